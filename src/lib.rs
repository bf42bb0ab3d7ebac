//! Subburn - translated, burned-in subtitles for videos
//!
//! Splits a video into fixed-length chunks, translates the speech of every
//! chunk with whisper, draws the translation onto the chunk with ffmpeg and
//! joins the chunks back into one video.

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod segment;
pub mod setup;
pub mod source;
pub mod subtitle;
pub mod transcribe;
