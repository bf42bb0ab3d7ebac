// Media encoding capability
//
// Everything that touches ffmpeg/ffprobe goes through the MediaEncoder trait:
// - Probe: duration, frame rate and geometry of a file
// - Commands: argument builders and process execution with timeouts
// - Processor: the ffmpeg-backed implementation

pub mod commands;
pub mod probe;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use commands::*;
pub use probe::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// External media encoding operations used by the pipeline
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Read duration, frame rate and geometry of a media file
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Encode `[start, start + duration)` of `source` into `output_path`.
    /// When `info` says the source has no audio, a silent track is added.
    async fn cut(
        &self,
        source: &Path,
        info: &MediaInfo,
        start: f64,
        duration: f64,
        output_path: &Path,
    ) -> Result<()>;

    /// Transcode the audio of a video into 16 kHz mono WAV
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;

    /// Re-encode the video through a filter graph, copying audio unchanged
    async fn filter_video(&self, input_path: &Path, filter: &str, output_path: &Path) -> Result<()>;

    /// Join `inputs` in the given order into `output_path`
    async fn concatenate(&self, inputs: &[PathBuf], output_path: &Path) -> Result<()>;

    /// Check if the encoder and probe binaries are available
    async fn check_availability(&self) -> Result<()>;

    /// Get encoder version information
    async fn get_version_info(&self) -> Result<String>;
}

/// Factory for creating media encoder instances
pub struct MediaEncoderFactory;

impl MediaEncoderFactory {
    /// Create the default media encoder implementation (FFmpeg-based)
    pub fn create_encoder(config: MediaConfig, tool_timeout: Duration) -> Box<dyn MediaEncoder> {
        Box::new(processor::FfmpegEncoder::new(config, tool_timeout))
    }
}
