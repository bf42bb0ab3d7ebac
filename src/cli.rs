use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a video and burn the translation in as subtitles
    Process {
        /// Input video file, or "-" to read the upload from stdin
        #[arg(short, long)]
        input: PathBuf,

        /// File name of an upload read from stdin
        #[arg(long)]
        filename: Option<String>,

        /// Output video file (defaults to the configured output slot)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chunk length in seconds
        #[arg(long)]
        chunk_duration: Option<f64>,

        /// Number of chunks processed concurrently
        #[arg(long)]
        workers: Option<usize>,

        /// Name the output after the run instead of overwriting the slot
        #[arg(long)]
        unique: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a video would be split into chunks
    Plan {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Chunk length in seconds
        #[arg(long)]
        chunk_duration: Option<f64>,
    },

    /// Extract the speech-model audio track of a video
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Translate the speech in an audio file and print the text
    Translate {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Burn a caption into a video chunk
    Render {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Caption text
        #[arg(short, long)]
        text: String,
    },

    /// Check that ffmpeg, ffprobe and the speech model are usable
    Check,

    /// List available whisper models and their status
    Models {
        /// Download all missing models
        #[arg(long)]
        download: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Destination file
        #[arg(short, long, default_value = "subburn.toml")]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
