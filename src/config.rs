use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, SubburnError};

// Default values for optional configuration keys
fn default_chunk_duration() -> f64 {
    5.0
}

fn default_workers() -> usize {
    1
}

fn default_tool_timeout_secs() -> u64 {
    600
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_skip_empty() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub segment: SegmentConfig,
    pub translator: TranslatorConfig,
    pub media: MediaConfig,
    pub subtitle: SubtitleConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Length of each chunk in seconds
    #[serde(default = "default_chunk_duration")]
    pub chunk_duration: f64,
    /// Directory under which per-run workspaces are created (system temp dir when unset)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Speech-to-text implementation
    pub implementation: TranslatorImplementation,
    /// Path to the speech-to-text binary (whisper-cli or whisper)
    pub binary_path: String,
    /// Model name (e.g. "base") or path to a model file
    pub model: String,
    /// Compute device selection
    pub device: Device,
    /// Number of threads handed to the model
    pub threads: u32,
    /// Source language hint; auto-detected when unset
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslatorImplementation {
    /// whisper.cpp command line (whisper-cli)
    WhisperCpp,
    /// OpenAI Whisper Python command line (whisper)
    OpenAI,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    /// Probe for an accelerator at startup and fall back to CPU
    Auto,
    /// Always run on CPU
    Cpu,
    /// Require a GPU
    Gpu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Path to ffprobe binary
    pub probe_path: String,
    /// Video encoder used for chunks and overlays
    pub video_codec: String,
    /// Audio encoder used for chunks
    pub audio_codec: String,
    /// Additional encoding options appended to every re-encode
    /// Common options: ["-preset", "veryfast", "-crf", "23", "-pix_fmt", "yuv420p"]
    pub encode_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleConfig {
    /// Caption font size in pixels
    pub font_size: u32,
    /// Caption text color (ffmpeg color syntax)
    pub font_color: String,
    /// Background box color (ffmpeg color syntax, may carry @alpha)
    pub box_color: String,
    /// Border width of the background box in pixels
    pub box_border: u32,
    /// Distance between caption and bottom edge in pixels
    pub bottom_margin: u32,
    /// Optional font file for drawtext
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    /// Skip the overlay entirely for empty transcripts
    #[serde(default = "default_skip_empty")]
    pub skip_empty: bool,
    /// Center every caption line, not only the block (drawtext text_align, ffmpeg 6.1+)
    #[serde(default)]
    pub center_lines: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Well-known output artifact path, overwritten by each run
    pub output_path: PathBuf,
    /// Append the run id to the output file name instead of overwriting
    #[serde(default)]
    pub unique_output: bool,
    /// Number of chunks processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upper bound for a single external tool invocation
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Retries for failed audio extraction and translation
    #[serde(default)]
    pub max_retries: u32,
    /// Pause between retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment: SegmentConfig {
                chunk_duration: default_chunk_duration(),
                workspace_root: None,
            },
            translator: TranslatorConfig {
                implementation: TranslatorImplementation::WhisperCpp,
                binary_path: "whisper-cli".to_string(),
                model: "base".to_string(),
                device: Device::Auto,
                threads: 4,
                language: None,
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                probe_path: "ffprobe".to_string(),
                video_codec: "libx264".to_string(),
                audio_codec: "aac".to_string(),
                encode_options: vec![
                    "-preset".to_string(), "veryfast".to_string(),
                    "-pix_fmt".to_string(), "yuv420p".to_string(),
                ],
            },
            subtitle: SubtitleConfig {
                font_size: 24,
                font_color: "white".to_string(),
                box_color: "black@0.6".to_string(),
                box_border: 10,
                bottom_margin: 20,
                font_file: None,
                skip_empty: default_skip_empty(),
                center_lines: false,
            },
            pipeline: PipelineConfig {
                output_path: PathBuf::from("static/output.mp4"),
                unique_output: false,
                workers: default_workers(),
                tool_timeout_secs: default_tool_timeout_secs(),
                max_retries: 0,
                retry_backoff_ms: default_retry_backoff_ms(),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubburnError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| SubburnError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SubburnError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SubburnError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.segment.chunk_duration.is_finite() && self.segment.chunk_duration > 0.0) {
            return Err(SubburnError::Config(format!(
                "chunk_duration must be positive, got {}",
                self.segment.chunk_duration
            )));
        }
        if self.pipeline.workers == 0 {
            return Err(SubburnError::Config("workers must be at least 1".to_string()));
        }
        if self.pipeline.tool_timeout_secs == 0 {
            return Err(SubburnError::Config("tool_timeout_secs must be at least 1".to_string()));
        }
        if self.subtitle.font_size == 0 {
            return Err(SubburnError::Config("font_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
