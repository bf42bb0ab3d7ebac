use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Device;
use crate::error::{Result, SubburnError};
use crate::media::MediaCommand;

/// whisper.cpp `-oj` JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOutput {
    pub result: Option<WhisperCppResult>,
    #[serde(default)]
    pub transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppResult {
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppSegment {
    pub offsets: Option<WhisperCppOffsets>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOffsets {
    pub from: i64,
    pub to: i64,
}

/// OpenAI Whisper `--output_format json` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperOutput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<OpenAIWhisperSegment>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Converts a service-specific result into the single transcript string
pub trait TranscriptText {
    fn transcript_text(&self) -> String;
}

impl TranscriptText for WhisperCppOutput {
    fn transcript_text(&self) -> String {
        join_segments(self.transcription.iter().map(|s| s.text.as_str()))
    }
}

impl TranscriptText for OpenAIWhisperOutput {
    fn transcript_text(&self) -> String {
        let text = normalize_whitespace(&self.text);
        if text.is_empty() {
            join_segments(self.segments.iter().map(|s| s.text.as_str()))
        } else {
            text
        }
    }
}

fn join_segments<'a, I: Iterator<Item = &'a str>>(segments: I) -> String {
    let joined: Vec<String> = segments
        .map(normalize_whitespace)
        .filter(|s| !s.is_empty())
        .collect();
    joined.join(" ")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compute device a model actually runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    Cuda,
    Metal,
    Cpu,
}

impl Accelerator {
    pub fn is_gpu(&self) -> bool {
        !matches!(self, Accelerator::Cpu)
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accelerator::Cuda => write!(f, "cuda"),
            Accelerator::Metal => write!(f, "metal"),
            Accelerator::Cpu => write!(f, "cpu"),
        }
    }
}

/// Resolve the configured device. Latency-only decision; output is the same.
pub async fn select_accelerator(device: Device) -> Result<Accelerator> {
    let detected = detect_gpu().await;
    debug!("Detected accelerator: {:?}", detected);

    let selected = match (device, detected) {
        (Device::Cpu, _) => Accelerator::Cpu,
        (Device::Auto, Some(gpu)) | (Device::Gpu, Some(gpu)) => gpu,
        (Device::Auto, None) => Accelerator::Cpu,
        (Device::Gpu, None) => {
            return Err(SubburnError::Config("GPU requested but none was detected".to_string()));
        }
    };

    info!("Speech model will run on {}", selected);
    Ok(selected)
}

async fn detect_gpu() -> Option<Accelerator> {
    let probe = MediaCommand::new("nvidia-smi", "GPU probe")
        .arg("-L")
        .timeout(Duration::from_secs(10));
    if probe.execute().await.is_ok() {
        return Some(Accelerator::Cuda);
    }

    if cfg!(target_os = "macos") {
        return Some(Accelerator::Metal);
    }

    None
}

/// Read a JSON result file produced by a speech model
pub async fn read_json_output<T: for<'de> Deserialize<'de>>(path: &std::path::Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SubburnError::Translation(format!("Failed to read output {}: {}", path.display(), e)))?;

    serde_json::from_str(&content)
        .map_err(|e| SubburnError::Translation(format!("Failed to parse model output: {}", e)))
}
