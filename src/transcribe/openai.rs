// OpenAI Whisper Python command line, run with `--task translate`

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TranslatorConfig;
use crate::error::{Result, SubburnError};
use crate::media::MediaCommand;
use super::{Accelerator, OpenAIWhisperOutput, SpeechTranslator, TranscriptText, read_json_output, select_accelerator};

/// OpenAI Whisper translator
pub struct OpenAITranslator {
    config: TranslatorConfig,
    accelerator: Accelerator,
    timeout: Duration,
}

impl OpenAITranslator {
    pub async fn initialize(config: TranslatorConfig, timeout: Duration) -> Result<Self> {
        MediaCommand::new(&config.binary_path, "Availability check")
            .arg("--help")
            .timeout(timeout)
            .execute()
            .await?;

        let accelerator = select_accelerator(config.device).await?;
        info!("OpenAI Whisper ready: model {} on {}", config.model, accelerator);

        Ok(Self {
            config,
            accelerator,
            timeout,
        })
    }

    fn command(&self, audio_path: &Path, output_dir: &Path) -> MediaCommand {
        // PyTorch only gets CUDA here; Metal hosts run on CPU
        let device = match self.accelerator {
            Accelerator::Cuda => "cuda",
            Accelerator::Metal | Accelerator::Cpu => "cpu",
        };

        let mut cmd = MediaCommand::new(&self.config.binary_path, "Speech translation")
            .timeout(self.timeout)
            .arg(audio_path.to_string_lossy().to_string())
            .arg("--model").arg(&self.config.model)
            .arg("--task").arg("translate")
            .arg("--device").arg(device)
            .arg("--threads").arg(self.config.threads.to_string())
            .arg("--output_format").arg("json")
            .arg("--output_dir").arg(output_dir.to_string_lossy().to_string())
            .arg("--verbose").arg("False");

        if device == "cpu" {
            cmd = cmd.arg("--fp16").arg("False");
        }
        if let Some(language) = &self.config.language {
            cmd = cmd.arg("--language").arg(language);
        }
        cmd
    }
}

#[async_trait]
impl SpeechTranslator for OpenAITranslator {
    async fn translate(&self, audio_path: &Path) -> Result<String> {
        debug!("Translating speech in {}", audio_path.display());

        let temp_dir = tempfile::tempdir()
            .map_err(|e| SubburnError::Translation(format!("Failed to create temp directory: {}", e)))?;

        self.command(audio_path, temp_dir.path())
            .execute()
            .await
            .map_err(|e| e.into_stage(SubburnError::Translation))?;

        let stem = audio_path
            .file_stem()
            .ok_or_else(|| SubburnError::Translation("Invalid audio filename".to_string()))?;
        let json_file = temp_dir.path().join(format!("{}.json", stem.to_string_lossy()));

        let output: OpenAIWhisperOutput = read_json_output(&json_file).await?;
        Ok(output.transcript_text())
    }
}
