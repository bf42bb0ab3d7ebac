use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TranslatorConfig;
use crate::error::{Result, SubburnError};
use crate::media::MediaCommand;
use super::{Accelerator, SpeechTranslator, TranscriptText, WhisperCppOutput, read_json_output, select_accelerator};

/// whisper.cpp command line translator
pub struct WhisperCppTranslator {
    config: TranslatorConfig,
    model_path: PathBuf,
    accelerator: Accelerator,
    timeout: Duration,
}

impl WhisperCppTranslator {
    /// Check the binary and model, and choose the compute device
    pub async fn initialize(
        config: TranslatorConfig,
        model_path: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let model_path = model_path.unwrap_or_else(|| PathBuf::from(&config.model));
        if !model_path.is_file() {
            return Err(SubburnError::FileNotFound(format!(
                "whisper.cpp model {}",
                model_path.display()
            )));
        }

        MediaCommand::new(&config.binary_path, "Availability check")
            .arg("--help")
            .timeout(timeout)
            .execute()
            .await?;

        let accelerator = select_accelerator(config.device).await?;

        info!(
            "whisper.cpp ready: {} with model {} on {}",
            config.binary_path,
            model_path.display(),
            accelerator
        );

        Ok(Self {
            config,
            model_path,
            accelerator,
            timeout,
        })
    }

    fn command(&self, audio_path: &Path, output_base: &Path) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.config.binary_path, "Speech translation")
            .timeout(self.timeout)
            .arg("-m").arg(self.model_path.to_string_lossy().to_string())
            .arg("-f").arg(audio_path.to_string_lossy().to_string())
            .arg("--translate")
            .arg("-l").arg(self.config.language.clone().unwrap_or_else(|| "auto".to_string()))
            .arg("-t").arg(self.config.threads.to_string())
            .arg("-oj")
            .arg("-of").arg(output_base.to_string_lossy().to_string())
            .arg("-np");

        if !self.accelerator.is_gpu() {
            cmd = cmd.arg("-ng");
        }
        cmd
    }
}

#[async_trait]
impl SpeechTranslator for WhisperCppTranslator {
    async fn translate(&self, audio_path: &Path) -> Result<String> {
        debug!("Translating speech in {}", audio_path.display());

        let temp_dir = tempfile::tempdir()
            .map_err(|e| SubburnError::Translation(format!("Failed to create temp directory: {}", e)))?;
        let output_base = temp_dir.path().join("result");

        self.command(audio_path, &output_base)
            .execute()
            .await
            .map_err(|e| e.into_stage(SubburnError::Translation))?;

        let output: WhisperCppOutput = read_json_output(&output_base.with_extension("json")).await?;
        Ok(output.transcript_text())
    }
}
