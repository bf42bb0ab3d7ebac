// Speech translation capability
//
// Audio in source language -> text in the target language, through an external
// speech-to-text model running in translate mode:
// - WhisperCpp: whisper.cpp command line (`whisper-cli --translate`)
// - OpenAI: OpenAI Whisper Python command line (`whisper --task translate`)
//
// Implementations are constructed once by the composition root and shared by
// reference with the pipeline.

pub mod common;
pub mod openai;
pub mod whisper_cpp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use common::*;
use crate::config::{TranslatorConfig, TranslatorImplementation};
use crate::error::Result;

/// Main trait for speech translation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechTranslator: Send + Sync {
    /// Translate the speech in `audio_path`. Silence gives an empty string.
    async fn translate(&self, audio_path: &Path) -> Result<String>;

    /// Whether `translate` may run concurrently on the same instance
    fn supports_concurrency(&self) -> bool {
        false
    }

    /// Release model resources
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory for creating translator instances
pub struct SpeechTranslatorFactory;

impl SpeechTranslatorFactory {
    /// Initialize the configured implementation. `model_path` is the resolved
    /// whisper.cpp model file; the OpenAI implementation takes the model name.
    pub async fn initialize(
        config: TranslatorConfig,
        model_path: Option<PathBuf>,
        tool_timeout: Duration,
    ) -> Result<Box<dyn SpeechTranslator>> {
        match config.implementation {
            TranslatorImplementation::WhisperCpp => {
                let translator = whisper_cpp::WhisperCppTranslator::initialize(config, model_path, tool_timeout).await?;
                Ok(Box::new(translator))
            }
            TranslatorImplementation::OpenAI => {
                let translator = openai::OpenAITranslator::initialize(config, tool_timeout).await?;
                Ok(Box::new(translator))
            }
        }
    }
}
