use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SubburnError};
use crate::media::MediaEncoder;

/// Audio track path for a chunk: same base name, `.wav` extension
pub fn audio_path_for(chunk_path: &Path) -> PathBuf {
    chunk_path.with_extension("wav")
}

/// Produces a standalone speech-model input track from a video chunk
pub struct AudioExtractor {
    encoder: Arc<dyn MediaEncoder>,
}

impl AudioExtractor {
    pub fn new(encoder: Arc<dyn MediaEncoder>) -> Self {
        Self { encoder }
    }

    /// Extract the audio of `chunk_path`. Repeated calls overwrite the same file.
    pub async fn extract_audio(&self, chunk_path: &Path) -> Result<PathBuf> {
        let audio_path = audio_path_for(chunk_path);

        self.encoder.extract_audio(chunk_path, &audio_path).await?;

        if !audio_path.is_file() {
            return Err(SubburnError::tool_failed(
                "ffmpeg",
                format!("no audio written to {}", audio_path.display()),
            ));
        }

        debug!("Audio track ready: {}", audio_path.display());
        Ok(audio_path)
    }
}
