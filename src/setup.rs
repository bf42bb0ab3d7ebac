use std::path::{Path, PathBuf};
use std::fs;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use reqwest::Client;
use tracing::{info, warn};
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Result, SubburnError};

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Resolves and downloads whisper.cpp models under `<base>/models`
pub struct SetupManager {
    client: Client,
    base_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub filename: String,
    pub url: String,
    pub size_mb: f64,
}

impl ModelInfo {
    fn ggml(name: &str, size_mb: f64) -> Self {
        let filename = format!("ggml-{}.bin", name);
        Self {
            name: name.to_string(),
            url: format!("{}/{}", MODEL_BASE_URL, filename),
            filename,
            size_mb,
        }
    }
}

impl SetupManager {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(base_dir.join("models"))?;

        let client = Client::builder()
            .user_agent(concat!("subburn/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_dir })
    }

    pub fn models_dir(&self) -> PathBuf {
        self.base_dir.join("models")
    }

    /// Multilingual models only: English-only (`.en`) models cannot translate
    pub fn get_available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo::ggml("tiny", 75.0),
            ModelInfo::ggml("base", 142.0),
            ModelInfo::ggml("small", 466.0),
            ModelInfo::ggml("medium", 1500.0),
            ModelInfo::ggml("large-v3", 2900.0),
        ]
    }

    /// Local file for a model name or path, if it is already present
    pub fn resolve_model_path(&self, model: &str) -> Option<PathBuf> {
        let as_path = Path::new(model);
        if (model.contains('/') || model.ends_with(".bin")) && as_path.is_file() {
            return Some(as_path.to_path_buf());
        }

        let filename = if model.ends_with(".bin") {
            model.to_string()
        } else {
            format!("ggml-{}.bin", model)
        };
        let local_path = self.models_dir().join(filename);
        local_path.is_file().then_some(local_path)
    }

    /// Return the model file, downloading it first if needed
    pub async fn ensure_model(&self, model: &str) -> Result<PathBuf> {
        if model.ends_with(".en") {
            return Err(SubburnError::Config(format!(
                "model '{}' is English-only and cannot translate",
                model
            )));
        }

        if let Some(path) = self.resolve_model_path(model) {
            info!("Using whisper model {}", path.display());
            return Ok(path);
        }

        if model.contains('/') {
            return Err(SubburnError::FileNotFound(model.to_string()));
        }

        let models = self.get_available_models();
        let info = models
            .iter()
            .find(|m| m.name == model)
            .cloned()
            .ok_or_else(|| SubburnError::Config(format!("unknown whisper model '{}'", model)))?;

        self.download_model(&info).await
    }

    pub async fn download_model(&self, model: &ModelInfo) -> Result<PathBuf> {
        let local_path = self.models_dir().join(&model.filename);

        if local_path.exists() {
            info!("Model {} already exists at {}", model.name, local_path.display());
            return Ok(local_path);
        }

        info!("Downloading {} model ({:.1} MB)...", model.name, model.size_mb);

        let mut response = self.client.get(&model.url).send().await?;

        if !response.status().is_success() {
            return Err(SubburnError::Config(format!(
                "Failed to download model {}: HTTP {}",
                model.name, response.status()
            )));
        }

        let total = response
            .content_length()
            .unwrap_or((model.size_mb * 1_000_000.0) as u64);
        let pb = ProgressBar::new(total);
        match ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            Ok(style) => pb.set_style(style.progress_chars("#>-")),
            Err(e) => warn!("Progress bar template rejected: {}", e),
        }

        // Stream into a temporary file and move it into place when complete
        let temp_path = local_path.with_extension("tmp");
        if let Err(e) = stream_to_file(&mut response, &temp_path, &pb).await {
            pb.abandon();
            if let Err(cleanup) = async_fs::remove_file(&temp_path).await {
                warn!("Cleanup warning: failed to remove {}: {}", temp_path.display(), cleanup);
            }
            return Err(e);
        }

        async_fs::rename(&temp_path, &local_path).await?;

        pb.finish_with_message(format!("Downloaded {}", model.name));
        info!("Successfully downloaded {} to {}", model.name, local_path.display());

        Ok(local_path)
    }
}

async fn stream_to_file(response: &mut reqwest::Response, path: &Path, pb: &ProgressBar) -> Result<()> {
    let mut file = async_fs::File::create(path).await?;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    Ok(())
}
