use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{Result, SubburnError};

/// The input video of a run. An uploaded copy lives in a staging directory
/// owned by this value.
#[derive(Debug)]
pub struct SourceVideo {
    path: PathBuf,
    staging: Option<TempDir>,
}

impl SourceVideo {
    /// Reference an existing file in place
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SubburnError::FileNotFound(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            staging: None,
        })
    }

    /// Receive an upload into a fresh staging directory.
    ///
    /// Only the final component of `filename` is used. A missing or empty
    /// filename is rejected.
    pub async fn receive<R>(mut reader: R, filename: &str, staging_root: Option<&Path>) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let name = Path::new(filename.trim())
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SubburnError::Config("No file selected for uploading".to_string()))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("subburn-upload-");
        let staging = match staging_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let path = staging.path().join(&name);
        let mut file = tokio::fs::File::create(&path).await?;
        let bytes = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;

        if bytes == 0 {
            return Err(SubburnError::Config(format!("Uploaded file {} is empty", name)));
        }

        info!("Received upload {} ({} bytes)", name, bytes);
        Ok(Self {
            path,
            staging: Some(staging),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file lives in a staging directory owned by this value
    pub fn is_staged(&self) -> bool {
        self.staging.is_some()
    }

    /// Remove the staging directory, if any. Failures are logged only.
    pub fn release(mut self) {
        if let Some(staging) = self.staging.take() {
            let dir = staging.path().to_path_buf();
            match staging.close() {
                Ok(()) => debug!("Removed staging directory {}", dir.display()),
                Err(e) => warn!("Cleanup warning: failed to remove staging directory {}: {}", dir.display(), e),
            }
        }
    }
}
