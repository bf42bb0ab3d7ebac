use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, SubburnError};
use super::{MediaCommandBuilder, MediaEncoder, MediaInfo};

/// Concrete implementation of the media encoder (FFmpeg-based)
pub struct FfmpegEncoder {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegEncoder {
    /// Create a new encoder; every invocation is bounded by `tool_timeout`
    pub fn new(config: MediaConfig, tool_timeout: Duration) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path, &config.probe_path, tool_timeout);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        debug!("Probing {}", path.display());

        let stdout = self.command_builder.probe(path).execute().await?;
        let info = MediaInfo::from_probe_json(&stdout)?;

        debug!(
            "Probed {}: {:.3}s, {:?} fps, {:?}x{:?}, audio: {}",
            path.display(), info.duration, info.frame_rate, info.width, info.height, info.has_audio
        );
        Ok(info)
    }

    async fn cut(
        &self,
        source: &Path,
        info: &MediaInfo,
        start: f64,
        duration: f64,
        output_path: &Path,
    ) -> Result<()> {
        let command = self.command_builder.cut(
            source,
            start,
            duration,
            info.frame_rate_ratio.as_deref(),
            !info.has_audio,
            &self.config.video_codec,
            &self.config.audio_codec,
            &self.config.encode_options,
            output_path,
        );

        command.execute().await?;
        Ok(())
    }

    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(video_path, audio_path);
        command.execute().await?;

        Ok(())
    }

    async fn filter_video(&self, input_path: &Path, filter: &str, output_path: &Path) -> Result<()> {
        let command = self.command_builder.filter_video(
            input_path,
            filter,
            &self.config.video_codec,
            &self.config.encode_options,
            output_path,
        );

        command.execute().await?;
        Ok(())
    }

    async fn concatenate(&self, inputs: &[PathBuf], output_path: &Path) -> Result<()> {
        let first = inputs
            .first()
            .ok_or_else(|| SubburnError::Concatenation("nothing to concatenate".to_string()))?;
        let list_dir = first.parent().unwrap_or_else(|| Path::new("."));

        // The list lives next to the chunks so it goes away with the workspace
        let mut list_file = tempfile::Builder::new()
            .prefix("concat-")
            .suffix(".txt")
            .tempfile_in(list_dir)?;
        list_file.write_all(concat_list(inputs).as_bytes())?;
        list_file.flush()?;

        info!("Concatenating {} chunks into {}", inputs.len(), output_path.display());

        let command = self.command_builder.concatenate(list_file.path(), output_path);
        command.execute().await?;

        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        self.command_builder.version_check().execute().await?;
        self.command_builder.probe_version_check().execute().await?;
        info!("Media encoder is available");
        Ok(())
    }

    async fn get_version_info(&self) -> Result<String> {
        let stdout = self.command_builder.version_check().execute().await?;
        let version_info = String::from_utf8_lossy(&stdout);
        // The first line carries the version
        let first_line = version_info.lines().next().unwrap_or("Unknown version");
        Ok(first_line.to_string())
    }
}

/// Render a concat-demuxer list. Paths are made absolute and single quotes escaped.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.clone());
            let escaped = absolute.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_keeps_order_and_escapes() {
        let inputs = vec![
            PathBuf::from("/tmp/w/chunk_0000_subtitled.mp4"),
            PathBuf::from("/tmp/w/chunk_0001.mp4"),
            PathBuf::from("/tmp/w/it's.mp4"),
        ];
        let list = concat_list(&inputs);
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "file '/tmp/w/chunk_0000_subtitled.mp4'");
        assert_eq!(lines[1], "file '/tmp/w/chunk_0001.mp4'");
        assert_eq!(lines[2], r"file '/tmp/w/it'\''s.mp4'");
    }

    #[tokio::test]
    async fn test_concatenate_rejects_empty_input() {
        let encoder = FfmpegEncoder::new(crate::config::Config::default().media, Duration::from_secs(5));
        let err = encoder.concatenate(&[], Path::new("out.mp4")).await.unwrap_err();
        assert!(matches!(err, SubburnError::Concatenation(_)));
    }

    #[tokio::test]
    async fn test_missing_encoder_is_reported() {
        let mut config = crate::config::Config::default().media;
        config.binary_path = "/nonexistent/ffmpeg".to_string();
        let encoder = FfmpegEncoder::new(config, Duration::from_secs(5));
        let err = encoder.check_availability().await.unwrap_err();
        assert!(err.is_tool_unavailable());
    }
}
