use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SubburnError};

/// Abstract external tool invocation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    pub timeout: Option<Duration>,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            timeout: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Bound the run time of the command
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Only print errors
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("error")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Name of the tool for error messages
    pub fn tool_name(&self) -> String {
        Path::new(&self.binary_path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.binary_path.clone())
    }

    /// Execute the command and return its standard output
    pub async fn execute(&self) -> Result<Vec<u8>> {
        debug!("Executing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let tool = self.tool_name();

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SubburnError::tool_unavailable(&tool, e))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| SubburnError::Timeout {
                    tool: tool.clone(),
                    after: limit,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| SubburnError::tool_failed(&tool, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubburnError::tool_failed(
                tool,
                format!("{} ({}): {}", self.description, output.status, stderr.trim()),
            ));
        }

        Ok(output.stdout)
    }
}

/// Builder for the ffmpeg/ffprobe invocations used by the pipeline
pub struct MediaCommandBuilder {
    binary_path: String,
    probe_path: String,
    timeout: Duration,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, probe_path: S2, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            probe_path: probe_path.into(),
            timeout,
        }
    }

    fn ffmpeg<S: Into<String>>(&self, description: S) -> MediaCommand {
        MediaCommand::new(&self.binary_path, description)
            .timeout(self.timeout)
            .quiet()
    }

    /// Build probe command emitting JSON stream and format information
    pub fn probe<P: AsRef<Path>>(&self, path: P) -> MediaCommand {
        MediaCommand::new(&self.probe_path, "Media probe")
            .timeout(self.timeout)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .output(path)
    }

    /// Build chunk extraction command. Re-encodes so that cuts are frame accurate.
    #[allow(clippy::too_many_arguments)]
    pub fn cut<P: AsRef<Path>>(
        &self,
        source: P,
        start: f64,
        duration: f64,
        frame_rate: Option<&str>,
        add_silence: bool,
        video_codec: &str,
        audio_codec: &str,
        encode_options: &[String],
        output_path: P,
    ) -> MediaCommand {
        let mut cmd = self
            .ffmpeg(format!("Cut {:.3}s from {:.3}s", duration, start))
            .overwrite()
            .arg("-ss").arg(format!("{:.3}", start))
            .arg("-t").arg(format!("{:.3}", duration))
            .input(&source);

        if add_silence {
            cmd = cmd
                .arg("-f").arg("lavfi")
                .input("anullsrc=r=44100:cl=stereo")
                .arg("-map").arg("0:v:0")
                .arg("-map").arg("1:a:0")
                .arg("-shortest");
        }

        if let Some(fps) = frame_rate {
            cmd = cmd.arg("-r").arg(fps);
        }

        cmd.video_codec(video_codec)
            .audio_codec(audio_codec)
            .args(encode_options.iter().cloned())
            .arg("-avoid_negative_ts").arg("make_zero")
            .output(output_path)
    }

    /// Build audio extraction command
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        self.ffmpeg("Audio extraction")
            .input(video_path)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(16000)
            .audio_channels(1)
            .overwrite()
            .output(audio_path)
    }

    /// Build a filtered re-encode that leaves the audio untouched
    pub fn filter_video<P: AsRef<Path>>(
        &self,
        input_path: P,
        filter: &str,
        video_codec: &str,
        encode_options: &[String],
        output_path: P,
    ) -> MediaCommand {
        self.ffmpeg("Subtitle overlay")
            .overwrite()
            .input(input_path)
            .video_filter(filter)
            .video_codec(video_codec)
            .args(encode_options.iter().cloned())
            .copy_audio()
            .output(output_path)
    }

    /// Build concat-demuxer command joining the files listed in `list_file`
    pub fn concatenate<P: AsRef<Path>>(&self, list_file: P, output_path: P) -> MediaCommand {
        self.ffmpeg("Concatenate chunks")
            .arg("-f").arg("concat")
            .arg("-safe").arg("0")
            .input(list_file)
            .arg("-c").arg("copy")
            .arg("-movflags").arg("+faststart")
            .overwrite()
            .output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check")
            .timeout(self.timeout)
            .arg("-version")
    }

    /// Build probe version check command
    pub fn probe_version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.probe_path, "Version check")
            .timeout(self.timeout)
            .arg("-version")
    }
}
