use serde::{Deserialize, Serialize};

use crate::error::{Result, SubburnError};

/// ffprobe `-show_format -show_streams` JSON output
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    pub format: Option<ProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    pub duration: Option<String>,
}

/// The facts about a media file the pipeline depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Total duration in seconds
    pub duration: f64,
    /// Frames per second of the first video stream
    pub frame_rate: Option<f64>,
    /// The same rate as ffprobe reported it, e.g. "30000/1001"
    #[serde(default)]
    pub frame_rate_ratio: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_audio: bool,
}

impl MediaInfo {
    pub fn from_probe_json(json: &[u8]) -> Result<Self> {
        let probe: ProbeOutput = serde_json::from_slice(json)?;
        Ok(probe.into())
    }

    /// Frame width, or an error when the file has no video stream
    pub fn video_width(&self) -> Result<u32> {
        self.width
            .ok_or_else(|| SubburnError::Render("no video stream".to_string()))
    }
}

impl From<ProbeOutput> for MediaInfo {
    fn from(probe: ProbeOutput) -> Self {
        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));

        let has_audio = probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));

        // Container duration first, video stream duration as a fallback
        let duration = probe
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_seconds)
            .or_else(|| video.and_then(|v| v.duration.as_deref()).and_then(parse_seconds))
            .unwrap_or(0.0);

        let (frame_rate, frame_rate_ratio) = video
            .and_then(|v| {
                [v.avg_frame_rate.as_deref(), v.r_frame_rate.as_deref()]
                    .into_iter()
                    .flatten()
                    .find_map(|raw| parse_rational(raw).map(|fps| (fps, raw.trim().to_string())))
            })
            .unzip();

        MediaInfo {
            duration,
            frame_rate,
            frame_rate_ratio,
            width: video.and_then(|v| v.width),
            height: video.and_then(|v| v.height),
            has_audio,
        }
    }
}

fn parse_seconds(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parse an ffprobe rational like "30000/1001". "0/0" means unknown.
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (value.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "width": 1280, "height": 720,
             "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001", "duration": "12.012000"},
            {"index": 1, "codec_type": "audio", "duration": "12.000000"}
        ],
        "format": {"filename": "in.mp4", "duration": "12.000000"}
    }"#;

    #[test]
    fn test_parse_probe() {
        let info = MediaInfo::from_probe_json(PROBE.as_bytes()).unwrap();
        assert_eq!(info.duration, 12.0);
        assert_eq!(info.width, Some(1280));
        assert_eq!(info.height, Some(720));
        assert!(info.has_audio);
        let fps = info.frame_rate.unwrap();
        assert!((fps - 29.97).abs() < 0.01);
        assert_eq!(info.frame_rate_ratio.as_deref(), Some("30000/1001"));
    }

    #[test]
    fn test_stream_duration_fallback_and_missing_audio() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360,
                         "avg_frame_rate": "0/0", "r_frame_rate": "25/1", "duration": "3.5"}],
            "format": {}
        }"#;
        let info = MediaInfo::from_probe_json(json.as_bytes()).unwrap();
        assert_eq!(info.duration, 3.5);
        assert_eq!(info.frame_rate, Some(25.0));
        assert_eq!(info.frame_rate_ratio.as_deref(), Some("25/1"));
        assert!(!info.has_audio);
    }

    #[test]
    fn test_unreadable_duration_is_zero() {
        let json = r#"{"streams": [], "format": {"duration": "N/A"}}"#;
        let info = MediaInfo::from_probe_json(json.as_bytes()).unwrap();
        assert_eq!(info.duration, 0.0);
        assert!(info.video_width().is_err());
    }

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("25/1"), Some(25.0));
        assert_eq!(parse_rational("24"), Some(24.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("abc"), None);
    }
}
