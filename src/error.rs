use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How an external tool invocation went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFailure {
    /// The binary could not be resolved or spawned.
    Unavailable,
    /// The process ran and exited non-zero (or produced unusable output).
    Failed,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolFailure::Unavailable => write!(f, "is not available"),
            ToolFailure::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SubburnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("{tool} {kind}: {message}")]
    ExternalTool {
        tool: String,
        kind: ToolFailure,
        message: String,
    },

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Subtitle rendering error: {0}")]
    Render(String),

    #[error("Concatenation error: {0}")]
    Concatenation(String),

    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl SubburnError {
    pub fn tool_unavailable<T: Into<String>, M: fmt::Display>(tool: T, message: M) -> Self {
        SubburnError::ExternalTool {
            tool: tool.into(),
            kind: ToolFailure::Unavailable,
            message: message.to_string(),
        }
    }

    pub fn tool_failed<T: Into<String>, M: fmt::Display>(tool: T, message: M) -> Self {
        SubburnError::ExternalTool {
            tool: tool.into(),
            kind: ToolFailure::Failed,
            message: message.to_string(),
        }
    }

    /// The encoder or model binary could not be found or started.
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(
            self,
            SubburnError::ExternalTool {
                kind: ToolFailure::Unavailable,
                ..
            }
        )
    }

    /// Failures that a bounded retry may clear. A missing tool never is.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubburnError::ExternalTool { kind, .. } => *kind == ToolFailure::Failed,
            SubburnError::Translation(_) => true,
            _ => false,
        }
    }

    /// Re-labels a failed tool run as a stage error. Unavailable tools and
    /// timeouts keep their own kind.
    pub fn into_stage<F>(self, stage: F) -> Self
    where
        F: FnOnce(String) -> SubburnError,
    {
        match self {
            SubburnError::ExternalTool {
                tool,
                kind: ToolFailure::Failed,
                message,
            } => stage(format!("{}: {}", tool, message)),
            SubburnError::Io(e) => stage(e.to_string()),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SubburnError>;
