// Error types for the download pipeline

use thiserror::Error;

use super::diagnostics::{diagnose_error, BlockingReason};

/// User-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The URL could not be parsed into a video or playlist id
    UrlParse,
    /// No stream satisfies the active selection policy
    NoMatchingStream,
    /// Transfer, tool, or metadata failure
    Download,
}

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// URL lacks the expected `v=` or `list=` parameter
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Stream resolver found no candidate
    #[error("No matching stream: {0}")]
    NoMatchingStream(String),

    /// Network timeout while talking to YouTube
    #[error("Network timeout: YouTube is not responding")]
    NetworkTimeout,

    /// YouTube refused the request (403, rate limit, bot check, restriction)
    #[error("{reason}: {details}")]
    Blocked { reason: &'static str, details: String },

    /// yt-dlp or python not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Command execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// HTTP failure while transferring a stream
    #[error("Network error: {0}")]
    Network(String),

    /// Local file system failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Unknown error with details
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DownloadError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUrl(_) => ErrorCategory::UrlParse,
            Self::NoMatchingStream(_) => ErrorCategory::NoMatchingStream,
            _ => ErrorCategory::Download,
        }
    }
}

// Classify raw tool output (usually yt-dlp stderr)
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let details = s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(3)
            .collect::<Vec<_>>()
            .join(" | ");

        if s.contains("command not found") || s.contains("No such file") {
            return Self::ToolNotFound(details);
        }

        if s.contains("Unsupported URL") || s.contains("is not a valid URL") {
            return Self::InvalidUrl(details);
        }

        match diagnose_error(&s) {
            Some(BlockingReason::NetworkTimeout) => Self::NetworkTimeout,
            Some(BlockingReason::Unknown) | None => Self::Unknown(details),
            Some(reason) => Self::Blocked {
                reason: reason.description(),
                details,
            },
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::NetworkTimeout
        } else {
            Self::Network(e.to_string())
        }
    }
}
