//! Error types shared by the agent and collector

use std::fmt;

/// Result type alias for protocol and network operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that can occur while discovering, polling or receiving device status
#[derive(Debug)]
pub enum MonitorError {
    /// Connect, send or receive failed at the socket level
    Transport(std::io::Error),

    /// An operation did not complete within its deadline
    Timeout(String),

    /// A document could not be parsed or is missing required fields
    MalformedPayload(String),

    /// An HTTP exchange failed or returned a non-success status
    Http(String),

    /// The local subnet or live hosts could not be determined
    Discovery(String),

    /// Reading device sensors failed
    Sensor(String),
}

impl MonitorError {
    /// Whether the failure is worth retrying on the component's own schedule.
    ///
    /// Everything except a malformed payload is transient: retrying the same
    /// bytes would fail the same way.
    pub fn is_transient(&self) -> bool {
        !matches!(self, MonitorError::MalformedPayload(_))
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        MonitorError::MalformedPayload(msg.into())
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Transport(err) => write!(f, "transport error: {}", err),
            MonitorError::Timeout(msg) => write!(f, "timed out: {}", msg),
            MonitorError::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
            MonitorError::Http(msg) => write!(f, "http error: {}", msg),
            MonitorError::Discovery(msg) => write!(f, "discovery failed: {}", msg),
            MonitorError::Sensor(msg) => write!(f, "sensor read failed: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => MonitorError::Timeout(err.to_string()),
            _ => MonitorError::Transport(err),
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::MalformedPayload(err.to_string())
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MonitorError::Timeout(err.to_string())
        } else if err.is_decode() {
            MonitorError::MalformedPayload(err.to_string())
        } else {
            MonitorError::Http(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for MonitorError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        MonitorError::Timeout(err.to_string())
    }
}
