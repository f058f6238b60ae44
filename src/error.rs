//! Error types for the tool invocation boundary.

use thiserror::Error;

/// Failures reaching the remote data service.
///
/// Upstream tool failures that come back as an error envelope are *not* errors here: they are
/// returned as a `ToolInvocationResult` with an error status. This type covers the cases where
/// no envelope could be obtained at all.
#[derive(Error, Debug)]
pub enum ToolServiceError {
    #[error("Tool '{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode service response: {0}")]
    Decode(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool '{tool}' failed after {attempts} attempts. Last error: {last_error}")]
    RetriesExhausted {
        tool: String,
        attempts: u32,
        last_error: String,
    },
}

impl ToolServiceError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ToolServiceError::Timeout { .. } | ToolServiceError::Transport(_) => true,
            ToolServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ToolServiceError::Decode(_)
            | ToolServiceError::Protocol(_)
            | ToolServiceError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ToolServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ToolServiceError::Decode(e.to_string())
        } else {
            ToolServiceError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ToolServiceError {
    fn from(e: serde_json::Error) -> Self {
        ToolServiceError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for ToolServiceError {
    fn from(e: std::io::Error) -> Self {
        ToolServiceError::Transport(e.to_string())
    }
}
