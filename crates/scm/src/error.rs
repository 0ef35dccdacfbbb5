//! Error types for issue tracker operations.

use thiserror::Error;

/// Errors returned by an [`IssueTracker`](crate::IssueTracker).
#[derive(Debug, Error)]
pub enum ScmError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client was misconfigured (bad token, bad base URL)
    #[error("Client configuration error: {0}")]
    Configuration(String),
}

impl ScmError {
    /// True when the API reported that the addressed resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScmError::Api { status: 404, .. })
    }
}
