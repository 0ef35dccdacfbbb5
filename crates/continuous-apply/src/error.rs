//! Crate-level error type.

use scm::ScmError;
use thiserror::Error;

use crate::cluster::AccessorError;
use crate::manifest::ManifestError;
use crate::markers::MarkerError;
use crate::status::StatusError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Issue tracker error: {0}")]
    Scm(#[from] ScmError),

    #[error("git {command} failed: {output}")]
    Git { command: String, output: String },

    #[error("Rendering {path} failed: {output}")]
    Render { path: String, output: String },

    #[error("Applying {object} failed: {output}")]
    Apply { object: String, output: String },

    #[error("Rollout status of {object} unavailable: {source}")]
    Status {
        object: String,
        #[source]
        source: StatusError,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Marker(#[from] MarkerError),

    #[error(transparent)]
    Accessor(#[from] AccessorError),

    #[error("No matching pull request found")]
    NoMatchingPullRequest,

    #[error("No matching issue found")]
    NoMatchingIssue,

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Nothing qualifying exists yet; the caller should back off and retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NoMatchingPullRequest | Error::NoMatchingIssue)
    }

    /// Errors no amount of retrying will fix.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Template(_))
    }
}

impl From<handlebars::RenderError> for Error {
    fn from(error: handlebars::RenderError) -> Self {
        Error::Template(error.to_string())
    }
}

impl From<handlebars::TemplateError> for Error {
    fn from(error: handlebars::TemplateError) -> Self {
        Error::Template(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
