//! Error types for refpromote

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{RefKind, Stage};

/// Promotion error types
#[derive(Error, Debug)]
pub enum PromoteError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reference '{name}' not found as a tag or branch on {url}")]
    ReferenceNotFound { name: String, url: String },

    #[error("Transport error talking to {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Authentication rejected by {0}")]
    AuthenticationRejected(String),

    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Push of {refname} was rejected: {message}")]
    PushRejected { refname: String, message: String },

    #[error("{kind} '{name}' already exists on the destination")]
    ReferenceExists { kind: RefKind, name: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Secret lookup failed: {0}")]
    Secret(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<PromoteError>,
    },
}

impl PromoteError {
    /// Wrap this error with the pipeline stage that raised it.
    ///
    /// Already-wrapped errors keep their original stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            PromoteError::StageFailed { .. } => self,
            other => PromoteError::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping stage wrappers
    pub fn root(&self) -> &PromoteError {
        match self {
            PromoteError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// The stage that failed, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PromoteError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self.root() {
            PromoteError::Git(_) => "GIT_ERROR",
            PromoteError::Io(_) => "IO_ERROR",
            PromoteError::ReferenceNotFound { .. } => "REFERENCE_NOT_FOUND",
            PromoteError::Transport { .. } => "TRANSPORT_ERROR",
            PromoteError::AuthenticationRejected(_) => "AUTH_REJECTED",
            PromoteError::TimedOut(_) => "TIMED_OUT",
            PromoteError::Cancelled => "CANCELLED",
            PromoteError::PushRejected { .. } => "PUSH_REJECTED",
            PromoteError::ReferenceExists { .. } => "REFERENCE_EXISTS",
            PromoteError::InvalidRequest(_) => "INVALID_REQUEST",
            PromoteError::Secret(_) => "SECRET_ERROR",
            PromoteError::Api(_) => "API_ERROR",
            PromoteError::StageFailed { .. } => "STAGE_FAILED",
        }
    }
}

/// Serializable error response for console and JSON output
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl From<&PromoteError> for ErrorResponse {
    fn from(error: &PromoteError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
            stage: error.stage(),
        }
    }
}

impl From<PromoteError> for ErrorResponse {
    fn from(error: PromoteError) -> Self {
        ErrorResponse::from(&error)
    }
}

impl serde::Serialize for PromoteError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ErrorResponse::from(self).serialize(serializer)
    }
}

/// Result type alias for refpromote operations
pub type Result<T> = std::result::Result<T, PromoteError>;
