//! Error types for the delegation substrate

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by delegation results and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller supplied a malformed request; nothing was published
    InvalidArgument,
    /// No response arrived before the deadline
    TimedOut,
    /// The target agent answered with an explicit error
    RemoteError,
    /// Artifact put/get failed
    StorageError,
    /// A referenced artifact does not exist (or was evicted)
    NotFound,
    /// Publish or read failed at the bus layer
    TransportError,
    /// A fan-out member panicked or was torn down
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::RemoteError => "remote_error",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a bus client
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Bus request failed: {0}")]
    Request(String),

    #[error("Bus returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed bus message: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BusError {
    fn from(e: reqwest::Error) -> Self {
        BusError::Request(e.to_string())
    }
}

/// Errors raised by the artifact store and its backends
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Artifact backend error: {0}")]
    Backend(String),

    #[error("Artifact database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Artifact {bucket}/{key} failed integrity check: {reason}")]
    Corrupted {
        bucket: String,
        key: String,
        reason: String,
    },
}

impl ArtifactError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArtifactError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::StorageError,
        }
    }
}

/// Crate-wide error
#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Transport(#[from] BusError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Raised from inside a user-supplied tool implementation
    #[error(transparent)]
    Tool(#[from] anyhow::Error),
}

impl HandoffError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandoffError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            HandoffError::Transport(_) => ErrorKind::TransportError,
            HandoffError::Artifact(e) => e.kind(),
            HandoffError::Serialization(_) => ErrorKind::InvalidArgument,
            HandoffError::Tool(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for HandoffError {
    fn into_response(self) -> Response {
        let (status, message) = match self.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, self.to_string()),
            ErrorKind::TransportError => {
                tracing::error!("Transport error: {}", self);
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            _ => {
                tracing::error!("Internal error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, HandoffError>;
