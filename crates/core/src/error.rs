//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("path is empty")]
    EmptyPath,

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid upstream: {0}")]
    InvalidUpstream(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
