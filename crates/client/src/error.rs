//! Error types for the API client crate.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while constructing authenticators or producing headers.
///
/// Request failures never surface here; the executor folds them into the
/// returned outcome so one record can never abort the batch.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid client or auth configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Authentication header could not be produced
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Token signing failed
    #[error("Token signing error: {0}")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),
}

impl ClientError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }
}
