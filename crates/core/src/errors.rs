//! Error types shared across the promosync crates.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Row-source failures.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Could not establish a connection
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    Query(String),

    /// A row came back in a shape the models cannot represent
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or inconsistent configuration; fatal before any row is processed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Row-source error; fatal for the run
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
