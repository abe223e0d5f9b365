//! Iterable API client: pluggable authentication plus a resilient request
//! executor with retry and backoff.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::Authenticator;
pub use client::IterableClient;
pub use error::{ClientError, Result};
