//! # Client Errors
//!
//! Purpose: One error type for every failure the client can surface.
//!
//! ## Design Principles
//! 1. **Verbatim Socket Errors**: IO failures keep the OS message text.
//! 2. **Cloneable**: A single socket failure rejects every pending request,
//!    so the error must be cheap to duplicate.
//! 3. **Fail Fast**: Unsafe command input is rejected before any write.

use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client and the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Network or IO failure while connecting, reading, or writing.
    #[error("io error: {0}")]
    Io(String),
    /// The peer closed the connection or the client was shut down.
    #[error("connection closed")]
    Closed,
    /// A key or value cannot be encoded safely with the configured framing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Host and port could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}
