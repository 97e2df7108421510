//! Error types for the secret vault.

use std::time::Duration;

use thiserror::Error;
use vkv_client::ClientError;

/// Result type alias using VaultError
pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The store did not answer before the deadline.
    #[error("timeout: no reply within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("cipher error: {0}")]
    Cipher(String),
}
