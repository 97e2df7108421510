//! # VeroKV Secret Vault
//!
//! Purpose: Encrypt messages under one-time secrets and keep only the
//! ciphertext in VeroKV, keyed by a hash of the secret.
//!
//! ## Design Principles
//! 1. **HTTP-Agnostic**: Handlers return a status code and JSON body; any web
//!    framework can send them.
//! 2. **Bounded Lookups**: Every read races a deadline; a timeout reads as
//!    "not found".
//! 3. **Secrets Stay Client-Side**: Only hashes and ciphertext reach the store.

pub mod cipher;
mod error;
mod route;
mod timeout;

pub use error::{VaultError, VaultResult};
pub use route::{DecryptRequest, RouteResponse, SecretVault, VaultRequest};
pub use timeout::{get_with_timeout, DEFAULT_LOOKUP_TIMEOUT};
