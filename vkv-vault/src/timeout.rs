//! # Timeout-Wrapped Lookup
//!
//! Races a `get` against a timer. When the timer wins the `get` future is
//! dropped, which cancels its pending slot on the connection, so a late
//! reply is discarded instead of reaching the next caller.

use std::time::Duration;

use tracing::warn;
use vkv_client::KVClient;

use crate::error::{VaultError, VaultResult};

/// Deadline applied to vault lookups.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(5000);

/// Fetches `key`, failing with [`VaultError::Timeout`] after `limit`.
pub async fn get_with_timeout(client: &KVClient, key: &str, limit: Duration) -> VaultResult<String> {
    match tokio::time::timeout(limit, client.get(key.as_bytes())).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!(key, timeout_ms = millis(limit), "lookup timed out");
            Err(VaultError::Timeout(limit))
        }
    }
}

// Saturates instead of truncating for deadlines past u64::MAX ms.
fn millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}
