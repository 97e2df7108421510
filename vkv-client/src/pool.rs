//! # Connection Pool
//!
//! Purpose: Share a bounded set of connected clients across concurrent
//! callers with explicit checkout/return.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle clients,
//!    never across an `.await`.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **Self-Healing**: Errored or closed clients are discarded, not reused.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::client::{ClientConfig, KVClient};
use crate::error::{ClientError, ClientResult};

struct PoolState {
    idle: VecDeque<KVClient>,
    total: usize,
}

struct PoolInner {
    config: ClientConfig,
    state: Mutex<PoolState>,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates an empty pool; connections are opened lazily on acquire.
    pub fn new(config: ClientConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Checks out a client, connecting a new one if none is idle.
    ///
    /// **Logic**:
    /// 1. Reuse the oldest idle client that is still usable.
    /// 2. Otherwise reserve a slot, failing with `PoolExhausted` at capacity.
    /// 3. Connect; on failure give the slot back.
    pub async fn acquire(&self) -> ClientResult<PooledClient> {
        if let Some(client) = self.pop_idle() {
            return Ok(PooledClient::new(self.inner.clone(), client));
        }

        if !self.try_reserve() {
            return Err(ClientError::PoolExhausted);
        }

        match KVClient::connect(&self.inner.config).await {
            Ok(client) => Ok(PooledClient::new(self.inner.clone(), client)),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    /// Number of idle clients parked in the pool.
    pub fn idle_count(&self) -> usize {
        let state = self.inner.state.lock().expect("pool mutex poisoned");
        state.idle.len()
    }

    fn pop_idle(&self) -> Option<KVClient> {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        while let Some(client) = state.idle.pop_front() {
            if client.is_usable() {
                return Some(client);
            }
            debug!(addr = client.addr(), "discarding dead pooled connection");
            state.total = state.total.saturating_sub(1);
        }
        None
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        state.total = state.total.saturating_sub(1);
    }

    fn return_client(&self, client: KVClient) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(client);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// RAII checkout returning its client to the pool on drop.
pub struct PooledClient {
    pool: Arc<PoolInner>,
    client: Option<KVClient>,
}

impl PooledClient {
    fn new(pool: Arc<PoolInner>, client: KVClient) -> Self {
        PooledClient {
            pool,
            client: Some(client),
        }
    }
}

impl Deref for PooledClient {
    type Target = KVClient;

    fn deref(&self) -> &KVClient {
        // Only `Drop` takes the client out.
        self.client.as_ref().expect("pooled client present until drop")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let client = match self.client.take() {
            Some(client) => client,
            None => return,
        };

        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };

        if client.is_usable() {
            pool.return_client(client);
        } else {
            pool.release_slot();
        }
    }
}
