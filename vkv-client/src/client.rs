//! # Async Client API
//!
//! Purpose: Expose `set`/`get`/`del` against a VeroKV server as plain
//! futures, hiding the driver task and reply correlation.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides the socket, framing, and FIFO.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Cheap Clones**: Clones share one connection; replies still land on
//!    the caller that issued the command.
//! 4. **Cancel by Drop**: Dropping a pending call frees its slot.

use std::time::Duration;

use tracing::debug;

use crate::codec::{Command, Framing};
use crate::connection::{ConnectionHandle, ConnectionState};
use crate::error::ClientResult;
use crate::metrics::MetricsSnapshot;
use crate::pool::{ConnectionPool, PooledClient};

/// Default VeroKV server port.
pub const DEFAULT_PORT: u16 = 6381;

/// How long an unterminated reply may sit in the read buffer before it is
/// taken as complete.
pub const DEFAULT_REPLY_FLUSH: Duration = Duration::from_millis(20);

/// Configuration for a client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or IP, e.g. "127.0.0.1".
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Wire framing used for outbound commands.
    pub framing: Framing,
    /// Optional bound on resolving and connecting.
    pub connect_timeout: Option<Duration>,
    /// Quiet period after which buffered bytes without a terminator count
    /// as one reply. Zero takes them at the end of each read.
    pub reply_flush: Duration,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            framing: Framing::Line,
            connect_timeout: None,
            reply_flush: DEFAULT_REPLY_FLUSH,
            max_idle: 8,
            max_total: 16,
        }
    }
}

impl ClientConfig {
    /// Config for `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        }
    }

    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn reply_flush(mut self, quiet: Duration) -> Self {
        self.reply_flush = quiet;
        self
    }

    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    pub fn max_total(mut self, count: usize) -> Self {
        self.max_total = count;
        self
    }
}

/// Client bound to one persistent connection.
///
/// Construction starts the TCP handshake in the background; commands issued
/// before it completes are queued and written once connected.
#[derive(Clone)]
pub struct KVClient {
    conn: ConnectionHandle,
}

impl KVClient {
    /// Starts connecting to `host:port` with default settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(host: &str, port: u16) -> Self {
        Self::new(&ClientConfig::new(host, port))
    }

    /// Starts connecting with a custom configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &ClientConfig) -> Self {
        let conn = ConnectionHandle::open(config);
        KVClient { conn }
    }

    /// Connects and waits for the handshake to finish.
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let client = Self::new(config);
        client.ready().await?;
        Ok(client)
    }

    /// Resolves once connected, or with the connection error.
    pub async fn ready(&self) -> ClientResult<()> {
        self.conn.ready().await
    }

    /// Current connectivity of the underlying socket.
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// True while the connection can still carry commands.
    pub fn is_usable(&self) -> bool {
        matches!(self.conn.state(), ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Server address as `host:port`.
    pub fn addr(&self) -> &str {
        self.conn.addr()
    }

    /// Point-in-time counters for this connection.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.conn.metrics()
    }

    /// Stores `value` under `key`.
    ///
    /// Any reply counts as the acknowledgment; its text is only logged.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let reply = self.conn.send(Command::Set { key, value }).await?;
        debug!(reply = %reply, "set response");
        Ok(())
    }

    /// Fetches the value for `key`.
    ///
    /// The decoded reply is returned as-is, including whatever sentinel the
    /// server uses for a missing key.
    pub async fn get(&self, key: &[u8]) -> ClientResult<String> {
        self.conn.send(Command::Get { key }).await
    }

    /// Deletes `key`, returning the server's decoded reply.
    pub async fn del(&self, key: &[u8]) -> ClientResult<String> {
        self.conn.send(Command::Del { key }).await
    }
}

/// Pool-backed facade: each call checks a client out and returns it.
#[derive(Clone)]
pub struct KVPool {
    pool: ConnectionPool,
}

impl KVPool {
    pub fn new(config: ClientConfig) -> Self {
        KVPool {
            pool: ConnectionPool::new(config),
        }
    }

    /// Checks out a client for several calls in a row.
    pub async fn acquire(&self) -> ClientResult<PooledClient> {
        self.pool.acquire().await
    }

    pub async fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let client = self.pool.acquire().await?;
        client.set(key, value).await
    }

    pub async fn get(&self, key: &[u8]) -> ClientResult<String> {
        let client = self.pool.acquire().await?;
        client.get(key).await
    }

    pub async fn del(&self, key: &[u8]) -> ClientResult<String> {
        let client = self.pool.acquire().await?;
        client.del(key).await
    }

    /// Number of idle connections currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.pool.idle_count()
    }
}
