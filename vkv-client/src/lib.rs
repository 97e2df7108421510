//! # VeroKV Async Client
//!
//! Purpose: Provide a small asynchronous client for the VeroKV line protocol
//! (`set K V\n`, `get K\n`) with FIFO reply correlation and connection pooling.
//!
//! ## Design Principles
//! 1. **Actor per Connection**: One driver task owns each socket.
//! 2. **FIFO Correlation**: The oldest pending command owns the next reply.
//! 3. **Cancellation Safety**: Abandoned calls never steal another's reply.
//! 4. **Protocol Clarity**: Encoding and decoding live in one module.

mod client;
mod codec;
mod connection;
mod correlator;
mod error;
mod metrics;
mod pool;

pub use client::{ClientConfig, KVClient, KVPool, DEFAULT_PORT, DEFAULT_REPLY_FLUSH};
pub use codec::{decode_reply, encode_command, Command, Framing, ReplyDecoder, Verb, FRAMING_MARKER};
pub use connection::ConnectionState;
pub use error::{ClientError, ClientResult};
pub use metrics::{LatencySnapshot, MetricsSnapshot};
pub use pool::{ConnectionPool, PooledClient};
