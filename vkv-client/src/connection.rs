//! # Connection Manager
//!
//! Purpose: Own one TCP socket to the VeroKV server, write encoded commands,
//! and route every inbound reply through the correlator.
//!
//! ## Design Principles
//! 1. **Single Owner**: A spawned driver task owns the read half and the
//!    pending queue, so the hot path needs no locks. A second task owns the
//!    write half, so a stalled write never blocks reading.
//! 2. **Queue Until Connected**: Commands issued during the handshake wait in
//!    the request channel and are written once the socket is up.
//! 3. **Observable State**: Connectivity is published on a `watch` channel.
//! 4. **No Reconnect**: Once errored or closed, the connection stays that way.
//!
//! ## Task Layout
//!
//! ```text
//!  KVClient ──Request{frame, responder}──▶ mpsc ──▶ driver task ──frame──▶ writer task
//!     ▲                                              │  push Pending
//!     │ oneshot                                      │
//!     └──────────── Correlator::resolve ◀── decode ◀─┘  read replies
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::client::ClientConfig;
use crate::codec::{encode_command, Command, Framing, ReplyDecoder, Verb};
use crate::correlator::{Correlator, Delivery, Pending, Responder};
use crate::error::{ClientError, ClientResult};
use crate::metrics::{Metrics, MetricsSnapshot};

/// Connectivity of a client's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake not finished yet; commands are queued.
    Connecting,
    /// Socket is up.
    Connected,
    /// A socket error ended the connection. Holds the error text.
    Errored(String),
    /// Peer closed the socket or every client handle was dropped.
    Closed,
}

/// A command on its way to the driver task.
struct Request {
    verb: Verb,
    frame: Vec<u8>,
    responder: Responder,
}

/// Caller-side handle to a running driver task.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    addr: String,
    framing: Framing,
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    metrics: Arc<Metrics>,
}

impl ConnectionHandle {
    /// Spawns the driver task and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn open(config: &ClientConfig) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let metrics = Arc::new(Metrics::new());

        let driver = Driver {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout,
            reply_flush: config.reply_flush,
            requests: requests_rx,
            state: state_tx,
            metrics: metrics.clone(),
            correlator: Correlator::new(),
            decoder: ReplyDecoder::new(),
        };
        tokio::spawn(driver.run());

        ConnectionHandle {
            addr: format!("{}:{}", config.host, config.port),
            framing: config.framing,
            requests: requests_tx,
            state: state_rx,
            metrics,
        }
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Waits until the handshake finishes or fails.
    pub(crate) async fn ready(&self) -> ClientResult<()> {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Errored(message) => return Err(ClientError::Io(message)),
                ConnectionState::Closed => return Err(ClientError::Closed),
                ConnectionState::Connecting => {}
            }
            if state.changed().await.is_err() {
                return Err(self.terminal_error());
            }
        }
    }

    /// Encodes `command`, hands it to the driver, and waits for its reply.
    ///
    /// Dropping the returned future abandons the command: if it has not been
    /// written yet it never will be, otherwise its reply is discarded.
    pub(crate) async fn send(&self, command: Command<'_>) -> ClientResult<String> {
        let mut frame = Vec::with_capacity(64);
        if let Err(err) = encode_command(&command, self.framing, &mut frame) {
            self.metrics.record_error();
            return Err(err);
        }

        let (responder, completion) = oneshot::channel();
        let request = Request {
            verb: command.verb(),
            frame,
            responder,
        };
        if self.requests.send(request).is_err() {
            self.metrics.record_error();
            return Err(self.terminal_error());
        }

        match completion.await {
            Ok(result) => result,
            Err(_) => Err(self.terminal_error()),
        }
    }

    fn terminal_error(&self) -> ClientError {
        match &*self.state.borrow() {
            ConnectionState::Errored(message) => ClientError::Io(message.clone()),
            _ => ClientError::Closed,
        }
    }
}

/// Background task owning the socket.
struct Driver {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    reply_flush: Duration,
    requests: mpsc::UnboundedReceiver<Request>,
    state: watch::Sender<ConnectionState>,
    metrics: Arc<Metrics>,
    correlator: Correlator,
    decoder: ReplyDecoder,
}

impl Driver {
    async fn run(mut self) {
        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(err) => {
                error!(host = %self.host, port = self.port, error = %err, "connection error");
                self.shutdown(ConnectionState::Errored(err.to_string()), err);
                return;
            }
        };

        info!(host = %self.host, port = self.port, "connected to server");
        self.state.send_replace(ConnectionState::Connected);

        match self.serve(stream).await {
            Ok(()) => {
                debug!(host = %self.host, port = self.port, "client handles dropped, closing connection");
                self.shutdown(ConnectionState::Closed, ClientError::Closed);
            }
            Err(ClientError::Closed) => {
                info!(host = %self.host, port = self.port, "server closed connection");
                self.shutdown(ConnectionState::Closed, ClientError::Closed);
            }
            Err(err) => {
                error!(host = %self.host, port = self.port, error = %err, "connection error");
                self.shutdown(ConnectionState::Errored(err.to_string()), err);
            }
        }
    }

    async fn connect(&self) -> ClientResult<TcpStream> {
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connect_any())
                .await
                .map_err(|_| ClientError::Io(format!("connect timed out after {}ms", limit.as_millis())))??,
            None => self.connect_any().await?,
        };
        // Commands are tiny; disable Nagle so each one leaves immediately.
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn connect_any(&self) -> ClientResult<TcpStream> {
        let addrs: Vec<SocketAddr> = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|err| ClientError::InvalidAddress(format!("{}:{}: {}", self.host, self.port, err)))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(match last_err {
            Some(err) => err.into(),
            None => ClientError::InvalidAddress(format!("{}:{}: no addresses", self.host, self.port)),
        })
    }

    /// Runs until the socket fails, the peer closes, or every handle is gone.
    async fn serve(&mut self, stream: TcpStream) -> ClientResult<()> {
        let (mut reader, writer) = stream.into_split();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let mut writer_task = tokio::spawn(write_frames(writer, frames_rx));
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        let mut flush_at: Option<Instant> = None;

        let outcome = loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        break Ok(());
                    };
                    self.dispatch(request, &frames_tx);
                }
                read = reader.read_buf(&mut buffer) => {
                    let read = match read {
                        Ok(read) => read,
                        Err(err) => break Err(ClientError::from(err)),
                    };
                    if read == 0 {
                        if let Some(reply) = self.decoder.finish(&mut buffer) {
                            self.route(reply);
                        }
                        break Err(ClientError::Closed);
                    }
                    for reply in self.decoder.decode(&mut buffer) {
                        self.route(reply);
                    }
                    flush_at = None;
                    if self.decoder.has_partial(&buffer) {
                        if self.reply_flush.is_zero() {
                            self.flush_partial(&mut buffer);
                        } else {
                            flush_at = Some(Instant::now() + self.reply_flush);
                        }
                    }
                }
                _ = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    flush_at = None;
                    self.flush_partial(&mut buffer);
                }
                written = &mut writer_task => {
                    break match written {
                        Ok(Ok(())) => Err(ClientError::Closed),
                        Ok(Err(err)) => Err(err),
                        Err(join) => Err(ClientError::Io(format!("writer task failed: {join}"))),
                    };
                }
            }
        };

        if outcome.is_err() {
            writer_task.abort();
        }
        outcome
    }

    /// Queues a command for the writer task and registers its pending slot.
    ///
    /// The slot is pushed before the frame leaves, so a reply can never
    /// arrive ahead of its entry.
    fn dispatch(&mut self, request: Request, frames: &mpsc::UnboundedSender<Vec<u8>>) {
        if request.responder.is_closed() {
            self.metrics.record_abandoned();
            debug!(verb = %request.verb, "caller gone before write, skipping command");
            return;
        }

        trace!(verb = %request.verb, bytes = request.frame.len(), "queueing command");
        self.metrics.record_request_start();
        self.correlator.push(Pending::new(request.verb, request.responder));
        // A closed writer surfaces through its join handle on the next poll.
        let _ = frames.send(request.frame);
    }

    // The socket went quiet with bytes left over; they are one whole reply.
    fn flush_partial(&mut self, buffer: &mut BytesMut) {
        if let Some(reply) = self.decoder.finish(buffer) {
            trace!("unterminated reply flushed");
            self.route(reply);
        }
    }

    fn route(&mut self, reply: String) {
        trace!(reply = %reply, pending = self.correlator.len(), "reply received");
        match self.correlator.resolve(reply, &self.metrics) {
            Delivery::Delivered(_) => {}
            Delivery::Abandoned(verb) => {
                debug!(verb = %verb, "dropping reply for abandoned command");
            }
            Delivery::Unsolicited => {
                warn!(host = %self.host, port = self.port, "unsolicited reply dropped");
            }
        }
    }

    /// Publishes the final state and rejects everything still waiting.
    fn shutdown(&mut self, state: ConnectionState, err: ClientError) {
        self.state.send_replace(state);

        let mut failed = self.correlator.fail_all(&err, &self.metrics);
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            self.metrics.record_error();
            let _ = request.responder.send(Err(err.clone()));
            failed += 1;
        }

        if failed > 0 {
            warn!(failed, error = %err, "rejected pending commands");
        }
    }
}

/// Writes queued frames in order until the driver drops its sender.
///
/// Runs apart from the reader so a blocked write never stops replies from
/// being drained.
async fn write_frames(mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) -> ClientResult<()> {
    while let Some(frame) = frames.recv().await {
        writer.write_all(&frame).await?;
    }
    Ok(())
}
