//! # Request/Response Correlator
//!
//! Purpose: Pair every command written to a connection with the reply that
//! answers it.
//!
//! ## Design Principles
//! 1. **FIFO Matching**: The server answers in order, so the oldest pending
//!    command owns the next reply. Concurrent callers never cross-wire.
//! 2. **Abandon, Don't Reroute**: A reply whose caller has gone is dropped
//!    in place; it never slides forward to the next caller.
//! 3. **Fail Everyone**: A socket failure rejects every pending command.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::codec::Verb;
use crate::error::{ClientError, ClientResult};
use crate::metrics::Metrics;

/// Completion handle for one in-flight command.
pub(crate) type Responder = oneshot::Sender<ClientResult<String>>;

/// A command that has been written and is waiting for its reply.
pub(crate) struct Pending {
    verb: Verb,
    issued_at: Instant,
    responder: Responder,
}

impl Pending {
    pub(crate) fn new(verb: Verb, responder: Responder) -> Self {
        Pending {
            verb,
            issued_at: Instant::now(),
            responder,
        }
    }
}

/// Outcome of routing one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The oldest pending caller received the reply.
    Delivered(Verb),
    /// The oldest pending caller had dropped its future; reply discarded.
    Abandoned(Verb),
    /// Nothing was pending.
    Unsolicited,
}

#[derive(Default)]
pub(crate) struct Correlator {
    pending: VecDeque<Pending>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Correlator::default()
    }

    pub(crate) fn push(&mut self, pending: Pending) {
        self.pending.push_back(pending);
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Routes one decoded reply to the oldest pending command.
    ///
    /// **Logic**:
    /// 1. Pop the front of the queue; an empty queue means the reply was unsolicited.
    /// 2. Record latency for the popped command.
    /// 3. Send the reply; a closed receiver means the caller abandoned it.
    pub(crate) fn resolve(&mut self, reply: String, metrics: &Metrics) -> Delivery {
        let Some(entry) = self.pending.pop_front() else {
            metrics.record_unsolicited();
            return Delivery::Unsolicited;
        };

        metrics.record_request_end(entry.issued_at.elapsed());
        match entry.responder.send(Ok(reply)) {
            Ok(()) => Delivery::Delivered(entry.verb),
            Err(_) => {
                metrics.record_abandoned();
                Delivery::Abandoned(entry.verb)
            }
        }
    }

    /// Rejects every pending command with `err`. Returns how many were failed.
    pub(crate) fn fail_all(&mut self, err: &ClientError, metrics: &Metrics) -> usize {
        let failed = self.pending.len();
        for entry in self.pending.drain(..) {
            metrics.record_request_failed();
            let _ = entry.responder.send(Err(err.clone()));
        }
        failed
    }
}
