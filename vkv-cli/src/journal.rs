//! # Command Journals
//!
//! Purpose: Keep a replayable record of the mutating commands typed at the
//! prompt, and feed such a record back through a connection at startup.
//!
//! ## Design Principles
//! 1. **Two Shapes**: An append-only file (AOF) writes every `set`/`del`
//!    immediately, followed by a `# Timestamp:` comment. A batch journal
//!    queues them and appends in bulk.
//! 2. **Bounded Loss**: Batches flush when full, on a timer, and at exit.
//! 3. **Plain Text**: One command per line, so a journal can be edited or
//!    replayed by hand.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use vkv_client::KVClient;

use crate::repl::{execute, parse_line, ReplCommand};

/// Longest a queued batch command waits before reaching disk.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Queued commands that trigger an early batch flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Which journal a file holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum JournalKind {
    /// Append-only file, one write per command
    Aof,
    /// Batched file, flushed in groups
    Batch,
}

impl JournalKind {
    fn label(self) -> &'static str {
        match self {
            JournalKind::Aof => "AOF",
            JournalKind::Batch => "Batch",
        }
    }

    fn completion(self) -> &'static str {
        match self {
            JournalKind::Aof => "AOF replay completed.",
            JournalKind::Batch => "Batch file replay completed.",
        }
    }
}

/// Records `set`/`del` lines into one journal file.
#[derive(Debug)]
pub struct Journal {
    kind: JournalKind,
    path: PathBuf,
    queue: Vec<String>,
    batch_size: usize,
}

impl Journal {
    /// Append-only journal at `path`.
    pub fn aof(path: impl Into<PathBuf>) -> Self {
        Journal {
            kind: JournalKind::Aof,
            path: path.into(),
            queue: Vec::new(),
            batch_size: 1,
        }
    }

    /// Batched journal at `path`, flushed early once `batch_size` commands wait.
    pub fn batch(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Journal {
            kind: JournalKind::Batch,
            path: path.into(),
            queue: Vec::new(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn kind(&self) -> JournalKind {
        self.kind
    }

    /// Commands queued but not yet written.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Records one command line.
    pub async fn record(&mut self, line: &str) -> io::Result<()> {
        match self.kind {
            JournalKind::Aof => {
                let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
                let entry = format!("{line}\n# Timestamp: {}.{:09}\n", now.as_secs(), now.subsec_nanos());
                self.append(&entry).await
            }
            JournalKind::Batch => {
                self.queue.push(line.to_string());
                if self.queue.len() >= self.batch_size {
                    self.flush().await?;
                }
                Ok(())
            }
        }
    }

    /// Writes every queued command.
    pub async fn flush(&mut self) -> io::Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let mut text = String::new();
        for command in &self.queue {
            text.push_str(command);
            text.push('\n');
        }
        self.append(&text).await?;
        debug!(path = %self.path.display(), commands = self.queue.len(), "batch flushed");
        self.queue.clear();
        Ok(())
    }

    async fn append(&self, text: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub commands: usize,
    pub elapsed: Duration,
}

/// Sends every command in the journal at `path` through `client`, writing
/// each rendered reply to `output`, then the completion line and timing.
///
/// Comment lines are skipped. A missing file replays nothing.
pub async fn replay<W>(client: &KVClient, kind: JournalKind, path: &Path, output: &mut W) -> io::Result<ReplayReport>
where
    W: AsyncWrite + Unpin,
{
    let started = Instant::now();
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };

    let mut commands = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command = parse_line(line);
        let Some(rendered) = execute(client, &command).await else {
            if let ReplCommand::Invalid(text) = command {
                warn!(line = text, "skipping unreadable journal line");
            }
            continue;
        };
        commands += 1;
        output.write_all(rendered.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    let elapsed = started.elapsed();
    let summary = format!(
        "{}\nTime taken for {} replay: {} milliseconds\n",
        kind.completion(),
        kind.label(),
        elapsed.as_millis()
    );
    output.write_all(summary.as_bytes()).await?;
    output.flush().await?;

    Ok(ReplayReport { commands, elapsed })
}
