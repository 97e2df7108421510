//! VeroKV CLI Client
//!
//! Interactive prompt for issuing `set`/`get`/`del` against a VeroKV server.

mod journal;
mod repl;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tokio::io::BufReader;
use tracing_subscriber::{fmt, EnvFilter};

use journal::{Journal, JournalKind, DEFAULT_BATCH_SIZE};
use vkv_client::{ClientConfig, Framing, KVClient, DEFAULT_PORT};

/// VeroKV CLI
#[derive(Parser, Debug)]
#[command(name = "vkv-cli")]
#[command(about = "Interactive client for the VeroKV key-value store")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Command framing on the wire
    #[arg(long, value_enum, default_value_t = WireFraming::Line)]
    framing: WireFraming,

    /// Give up connecting after this many milliseconds
    #[arg(long, default_value = "3000")]
    connect_timeout_ms: u64,

    /// Append every set/del to this file, each followed by a timestamp line
    #[arg(long)]
    aof: Option<PathBuf>,

    /// Queue set/del commands and append them to this file in batches
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Queued commands that force a batch flush
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Replay a journal through the connection before the prompt opens
    #[arg(long, value_enum)]
    replay: Option<JournalKind>,
}

impl Args {
    fn journals(&self) -> Vec<Journal> {
        let mut journals = Vec::new();
        if let Some(path) = &self.aof {
            journals.push(Journal::aof(path));
        }
        if let Some(path) = &self.batch {
            journals.push(Journal::batch(path, self.batch_size));
        }
        journals
    }

    fn replay_path(&self, kind: JournalKind) -> anyhow::Result<&PathBuf> {
        let path = match kind {
            JournalKind::Aof => self.aof.as_ref(),
            JournalKind::Batch => self.batch.as_ref(),
        };
        match path {
            Some(path) => Ok(path),
            None => bail!("--replay {kind:?} needs the matching --aof/--batch path"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum WireFraming {
    /// `set key value` text lines
    Line,
    /// Length-prefixed RESP arrays
    Resp,
}

impl From<WireFraming> for Framing {
    fn from(framing: WireFraming) -> Self {
        match framing {
            WireFraming::Line => Framing::Line,
            WireFraming::Resp => Framing::Resp,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::new(&args.host, args.port)
        .framing(args.framing.into())
        .connect_timeout(Duration::from_millis(args.connect_timeout_ms));

    let client = KVClient::connect(&config)
        .await
        .with_context(|| format!("failed to connect to {}:{}", args.host, args.port))?;

    let mut stdout = tokio::io::stdout();
    if let Some(kind) = args.replay {
        let path = args.replay_path(kind)?;
        let report = journal::replay(&client, kind, path, &mut stdout)
            .await
            .with_context(|| format!("replay of {} failed", path.display()))?;
        tracing::info!(commands = report.commands, "journal replayed");
    }

    let mut journals = args.journals();
    repl::run(&client, BufReader::new(tokio::io::stdin()), stdout, &mut journals)
        .await
        .context("terminal io failed")?;

    let metrics = client.metrics();
    tracing::debug!(
        requests = metrics.requests_total,
        errors = metrics.errors_total,
        "session finished"
    );
    Ok(())
}
