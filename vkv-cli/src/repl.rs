//! Interactive read-eval-print loop over a single client connection.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{interval_at, Instant};
use tracing::warn;
use vkv_client::KVClient;

use crate::journal::{Journal, FLUSH_INTERVAL};

pub const PROMPT: &str = "verokv> ";

const USAGE: &str = "commands: set <key> <value> | get <key> | del <key> | quit";

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Set { key: &'a str, value: &'a str },
    Get { key: &'a str },
    Del { key: &'a str },
    Help,
    Quit,
    Empty,
    Invalid(&'a str),
}

/// Parses a line typed at the prompt.
///
/// Everything after the key is the value, so RESP framing can carry spaces.
pub fn parse_line(line: &str) -> ReplCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }

    let mut parts = line.splitn(3, char::is_whitespace);
    let verb = parts.next().unwrap_or_default();
    let key = parts.next().map(str::trim).filter(|key| !key.is_empty());
    let rest = parts.next().map(str::trim).filter(|rest| !rest.is_empty());

    match (verb.to_ascii_lowercase().as_str(), key, rest) {
        ("set", Some(key), Some(value)) => ReplCommand::Set { key, value },
        ("get", Some(key), None) => ReplCommand::Get { key },
        ("del", Some(key), None) => ReplCommand::Del { key },
        ("help", None, None) => ReplCommand::Help,
        ("quit" | "exit", None, None) => ReplCommand::Quit,
        _ => ReplCommand::Invalid(line),
    }
}

/// Reply text a store uses for a missing key.
const NIL: &str = "(nil)";

/// Formats a decoded reply for display.
///
/// Empty and nil replies print as `(nil)`, `:N` as `(integer) N`, `-text` as
/// the bare error text, and anything else quoted.
pub fn render_reply(reply: &str) -> String {
    if reply.is_empty() || reply == NIL {
        return NIL.to_string();
    }
    if let Some(number) = reply.strip_prefix(':') {
        return format!("(integer) {number}");
    }
    if let Some(message) = reply.strip_prefix('-') {
        return message.to_string();
    }
    format!("\"{reply}\"")
}

/// Sends a `set`/`get`/`del` and renders the outcome; `None` for anything else.
pub async fn execute(client: &KVClient, command: &ReplCommand<'_>) -> Option<String> {
    let rendered = match *command {
        ReplCommand::Set { key, value } => match client.set(key.as_bytes(), value.as_bytes()).await {
            Ok(()) => "OK".to_string(),
            Err(err) => format!("(error) {err}"),
        },
        ReplCommand::Get { key } => match client.get(key.as_bytes()).await {
            Ok(reply) => render_reply(&reply),
            Err(err) => format!("(error) {err}"),
        },
        ReplCommand::Del { key } => match client.del(key.as_bytes()).await {
            Ok(reply) => render_reply(&reply),
            Err(err) => format!("(error) {err}"),
        },
        _ => return None,
    };
    Some(rendered)
}

/// Runs the loop until `quit` or end of input.
///
/// `set` and `del` lines are recorded in every journal before they are sent.
/// Batched journals also flush on [`FLUSH_INTERVAL`] and when the loop ends.
pub async fn run<R, W>(client: &KVClient, input: R, mut output: W, journals: &mut [Journal]) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut ticker = interval_at(Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let line = loop {
            tokio::select! {
                line = lines.next_line() => break line?,
                _ = ticker.tick() => flush_all(journals).await,
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = parse_line(&line);
        let reply = match command {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Help => USAGE.to_string(),
            ReplCommand::Invalid(text) => format!("(error) unknown command '{text}'; {USAGE}"),
            ReplCommand::Set { .. } | ReplCommand::Del { .. } => {
                for journal in journals.iter_mut() {
                    if let Err(err) = journal.record(line.trim()).await {
                        warn!(kind = ?journal.kind(), error = %err, "journal write failed");
                    }
                }
                execute(client, &command).await.unwrap_or_default()
            }
            ReplCommand::Get { .. } => execute(client, &command).await.unwrap_or_default(),
        };

        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    flush_all(journals).await;
    output.flush().await
}

async fn flush_all(journals: &mut [Journal]) {
    for journal in journals.iter_mut() {
        if let Err(err) = journal.flush().await {
            warn!(kind = ?journal.kind(), error = %err, "journal flush failed");
        }
    }
}
