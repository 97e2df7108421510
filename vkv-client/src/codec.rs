//! # Command Encoding and Reply Decoding
//!
//! Purpose: Turn `set`/`get`/`del` commands into wire bytes and pull decoded
//! replies out of the inbound byte stream.
//!
//! ## Design Principles
//! 1. **Buffer Reuse**: Caller provides the output buffer for encoding.
//! 2. **Two Framings**: Plain text lines for the VeroKV server, RESP2 arrays
//!    when keys or values may carry arbitrary bytes.
//! 3. **Fail Fast**: Input that would break line framing is rejected instead
//!    of silently corrupting the command stream.
//! 4. **Reply Boundaries**: A reply is a length-prefixed bulk string, a
//!    newline-terminated line, or whatever sits in the buffer when the socket
//!    goes quiet. Partial replies stay buffered between reads.

use std::fmt;

use bytes::{Buf, BytesMut};

use crate::error::{ClientError, ClientResult};

/// Framing marker stripped from the front of a reply.
pub const FRAMING_MARKER: char = '$';

/// Protocol operation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Set,
    Get,
    Del,
}

impl Verb {
    /// Lowercase wire name of the verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Set => "set",
            Verb::Get => "get",
            Verb::Del => "del",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol operation. Built per call, encoded, then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Set { key: &'a [u8], value: &'a [u8] },
    Get { key: &'a [u8] },
    Del { key: &'a [u8] },
}

impl<'a> Command<'a> {
    pub fn verb(&self) -> Verb {
        match self {
            Command::Set { .. } => Verb::Set,
            Command::Get { .. } => Verb::Get,
            Command::Del { .. } => Verb::Del,
        }
    }

    fn key(&self) -> &'a [u8] {
        match *self {
            Command::Set { key, .. } | Command::Get { key } | Command::Del { key } => key,
        }
    }
}

/// How commands are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `set K V\n` style text lines understood by the VeroKV server.
    #[default]
    Line,
    /// RESP2 array of bulk strings with byte-count headers.
    Resp,
}

/// Encodes a command into `out` using the requested framing.
///
/// **Input**: command, framing, output buffer (appended to, not cleared).
/// **Output**: `Err(InvalidArgument)` when line framing cannot carry the
/// key or value unambiguously.
pub fn encode_command(command: &Command<'_>, framing: Framing, out: &mut Vec<u8>) -> ClientResult<()> {
    match framing {
        Framing::Line => encode_line(command, out),
        Framing::Resp => {
            encode_resp(command, out);
            Ok(())
        }
    }
}

fn encode_line(command: &Command<'_>, out: &mut Vec<u8>) -> ClientResult<()> {
    check_token("key", command.key())?;
    if let Command::Set { value, .. } = command {
        check_token("value", value)?;
    }

    out.extend_from_slice(command.verb().as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(command.key());
    if let Command::Set { value, .. } = command {
        out.push(b' ');
        out.extend_from_slice(value);
    }
    out.push(b'\n');
    Ok(())
}

// Line framing splits on whitespace, so every token must be a single word.
fn check_token(what: &str, data: &[u8]) -> ClientResult<()> {
    if data.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{what} must not be empty")));
    }
    if let Some(b) = data.iter().find(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(ClientError::InvalidArgument(format!(
            "{what} contains byte 0x{b:02x}; use RESP framing for arbitrary data"
        )));
    }
    Ok(())
}

fn encode_resp(command: &Command<'_>, out: &mut Vec<u8>) {
    let verb = command.verb().as_str().as_bytes();
    match *command {
        Command::Set { key, value } => push_array(out, &[verb, key, value]),
        Command::Get { key } | Command::Del { key } => push_array(out, &[verb, key]),
    }
}

fn push_array(out: &mut Vec<u8>, args: &[&[u8]]) {
    out.push(b'*');
    push_usize(out, args.len());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        push_usize(out, arg.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Digits land in a stack buffer so encoding stays allocation-free.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}

/// Decodes one reply chunk into its plain value.
///
/// Surrounding whitespace and NUL padding are trimmed, then a single leading
/// `$` framing marker is removed if present.
pub fn decode_reply(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    trimmed
        .strip_prefix(FRAMING_MARKER)
        .unwrap_or(trimmed)
        .to_string()
}

/// Splits complete replies off the front of a read buffer.
///
/// Two reply shapes are recognised:
/// - a `$<len>\r\n<data>` bulk string, taken as one reply of exactly `len`
///   bytes even when `data` contains newlines (`$-1` is the empty reply);
/// - anything else, up to the next `\n`.
///
/// NUL and whitespace between replies are consumed. An unterminated tail
/// stays buffered; the connection hands it to [`ReplyDecoder::finish`] once
/// the socket goes quiet, so a reply without a trailing newline still
/// completes.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    // Offset already scanned for a newline, so re-polls do not rescan.
    scanned: usize,
}

enum Bulk {
    Complete { value: String, consumed: usize },
    Incomplete,
    NotBulk,
}

// `$` plus the widest usize in decimal.
const MAX_BULK_HEADER: usize = 21;

impl ReplyDecoder {
    pub fn new() -> Self {
        ReplyDecoder::default()
    }

    /// Removes every complete reply from `buffer`, oldest first.
    pub fn decode(&mut self, buffer: &mut BytesMut) -> Vec<String> {
        let mut replies = Vec::new();
        loop {
            let padding = buffer.iter().take_while(|&&b| is_padding(b)).count();
            if padding > 0 {
                buffer.advance(padding);
                self.scanned = 0;
            }
            if buffer.is_empty() {
                break;
            }

            match parse_bulk(buffer) {
                Bulk::Complete { value, consumed } => {
                    buffer.advance(consumed);
                    self.scanned = 0;
                    replies.push(value);
                    continue;
                }
                Bulk::Incomplete => break,
                Bulk::NotBulk => {}
            }

            let Some(offset) = buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = buffer.len();
                break;
            };
            let line = buffer.split_to(self.scanned + offset);
            buffer.advance(1);
            self.scanned = 0;
            replies.push(decode_reply(&line));
        }
        replies
    }

    /// True when an unterminated reply is waiting in `buffer`.
    pub fn has_partial(&self, buffer: &BytesMut) -> bool {
        !is_blank(buffer)
    }

    /// Takes whatever is left in `buffer` as one final reply.
    pub fn finish(&mut self, buffer: &mut BytesMut) -> Option<String> {
        self.scanned = 0;
        let tail = buffer.split();
        if is_blank(&tail) {
            return None;
        }
        Some(decode_reply(&tail))
    }
}

fn parse_bulk(buffer: &[u8]) -> Bulk {
    if buffer.first() != Some(&b'$') {
        return Bulk::NotBulk;
    }
    let window = &buffer[..buffer.len().min(MAX_BULK_HEADER + 2)];
    let Some(cr) = window.windows(2).position(|pair| pair == b"\r\n") else {
        return Bulk::NotBulk;
    };
    let header = &buffer[1..cr];
    let body_start = cr + 2;

    if header == b"-1" {
        return Bulk::Complete {
            value: String::new(),
            consumed: body_start,
        };
    }
    if header.is_empty() || !header.iter().all(u8::is_ascii_digit) {
        return Bulk::NotBulk;
    }
    let Some(len) = std::str::from_utf8(header).ok().and_then(|digits| digits.parse::<usize>().ok()) else {
        return Bulk::NotBulk;
    };

    // A header with nothing behind it may be a short line reply such as
    // `$42\r\n`; waiting lets the quiet-socket flush decide.
    let body = &buffer[body_start..];
    if body.len() < len || is_blank(body) {
        return Bulk::Incomplete;
    }

    let mut consumed = body_start + len;
    if body[len..].starts_with(b"\r\n") {
        consumed += 2;
    }
    Bulk::Complete {
        value: String::from_utf8_lossy(&body[..len]).into_owned(),
        consumed,
    }
}

fn is_padding(b: u8) -> bool {
    b.is_ascii_whitespace() || b == 0
}

fn is_blank(data: &[u8]) -> bool {
    data.iter().all(|&b| is_padding(b))
}
