//! Classification of one command exchange and the per-line parser hook.

use core::fmt;

use serde::de::DeserializeOwned;

/// Outcome of one call to the response reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Lines arrived but no terminal token before the deadline
    NotFound,
    Ok,
    Error,
    /// Modem waits for raw data (`>`)
    Prompt,
    /// Nothing at all arrived before the deadline
    Timeout,
    /// Only blank or echoed lines arrived before the deadline
    Empty,
}

/// Numeric code carried by `+CME ERROR:` / `+CMS ERROR:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Cme(u16),
    Cms(u16),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Cme(code) => write!(f, "+CME ERROR: {}", code),
            ErrorCode::Cms(code) => write!(f, "+CMS ERROR: {}", code),
        }
    }
}

/// Result of [`crate::modem::interface::Interface::read_response`]: the
/// classification plus the number of bytes parsers wrote to the output
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub response: Response,
    pub len: usize,
}

impl Reply {
    pub fn new(response: Response, len: usize) -> Self {
        Self { response, len }
    }

    pub fn is_ok(&self) -> bool {
        self.response == Response::Ok
    }
}

pub(crate) const PROMPT: u8 = b'>';

/// Terminal tokens that end an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminal {
    Ok,
    Error(Option<ErrorCode>),
    Prompt,
}

impl Terminal {
    pub(crate) fn parse(line: &[u8]) -> Option<Self> {
        match line {
            b"OK" => Some(Terminal::Ok),
            b"ERROR" => Some(Terminal::Error(None)),
            [PROMPT] => Some(Terminal::Prompt),
            _ => {
                if let Some(rest) = line.strip_prefix(b"+CME ERROR:") {
                    Some(Terminal::Error(parse_code(rest).map(ErrorCode::Cme)))
                } else if let Some(rest) = line.strip_prefix(b"+CMS ERROR:") {
                    Some(Terminal::Error(parse_code(rest).map(ErrorCode::Cms)))
                } else {
                    None
                }
            }
        }
    }

    pub(crate) fn response(&self) -> Response {
        match self {
            Terminal::Ok => Response::Ok,
            Terminal::Error(_) => Response::Error,
            Terminal::Prompt => Response::Prompt,
        }
    }
}

// verbose error reports (AT+CMEE=2) carry text instead of a number
fn parse_code(rest: &[u8]) -> Option<u16> {
    core::str::from_utf8(rest).ok()?.trim().parse().ok()
}

/// Raw, unframed reads for payloads that may contain line endings.
pub trait RawRead {
    /// Fill `buf` until it is full, a single byte read times out or the
    /// exchange deadline passes. Returns the number of bytes read.
    fn read_raw(&mut self, buf: &mut [u8]) -> usize;
}

/// What a [`Parser`] may touch while handling one line: the caller's output
/// buffer and the transport, for raw payload phases.
pub struct ParseContext<'a> {
    out: &'a mut [u8],
    len: &'a mut usize,
    raw: &'a mut dyn RawRead,
    untrimmed: &'a [u8],
    terminated: bool,
}

impl<'a> ParseContext<'a> {
    pub(crate) fn new(
        out: &'a mut [u8],
        len: &'a mut usize,
        raw: &'a mut dyn RawRead,
        untrimmed: &'a [u8],
        terminated: bool,
    ) -> Self {
        Self {
            out,
            len,
            raw,
            untrimmed,
            terminated,
        }
    }

    /// The current line exactly as read, before whitespace trimming.
    pub fn untrimmed_line(&self) -> &'a [u8] {
        self.untrimmed
    }

    /// False when the line reader stopped on a full buffer or a timeout
    /// instead of a `\n`.
    pub fn line_terminated(&self) -> bool {
        self.terminated
    }

    /// Bytes written to the output buffer so far in this exchange.
    pub fn written(&self) -> usize {
        *self.len
    }

    pub fn remaining(&self) -> usize {
        self.out.len() - *self.len
    }

    /// Append to the output buffer, truncating at its capacity. Returns the
    /// number of bytes copied.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.out[*self.len..*self.len + n].copy_from_slice(&data[..n]);
        *self.len += n;
        n
    }

    /// Read `count` raw bytes from the transport into the output buffer.
    ///
    /// Bytes that do not fit are still consumed so the stream stays in sync.
    /// Returns the number of bytes stored.
    pub fn read_raw(&mut self, count: usize) -> usize {
        let keep = count.min(self.remaining());
        let start = *self.len;
        let stored = self.raw.read_raw(&mut self.out[start..start + keep]);
        *self.len += stored;
        if stored == keep {
            self.skip_raw(count - keep);
        }
        stored
    }

    /// Raw read into a parser-owned buffer, for payloads that need decoding
    /// before they reach the output buffer.
    pub fn read_raw_into(&mut self, buf: &mut [u8]) -> usize {
        self.raw.read_raw(buf)
    }

    /// Consume and drop `count` raw bytes.
    pub fn skip_raw(&mut self, mut count: usize) {
        let mut scratch = [0u8; 32];
        while count > 0 {
            let chunk = count.min(scratch.len());
            let n = self.raw.read_raw(&mut scratch[..chunk]);
            if n < chunk {
                break;
            }
            count -= n;
        }
    }
}

/// Operation-specific handling of intermediate lines.
///
/// The response reader calls `parse` once per line that is neither blank,
/// the command echo, a terminal token nor an engine-handled URC. Returning
/// `Some` ends the exchange with that classification.
pub trait Parser {
    fn parse(&mut self, line: &[u8], cx: &mut ParseContext<'_>) -> Option<Response>;
}

/// Deserializes the first line starting with `prefix` into `R`.
pub struct Capture<R> {
    prefix: &'static [u8],
    value: Option<R>,
}

impl<R: DeserializeOwned> Capture<R> {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix: prefix.as_bytes(),
            value: None,
        }
    }

    pub fn value(&self) -> Option<&R> {
        self.value.as_ref()
    }

    pub fn take(&mut self) -> Option<R> {
        self.value.take()
    }
}

impl<R: DeserializeOwned> Parser for Capture<R> {
    fn parse(&mut self, line: &[u8], _cx: &mut ParseContext<'_>) -> Option<Response> {
        if self.value.is_none() && line.starts_with(self.prefix) {
            match serde_at::from_slice::<R>(line) {
                Ok(value) => self.value = Some(value),
                Err(_) => log::warn!(
                    "Unparseable reply line: {:?}",
                    core::str::from_utf8(line).unwrap_or("<binary>")
                ),
            }
        }
        None
    }
}

/// Copies the first intermediate line into the output buffer, minus an
/// optional `+XXX: ` prefix. Used for identity queries like `AT+CGSN`.
///
/// Without a prefix the value is a bare line, so `+...` lines are
/// unsolicited noise and skipped.
pub struct FirstLine {
    prefix: Option<&'static [u8]>,
    done: bool,
    truncated: bool,
}

impl FirstLine {
    pub fn new() -> Self {
        Self {
            prefix: None,
            done: false,
            truncated: false,
        }
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix: Some(prefix.as_bytes()),
            ..Self::new()
        }
    }

    /// True if the line did not fit the output buffer.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl Default for FirstLine {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for FirstLine {
    fn parse(&mut self, line: &[u8], cx: &mut ParseContext<'_>) -> Option<Response> {
        if self.done {
            return None;
        }
        let value = match self.prefix {
            Some(prefix) => match line.strip_prefix(prefix) {
                Some(rest) => trim_quotes(rest.trim_ascii()),
                None => return None,
            },
            None if line.starts_with(b"+") => return None,
            None => line,
        };
        self.truncated = cx.push(value) < value.len();
        self.done = true;
        None
    }
}

/// Watches for an unsolicited completion code (`+UUHTTPCR`, `+UUFTPCR`, ...)
/// and ends the exchange as soon as `done` accepts it.
pub struct Completion<R, F> {
    capture: Capture<R>,
    done: F,
}

impl<R, F> Completion<R, F>
where
    R: DeserializeOwned,
    F: FnMut(&R) -> Option<bool>,
{
    /// `done` returns `Some(true)` for success, `Some(false)` for failure and
    /// `None` when the code belongs to another request.
    pub fn new(prefix: &'static str, done: F) -> Self {
        Self {
            capture: Capture::new(prefix),
            done,
        }
    }
}

impl<R, F> Parser for Completion<R, F>
where
    R: DeserializeOwned,
    F: FnMut(&R) -> Option<bool>,
{
    fn parse(&mut self, line: &[u8], cx: &mut ParseContext<'_>) -> Option<Response> {
        self.capture.parse(line, cx);
        let value = self.capture.take()?;
        match (self.done)(&value) {
            Some(true) => Some(Response::Ok),
            Some(false) => Some(Response::Error),
            None => None,
        }
    }
}

pub(crate) fn trim_quotes(value: &[u8]) -> &[u8] {
    value
        .strip_prefix(b"\"")
        .and_then(|v| v.strip_suffix(b"\""))
        .unwrap_or(value)
}
