use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Write as _;

use atat::AtatUrc as _;
use embassy_time::{Duration, Instant};

use super::response::{ErrorCode, ParseContext, Parser, RawRead, Reply, Response, Terminal, PROMPT};
use super::socket::SocketTable;
use crate::at::Urc;
use crate::config::{Config, Terminator};
use crate::transport::Transport;

/// How much of the current command is kept to recognise its echo
const ECHO_CAPACITY: usize = 64;

/// Silence after `>` (or `> `) that makes it a prompt rather than the start
/// of a line
const PROMPT_SETTLE: Duration = Duration::from_millis(50);

/// Modem session: the transport plus everything one command exchange needs.
///
/// Exclusively owned by one caller. `read_response` must never be re-entered
/// from a parser, it holds the input buffer for the whole exchange.
pub struct Interface<T> {
    transport: T,
    buffer: Option<Vec<u8>>,
    buffer_size: usize,
    char_timeout: Duration,
    terminator: Terminator,
    /// Set while a command is being written and its terminator is still due
    append_command: bool,
    echo: heapless::Vec<u8, ECHO_CAPACITY>,
    write_failed: bool,
    last_error: Option<ErrorCode>,
    diag: Option<Box<dyn fmt::Write>>,
    pub(crate) sockets: SocketTable,
}

impl<T: Transport> Interface<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            transport,
            buffer: None,
            buffer_size: config.input_buffer_size,
            char_timeout: config.char_timeout(),
            terminator: config.terminator,
            append_command: false,
            echo: heapless::Vec::new(),
            write_failed: false,
            last_error: None,
            diag: None,
            sockets: SocketTable::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn release(self) -> T {
        self.transport
    }

    pub fn set_diag(&mut self, diag: Box<dyn fmt::Write>) {
        self.diag = Some(diag);
    }

    pub fn set_char_timeout(&mut self, timeout: Duration) {
        self.char_timeout = timeout;
    }

    pub fn now(&self) -> Instant {
        self.transport.now()
    }

    /// Code of the last `+CME ERROR` / `+CMS ERROR`, cleared by every exchange.
    pub fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    /// Allocates the input buffer. Safe to call more than once.
    pub fn init_buffer(&mut self) {
        if self.buffer.is_none() {
            log::debug!("Allocating {} byte input buffer", self.buffer_size);
            self.buffer = Some(vec![0; self.buffer_size]);
        }
    }

    // ========================================================================
    // Writing

    /// Write part of a command. The first write after a terminator starts a
    /// new command.
    pub fn write(&mut self, data: &[u8]) {
        if !self.append_command {
            self.append_command = true;
            self.echo.clear();
            self.mirror(format_args!(">> "));
        }
        let room = ECHO_CAPACITY - self.echo.len();
        self.echo.extend_from_slice(&data[..data.len().min(room)]).ok();
        match core::str::from_utf8(data) {
            Ok(text) => self.mirror(format_args!("{}", text)),
            Err(_) => self.mirror(format_args!("<{} bytes>", data.len())),
        }
        if let Err(e) = self.transport.write_all(data) {
            log::warn!("Modem write failed: {:?}", e);
            self.write_failed = true;
        }
    }

    /// Formatted variant of [`Interface::write`], so `write!(interface, ..)`
    /// works.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) {
        struct Adapter<'a, T: Transport>(&'a mut Interface<T>);

        impl<T: Transport> fmt::Write for Adapter<'_, T> {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                self.0.write(s.as_bytes());
                Ok(())
            }
        }

        fmt::Write::write_fmt(&mut Adapter(self), args).ok();
    }

    /// Terminate the current command.
    pub fn write_ln(&mut self) {
        let terminator = self.terminator.as_bytes();
        let result = self
            .transport
            .write_all(terminator)
            .and_then(|_| self.transport.flush());
        if let Err(e) = result {
            log::warn!("Modem write failed: {:?}", e);
            self.write_failed = true;
        }
        self.append_command = false;
        self.mirror(format_args!("\n"));
    }

    /// Write a complete command line.
    pub fn send(&mut self, args: fmt::Arguments<'_>) {
        self.write_fmt(args);
        if let Ok(text) = core::str::from_utf8(&self.echo) {
            log::debug!("Sending {}", text);
        }
        self.write_ln();
    }

    /// Payload phase after a `>` prompt: the bytes go out as they are, with
    /// no terminator and without starting a new command.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.mirror(format_args!(">> <{} bytes>\n", data.len()));
        let result = self
            .transport
            .write_all(data)
            .and_then(|_| self.transport.flush());
        if let Err(e) = result {
            log::warn!("Modem write failed: {:?}", e);
            self.write_failed = true;
        }
    }

    fn mirror(&mut self, args: fmt::Arguments<'_>) {
        if let Some(diag) = self.diag.as_mut() {
            diag.write_fmt(args).ok();
        }
    }

    // ========================================================================
    // Reading

    /// Reads one byte within `timeout`. Transport errors count as silence.
    pub fn timed_read(&mut self, timeout: Duration) -> Option<u8> {
        read_byte(&mut self.transport, timeout)
    }

    /// Read until `terminator` (not stored), a full `buf`, or a byte read
    /// timing out. Returns the number of bytes stored.
    pub fn read_bytes_until(&mut self, terminator: u8, buf: &mut [u8]) -> usize {
        let deadline = self.transport.now() + self.char_timeout * buf.len().max(1) as u32;
        read_until(&mut self.transport, terminator, buf, self.char_timeout, deadline)
            .map_or(0, |(len, _)| len)
    }

    /// Read up to `buf.len()` bytes, stopping early only when a byte read
    /// times out.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let deadline = self.transport.now() + self.char_timeout * buf.len().max(1) as u32;
        read_raw(&mut self.transport, buf, self.char_timeout, deadline)
    }

    /// Run one exchange: read lines until a terminal token or `timeout`.
    ///
    /// Blank lines and the command echo are skipped, `+UUSORD`/`+UUSORF`/
    /// `+UUSOCL` update the socket table, every other line goes to `parser`
    /// which may fill `out` and may end the exchange early.
    pub fn read_response(
        &mut self,
        out: &mut [u8],
        mut parser: Option<&mut dyn Parser>,
        timeout: Duration,
    ) -> Reply {
        self.last_error = None;
        if core::mem::take(&mut self.write_failed) {
            log::warn!("Command was not sent completely");
            return self.finish(Reply::new(Response::Timeout, 0));
        }
        self.init_buffer();

        let Self {
            transport,
            buffer,
            char_timeout,
            echo,
            sockets,
            diag,
            last_error,
            ..
        } = self;
        let Some(buffer) = buffer.as_mut() else {
            return Reply::new(Response::Timeout, 0);
        };
        let char_timeout = *char_timeout;
        let deadline = transport.now() + timeout;

        let mut written = 0;
        let mut seen_bytes = false;
        let mut seen_lines = false;

        let response = loop {
            if transport.now() >= deadline {
                break if seen_lines {
                    Response::NotFound
                } else if seen_bytes {
                    Response::Empty
                } else {
                    Response::Timeout
                };
            }

            let Some((len, terminated)) =
                read_until(transport, b'\n', buffer, char_timeout, deadline)
            else {
                continue;
            };
            seen_bytes = true;
            let untrimmed = &buffer[..len];
            let line = untrimmed.trim_ascii();
            if line.is_empty() {
                continue;
            }
            if let Some(diag) = diag.as_mut() {
                match core::str::from_utf8(line) {
                    Ok(text) => writeln!(diag, "<< {}", text).ok(),
                    Err(_) => writeln!(diag, "<< <{} bytes>", line.len()).ok(),
                };
            }

            if let Some(terminal) = Terminal::parse(line) {
                if let Terminal::Error(code) = terminal {
                    *last_error = code;
                }
                break terminal.response();
            }
            if is_echo(echo, line) {
                continue;
            }
            seen_lines = true;

            if let Some(urc) = Urc::parse(line) {
                sockets.on_urc(&urc);
                continue;
            }

            match parser.as_mut() {
                Some(parser) => {
                    let mut raw = RawReader {
                        transport: &mut *transport,
                        char_timeout,
                        deadline,
                    };
                    let mut cx =
                        ParseContext::new(&mut *out, &mut written, &mut raw, untrimmed, terminated);
                    if let Some(response) = parser.parse(line, &mut cx) {
                        break response;
                    }
                }
                None => log::debug!(
                    "Ignoring line: {}",
                    core::str::from_utf8(line).unwrap_or("<binary>")
                ),
            }
        };

        self.finish(Reply::new(response, written))
    }

    fn finish(&mut self, reply: Reply) -> Reply {
        log::trace!("Response {:?} ({} bytes)", reply.response, reply.len);
        self.mirror(format_args!("[{:?}]\n", reply.response));
        reply
    }
}

/// Raw reads on behalf of a parser, bounded by the exchange deadline.
struct RawReader<'a, T> {
    transport: &'a mut T,
    char_timeout: Duration,
    deadline: Instant,
}

impl<T: Transport> RawRead for RawReader<'_, T> {
    fn read_raw(&mut self, buf: &mut [u8]) -> usize {
        read_raw(self.transport, buf, self.char_timeout, self.deadline)
    }
}

fn read_byte<T: Transport>(transport: &mut T, timeout: Duration) -> Option<u8> {
    match transport.read_byte(timeout) {
        Ok(byte) => byte,
        Err(e) => {
            log::warn!("Modem read failed: {:?}", e);
            None
        }
    }
}

/// Line reader. Returns `None` if not a single byte arrived, otherwise the
/// stored length and whether the terminator was seen.
///
/// The modem does not terminate its `>` prompt, so a line holding only `>`
/// or `> ` ends after [`PROMPT_SETTLE`] of silence. Lines that merely start
/// with `>` keep going.
fn read_until<T: Transport>(
    transport: &mut T,
    terminator: u8,
    buf: &mut [u8],
    char_timeout: Duration,
    deadline: Instant,
) -> Option<(usize, bool)> {
    let mut len = 0;
    let mut any = false;
    while len < buf.len() {
        let now = transport.now();
        if now >= deadline {
            break;
        }
        let wait = match &buf[..len] {
            [PROMPT] | [PROMPT, b' '] => PROMPT_SETTLE,
            _ => char_timeout,
        };
        let Some(byte) = read_byte(transport, wait.min(deadline.duration_since(now))) else {
            break;
        };
        any = true;
        if byte == terminator {
            return Some((len, true));
        }
        buf[len] = byte;
        len += 1;
    }
    any.then_some((len, false))
}

fn read_raw<T: Transport>(
    transport: &mut T,
    buf: &mut [u8],
    char_timeout: Duration,
    deadline: Instant,
) -> usize {
    let mut len = 0;
    while len < buf.len() {
        let now = transport.now();
        if now >= deadline {
            break;
        }
        match read_byte(transport, char_timeout.min(deadline.duration_since(now))) {
            Some(byte) => {
                buf[len] = byte;
                len += 1;
            }
            None => break,
        }
    }
    len
}

fn is_echo(echo: &[u8], line: &[u8]) -> bool {
    !echo.is_empty() && line.starts_with(b"AT") && (line.starts_with(echo) || echo.starts_with(line))
}
