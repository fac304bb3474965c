//! Scripted modem with a virtual clock, for unit tests.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use embassy_time::{Duration, Instant};
use embedded_io::{ErrorKind, ErrorType, Write};

use crate::transport::Transport;

enum Step {
    /// A command line, matched once its terminator arrives
    Command(Vec<u8>, Vec<u8>),
    /// Raw bytes written after a prompt, matched on length
    Raw(Vec<u8>, Vec<u8>),
}

pub struct ScriptedModem {
    script: VecDeque<Step>,
    line: Vec<u8>,
    written: Vec<u8>,
    rx: VecDeque<u8>,
    now: Instant,
    chatter: Option<(Vec<u8>, Duration)>,
    fail_writes: bool,
}

impl ScriptedModem {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            line: Vec::new(),
            written: Vec::new(),
            rx: VecDeque::new(),
            now: Instant::from_ticks(0),
            chatter: None,
            fail_writes: false,
        }
    }

    /// Answer `command` (without terminator) with `reply`.
    pub fn expect(mut self, command: &str, reply: &str) -> Self {
        self.script.push_back(Step::Command(command.into(), reply.into()));
        self
    }

    /// Answer a raw data phase of exactly `data` with `reply`.
    pub fn expect_raw(mut self, data: &[u8], reply: &str) -> Self {
        self.script.push_back(Step::Raw(data.into(), reply.into()));
        self
    }

    /// Continue with the steps of `other`.
    pub fn append(mut self, other: ScriptedModem) -> Self {
        self.script.extend(other.script);
        self
    }

    /// Bytes waiting before any command is sent.
    pub fn with_pending(mut self, data: &[u8]) -> Self {
        self.rx.extend(data);
        self
    }

    /// Emit `line` every `interval` whenever nothing else is queued.
    pub fn with_chatter(mut self, line: &[u8], interval: Duration) -> Self {
        self.chatter = Some((line.into(), interval));
        self
    }

    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn is_done(&self) -> bool {
        self.script.is_empty()
    }

    fn on_byte(&mut self, byte: u8) {
        self.line.push(byte);
        let reply = match self.script.front() {
            Some(Step::Command(command, reply)) if self.line.ends_with(b"\r\n") => {
                let sent = &self.line[..self.line.len() - 2];
                assert_eq!(
                    core::str::from_utf8(sent).unwrap(),
                    core::str::from_utf8(command).unwrap(),
                    "unexpected command"
                );
                reply.clone()
            }
            Some(Step::Raw(data, reply)) if self.line.len() == data.len() => {
                assert_eq!(&self.line, data, "unexpected raw data");
                reply.clone()
            }
            None if self.line.ends_with(b"\r\n") => {
                panic!("unscripted command {:?}", core::str::from_utf8(&self.line));
            }
            _ => return,
        };
        self.script.pop_front();
        self.line.clear();
        self.rx.extend(reply);
    }
}

impl ErrorType for ScriptedModem {
    type Error = ErrorKind;
}

impl Write for ScriptedModem {
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        if self.fail_writes {
            return Err(ErrorKind::Other);
        }
        self.written.extend_from_slice(buf);
        for &byte in buf {
            self.on_byte(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }
}

impl Transport for ScriptedModem {
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, ErrorKind> {
        if let Some(byte) = self.rx.pop_front() {
            return Ok(Some(byte));
        }
        match &self.chatter {
            Some((line, interval)) if *interval <= timeout => {
                self.now += *interval;
                self.rx.extend(line.iter().copied());
                Ok(self.rx.pop_front())
            }
            _ => {
                self.now += timeout;
                Ok(None)
            }
        }
    }

    fn now(&self) -> Instant {
        self.now
    }
}
