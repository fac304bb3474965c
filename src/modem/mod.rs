use alloc::boxed::Box;
use core::fmt;

use embassy_time::Duration;

mod file;
pub mod ftp;
pub mod http;
pub mod interface;
pub mod network;
pub mod response;
pub mod sms;
pub mod socket;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::power::{AlwaysOn, OnOff};
use crate::transport::Transport;
use interface::Interface;
use response::{FirstLine, Parser, Reply, Response};

/// Deadline for the `AT` liveness check
const ALIVE_TIMEOUT: Duration = Duration::from_millis(450);
const ALIVE_ATTEMPTS: usize = 10;

/// Called with the new baud rate once the modem switched; the application
/// must reconfigure its UART before the next command.
pub type BaudrateChange = fn(u32);

/// Driver for one u-blox SARA-U2 modem.
///
/// Single owner, synchronous: every method blocks until the modem answered
/// or the operation's deadline passed.
pub struct Modem<T, P = AlwaysOn> {
    interface: Interface<T>,
    power: P,
    config: Config,
    baudrate_change: Option<BaudrateChange>,
    last_csq: u8,
    ftp: ftp::FtpState,
    tcp_socket: Option<usize>,
}

impl<T: Transport> Modem<T, AlwaysOn> {
    pub fn new(transport: T, config: Config) -> Self {
        Self::with_power(transport, AlwaysOn, config)
    }
}

impl<T: Transport, P: OnOff> Modem<T, P> {
    pub fn with_power(transport: T, power: P, config: Config) -> Self {
        Self {
            interface: Interface::new(transport, &config),
            power,
            config,
            baudrate_change: None,
            last_csq: 0,
            ftp: ftp::FtpState::default(),
            tcp_socket: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Direct access to the protocol engine, for commands this driver does
    /// not wrap.
    pub fn interface(&mut self) -> &mut Interface<T> {
        &mut self.interface
    }

    pub fn transport(&self) -> &T {
        self.interface.transport()
    }

    pub fn release(self) -> (T, P) {
        (self.interface.release(), self.power)
    }

    /// Mirror all traffic to `diag`.
    pub fn set_diag(&mut self, diag: Box<dyn fmt::Write>) {
        self.interface.set_diag(diag);
    }

    pub fn enable_baudrate_change(&mut self, callback: BaudrateChange) {
        self.baudrate_change = Some(callback);
    }

    /// Baud rate to open the UART with before the first command.
    pub fn default_baudrate(&self) -> u32 {
        self.config.baudrate
    }

    /// Most recent `+CSQ` rssi value.
    pub fn last_csq(&self) -> u8 {
        self.last_csq
    }

    // ========================================================================
    // Lifecycle

    /// Powers the modem and waits until it answers `AT`.
    pub fn on(&mut self) -> bool {
        self.interface.init_buffer();
        if !self.power.is_on() {
            log::info!("Powering on modem...");
            self.power.on();
        }
        for _ in 0..ALIVE_ATTEMPTS {
            if self.is_alive() {
                return true;
            }
        }
        log::error!("Modem does not respond");
        false
    }

    pub fn off(&mut self) {
        log::info!("Powering off modem");
        self.power.off();
    }

    pub fn is_on(&mut self) -> bool {
        self.power.is_on()
    }

    /// True if the modem replies to `AT` without timing out.
    pub fn is_alive(&mut self) -> bool {
        self.interface.send(format_args!("AT"));
        self.interface.read_response(&mut [], None, ALIVE_TIMEOUT).is_ok()
    }

    /// Puts the modem in the mode the rest of the driver expects: no echo,
    /// numeric errors, hex socket payloads, SMS text mode.
    pub fn init(&mut self) -> Result<()> {
        self.interface.init_buffer();
        self.execute(format_args!("ATE0"))?;
        self.execute(format_args!("AT+CMEE=1"))?;
        self.execute(format_args!("AT+UDCONF=1,1"))?;
        self.execute(format_args!("AT+CMGF=1"))?;

        if let (Some(callback), Some(baudrate)) = (self.baudrate_change, self.config.high_baudrate)
        {
            self.execute(format_args!("AT+IPR={}", baudrate))?;
            log::info!("Switching modem to {} baud", baudrate);
            callback(baudrate);
        }

        log::info!("Modem initialized");
        Ok(())
    }

    // ========================================================================
    // Exchange helpers

    /// Send `command` and require `OK` within the default deadline.
    pub(crate) fn execute(&mut self, command: fmt::Arguments<'_>) -> Result<()> {
        let timeout = self.config.read_timeout();
        self.exchange(command, &mut [], None, timeout).map(|_| ())
    }

    /// Send `command`, read the reply through `parser` into `out`.
    /// Returns the number of bytes written to `out`.
    pub(crate) fn exchange(
        &mut self,
        command: fmt::Arguments<'_>,
        out: &mut [u8],
        parser: Option<&mut dyn Parser>,
        timeout: Duration,
    ) -> Result<usize> {
        self.interface.send(command);
        let reply = self.interface.read_response(out, parser, timeout);
        self.check(reply)
    }

    /// `OK`, or `Empty` when a parser produced data, count as success.
    pub(crate) fn check(&self, reply: Reply) -> Result<usize> {
        match reply.response {
            Response::Ok => Ok(reply.len),
            Response::Empty if reply.len > 0 => Ok(reply.len),
            other => Err(Error::from_response(other, self.interface.last_error())),
        }
    }

    /// Read whatever the modem sends unprompted for `timeout`, so URCs reach
    /// the socket table.
    pub(crate) fn poll_urcs(&mut self, timeout: Duration) {
        self.interface.read_response(&mut [], None, timeout);
    }

    /// Like [`Modem::exchange`] for single line values, returned as text
    /// borrowed from `buf`.
    pub(crate) fn query_line<'b>(
        &mut self,
        command: fmt::Arguments<'_>,
        buf: &'b mut [u8],
        mut parser: FirstLine,
    ) -> Result<&'b str> {
        let timeout = self.config.read_timeout();
        let len = self.exchange(command, buf, Some(&mut parser), timeout)?;
        if parser.truncated() {
            return Err(Error::BufferTooSmall);
        }
        if len == 0 {
            return Err(Error::NotFound);
        }
        core::str::from_utf8(&buf[..len]).map_err(|_| Error::NotFound)
    }
}
