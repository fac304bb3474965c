//! Byte channel between the driver and the modem.

use embassy_time::{Duration, Instant};
use embedded_io::{ErrorType, Read, ReadReady, Write};

/// A duplex, already-open byte channel.
///
/// Writes go through [`embedded_io::Write`]. Reads are one byte at a time
/// and give up after a caller-supplied timeout, which is the only blocking
/// primitive the protocol engine relies on.
pub trait Transport: Write {
    /// Read a single byte, waiting at most `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, Self::Error>;

    /// Monotonic time used for all deadlines.
    fn now(&self) -> Instant;
}

/// [`Transport`] over any blocking `embedded-io` UART plus a millisecond
/// clock, e.g. `Serial::new(uart, embassy_time::Instant::now)`.
pub struct Serial<U, C> {
    uart: U,
    clock: C,
}

impl<U, C> Serial<U, C>
where
    C: Fn() -> Instant,
{
    pub fn new(uart: U, clock: C) -> Self {
        Self { uart, clock }
    }

    pub fn release(self) -> U {
        self.uart
    }
}

impl<U: ErrorType, C> ErrorType for Serial<U, C> {
    type Error = U::Error;
}

impl<U: Write, C> Write for Serial<U, C> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.uart.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.uart.flush()
    }
}

impl<U, C> Transport for Serial<U, C>
where
    U: Read + ReadReady + Write,
    C: Fn() -> Instant,
{
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, Self::Error> {
        let start = (self.clock)();
        loop {
            if self.uart.read_ready()? {
                let mut byte = [0u8; 1];
                if self.uart.read(&mut byte)? == 1 {
                    return Ok(Some(byte[0]));
                }
            }
            if (self.clock)().duration_since(start) >= timeout {
                return Ok(None);
            }
        }
    }

    fn now(&self) -> Instant {
        (self.clock)()
    }
}
