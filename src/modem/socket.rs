use embassy_time::Duration;

use super::response::{Capture, ParseContext, Parser, Response};
use super::Modem;
use crate::at::socket::responses::{CreateSocketResponse, WriteSocketDataResponse};
use crate::at::Urc;
use crate::error::{Error, Result};
use crate::gsm::{Network, Protocol, SocketIndex, Sockets, Tcp};
use crate::power::OnOff;
use crate::transport::Transport;

pub const SOCKET_COUNT: usize = 7;

/// Largest payload one `+USOWR` / `+USORD` carries
const MAX_CHUNK: usize = 512;

/// How long to listen for `+UUSORD` before reporting an empty receive
const URC_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketEntry {
    /// Socket id assigned by the modem
    pub id: u8,
    /// Bytes the modem announced and the host has not read yet
    pub pending: usize,
    pub peer_closed: bool,
}

/// Maps the driver's socket indexes to modem socket ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketTable {
    slots: [Option<SocketEntry>; SOCKET_COUNT],
}

impl SocketTable {
    pub fn first_free(&self) -> Option<SocketIndex> {
        self.slots.iter().position(Option::is_none)
    }

    /// Record a socket the modem just created. A stale slot holding the same
    /// id is dropped first, the modem reuses ids after a close.
    pub fn insert(&mut self, id: u8) -> Option<SocketIndex> {
        if let Some(stale) = self.index_of(id) {
            log::warn!("Socket id {} was still mapped to index {}", id, stale);
            self.slots[stale] = None;
        }
        let index = self.first_free()?;
        self.slots[index] = Some(SocketEntry {
            id,
            pending: 0,
            peer_closed: false,
        });
        Some(index)
    }

    pub fn get(&self, index: SocketIndex) -> Option<&SocketEntry> {
        self.slots.get(index)?.as_ref()
    }

    pub fn id(&self, index: SocketIndex) -> Option<u8> {
        self.get(index).map(|entry| entry.id)
    }

    /// Pending byte count, 0 for free or out of range indexes.
    pub fn pending(&self, index: SocketIndex) -> usize {
        self.get(index).map_or(0, |entry| entry.pending)
    }

    pub fn remove(&mut self, index: SocketIndex) -> Option<SocketEntry> {
        self.slots.get_mut(index)?.take()
    }

    pub fn index_of(&self, id: u8) -> Option<SocketIndex> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if entry.id == id))
    }

    pub(crate) fn consumed(&mut self, index: SocketIndex, count: usize) {
        if let Some(Some(entry)) = self.slots.get_mut(index) {
            entry.pending = entry.pending.saturating_sub(count);
        }
    }

    pub(crate) fn on_urc(&mut self, urc: &Urc) {
        match urc {
            Urc::SocketDataAvailable(data) | Urc::DatagramAvailable(data) => {
                match self.entry_mut(data.socket) {
                    Some(entry) => entry.pending = data.length,
                    None => log::warn!("Data announced for unknown socket {}", data.socket),
                }
            }
            Urc::SocketClosed(closed) => {
                log::info!("Socket {} closed by peer", closed.socket);
                if let Some(entry) = self.entry_mut(closed.socket) {
                    entry.peer_closed = true;
                }
            }
        }
    }

    fn entry_mut(&mut self, id: u8) -> Option<&mut SocketEntry> {
        self.slots.iter_mut().flatten().find(|entry| entry.id == id)
    }
}

/// Decodes the hex payload of `+USORD: <id>,<len>,"<hex>"` into the output
/// buffer. The line reader truncates long replies, so whatever hex the line
/// does not hold is read raw.
#[derive(Default)]
struct SocketPayload {
    length: Option<usize>,
    carry: Option<u8>,
    invalid: bool,
}

impl SocketPayload {
    fn feed(&mut self, mut digits: &[u8], cx: &mut ParseContext<'_>) {
        let mut chunk = [0u8; 64];
        let mut bytes = [0u8; 32];
        while !digits.is_empty() {
            let mut n = 0;
            if let Some(c) = self.carry.take() {
                chunk[0] = c;
                n = 1;
            }
            let take = (chunk.len() - n).min(digits.len());
            chunk[n..n + take].copy_from_slice(&digits[..take]);
            n += take;
            digits = &digits[take..];
            if n % 2 == 1 {
                n -= 1;
                self.carry = Some(chunk[n]);
            }
            let decoded = &mut bytes[..n / 2];
            match hex::decode_to_slice(&chunk[..n], decoded) {
                Ok(()) => {
                    cx.push(decoded);
                }
                Err(e) => {
                    log::warn!("Bad socket payload: {:?}", e);
                    self.invalid = true;
                }
            }
        }
    }
}

impl Parser for SocketPayload {
    fn parse(&mut self, line: &[u8], cx: &mut ParseContext<'_>) -> Option<Response> {
        if self.length.is_some() {
            return None;
        }
        let rest = line.strip_prefix(b"+USORD:")?;
        let (header, data) = match rest.iter().position(|&b| b == b'"') {
            Some(quote) => (&rest[..quote], &rest[quote + 1..]),
            None => (rest, &[][..]),
        };
        let length = core::str::from_utf8(header)
            .ok()
            .and_then(|h| h.trim().trim_end_matches(',').split(',').nth(1))
            .and_then(|l| l.trim().parse::<usize>().ok());
        let Some(length) = length else {
            log::warn!("Malformed +USORD header");
            self.invalid = true;
            return None;
        };
        self.length = Some(length);

        let hex_len = length * 2;
        let data = data.strip_suffix(b"\"").unwrap_or(data);
        let in_line = data.len().min(hex_len);
        self.feed(&data[..in_line], cx);

        let mut missing = hex_len - in_line;
        let mut scratch = [0u8; 64];
        while missing > 0 {
            let want = missing.min(scratch.len());
            let got = cx.read_raw_into(&mut scratch[..want]);
            self.feed(&scratch[..got], cx);
            missing -= got;
            if got < want {
                self.invalid = true;
                break;
            }
        }
        None
    }
}

impl<T: Transport, P: OnOff> Modem<T, P> {
    /// Bytes announced for `socket` and not read yet.
    pub fn pending_bytes(&self, socket: SocketIndex) -> usize {
        self.interface.sockets.pending(socket)
    }

    fn socket_id(&self, socket: SocketIndex) -> Result<u8> {
        self.interface.sockets.id(socket).ok_or(Error::InvalidSocket)
    }

    fn send_chunk(&mut self, id: u8, chunk: &[u8]) -> Result<()> {
        let mut digits = [0u8; 64];
        let int = &mut self.interface;
        write!(int, "AT+USOWR={},{},\"", id, chunk.len());
        for part in chunk.chunks(digits.len() / 2) {
            let encoded = &mut digits[..part.len() * 2];
            hex::encode_to_slice(part, encoded).map_err(|_| Error::InvalidArgument)?;
            int.write(encoded);
        }
        int.write(b"\"");
        int.write_ln();

        let mut ack = Capture::<WriteSocketDataResponse>::new("+USOWR");
        let timeout = self.config.read_timeout();
        let reply = self.interface.read_response(&mut [], Some(&mut ack), timeout);
        self.check(reply)?;
        match ack.take() {
            Some(ack) if ack.length == chunk.len() => Ok(()),
            Some(ack) => {
                log::warn!("Modem accepted {} of {} bytes", ack.length, chunk.len());
                Err(Error::Unexpected(Response::Ok))
            }
            None => Err(Error::NotFound),
        }
    }
}

impl<T: Transport, P: OnOff> Sockets for Modem<T, P> {
    fn create_socket(&mut self, protocol: Protocol, local_port: Option<u16>) -> Result<SocketIndex> {
        if self.interface.sockets.first_free().is_none() {
            return Err(Error::NoFreeSocket);
        }
        let number = match protocol {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        };
        let mut created = Capture::<CreateSocketResponse>::new("+USOCR");
        let timeout = self.config.read_timeout();
        match local_port {
            Some(port) => self.exchange(
                format_args!("AT+USOCR={},{}", number, port),
                &mut [],
                Some(&mut created),
                timeout,
            )?,
            None => self.exchange(
                format_args!("AT+USOCR={}", number),
                &mut [],
                Some(&mut created),
                timeout,
            )?,
        };
        let id = created.take().ok_or(Error::NotFound)?.socket;
        let index = self
            .interface
            .sockets
            .insert(id)
            .ok_or(Error::NoFreeSocket)?;
        log::debug!("Socket {} created as index {}", id, index);
        Ok(index)
    }

    fn connect_socket(&mut self, socket: SocketIndex, host: &str, port: u16) -> Result<()> {
        let id = self.socket_id(socket)?;
        let timeout = self.config.socket_connect_timeout();
        self.exchange(
            format_args!("AT+USOCO={},\"{}\",{}", id, host, port),
            &mut [],
            None,
            timeout,
        )?;
        Ok(())
    }

    fn socket_send(&mut self, socket: SocketIndex, data: &[u8]) -> Result<()> {
        let id = self.socket_id(socket)?;
        for chunk in data.chunks(MAX_CHUNK) {
            self.send_chunk(id, chunk)?;
        }
        Ok(())
    }

    fn socket_receive(&mut self, socket: SocketIndex, buf: &mut [u8]) -> Result<usize> {
        let id = self.socket_id(socket)?;
        if self.interface.sockets.pending(socket) == 0 {
            self.poll_urcs(URC_POLL);
        }
        let count = buf
            .len()
            .min(self.interface.sockets.pending(socket))
            .min(MAX_CHUNK);
        if count == 0 {
            return Ok(0);
        }

        let mut payload = SocketPayload::default();
        let timeout = self.config.read_timeout();
        let len = self.exchange(
            format_args!("AT+USORD={},{}", id, count),
            &mut buf[..count],
            Some(&mut payload),
            timeout,
        )?;
        if payload.invalid || payload.length.is_none() {
            return Err(Error::NotFound);
        }
        self.interface.sockets.consumed(socket, len);
        Ok(len)
    }

    fn close_socket(&mut self, socket: SocketIndex) -> Result<()> {
        let entry = *self
            .interface
            .sockets
            .get(socket)
            .ok_or(Error::InvalidSocket)?;
        let timeout = self.config.read_timeout();
        let result = self.exchange(format_args!("AT+USOCL={}", entry.id), &mut [], None, timeout);
        if result.is_ok() || entry.peer_closed {
            self.interface.sockets.remove(socket);
            if self.tcp_socket == Some(socket) {
                self.tcp_socket = None;
            }
        }
        result.map(|_| ())
    }
}

impl<T: Transport, P: OnOff> Tcp for Modem<T, P> {
    fn open_tcp(
        &mut self,
        apn: &str,
        username: Option<&str>,
        password: Option<&str>,
        server: &str,
        port: u16,
    ) -> anyhow::Result<()> {
        if self.tcp_socket.is_some() {
            log::warn!("TCP connection already open, closing it first");
            self.close_tcp(false);
        }
        if !self
            .is_connected()
            .map_err(|e| anyhow::anyhow!("Failed to query data connection: {e:?}"))?
        {
            self.connect(None, apn, username, password, Default::default())?;
        }
        let socket = self
            .create_socket(Protocol::Tcp, None)
            .map_err(|e| anyhow::anyhow!("Failed to create socket: {e:?}"))?;
        if let Err(e) = self.connect_socket(socket, server, port) {
            self.close_socket(socket).ok();
            return Err(anyhow::anyhow!("Failed to connect to {server}:{port}: {e:?}"));
        }
        log::info!("TCP connection to {}:{} open", server, port);
        self.tcp_socket = Some(socket);
        Ok(())
    }

    fn close_tcp(&mut self, switch_off: bool) {
        if let Some(socket) = self.tcp_socket.take() {
            if let Err(e) = self.close_socket(socket) {
                log::warn!("Failed to close TCP socket: {:?}", e);
            }
        }
        if switch_off {
            self.off();
        }
    }

    fn send_data_tcp(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.tcp_socket.ok_or(Error::InvalidSocket)?;
        self.socket_send(socket, data)
    }

    fn receive_data_tcp(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let socket = self.tcp_socket.ok_or(Error::InvalidSocket)?;
        let deadline = self.interface.now() + timeout;
        let mut len = 0;
        while len < buf.len() && self.interface.now() < deadline {
            len += self.socket_receive(socket, &mut buf[len..])?;
            let closed = self
                .interface
                .sockets
                .get(socket)
                .map_or(true, |entry| entry.peer_closed);
            if closed && self.pending_bytes(socket) == 0 {
                break;
            }
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mock::ScriptedModem;
    use crate::modem::Modem;

    fn modem(script: ScriptedModem) -> Modem<ScriptedModem> {
        Modem::new(script, Config::default())
    }

    #[test]
    fn table_maps_index_to_id() {
        let mut table = SocketTable::default();
        assert_eq!(table.insert(3), Some(0));
        assert_eq!(table.insert(5), Some(1));
        assert_eq!(table.id(0), Some(3));
        assert_eq!(table.index_of(5), Some(1));
        assert_eq!(table.remove(0).map(|e| e.id), Some(3));
        assert_eq!(table.first_free(), Some(0));
        assert_eq!(table.pending(0), 0);
        assert_eq!(table.pending(42), 0);
    }

    #[test]
    fn table_full() {
        let mut table = SocketTable::default();
        for id in 0..SOCKET_COUNT as u8 {
            assert!(table.insert(id).is_some());
        }
        assert_eq!(table.first_free(), None);
        assert_eq!(table.insert(9), None);
    }

    #[test]
    fn reused_id_replaces_stale_slot() {
        let mut table = SocketTable::default();
        table.insert(2);
        table.insert(4);
        assert_eq!(table.insert(2), Some(0));
        assert_eq!(table.index_of(2), Some(0));
        assert_eq!(table.index_of(4), Some(1));
    }

    #[test]
    fn create_records_modem_id() {
        let mut modem = modem(ScriptedModem::new().expect("AT+USOCR=6", "\r\n+USOCR: 3\r\n\r\nOK\r\n"));
        let index = modem.create_socket(Protocol::Tcp, None).unwrap();
        assert_eq!(index, 0);
        assert_eq!(modem.interface().sockets.id(0), Some(3));
    }

    #[test]
    fn create_udp_with_local_port() {
        let mut modem = modem(ScriptedModem::new().expect("AT+USOCR=17,4000", "+USOCR: 1\r\nOK\r\n"));
        assert_eq!(modem.create_socket(Protocol::Udp, Some(4000)), Ok(0));
    }

    #[test]
    fn create_fails_without_free_slot() {
        let mut modem = modem(ScriptedModem::new());
        for id in 0..SOCKET_COUNT as u8 {
            modem.interface().sockets.insert(id);
        }
        assert_eq!(modem.create_socket(Protocol::Tcp, None), Err(Error::NoFreeSocket));
        assert!(modem.transport().written().is_empty());
    }

    #[test]
    fn create_reports_modem_error() {
        let mut modem = modem(ScriptedModem::new().expect("AT+USOCR=6", "+CME ERROR: 3\r\n"));
        assert_eq!(
            modem.create_socket(Protocol::Tcp, None),
            Err(Error::Modem(Some(crate::modem::response::ErrorCode::Cme(3))))
        );
        assert_eq!(modem.interface().sockets.first_free(), Some(0));
    }

    #[test]
    fn connect_uses_modem_id() {
        let mut modem = modem(
            ScriptedModem::new()
                .expect("AT+USOCR=6", "+USOCR: 2\r\nOK\r\n")
                .expect("AT+USOCO=2,\"example.com\",80", "OK\r\n"),
        );
        let socket = modem.create_socket(Protocol::Tcp, None).unwrap();
        modem.connect_socket(socket, "example.com", 80).unwrap();
        assert_eq!(modem.connect_socket(5, "example.com", 80), Err(Error::InvalidSocket));
    }

    #[test]
    fn send_is_hex_encoded_and_chunked() {
        let data = [0xABu8; 600];
        let first = format!("AT+USOWR=0,512,\"{}\"", "ab".repeat(512));
        let second = format!("AT+USOWR=0,88,\"{}\"", "ab".repeat(88));
        let mut modem = modem(
            ScriptedModem::new()
                .expect(&first, "+USOWR: 0,512\r\nOK\r\n")
                .expect(&second, "+USOWR: 0,88\r\nOK\r\n"),
        );
        modem.interface().sockets.insert(0);
        modem.socket_send(0, &data).unwrap();
        assert!(modem.transport().is_done());
    }

    #[test]
    fn short_write_is_an_error() {
        let mut modem = modem(ScriptedModem::new().expect("AT+USOWR=0,2,\"6869\"", "+USOWR: 0,1\r\nOK\r\n"));
        modem.interface().sockets.insert(0);
        assert!(modem.socket_send(0, b"hi").is_err());
    }

    #[test]
    fn receive_is_bounded_by_pending() {
        let mut modem = modem(
            ScriptedModem::new()
                .expect("AT", "+UUSORD: 3,4\r\nOK\r\n")
                .expect("AT+USORD=3,4", "+USORD: 3,4,\"74657374\"\r\nOK\r\n"),
        );
        let index = modem.interface().sockets.insert(3).unwrap();
        modem.execute(format_args!("AT")).unwrap();
        assert_eq!(modem.pending_bytes(index), 4);

        let mut buf = [0u8; 16];
        assert_eq!(modem.socket_receive(index, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"test");
        assert_eq!(modem.pending_bytes(index), 0);
    }

    #[test]
    fn receive_limited_by_buffer() {
        let mut modem = modem(
            ScriptedModem::new()
                .with_pending(b"+UUSORD: 1,10\r\n")
                .expect("AT+USORD=1,3", "+USORD: 1,3,\"616263\"\r\nOK\r\n"),
        );
        let index = modem.interface().sockets.insert(1).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(modem.socket_receive(index, &mut buf), Ok(3));
        assert_eq!(&buf, b"abc");
        assert_eq!(modem.pending_bytes(index), 7);
    }

    #[test]
    fn receive_nothing_pending() {
        let mut modem = modem(ScriptedModem::new());
        let index = modem.interface().sockets.insert(1).unwrap();
        assert_eq!(modem.socket_receive(index, &mut [0u8; 8]), Ok(0));
        assert!(modem.transport().written().is_empty());
    }

    #[test]
    fn receive_payload_longer_than_line_buffer() {
        let payload: Vec<u8> = (0..200u8).collect();
        let reply = format!("+USORD: 0,200,\"{}\"\r\nOK\r\n", hex_string(&payload));
        let mut modem = modem(
            ScriptedModem::new()
                .with_pending(b"+UUSORD: 0,200\r\n")
                .expect("AT+USORD=0,200", &reply),
        );
        let index = modem.interface().sockets.insert(0).unwrap();
        let mut buf = [0u8; 256];
        assert_eq!(modem.socket_receive(index, &mut buf), Ok(200));
        assert_eq!(&buf[..200], payload.as_slice());
    }

    #[test]
    fn close_twice() {
        let mut modem = modem(ScriptedModem::new().expect("AT+USOCL=3", "OK\r\n"));
        let index = modem.interface().sockets.insert(3).unwrap();
        assert_eq!(modem.close_socket(index), Ok(()));
        assert_eq!(modem.close_socket(index), Err(Error::InvalidSocket));
        assert!(modem.transport().is_done());
    }

    #[test]
    fn peer_closed_socket_is_freed_on_error() {
        let mut modem = modem(
            ScriptedModem::new()
                .with_pending(b"+UUSOCL: 3\r\n")
                .expect("AT", "OK\r\n")
                .expect("AT+USOCL=3", "ERROR\r\n"),
        );
        let index = modem.interface().sockets.insert(3).unwrap();
        modem.execute(format_args!("AT")).unwrap();
        assert!(modem.close_socket(index).is_err());
        assert_eq!(modem.interface().sockets.get(index), None);
    }

    #[test]
    fn tcp_round_trip() {
        let mut modem = modem(
            ScriptedModem::new()
                .expect("AT+UPSND=0,8", "+UPSND: 0,8,1\r\nOK\r\n")
                .expect("AT+USOCR=6", "+USOCR: 0\r\nOK\r\n")
                .expect("AT+USOCO=0,\"10.0.0.1\",7", "OK\r\n")
                .expect("AT+USOWR=0,4,\"70696e67\"", "+USOWR: 0,4\r\nOK\r\n+UUSORD: 0,4\r\n")
                .expect("AT+USORD=0,4", "+USORD: 0,4,\"706f6e67\"\r\nOK\r\n")
                .expect("AT+USOCL=0", "OK\r\n"),
        );
        modem.open_tcp("internet", None, None, "10.0.0.1", 7).unwrap();
        modem.send_data_tcp(b"ping").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(modem.receive_data_tcp(&mut buf, Duration::from_secs(5)), Ok(4));
        assert_eq!(&buf, b"pong");
        modem.close_tcp(false);
        assert_eq!(modem.send_data_tcp(b"x"), Err(Error::InvalidSocket));
        assert!(modem.transport().is_done());
    }

    fn hex_string(data: &[u8]) -> String {
        data.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
