//! Dialect independent view of a cellular modem.
//!
//! Each trait is one capability. [`crate::Modem`] implements all of them
//! for the u-blox SARA-U2 command set; another module family would supply
//! its own adapter and keep the same protocol engine.

use core::net::Ipv4Addr;

use embassy_time::Duration;

use crate::error::Result;

/// Index into the driver's socket table, not the modem's own socket id
pub type SocketIndex = usize;

pub type PhoneNumber = heapless::String<24>;

/// Data authorization type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationType {
    None = 0,
    Pap = 1,
    Chap = 2,
    #[default]
    AutoDetect = 3,
}

/// Network registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRegistrationStatus {
    Unknown,
    Denied,
    NoNetwork,
    Home,
    Roaming,
}

impl NetworkRegistrationStatus {
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTechnology {
    Unknown,
    Gsm,
    Edge,
    Utran,
    Hsdpa,
    Hsupa,
    HsdpaHsupa,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStatus {
    Unknown,
    Missing,
    NeedsPin,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpRequestType {
    Post,
    #[default]
    Get,
    Head,
    Delete,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpMode {
    Active,
    #[default]
    Passive,
}

/// Registration, data connection and identity queries.
///
/// Buffer-filling queries return the value as a `&str` borrowed from the
/// caller's buffer and fail with [`crate::Error::BufferTooSmall`] if it
/// does not fit.
pub trait Network {
    fn set_apn(&mut self, apn: &str) -> Result<()>;
    fn set_apn_username(&mut self, username: &str) -> Result<()>;
    fn set_apn_password(&mut self, password: &str) -> Result<()>;

    /// Power up, unlock the SIM, wait for registration and activate the
    /// packet data connection. An empty `apn` selects [`crate::Config::apn`].
    fn connect(
        &mut self,
        sim_pin: Option<&str>,
        apn: &str,
        username: Option<&str>,
        password: Option<&str>,
        authorization: AuthorizationType,
    ) -> anyhow::Result<()>;

    /// Deactivate the packet data connection.
    fn disconnect(&mut self) -> Result<()>;

    /// True when the packet data connection is active.
    fn is_connected(&mut self) -> Result<bool>;

    fn network_status(&mut self) -> Result<NetworkRegistrationStatus>;
    fn network_technology(&mut self) -> Result<NetworkTechnology>;

    /// RSSI in dBm (0 when unknown) and the raw bit error rate.
    fn rssi_and_ber(&mut self) -> Result<(i8, u8)>;

    fn operator_name<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str>;
    fn mobile_directory_number<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str>;
    /// Needs at least 15 bytes.
    fn imei<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str>;
    /// Needs at least 20 bytes.
    fn ccid<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str>;
    /// Needs at least 15 bytes.
    fn imsi<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str>;
    /// Mobile equipment identifier of CDMA modules. GSM/UMTS modules have
    /// none and report [`crate::Error::NotFound`].
    fn meid<'b>(&mut self, _buf: &'b mut [u8]) -> Result<&'b str> {
        Err(crate::Error::NotFound)
    }

    fn sim_status(&mut self) -> Result<SimStatus>;

    fn local_ip(&mut self) -> Result<Ipv4Addr>;
    /// DNS lookup through the modem.
    fn host_ip(&mut self, host: &str) -> Result<Ipv4Addr>;
}

/// Modem-side sockets, addressed by [`SocketIndex`].
pub trait Sockets {
    /// Fails with [`crate::Error::NoFreeSocket`] without talking to the
    /// modem when every slot is taken.
    fn create_socket(&mut self, protocol: Protocol, local_port: Option<u16>) -> Result<SocketIndex>;
    fn connect_socket(&mut self, socket: SocketIndex, host: &str, port: u16) -> Result<()>;
    fn socket_send(&mut self, socket: SocketIndex, data: &[u8]) -> Result<()>;
    /// Never returns more than the modem announced as pending.
    fn socket_receive(&mut self, socket: SocketIndex, buf: &mut [u8]) -> Result<usize>;
    fn close_socket(&mut self, socket: SocketIndex) -> Result<()>;
}

/// Single TCP connection convenience layer over [`Sockets`].
pub trait Tcp {
    fn open_tcp(
        &mut self,
        apn: &str,
        username: Option<&str>,
        password: Option<&str>,
        server: &str,
        port: u16,
    ) -> anyhow::Result<()>;
    fn close_tcp(&mut self, switch_off: bool);
    fn send_data_tcp(&mut self, data: &[u8]) -> Result<()>;
    /// Fill `buf` with whatever arrives before `timeout` elapses.
    fn receive_data_tcp(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

pub trait Http {
    /// `endpoint` includes the leading `/`. Returns the number of response
    /// bytes copied into `response`.
    fn http_request(
        &mut self,
        server: &str,
        port: u16,
        endpoint: &str,
        request_type: HttpRequestType,
        response: &mut [u8],
        body: &[u8],
    ) -> anyhow::Result<usize>;
}

/// One FTP connection with at most one open file.
pub trait Ftp {
    fn open_ftp_connection(
        &mut self,
        server: &str,
        username: &str,
        password: &str,
        mode: FtpMode,
    ) -> anyhow::Result<()>;
    fn close_ftp_connection(&mut self) -> Result<()>;
    /// `filename` up to 256 characters, `path` up to 512.
    fn open_ftp_file(&mut self, filename: &str, path: Option<&str>) -> Result<()>;
    fn ftp_send(&mut self, data: &[u8]) -> Result<()>;
    fn ftp_receive(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn close_ftp_file(&mut self) -> Result<()>;
}

/// Text mode SMS.
pub trait Sms {
    /// Writes message indexes matching `status_filter` (e.g. `"ALL"`,
    /// `"REC UNREAD"`) into `indexes` and returns how many were written.
    fn sms_list(&mut self, status_filter: &str, indexes: &mut [u16]) -> Result<usize>;
    /// Returns the sender and the length of the text written to `buf`.
    fn read_sms(&mut self, index: u16, buf: &mut [u8]) -> Result<(PhoneNumber, usize)>;
    fn delete_sms(&mut self, index: u16) -> Result<()>;
    fn send_sms(&mut self, number: &str, text: &str) -> Result<()>;
}
