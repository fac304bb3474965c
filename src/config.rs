use alloc::string::String;
use embassy_time::Duration;
use serde::Deserialize;

/// Line ending appended to every command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Terminator {
    Cr,
    Lf,
    #[default]
    CrLf,
}

impl Terminator {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::Cr => b"\r",
            Terminator::Lf => b"\n",
            Terminator::CrLf => b"\r\n",
        }
    }
}

/// Driver settings.
///
/// Every field has a default, so a partial document (e.g. just an `apn`)
/// deserializes fine. Defaults can be baked in at build time through
/// `modem.yml`, see `build.rs`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capacity of the reusable input line buffer
    pub input_buffer_size: usize,
    /// Per-character read timeout
    pub char_timeout_ms: u64,
    /// Deadline of an ordinary command exchange
    pub read_timeout_ms: u64,
    pub terminator: Terminator,
    /// Baud rate the modem starts up with
    pub baudrate: u32,
    /// Baud rate to switch to after init, if a change callback is installed
    pub high_baudrate: Option<u32>,

    pub join_timeout_ms: u64,
    pub pdp_timeout_ms: u64,
    pub dns_timeout_ms: u64,
    pub socket_connect_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub ftp_timeout_ms: u64,
    pub sms_timeout_ms: u64,

    pub apn: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_buffer_size: parse_env(option_env!("SARA_INPUT_BUFFER_SIZE")).unwrap_or(128),
            char_timeout_ms: 1_000,
            read_timeout_ms: parse_env(option_env!("SARA_READ_TIMEOUT_MS")).unwrap_or(5_000),
            terminator: Terminator::CrLf,
            baudrate: parse_env(option_env!("SARA_BAUDRATE")).unwrap_or(9_600),
            high_baudrate: parse_env(option_env!("SARA_HIGH_BAUDRATE")),
            join_timeout_ms: 60_000,
            pdp_timeout_ms: 180_000,
            dns_timeout_ms: 70_000,
            socket_connect_timeout_ms: 30_000,
            http_timeout_ms: 60_000,
            ftp_timeout_ms: 60_000,
            sms_timeout_ms: 60_000,
            apn: String::from(option_env!("SARA_APN").unwrap_or("")),
        }
    }
}

impl Config {
    pub fn char_timeout(&self) -> Duration {
        Duration::from_millis(self.char_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn pdp_timeout(&self) -> Duration {
        Duration::from_millis(self.pdp_timeout_ms)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn socket_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_connect_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn ftp_timeout(&self) -> Duration {
        Duration::from_millis(self.ftp_timeout_ms)
    }

    pub fn sms_timeout(&self) -> Duration {
        Duration::from_millis(self.sms_timeout_ms)
    }
}

fn parse_env<T: core::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "apn": "internet", "terminator": "Cr" }"#).unwrap();
        assert_eq!(config.apn, "internet");
        assert_eq!(config.terminator, Terminator::Cr);
        assert_eq!(config.read_timeout_ms, Config::default().read_timeout_ms);
        assert_eq!(config.input_buffer_size, Config::default().input_buffer_size);
    }

    #[test]
    fn timeouts_convert_to_durations() {
        let config = Config {
            dns_timeout_ms: 1_500,
            ..Default::default()
        };
        assert_eq!(config.dns_timeout(), Duration::from_millis(1_500));
    }

    #[test]
    fn terminator_bytes() {
        assert_eq!(Terminator::default().as_bytes(), b"\r\n");
        assert_eq!(Terminator::Cr.as_bytes(), b"\r");
    }
}
