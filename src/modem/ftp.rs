use core::fmt;

use anyhow::anyhow;

use super::response::Completion;
use super::Modem;
use crate::at::ftp::responses::FtpCommandResult;
use crate::error::{Error, Result};
use crate::gsm::{Ftp, FtpMode};
use crate::power::OnOff;
use crate::transport::Transport;

pub const MAX_FILENAME_LEN: usize = 256;
pub const MAX_PATH_LEN: usize = 512;

/// Staging file on the modem for transfers
const LOCAL_FILE: &str = "ftp_data";

// AT+UFTPC operations
const LOGOUT: u8 = 0;
const LOGIN: u8 = 1;
const GET_FILE: u8 = 4;
const PUT_FILE: u8 = 5;
const CHANGE_DIRECTORY: u8 = 8;

#[derive(Debug, Default)]
pub(crate) struct FtpState {
    connected: bool,
    file: Option<heapless::String<MAX_FILENAME_LEN>>,
}

impl FtpMode {
    fn parameter(&self) -> u8 {
        match self {
            FtpMode::Active => 0,
            FtpMode::Passive => 1,
        }
    }
}

impl<T: Transport, P: OnOff> Modem<T, P> {
    /// Run `AT+UFTPC=<op><args>` and wait for its `+UUFTPCR` completion.
    fn ftp_command(&mut self, op: u8, args: fmt::Arguments<'_>) -> Result<()> {
        self.execute(format_args!("AT+UFTPC={}{}", op, args))?;
        let mut done = Completion::new("+UUFTPCR", |r: &FtpCommandResult| {
            (r.command == op).then_some(r.result == 1)
        });
        let timeout = self.config.ftp_timeout();
        let reply = self.interface.read_response(&mut [], Some(&mut done), timeout);
        self.check(reply).map(|_| ())
    }

    fn open_file_name(&self) -> Result<heapless::String<MAX_FILENAME_LEN>> {
        self.ftp.file.clone().ok_or(Error::NoOpenFile)
    }

    pub fn is_ftp_connected(&self) -> bool {
        self.ftp.connected
    }
}

impl<T: Transport, P: OnOff> Ftp for Modem<T, P> {
    fn open_ftp_connection(
        &mut self,
        server: &str,
        username: &str,
        password: &str,
        mode: FtpMode,
    ) -> anyhow::Result<()> {
        log::info!("Opening FTP connection to {}", server);
        self.execute(format_args!("AT+UFTP=1,\"{}\"", server))
            .map_err(|e| anyhow!("Failed to set FTP server: {e:?}"))?;
        self.execute(format_args!("AT+UFTP=2,\"{}\"", username))
            .map_err(|e| anyhow!("Failed to set FTP username: {e:?}"))?;
        self.execute(format_args!("AT+UFTP=3,\"{}\"", password))
            .map_err(|e| anyhow!("Failed to set FTP password: {e:?}"))?;
        self.execute(format_args!("AT+UFTP=6,{}", mode.parameter()))
            .map_err(|e| anyhow!("Failed to set FTP mode: {e:?}"))?;
        self.ftp_command(LOGIN, format_args!(""))
            .map_err(|e| anyhow!("FTP login failed: {e:?}"))?;
        self.ftp.connected = true;
        Ok(())
    }

    fn close_ftp_connection(&mut self) -> Result<()> {
        self.ftp.file = None;
        self.ftp_command(LOGOUT, format_args!(""))?;
        self.ftp.connected = false;
        Ok(())
    }

    fn open_ftp_file(&mut self, filename: &str, path: Option<&str>) -> Result<()> {
        if path.is_some_and(|p| p.len() > MAX_PATH_LEN) {
            return Err(Error::InvalidArgument);
        }
        let name = heapless::String::try_from(filename).map_err(|_| Error::InvalidArgument)?;
        if let Some(path) = path {
            self.ftp_command(CHANGE_DIRECTORY, format_args!(",\"{}\"", path))?;
        }
        self.ftp.file = Some(name);
        Ok(())
    }

    fn ftp_send(&mut self, data: &[u8]) -> Result<()> {
        let name = self.open_file_name()?;
        self.upload_file(LOCAL_FILE, data)?;
        let result = self.ftp_command(PUT_FILE, format_args!(",\"{}\",\"{}\"", LOCAL_FILE, name));
        self.delete_file(LOCAL_FILE).ok();
        result
    }

    fn ftp_receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let name = self.open_file_name()?;
        self.ftp_command(GET_FILE, format_args!(",\"{}\",\"{}\"", name, LOCAL_FILE))?;
        let result = self.read_file(LOCAL_FILE, buf);
        self.delete_file(LOCAL_FILE).ok();
        result
    }

    fn close_ftp_file(&mut self) -> Result<()> {
        self.ftp.file.take().map(|_| ()).ok_or(Error::NoOpenFile)
    }
}
