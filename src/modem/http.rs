use anyhow::anyhow;

use super::response::Completion;
use super::Modem;
use crate::at::http::responses::HttpCommandResult;
use crate::gsm::{Http, HttpRequestType};
use crate::power::OnOff;
use crate::transport::Transport;

const PROFILE: u8 = 0;
const REQUEST_FILE: &str = "http_req";
const RESPONSE_FILE: &str = "http_resp";

/// `application/octet-stream`
const CONTENT_TYPE_OCTET_STREAM: u8 = 2;

impl HttpRequestType {
    /// `<http_command>` number of `AT+UHTTPC`.
    pub fn command(&self) -> u8 {
        match self {
            HttpRequestType::Head => 0,
            HttpRequestType::Get => 1,
            HttpRequestType::Delete => 2,
            HttpRequestType::Put => 3,
            HttpRequestType::Post => 4,
        }
    }

    fn has_body(&self) -> bool {
        matches!(self, HttpRequestType::Put | HttpRequestType::Post)
    }
}

impl<T: Transport, P: OnOff> Http for Modem<T, P> {
    /// The response is copied as the modem stores it: status line and
    /// headers, followed by the body.
    fn http_request(
        &mut self,
        server: &str,
        port: u16,
        endpoint: &str,
        request_type: HttpRequestType,
        response: &mut [u8],
        body: &[u8],
    ) -> anyhow::Result<usize> {
        log::info!("HTTP {:?} {}:{}{}", request_type, server, port, endpoint);

        self.execute(format_args!("AT+UHTTP={}", PROFILE))
            .map_err(|e| anyhow!("Failed to reset HTTP profile: {e:?}"))?;
        self.execute(format_args!("AT+UHTTP={},1,\"{}\"", PROFILE, server))
            .map_err(|e| anyhow!("Failed to set HTTP server: {e:?}"))?;
        self.execute(format_args!("AT+UHTTP={},5,{}", PROFILE, port))
            .map_err(|e| anyhow!("Failed to set HTTP port: {e:?}"))?;

        let command = request_type.command();
        let started = if request_type.has_body() {
            self.upload_file(REQUEST_FILE, body)
                .map_err(|e| anyhow!("Failed to upload request body: {e:?}"))?;
            self.execute(format_args!(
                "AT+UHTTPC={},{},\"{}\",\"{}\",\"{}\",{}",
                PROFILE,
                command,
                endpoint,
                RESPONSE_FILE,
                REQUEST_FILE,
                CONTENT_TYPE_OCTET_STREAM
            ))
        } else {
            self.execute(format_args!(
                "AT+UHTTPC={},{},\"{}\",\"{}\"",
                PROFILE, command, endpoint, RESPONSE_FILE
            ))
        };
        started.map_err(|e| anyhow!("Failed to start HTTP request: {e:?}"))?;

        let mut done = Completion::new("+UUHTTPCR", |r: &HttpCommandResult| {
            (r.profile_id == PROFILE && r.command == command).then_some(r.result == 1)
        });
        let timeout = self.config.http_timeout();
        let reply = self.interface.read_response(&mut [], Some(&mut done), timeout);
        self.check(reply)
            .map_err(|e| anyhow!("HTTP request failed: {e:?}"))?;

        let len = self
            .read_file(RESPONSE_FILE, response)
            .map_err(|e| anyhow!("Failed to read HTTP response: {e:?}"))?;
        if let Err(e) = self.delete_file(RESPONSE_FILE) {
            log::warn!("Failed to delete HTTP response file: {:?}", e);
        }
        if request_type.has_body() {
            self.delete_file(REQUEST_FILE).ok();
        }
        Ok(len)
    }
}
