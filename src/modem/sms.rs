use super::response::{Capture, ParseContext, Parser, Response};
use super::Modem;
use crate::at::sms::responses::{MessageHeader, MessageListEntry, MessageSent};
use crate::error::{Error, Result};
use crate::gsm::{PhoneNumber, Sms};
use crate::power::OnOff;
use crate::transport::Transport;

/// Ends the text of a message in `AT+CMGS`
const CTRL_Z: u8 = 0x1A;
const ESC: u8 = 0x1B;

/// Collects the indexes of `+CMGL` entries, skipping the text line that
/// follows each one.
struct MessageIndexes<'i> {
    indexes: &'i mut [u16],
    count: usize,
}

impl Parser for MessageIndexes<'_> {
    fn parse(&mut self, line: &[u8], _cx: &mut ParseContext<'_>) -> Option<Response> {
        if !line.starts_with(b"+CMGL:") {
            return None;
        }
        match serde_at::from_slice::<MessageListEntry>(line) {
            Ok(entry) => {
                if let Some(slot) = self.indexes.get_mut(self.count) {
                    *slot = entry.index;
                    self.count += 1;
                } else {
                    log::debug!("No room for message {}", entry.index);
                }
            }
            Err(_) => log::warn!("Unparseable +CMGL entry"),
        }
        None
    }
}

/// `+CMGR` header followed by the message text, possibly over several lines.
#[derive(Default)]
struct MessageText {
    header: Option<MessageHeader>,
    lines: usize,
}

impl Parser for MessageText {
    fn parse(&mut self, line: &[u8], cx: &mut ParseContext<'_>) -> Option<Response> {
        if self.header.is_none() {
            if line.starts_with(b"+CMGR:") {
                match serde_at::from_slice::<MessageHeader>(line) {
                    Ok(header) => self.header = Some(header),
                    Err(_) => log::warn!("Unparseable +CMGR header"),
                }
            }
            return None;
        }
        if self.lines > 0 {
            cx.push(b"\n");
        }
        cx.push(line);
        self.lines += 1;
        None
    }
}

impl<T: Transport, P: OnOff> Sms for Modem<T, P> {
    fn sms_list(&mut self, status_filter: &str, indexes: &mut [u16]) -> Result<usize> {
        let mut list = MessageIndexes { indexes, count: 0 };
        let timeout = self.config.read_timeout();
        self.exchange(
            format_args!("AT+CMGL=\"{}\"", status_filter),
            &mut [],
            Some(&mut list),
            timeout,
        )?;
        Ok(list.count)
    }

    fn read_sms(&mut self, index: u16, buf: &mut [u8]) -> Result<(PhoneNumber, usize)> {
        let mut message = MessageText::default();
        let timeout = self.config.read_timeout();
        let len = self.exchange(
            format_args!("AT+CMGR={}", index),
            buf,
            Some(&mut message),
            timeout,
        )?;
        let header = message.header.ok_or(Error::NotFound)?;
        let sender =
            PhoneNumber::try_from(header.from.as_str()).map_err(|_| Error::BufferTooSmall)?;
        Ok((sender, len))
    }

    fn delete_sms(&mut self, index: u16) -> Result<()> {
        self.execute(format_args!("AT+CMGD={}", index))
    }

    fn send_sms(&mut self, number: &str, text: &str) -> Result<()> {
        if text.bytes().any(|b| b == CTRL_Z || b == ESC) {
            return Err(Error::InvalidArgument);
        }
        let timeout = self.config.read_timeout();
        self.interface.send(format_args!("AT+CMGS=\"{}\"", number));
        let reply = self.interface.read_response(&mut [], None, timeout);
        if reply.response != Response::Prompt {
            return Err(Error::from_response(
                reply.response,
                self.interface.last_error(),
            ));
        }

        self.interface.write_raw(text.as_bytes());
        self.interface.write_raw(&[CTRL_Z]);
        let mut sent = Capture::<MessageSent>::new("+CMGS");
        let timeout = self.config.sms_timeout();
        let reply = self.interface.read_response(&mut [], Some(&mut sent), timeout);
        self.check(reply)?;
        if let Some(sent) = sent.take() {
            log::info!("SMS sent, reference {}", sent.reference);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mock::ScriptedModem;

    fn modem(script: ScriptedModem) -> Modem<ScriptedModem> {
        Modem::new(script, Config::default())
    }

    const LIST: &str = "\r\n+CMGL: 1,\"REC READ\",\"+31612345678\",,\"16/01/12,13:14:15+04\"\r\nfirst\r\n\
                        +CMGL: 4,\"REC READ\",\"+31612345678\",,\"16/01/12,13:15:00+04\"\r\nsecond\r\n\
                        +CMGL: 7,\"REC UNREAD\",\"+31687654321\",,\"16/01/13,08:00:00+04\"\r\nthird\r\n\r\nOK\r\n";

    #[test]
    fn list_collects_indexes() {
        let mut modem = modem(ScriptedModem::new().expect("AT+CMGL=\"ALL\"", LIST));
        let mut indexes = [0u16; 8];
        assert_eq!(modem.sms_list("ALL", &mut indexes), Ok(3));
        assert_eq!(&indexes[..3], &[1, 4, 7]);
    }

    #[test]
    fn list_stops_at_capacity() {
        let mut modem = modem(ScriptedModem::new().expect("AT+CMGL=\"ALL\"", LIST));
        let mut indexes = [0u16; 2];
        assert_eq!(modem.sms_list("ALL", &mut indexes), Ok(2));
        assert_eq!(indexes, [1, 4]);
    }

    #[test]
    fn read_message() {
        let mut modem = modem(ScriptedModem::new().expect(
            "AT+CMGR=4",
            "\r\n+CMGR: \"REC READ\",\"+31612345678\",,\"16/01/12,13:15:00+04\"\r\nhello\r\nworld\r\n\r\nOK\r\n",
        ));
        let mut buf = [0u8; 32];
        let (sender, len) = modem.read_sms(4, &mut buf).unwrap();
        assert_eq!(sender.as_str(), "+31612345678");
        assert_eq!(&buf[..len], b"hello\nworld");
    }

    #[test]
    fn read_quoted_message() {
        let mut modem = modem(
            ScriptedModem::new()
                .expect(
                    "AT+CMGR=4",
                    "\r\n+CMGR: \"REC READ\",\"+31612345678\",,\"16/01/12,13:15:00+04\"\r\n> quoted reply\r\nok\r\n\r\nOK\r\n",
                )
                .expect("AT+CMGD=4", "OK\r\n"),
        );
        let mut buf = [0u8; 32];
        let (_, len) = modem.read_sms(4, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"> quoted reply\nok");
        assert_eq!(modem.delete_sms(4), Ok(()));
    }

    #[test]
    fn read_empty_slot() {
        let mut modem = modem(ScriptedModem::new().expect("AT+CMGR=9", "\r\nOK\r\n"));
        assert_eq!(modem.read_sms(9, &mut [0u8; 8]), Err(Error::NotFound));
    }

    #[test]
    fn delete_message() {
        let mut modem = modem(ScriptedModem::new().expect("AT+CMGD=4", "OK\r\n"));
        assert_eq!(modem.delete_sms(4), Ok(()));
    }

    #[test]
    fn send_message() {
        let mut modem = modem(
            ScriptedModem::new()
                .expect("AT+CMGS=\"+31612345678\"", "\r\n> ")
                .expect_raw(b"hi there\x1a", "\r\n+CMGS: 42\r\n\r\nOK\r\n"),
        );
        modem.send_sms("+31612345678", "hi there").unwrap();
        assert!(modem.transport().is_done());
    }

    #[test]
    fn send_rejects_control_characters() {
        let mut modem = modem(ScriptedModem::new());
        assert_eq!(modem.send_sms("123", "a\x1ab"), Err(Error::InvalidArgument));
    }

    #[test]
    fn send_without_prompt() {
        let mut modem = modem(ScriptedModem::new().expect("AT+CMGS=\"123\"", "+CMS ERROR: 304\r\n"));
        assert_eq!(
            modem.send_sms("123", "x"),
            Err(Error::Modem(Some(crate::modem::response::ErrorCode::Cms(304))))
        );
    }
}
