//! Modem file system, the staging area for HTTP and FTP transfers.

use super::response::{ParseContext, Parser, Response};
use super::Modem;
use crate::error::{Error, Result};
use crate::power::OnOff;
use crate::transport::Transport;

/// Copies the payload of `+URDFILE: "<name>",<size>,"<data>"` into the output
/// buffer.
///
/// The data is raw and may contain line endings, so whatever the header line
/// did not hold is read unframed. Bytes beyond the output buffer are consumed
/// and dropped.
#[derive(Default)]
struct FileContent {
    size: Option<usize>,
}

/// Splits `"<name>",<size>,"` off the start of `rest`, returning the size and
/// the offset where the data starts.
fn parse_header(rest: &[u8]) -> Option<(usize, usize)> {
    let first = rest.iter().position(|&b| b == b',')?;
    let second = first + 1 + rest[first + 1..].iter().position(|&b| b == b',')?;
    if rest.get(second + 1) != Some(&b'"') {
        return None;
    }
    let size = core::str::from_utf8(&rest[first + 1..second])
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some((size, second + 2))
}

impl Parser for FileContent {
    fn parse(&mut self, line: &[u8], cx: &mut ParseContext<'_>) -> Option<Response> {
        if self.size.is_some() || !line.starts_with(b"+URDFILE:") {
            return None;
        }
        let untrimmed = cx.untrimmed_line();
        let rest = &untrimmed[untrimmed.iter().position(|&b| b == b':')? + 1..];
        let Some((size, offset)) = parse_header(rest) else {
            log::warn!("Malformed +URDFILE header");
            return None;
        };
        self.size = Some(size);

        let data = &rest[offset..];
        let mut consumed = data.len().min(size);
        cx.push(&data[..consumed]);
        // the line reader swallowed a newline that belongs to the data
        if consumed < size && cx.line_terminated() {
            cx.push(b"\n");
            consumed += 1;
        }
        cx.read_raw(size - consumed);
        None
    }
}

impl<T: Transport, P: OnOff> Modem<T, P> {
    /// Store `data` as `name` on the modem, replacing an existing file.
    pub(crate) fn upload_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.delete_file(name).ok();
        let timeout = self.config.read_timeout();
        self.interface
            .send(format_args!("AT+UDWNFILE=\"{}\",{}", name, data.len()));
        let reply = self.interface.read_response(&mut [], None, timeout);
        if reply.response != Response::Prompt {
            return Err(Error::from_response(
                reply.response,
                self.interface.last_error(),
            ));
        }
        self.interface.write_raw(data);
        let reply = self.interface.read_response(&mut [], None, timeout);
        self.check(reply).map(|_| ())
    }

    /// Copy the content of `name` into `out`. Returns the number of bytes
    /// copied, which is less than the file size if `out` is too small.
    pub(crate) fn read_file(&mut self, name: &str, out: &mut [u8]) -> Result<usize> {
        let mut content = FileContent::default();
        let timeout = self.config.read_timeout();
        let len = self.exchange(
            format_args!("AT+URDFILE=\"{}\"", name),
            out,
            Some(&mut content),
            timeout,
        )?;
        match content.size {
            Some(_) => Ok(len),
            None => Err(Error::NotFound),
        }
    }

    pub(crate) fn delete_file(&mut self, name: &str) -> Result<()> {
        self.execute(format_args!("AT+UDELFILE=\"{}\"", name))
    }
}
