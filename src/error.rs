use core::fmt;

use crate::modem::response::{ErrorCode, Response};

/// Everything a driver operation can fail with.
///
/// Failures detected before any exchange with the modem (no free socket, a
/// buffer that cannot hold the reply, ...) get their own variants so callers
/// can tell them apart from protocol failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // Exchange outcomes
    Timeout,
    Modem(Option<ErrorCode>),
    Unexpected(Response),

    // Local resource errors
    NoFreeSocket,
    InvalidSocket,
    BufferTooSmall,
    NotFound,
    InvalidArgument,
    NoOpenFile,
}

impl Error {
    /// Map a non-OK classification to the matching error.
    pub(crate) fn from_response(response: Response, code: Option<ErrorCode>) -> Self {
        match response {
            Response::Timeout => Self::Timeout,
            Response::Error => Self::Modem(code),
            other => Self::Unexpected(other),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("no response from modem before the deadline"),
            Self::Modem(Some(code)) => write!(f, "modem reported {}", code),
            Self::Modem(None) => f.write_str("modem reported ERROR"),
            Self::Unexpected(r) => write!(f, "unexpected response: {:?}", r),
            Self::NoFreeSocket => f.write_str("no free socket slot"),
            Self::InvalidSocket => f.write_str("socket is not open"),
            Self::BufferTooSmall => f.write_str("buffer too small"),
            Self::NotFound => f.write_str("expected value missing from reply"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::NoOpenFile => f.write_str("no FTP file is open"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
