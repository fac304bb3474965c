#![cfg_attr(not(test), no_std)]

//! Blocking AT-command driver for u-blox SARA-U2 cellular modems, as found on
//! the SODAQ 3Gbee.
//!
//! [`Modem`] owns the byte transport and a power controller and exposes the
//! modem's capabilities through the traits in [`gsm`].

extern crate alloc;

pub mod at;
pub mod config;
pub mod error;
pub mod gsm;
pub mod modem;
pub mod power;
pub mod transport;

#[cfg(test)]
mod mock;

pub use atat;
pub use config::{Config, Terminator};
pub use error::{Error, Result};
pub use modem::response::{ErrorCode, Reply, Response};
pub use modem::Modem;
pub use transport::{Serial, Transport};

pub mod prelude {
    pub use crate::gsm::{Ftp, Http, Network, Sms, Sockets, Tcp};
    pub use crate::power::OnOff;
    pub use crate::transport::Transport;
}
