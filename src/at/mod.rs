pub mod ftp;
pub mod general;
pub mod http;
pub mod psd;
pub mod sms;
pub mod socket;

use atat::atat_derive::AtatUrc;

/// Unsolicited result codes the protocol engine consumes on its own, whatever
/// command is in flight.
#[derive(Clone, Debug, AtatUrc)]
pub enum Urc {
    #[at_urc("+UUSORD")]
    SocketDataAvailable(socket::urc::SocketDataAvailable),
    #[at_urc("+UUSORF")]
    DatagramAvailable(socket::urc::SocketDataAvailable),
    #[at_urc("+UUSOCL")]
    SocketClosed(socket::urc::SocketClosed),
}
