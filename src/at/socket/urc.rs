use atat::atat_derive::AtatResp;

/// +UUSORD/+UUSORF: <socket>,<length>
#[derive(Clone, Debug, AtatResp)]
pub struct SocketDataAvailable {
    pub socket: u8,
    pub length: usize,
}

// +UUSOCL: 2
#[derive(Clone, Debug, AtatResp)]
pub struct SocketClosed {
    pub socket: u8,
}
