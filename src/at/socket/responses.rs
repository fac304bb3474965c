use atat::atat_derive::AtatResp;

// +USOCR: 0
#[derive(Clone, Debug, AtatResp)]
pub struct CreateSocketResponse {
    pub socket: u8,
}

// +USOWR: 0,12
#[derive(Clone, Debug, AtatResp)]
pub struct WriteSocketDataResponse {
    pub socket: u8,
    pub length: usize,
}
