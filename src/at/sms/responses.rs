use alloc::string::String;
use atat::atat_derive::AtatResp;

// +CMGL: 3,"REC READ","+31612345678",,"16/01/12,13:14:15+04"
#[derive(Clone, Debug, AtatResp)]
pub struct MessageListEntry {
    pub index: u16,
    pub status: String,
    pub from: String,
    pub alpha: Option<String>,
    pub timestamp: Option<String>,
}

// +CMGR: "REC UNREAD","+31612345678",,"16/01/12,13:14:15+04"
#[derive(Clone, Debug, AtatResp)]
pub struct MessageHeader {
    pub status: String,
    pub from: String,
    pub alpha: Option<String>,
    pub timestamp: Option<String>,
}

// +CMGS: 42
#[derive(Clone, Debug, AtatResp)]
pub struct MessageSent {
    pub reference: u8,
}
