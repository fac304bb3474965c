use alloc::string::String;
use atat::atat_derive::AtatResp;

// +CPIN: READY
#[derive(Clone, Debug, AtatResp)]
pub struct PinStatus {
    pub status: String,
}

// +CREG: 0,1
#[derive(Clone, Debug, AtatResp)]
pub struct NetworkRegistration {
    pub n: u8,
    pub stat: u8,
}

// +COPS: 0,0,"vodafone NL",2
#[derive(Clone, Debug, AtatResp)]
pub struct OperatorSelection {
    pub mode: u8,
    pub format: Option<u8>,
    pub oper: Option<String>,
    pub act: Option<u8>,
}

// +CSQ: 17,99
#[derive(Clone, Debug, AtatResp)]
pub struct SignalQuality {
    pub rssi: u8,
    pub ber: u8,
}

// +CNUM: "Line 1","+31612345678",145
#[derive(Clone, Debug, AtatResp)]
pub struct SubscriberNumber {
    pub alpha: String,
    pub number: String,
    pub kind: Option<u8>,
}
