use alloc::string::String;
use atat::atat_derive::AtatResp;

/// +UPSND: <profile_id>,0,"<ip address>"
#[derive(Clone, Debug, AtatResp)]
pub struct PacketSwitchedNetworkData {
    pub profile_id: u8,
    pub param_tag: u8,
    pub param_val: String,
}

/// +UPSND: <profile_id>,8,<0|1>
///
/// Activation state of the profile, sent as a bare number.
#[derive(Clone, Debug, AtatResp)]
pub struct PacketSwitchedNetworkState {
    pub profile_id: u8,
    pub param_tag: u8,
    pub param_val: u8,
}

// +UDNSRN: "93.184.216.34"
#[derive(Clone, Debug, AtatResp)]
pub struct ResolvedName {
    pub ip: String,
}
