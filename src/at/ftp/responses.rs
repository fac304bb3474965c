use atat::atat_derive::AtatResp;

// +UUFTPCR: 1,1
#[derive(Clone, Debug, AtatResp)]
pub struct FtpCommandResult {
    pub command: u8,
    pub result: u8,
}
