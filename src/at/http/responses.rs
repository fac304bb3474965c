use atat::atat_derive::AtatResp;

/// +UUHTTPCR: <profile_id>,<http_command>,<http_result>
///
/// Result 1 means the server response was stored in the requested file.
#[derive(Clone, Debug, AtatResp)]
pub struct HttpCommandResult {
    pub profile_id: u8,
    pub command: u8,
    pub result: u8,
}
