use thiserror::Error;

use crate::varint::VarIntError;

/// Everything that can go wrong while probing a game server.
///
/// The `Display` text of each variant is what ends up in
/// `ServerStatus::Offline { reason }`, so keep it short and free of
/// internal detail.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Connection timeout")]
    Timeout,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    VarInt(#[from] VarIntError),
    #[error("Parse error: unexpected packet id 0x{0:02x}")]
    UnexpectedPacketId(u32),
    #[error("Parse error: {0}")]
    Malformed(String),
    #[error("Connection closed before the response was complete")]
    Closed,
    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("No response from server endpoints")]
    NoEndpointResponse,
    #[error("Invalid server address")]
    InvalidAddress,
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProbeError::Timeout;
        }
        match err.status() {
            Some(status) => ProbeError::Http(format!("status {status}")),
            None => ProbeError::Http(err.without_url().to_string()),
        }
    }
}
