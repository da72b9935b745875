use thiserror::Error;

use crate::BgpType;

/// Wire-level decode failures. Header failures are fatal to the TCP
/// connection and are never signalled back to the sender.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("marker is not all ones")]
    BadMarker,
    #[error("message length {0} out of range")]
    BadLength(u16),
    #[error("unknown message type {0}")]
    BadType(u8),
    #[error("malformed {0} message body")]
    BadBody(BgpType),
}
