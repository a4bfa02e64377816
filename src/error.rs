use std::io;

use crate::protocol::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("malformed record for command {code:#06x}: expected {expected} bytes, got {actual}")]
    MalformedRecord {
        code: u16,
        expected: usize,
        actual: usize,
    },

    #[error("command {code:#06x} failed: {status}")]
    Status { code: u16, status: Status },

    #[error("no event callback registered")]
    NotRegistered,
}

impl Error {
    /// True for failures of the socket layer rather than of the protocol
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
