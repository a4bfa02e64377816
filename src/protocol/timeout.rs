//! Conntrack timeout record
//!
//! ```text
//! 0 protocol:u16 (6 TCP, 17 UDP, 0 all others)   2 reserved:u16   4 timeout:u32 seconds
//! ```

use super::codes::cmd;
use super::types::{read_u16, read_u32};
use crate::{Error, Result};

/// Encoded size of a timeout record
pub const TIMEOUT_RECORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutRecord {
    pub protocol: u16,
    pub timeout_secs: u32,
}

impl TimeoutRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; TIMEOUT_RECORD_LEN];
        buf[0..2].copy_from_slice(&self.protocol.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timeout_secs.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != TIMEOUT_RECORD_LEN {
            return Err(Error::MalformedRecord {
                code: cmd::IPV4_SET_TIMEOUT,
                expected: TIMEOUT_RECORD_LEN,
                actual: buf.len(),
            });
        }
        Ok(Self {
            protocol: read_u16(buf, 0),
            timeout_secs: read_u32(buf, 4),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_record() {
        let record = TimeoutRecord {
            protocol: 17,
            timeout_secs: 300,
        };
        let buf = record.encode();
        assert_eq!(buf, vec![0, 17, 0, 0, 0, 0, 0x01, 0x2c]);
        assert_eq!(TimeoutRecord::decode(&buf).unwrap(), record);
        assert!(TimeoutRecord::decode(&buf[..6]).is_err());
    }
}
