//! Health monitor event record
//!
//! ```text
//! 0 id:u16   2 severity:u8   3 text_len:u8   4 text[64]
//! ```

use super::codes::cmd;
use super::types::read_u16;
use crate::{Error, Result};

/// Encoded size of a health event
pub const HEALTH_EVENT_LEN: usize = 68;

const TEXT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Info = 0,
    Warning = 1,
    Error = 2,
}

impl Severity {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Severity::Info),
            1 => Some(Severity::Warning),
            2 => Some(Severity::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvent {
    pub id: u16,
    pub severity: Severity,
    /// Truncated to 64 bytes on the wire
    pub text: String,
}

impl HealthEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEALTH_EVENT_LEN];
        let mut len = self.text.len().min(TEXT_CAPACITY);
        while !self.text.is_char_boundary(len) {
            len -= 1;
        }
        buf[0..2].copy_from_slice(&self.id.to_be_bytes());
        buf[2] = self.severity as u8;
        buf[3] = len as u8;
        buf[4..4 + len].copy_from_slice(&self.text.as_bytes()[..len]);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEALTH_EVENT_LEN {
            return Err(Error::MalformedRecord {
                code: cmd::HEALTH_MONITOR_EVENT,
                expected: HEALTH_EVENT_LEN,
                actual: buf.len(),
            });
        }
        let severity = Severity::from_u8(buf[2])
            .ok_or_else(|| Error::Parse(format!("unknown severity {}", buf[2])))?;
        let len = (buf[3] as usize).min(TEXT_CAPACITY);
        Ok(Self {
            id: read_u16(buf, 0),
            severity,
            text: String::from_utf8_lossy(&buf[4..4 + len]).into_owned(),
        })
    }
}
