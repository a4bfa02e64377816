//! Message envelope
//!
//! A datagram carries exactly one message:
//!
//! ```text
//! 0      1          2        4          6
//! +------+----------+--------+----------+-----------------+
//! | kind | reserved | code   | length   | payload[length] |
//! +------+----------+--------+----------+-----------------+
//! ```
//!
//! Envelope integers are little-endian. Payload records carry their own
//! big-endian fields and are never swapped by the envelope codec.

use super::codes::Status;
use super::types::{read_addr, read_u16, write_addr, IpFamily};
use crate::{Error, Result};
use std::net::SocketAddr;

/// Envelope header size
pub const HEADER_LEN: usize = 6;

/// Payload capacity of a single message
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Largest datagram a peer ever needs to receive
pub const MAX_DATAGRAM_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

/// Size of the status prefix in every reply payload
pub const STATUS_LEN: usize = 2;

/// Message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Command request, command reply or event
    Cmd = 0,
    /// Back-channel registration
    ClientRegister = 1,
    /// Back-channel deregistration
    ClientUnregister = 2,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageKind::Cmd),
            1 => Some(MessageKind::ClientRegister),
            2 => Some(MessageKind::ClientUnregister),
            _ => None,
        }
    }
}

/// A single request, reply or event unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    code: u16,
    payload: Vec<u8>,
}

impl Message {
    /// Build a message, rejecting payloads above `MAX_PAYLOAD_LEN`
    pub fn new(kind: MessageKind, code: u16, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::Parse(format!(
                "payload of {} bytes exceeds capacity {}",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        Ok(Self {
            kind,
            code,
            payload,
        })
    }

    /// Build a command message
    pub fn command(code: u16, payload: Vec<u8>) -> Result<Self> {
        Self::new(MessageKind::Cmd, code, payload)
    }

    /// Build a command message whose payload size is known to fit
    pub(crate) fn command_fixed(code: u16, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
        Self {
            kind: MessageKind::Cmd,
            code,
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Raw action field at the start of the payload, if present
    pub fn action(&self) -> Option<u16> {
        if self.payload.len() < 2 {
            return None;
        }
        Some(read_u16(&self.payload, 0))
    }

    /// Serialize into a datagram
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.kind as u8);
        buf.push(0);
        buf.extend_from_slice(&self.code.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a datagram
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Parse("message shorter than envelope header".into()));
        }

        let kind = MessageKind::from_u8(buf[0])
            .ok_or_else(|| Error::Parse(format!("unknown message kind {}", buf[0])))?;
        let code = u16::from_le_bytes([buf[2], buf[3]]);
        let length = u16::from_le_bytes([buf[4], buf[5]]) as usize;

        if length > MAX_PAYLOAD_LEN {
            return Err(Error::Parse(format!(
                "declared length {} exceeds capacity {}",
                length, MAX_PAYLOAD_LEN
            )));
        }
        if buf.len() < HEADER_LEN + length {
            return Err(Error::Parse(format!(
                "truncated message: declared {} payload bytes, got {}",
                length,
                buf.len() - HEADER_LEN
            )));
        }

        Ok(Self {
            kind,
            code,
            payload: buf[HEADER_LEN..HEADER_LEN + length].to_vec(),
        })
    }
}

/// Decoded reply: status plus an optional record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub record: Vec<u8>,
}

impl Reply {
    pub fn ok() -> Self {
        Self::status(Status::Ok)
    }

    pub fn status(status: Status) -> Self {
        Self {
            status,
            record: Vec::new(),
        }
    }

    pub fn with_record(record: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            record,
        }
    }

    /// Wrap into a command message for `code`
    pub fn into_message(self, code: u16) -> Message {
        let mut payload = Vec::with_capacity(STATUS_LEN + self.record.len());
        payload.extend_from_slice(&self.status.as_u16().to_be_bytes());
        payload.extend_from_slice(&self.record);
        Message::command_fixed(code, payload)
    }

    pub fn from_message(msg: &Message) -> Result<Self> {
        if msg.len() < STATUS_LEN {
            return Err(Error::Parse("reply without status".into()));
        }
        let raw = read_u16(msg.payload(), 0);
        let status =
            Status::from_u16(raw).ok_or_else(|| Error::Parse(format!("unknown status {:#06x}", raw)))?;
        Ok(Self {
            status,
            record: msg.payload()[STATUS_LEN..].to_vec(),
        })
    }
}

/// Back-channel address announced with `ClientRegister`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRegistration {
    pub addr: SocketAddr,
}

impl ClientRegistration {
    /// family:u8, reserved:u8, port:u16, addr:16
    pub const LEN: usize = 20;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        let family = IpFamily::of(&self.addr.ip());
        buf[0] = match family {
            IpFamily::V4 => 4,
            IpFamily::V6 => 6,
        };
        buf[2..4].copy_from_slice(&self.addr.port().to_be_bytes());
        write_addr(&mut buf[4..], family, &self.addr.ip());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::LEN {
            return Err(Error::Parse(format!(
                "client registration must be {} bytes, got {}",
                Self::LEN,
                buf.len()
            )));
        }
        let family = match buf[0] {
            4 => IpFamily::V4,
            6 => IpFamily::V6,
            other => return Err(Error::Parse(format!("unknown address family {}", other))),
        };
        let port = read_u16(buf, 2);
        let ip = read_addr(&buf[4..], family);
        Ok(Self {
            addr: SocketAddr::new(ip, port),
        })
    }
}
