//! Code-directed record codec
//!
//! Maps a command code to its fixed record layout so a message can be turned
//! into `(code, action, record)` and back.

use super::codes::{cmd, Action};
use super::conntrack::ConntrackRecord;
use super::health::HealthEvent;
use super::interface::PhyIfRecord;
use super::message::Message;
use super::route::RouteRecord;
use super::timeout::TimeoutRecord;
use super::types::{read_u16, IpFamily};
use crate::{Error, Result};

/// Payload record of a command or event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Route(RouteRecord),
    Conntrack(ConntrackRecord),
    PhyIf(PhyIfRecord),
    Timeout(TimeoutRecord),
    Health(HealthEvent),
    /// Commands without a payload (session lock, reset)
    Empty,
}

/// Fixed payload size for `code`, or `None` for an unknown code
pub fn record_len(code: u16) -> Option<usize> {
    let len = match code {
        cmd::IP_ROUTE => super::route::ROUTE_RECORD_LEN,
        cmd::IPV4_CONNTRACK | cmd::IPV4_CONNTRACK_CHANGE => {
            super::conntrack::record_len(IpFamily::V4)
        }
        cmd::IPV6_CONNTRACK | cmd::IPV6_CONNTRACK_CHANGE => {
            super::conntrack::record_len(IpFamily::V6)
        }
        cmd::PHY_IF => super::interface::PHY_IF_RECORD_LEN,
        cmd::IPV4_SET_TIMEOUT => super::timeout::TIMEOUT_RECORD_LEN,
        cmd::HEALTH_MONITOR_EVENT => super::health::HEALTH_EVENT_LEN,
        cmd::IF_LOCK_SESSION | cmd::IF_UNLOCK_SESSION | cmd::IPV4_RESET | cmd::IPV6_RESET => 0,
        _ => return None,
    };
    Some(len)
}

/// True when the record layout for `code` begins with an action field
pub fn has_action(code: u16) -> bool {
    matches!(
        code,
        cmd::IP_ROUTE
            | cmd::IPV4_CONNTRACK
            | cmd::IPV4_CONNTRACK_CHANGE
            | cmd::IPV6_CONNTRACK
            | cmd::IPV6_CONNTRACK_CHANGE
            | cmd::PHY_IF
    )
}

/// Build a command message. `action` is ignored for records without one.
pub fn encode(code: u16, action: Action, record: &Record) -> Result<Message> {
    let payload = match record {
        Record::Route(r) => r.encode(action),
        Record::Conntrack(r) => r.encode(action),
        Record::PhyIf(r) => r.encode(action),
        Record::Timeout(r) => r.encode(),
        Record::Health(r) => r.encode(),
        Record::Empty => Vec::new(),
    };
    Message::command(code, payload)
}

/// Split a command message into `(code, raw action, record)`.
///
/// Fails with `MalformedRecord` when the payload length is not the fixed size
/// for the code, and with `Parse` for unknown codes or invalid field values.
pub fn decode(msg: &Message) -> Result<(u16, Option<u16>, Record)> {
    let code = msg.code();
    let expected = record_len(code)
        .ok_or_else(|| Error::Parse(format!("unknown command {:#06x}", code)))?;
    let payload = msg.payload();
    if payload.len() != expected {
        return Err(Error::MalformedRecord {
            code,
            expected,
            actual: payload.len(),
        });
    }

    let action = if has_action(code) {
        Some(read_u16(payload, 0))
    } else {
        None
    };

    let record = match code {
        cmd::IP_ROUTE => Record::Route(RouteRecord::decode(payload)?),
        cmd::IPV4_CONNTRACK | cmd::IPV4_CONNTRACK_CHANGE => {
            Record::Conntrack(ConntrackRecord::decode(IpFamily::V4, payload)?)
        }
        cmd::IPV6_CONNTRACK | cmd::IPV6_CONNTRACK_CHANGE => {
            Record::Conntrack(ConntrackRecord::decode(IpFamily::V6, payload)?)
        }
        cmd::PHY_IF => Record::PhyIf(PhyIfRecord::decode(payload)?),
        cmd::IPV4_SET_TIMEOUT => Record::Timeout(TimeoutRecord::decode(payload)?),
        cmd::HEALTH_MONITOR_EVENT => Record::Health(HealthEvent::decode(payload)?),
        _ => Record::Empty,
    };

    Ok((code, action, record))
}
