//! Command identifiers, action codes and reply status codes

use std::fmt;

/// Command codes carried in the envelope `code` field
pub mod cmd {
    /// Lock the interface database for the calling client
    pub const IF_LOCK_SESSION: u16 = 0x0015;
    /// Release the interface database lock
    pub const IF_UNLOCK_SESSION: u16 = 0x0016;
    /// Physical interface management
    pub const PHY_IF: u16 = 0x0100;
    /// Route management
    pub const IP_ROUTE: u16 = 0x0313;
    /// IPv4 connection tracking
    pub const IPV4_CONNTRACK: u16 = 0x0314;
    /// IPv4 conntrack change notification (event only)
    pub const IPV4_CONNTRACK_CHANGE: u16 = 0x0315;
    /// Remove all IPv4 routes and conntracks
    pub const IPV4_RESET: u16 = 0x0316;
    /// Set a per-protocol conntrack timeout
    pub const IPV4_SET_TIMEOUT: u16 = 0x0319;
    /// IPv6 connection tracking
    pub const IPV6_CONNTRACK: u16 = 0x0414;
    /// IPv6 conntrack change notification (event only)
    pub const IPV6_CONNTRACK_CHANGE: u16 = 0x0415;
    /// Remove all IPv6 routes and conntracks
    pub const IPV6_RESET: u16 = 0x0416;
    /// Health monitor item (event only)
    pub const HEALTH_MONITOR_EVENT: u16 = 0x0f01;
}

/// Action field leading most command records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Action {
    Register = 0,
    Deregister = 1,
    KeepAlive = 2,
    Removed = 3,
    Update = 4,
    Query = 6,
    QueryCont = 7,
}

impl Action {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Action::Register),
            1 => Some(Action::Deregister),
            2 => Some(Action::KeepAlive),
            3 => Some(Action::Removed),
            4 => Some(Action::Update),
            6 => Some(Action::Query),
            7 => Some(Action::QueryCont),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Reply status shared by every command handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Ok = 0,
    UnknownCommand = 1,
    WrongSize = 2,
    WrongParam = 3,
    UnknownAction = 4,
    AlreadyRegistered = 0x0100,
    EntryNotFound = 0x0101,
    InternalFailure = 0x0102,
    AlreadyLocked = 0x0200,
    NotLocked = 0x0201,
    WrongSession = 0x0202,
}

impl Status {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Status::Ok),
            1 => Some(Status::UnknownCommand),
            2 => Some(Status::WrongSize),
            3 => Some(Status::WrongParam),
            4 => Some(Status::UnknownAction),
            0x0100 => Some(Status::AlreadyRegistered),
            0x0101 => Some(Status::EntryNotFound),
            0x0102 => Some(Status::InternalFailure),
            0x0200 => Some(Status::AlreadyLocked),
            0x0201 => Some(Status::NotLocked),
            0x0202 => Some(Status::WrongSession),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Ok => "ok",
            Status::UnknownCommand => "unknown command",
            Status::WrongSize => "wrong command size",
            Status::WrongParam => "wrong command parameter",
            Status::UnknownAction => "unknown action",
            Status::AlreadyRegistered => "entry already registered",
            Status::EntryNotFound => "entry not found",
            Status::InternalFailure => "internal failure",
            Status::AlreadyLocked => "session already locked",
            Status::NotLocked => "session not locked",
            Status::WrongSession => "session locked by another client",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_u16() {
        assert_eq!(Action::from_u16(0), Some(Action::Register));
        assert_eq!(Action::from_u16(7), Some(Action::QueryCont));
        assert_eq!(Action::from_u16(5), None);
        assert_eq!(Action::from_u16(0xffff), None);
    }

    #[test]
    fn test_status_values() {
        assert_eq!(Status::Ok.as_u16(), 0);
        assert_eq!(Status::UnknownCommand.as_u16(), 1);
        assert_eq!(Status::WrongSize.as_u16(), 2);
        assert_eq!(Status::WrongParam.as_u16(), 3);
        assert_eq!(Status::UnknownAction.as_u16(), 4);
        assert_eq!(Status::from_u16(0x0101), Some(Status::EntryNotFound));
        assert_eq!(Status::from_u16(0x9999), None);
    }
}
