//! Common protocol types

use crate::{Error, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Size of a fixed interface name field, including the terminating NUL
pub const IFNAMSIZ: usize = 16;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    pub const ZERO: MacAddr = MacAddr([0, 0, 0, 0, 0, 0]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[..6]);
        MacAddr(mac)
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    /// Parse a MAC address from colon- or hyphen-separated hex
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else {
            s.split('-').collect()
        };

        if parts.len() != 6 {
            return Err(Error::Parse(format!("invalid MAC address: {}", s)));
        }

        let mut mac = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(Error::Parse(format!("invalid MAC address: {}", s)));
            }
            mac[i] = u8::from_str_radix(part, 16)
                .map_err(|_| Error::Parse(format!("invalid hex digit in MAC address: {}", s)))?;
        }

        Ok(MacAddr(mac))
    }
}

/// Address family selector.
///
/// On the wire this is a pair of mutually exclusive flag bits; the API only
/// ever carries one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Route flag bit for IPv4
    pub const FLAG_IPV4: u32 = 1 << 0;
    /// Route flag bit for IPv6
    pub const FLAG_IPV6: u32 = 1 << 1;

    /// Number of address bytes used on the wire
    pub fn addr_len(&self) -> usize {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 16,
        }
    }

    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    pub fn unspecified(&self) -> IpAddr {
        match self {
            IpFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    pub(crate) fn to_flags(self) -> u32 {
        match self {
            IpFamily::V4 => Self::FLAG_IPV4,
            IpFamily::V6 => Self::FLAG_IPV6,
        }
    }

    /// Decode the legacy flag bits. Both or neither set yields `None`.
    pub(crate) fn from_flags(flags: u32) -> Option<Self> {
        match (flags & Self::FLAG_IPV4 != 0, flags & Self::FLAG_IPV6 != 0) {
            (true, false) => Some(IpFamily::V4),
            (false, true) => Some(IpFamily::V6),
            _ => None,
        }
    }
}

/// Write `addr` into a fixed slot sized for `family`.
///
/// The slot is zero-filled first; an address of the other family is stored
/// as the unspecified address.
pub(crate) fn write_addr(buf: &mut [u8], family: IpFamily, addr: &IpAddr) {
    let slot = &mut buf[..family.addr_len()];
    slot.fill(0);
    match (family, addr) {
        (IpFamily::V4, IpAddr::V4(a)) => slot.copy_from_slice(&a.octets()),
        (IpFamily::V6, IpAddr::V6(a)) => slot.copy_from_slice(&a.octets()),
        (IpFamily::V6, IpAddr::V4(a)) => slot.copy_from_slice(&a.to_ipv6_mapped().octets()),
        (IpFamily::V4, IpAddr::V6(a)) => {
            if let Some(v4) = a.to_ipv4_mapped() {
                slot.copy_from_slice(&v4.octets());
            }
        }
    }
}

pub(crate) fn read_addr(buf: &[u8], family: IpFamily) -> IpAddr {
    match family {
        IpFamily::V4 => IpAddr::V4(Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3])),
        IpFamily::V6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

/// Write a NUL-padded interface name. Names are truncated to `IFNAMSIZ - 1`.
pub(crate) fn write_name(buf: &mut [u8], name: &str) {
    let slot = &mut buf[..IFNAMSIZ];
    slot.fill(0);
    let bytes = name.as_bytes();
    let len = bytes.len().min(IFNAMSIZ - 1);
    slot[..len].copy_from_slice(&bytes[..len]);
}

pub(crate) fn read_name(buf: &[u8]) -> String {
    let slot = &buf[..IFNAMSIZ];
    let end = slot.iter().position(|&b| b == 0).unwrap_or(IFNAMSIZ);
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

pub(crate) fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}
