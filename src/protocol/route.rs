//! Route record
//!
//! ```text
//!  0 action:u16        2 mtu:u16
//!  4 src_mac[6]       10 dst_mac[6]
//! 16 output_device[16]
//! 32 id:u32           36 flags:u32 (bit0 IPv4, bit1 IPv6)
//! 40 dst_addr[16]     56 hits:u32
//! ```

use super::codes::{cmd, Action};
use super::types::{
    read_addr, read_name, read_u16, read_u32, write_addr, write_name, IpFamily, MacAddr,
};
use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};

/// Encoded size of a route record
pub const ROUTE_RECORD_LEN: usize = 60;

/// Wire form of a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    /// Reserved, carried through unchanged
    pub mtu: u16,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    /// Egress interface name
    pub output_device: String,
    pub id: u32,
    /// `None` when the flags carry neither or both family bits
    pub family: Option<IpFamily>,
    pub dst_addr: IpAddr,
    /// Read-only statistics
    pub hits: u32,
}

impl RouteRecord {
    /// Record that only identifies a route, as used by DEREGISTER
    pub fn with_id(id: u32) -> Self {
        Self {
            mtu: 0,
            src_mac: MacAddr::ZERO,
            dst_mac: MacAddr::ZERO,
            output_device: String::new(),
            id,
            family: None,
            dst_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            hits: 0,
        }
    }

    pub fn encode(&self, action: Action) -> Vec<u8> {
        let mut buf = vec![0u8; ROUTE_RECORD_LEN];
        buf[0..2].copy_from_slice(&action.as_u16().to_be_bytes());
        buf[2..4].copy_from_slice(&self.mtu.to_be_bytes());
        buf[4..10].copy_from_slice(&self.src_mac.0);
        buf[10..16].copy_from_slice(&self.dst_mac.0);
        write_name(&mut buf[16..32], &self.output_device);
        buf[32..36].copy_from_slice(&self.id.to_be_bytes());
        let flags = self.family.map(IpFamily::to_flags).unwrap_or(0);
        buf[36..40].copy_from_slice(&flags.to_be_bytes());
        let family = self.family.unwrap_or_else(|| IpFamily::of(&self.dst_addr));
        write_addr(&mut buf[40..56], family, &self.dst_addr);
        buf[56..60].copy_from_slice(&self.hits.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != ROUTE_RECORD_LEN {
            return Err(Error::MalformedRecord {
                code: cmd::IP_ROUTE,
                expected: ROUTE_RECORD_LEN,
                actual: buf.len(),
            });
        }

        let family = IpFamily::from_flags(read_u32(buf, 36));
        let dst_addr = read_addr(&buf[40..56], family.unwrap_or(IpFamily::V4));

        Ok(Self {
            mtu: read_u16(buf, 2),
            src_mac: MacAddr::from_slice(&buf[4..10]),
            dst_mac: MacAddr::from_slice(&buf[10..16]),
            output_device: read_name(&buf[16..32]),
            id: read_u32(buf, 32),
            family,
            dst_addr,
            hits: read_u32(buf, 56),
        })
    }
}
