//! Connection-track record
//!
//! The same layout serves IPv4 and IPv6; only the address width differs.
//!
//! ```text
//!  0 action:u16   2 protocol:u16   4 flags:u16   6 reserved:u16
//!  8 orig tuple   : saddr[A] daddr[A] sport:u16 dport:u16 route_id:u32 vlan:u16 reserved:u16
//!    reply tuple  : same layout
//!    orig stats   : hit:u32 hit_bytes:u64
//!    reply stats  : hit:u32 hit_bytes:u64
//! ```

use super::codes::{cmd, Action};
use super::types::{read_addr, read_u16, read_u32, read_u64, write_addr, IpFamily};
use crate::{Error, Result};
use std::net::IpAddr;

/// Orig direction is not offloaded
pub const FLAG_ORIG_DISABLED: u16 = 1 << 0;
/// Reply direction is not offloaded
pub const FLAG_REP_DISABLED: u16 = 1 << 1;
/// Decrement TTL when forwarding
pub const FLAG_TTL_DECREMENT: u16 = 1 << 2;

const HEADER_LEN: usize = 8;
const STATS_LEN: usize = 12;

/// Encoded size of a conntrack record for `family`
pub const fn record_len(family: IpFamily) -> usize {
    let addr_len = match family {
        IpFamily::V4 => 4,
        IpFamily::V6 => 16,
    };
    HEADER_LEN + 2 * tuple_len(addr_len) + 2 * STATS_LEN
}

const fn tuple_len(addr_len: usize) -> usize {
    2 * addr_len + 12
}

/// Which directions of a connection are offloaded.
///
/// The wire carries two flags (orig-disabled, reply-disabled) of which at
/// most one may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Directions {
    #[default]
    Both,
    OrigOnly,
    ReplyOnly,
}

impl Directions {
    pub fn orig_enabled(&self) -> bool {
        !matches!(self, Directions::ReplyOnly)
    }

    pub fn reply_enabled(&self) -> bool {
        !matches!(self, Directions::OrigOnly)
    }

    /// Number of directional entries the connection occupies
    pub fn count(&self) -> usize {
        match self {
            Directions::Both => 2,
            Directions::OrigOnly | Directions::ReplyOnly => 1,
        }
    }

    fn to_flags(self) -> u16 {
        match self {
            Directions::Both => 0,
            Directions::OrigOnly => FLAG_REP_DISABLED,
            Directions::ReplyOnly => FLAG_ORIG_DISABLED,
        }
    }

    fn from_flags(flags: u16) -> Option<Self> {
        match (
            flags & FLAG_ORIG_DISABLED != 0,
            flags & FLAG_REP_DISABLED != 0,
        ) {
            (false, false) => Some(Directions::Both),
            (false, true) => Some(Directions::OrigOnly),
            (true, false) => Some(Directions::ReplyOnly),
            (true, true) => None,
        }
    }
}

/// One direction of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuple {
    pub saddr: IpAddr,
    pub daddr: IpAddr,
    pub sport: u16,
    pub dport: u16,
    /// Route used for this direction, zero when the direction is disabled
    pub route_id: u32,
    pub vlan: u16,
}

impl Tuple {
    pub fn new(saddr: IpAddr, daddr: IpAddr, sport: u16, dport: u16) -> Self {
        Self {
            saddr,
            daddr,
            sport,
            dport,
            route_id: 0,
            vlan: 0,
        }
    }

    pub fn with_route(mut self, route_id: u32) -> Self {
        self.route_id = route_id;
        self
    }

    /// Tuple with source and destination swapped
    pub fn reversed(&self) -> Self {
        Self {
            saddr: self.daddr,
            daddr: self.saddr,
            sport: self.dport,
            dport: self.sport,
            route_id: 0,
            vlan: self.vlan,
        }
    }

    fn encode(&self, family: IpFamily, buf: &mut [u8]) {
        let a = family.addr_len();
        write_addr(&mut buf[0..a], family, &self.saddr);
        write_addr(&mut buf[a..2 * a], family, &self.daddr);
        let rest = &mut buf[2 * a..];
        rest[0..2].copy_from_slice(&self.sport.to_be_bytes());
        rest[2..4].copy_from_slice(&self.dport.to_be_bytes());
        rest[4..8].copy_from_slice(&self.route_id.to_be_bytes());
        rest[8..10].copy_from_slice(&self.vlan.to_be_bytes());
    }

    fn decode(family: IpFamily, buf: &[u8]) -> Self {
        let a = family.addr_len();
        let rest = &buf[2 * a..];
        Self {
            saddr: read_addr(&buf[0..a], family),
            daddr: read_addr(&buf[a..2 * a], family),
            sport: read_u16(rest, 0),
            dport: read_u16(rest, 2),
            route_id: read_u32(rest, 4),
            vlan: read_u16(rest, 8),
        }
    }
}

/// Per-direction hit counters (read-only on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitStats {
    pub hits: u32,
    pub bytes: u64,
}

impl HitStats {
    pub fn record(&mut self, bytes: u64) {
        self.hits = self.hits.wrapping_add(1);
        self.bytes = self.bytes.wrapping_add(bytes);
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.hits.to_be_bytes());
        buf[4..12].copy_from_slice(&self.bytes.to_be_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            hits: read_u32(buf, 0),
            bytes: read_u64(buf, 4),
        }
    }
}

/// Wire form of a connection-track entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConntrackRecord {
    pub family: IpFamily,
    /// IP protocol number
    pub protocol: u16,
    pub orig: Tuple,
    pub reply: Tuple,
    pub directions: Directions,
    pub ttl_decrement: bool,
    pub orig_stats: HitStats,
    pub reply_stats: HitStats,
}

impl ConntrackRecord {
    /// Bidirectional connection without translation: reply is the mirrored orig
    pub fn new(protocol: u16, orig: Tuple, reply: Tuple) -> Self {
        Self {
            family: IpFamily::of(&orig.saddr),
            protocol,
            orig,
            reply,
            directions: Directions::Both,
            ttl_decrement: false,
            orig_stats: HitStats::default(),
            reply_stats: HitStats::default(),
        }
    }

    /// Command code carrying this record
    pub fn code(&self) -> u16 {
        match self.family {
            IpFamily::V4 => cmd::IPV4_CONNTRACK,
            IpFamily::V6 => cmd::IPV6_CONNTRACK,
        }
    }

    /// Event code announcing changes to this record
    pub fn change_code(&self) -> u16 {
        match self.family {
            IpFamily::V4 => cmd::IPV4_CONNTRACK_CHANGE,
            IpFamily::V6 => cmd::IPV6_CONNTRACK_CHANGE,
        }
    }

    /// Destination or source address is translated
    pub fn is_nat(&self) -> bool {
        self.orig.daddr != self.reply.saddr || self.orig.saddr != self.reply.daddr
    }

    /// Destination or source port is translated
    pub fn is_pat(&self) -> bool {
        self.orig.dport != self.reply.sport || self.orig.sport != self.reply.dport
    }

    pub fn encode(&self, action: Action) -> Vec<u8> {
        let a = self.family.addr_len();
        let t = tuple_len(a);
        let mut buf = vec![0u8; record_len(self.family)];

        let mut flags = self.directions.to_flags();
        if self.ttl_decrement {
            flags |= FLAG_TTL_DECREMENT;
        }

        buf[0..2].copy_from_slice(&action.as_u16().to_be_bytes());
        buf[2..4].copy_from_slice(&self.protocol.to_be_bytes());
        buf[4..6].copy_from_slice(&flags.to_be_bytes());

        let orig_at = HEADER_LEN;
        let reply_at = orig_at + t;
        let stats_at = reply_at + t;
        self.orig.encode(self.family, &mut buf[orig_at..reply_at]);
        self.reply.encode(self.family, &mut buf[reply_at..stats_at]);
        self.orig_stats
            .encode(&mut buf[stats_at..stats_at + STATS_LEN]);
        self.reply_stats
            .encode(&mut buf[stats_at + STATS_LEN..stats_at + 2 * STATS_LEN]);
        buf
    }

    pub fn decode(family: IpFamily, buf: &[u8]) -> Result<Self> {
        let expected = record_len(family);
        if buf.len() != expected {
            return Err(Error::MalformedRecord {
                code: match family {
                    IpFamily::V4 => cmd::IPV4_CONNTRACK,
                    IpFamily::V6 => cmd::IPV6_CONNTRACK,
                },
                expected,
                actual: buf.len(),
            });
        }

        let flags = read_u16(buf, 4);
        let directions = Directions::from_flags(flags).ok_or_else(|| {
            Error::Parse("orig-disabled and reply-disabled are mutually exclusive".into())
        })?;

        let t = tuple_len(family.addr_len());
        let orig_at = HEADER_LEN;
        let reply_at = orig_at + t;
        let stats_at = reply_at + t;

        Ok(Self {
            family,
            protocol: read_u16(buf, 2),
            orig: Tuple::decode(family, &buf[orig_at..reply_at]),
            reply: Tuple::decode(family, &buf[reply_at..stats_at]),
            directions,
            ttl_decrement: flags & FLAG_TTL_DECREMENT != 0,
            orig_stats: HitStats::decode(&buf[stats_at..]),
            reply_stats: HitStats::decode(&buf[stats_at + STATS_LEN..]),
        })
    }
}
