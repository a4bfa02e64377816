//! Connection tracking database
//!
//! Each registered connection occupies one or two directional flow entries:
//! the orig direction is looked up by the orig tuple, the reply direction by
//! the reply tuple. Address translation needs no separate mode; it falls out
//! of the reply tuple not mirroring the orig tuple.

use super::query::Seq;
use crate::protocol::{ConntrackRecord, IpFamily, Status, Tuple};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// IP protocol numbers with their own timeout class
pub mod protocol {
    pub const ICMP: u16 = 1;
    pub const TCP: u16 = 6;
    pub const UDP: u16 = 17;
}

/// Lookup key of one direction (5-tuple)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub protocol: u16,
    pub saddr: IpAddr,
    pub daddr: IpAddr,
    pub sport: u16,
    pub dport: u16,
}

impl FlowKey {
    pub fn of(protocol: u16, tuple: &Tuple) -> Self {
        Self {
            protocol,
            saddr: tuple.saddr,
            daddr: tuple.daddr,
            sport: tuple.sport,
            dport: tuple.dport,
        }
    }

    /// Create the reverse key (swap src/dst)
    pub fn reverse(&self) -> Self {
        Self {
            protocol: self.protocol,
            saddr: self.daddr,
            daddr: self.saddr,
            sport: self.dport,
            dport: self.sport,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Orig,
    Reply,
}

/// A registered connection
#[derive(Debug, Clone)]
pub struct ConntrackEntry {
    pub record: ConntrackRecord,
    pub created_at: Instant,
    /// Refreshed by keep-alive and by traffic hits
    pub last_seen: Instant,
}

/// Idle timeouts per protocol class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConntrackTimeouts {
    /// TCP (default: 2 hours)
    pub tcp: Duration,
    /// UDP (default: 5 minutes)
    pub udp: Duration,
    /// Every other protocol (default: 1 minute)
    pub other: Duration,
}

impl Default for ConntrackTimeouts {
    fn default() -> Self {
        Self {
            tcp: Duration::from_secs(7200),
            udp: Duration::from_secs(300),
            other: Duration::from_secs(60),
        }
    }
}

impl ConntrackTimeouts {
    pub fn for_protocol(&self, protocol: u16) -> Duration {
        match protocol {
            self::protocol::TCP => self.tcp,
            self::protocol::UDP => self.udp,
            _ => self.other,
        }
    }

    /// Apply a timeout command. Protocol 0 addresses the "others" class.
    pub fn set(&mut self, protocol: u16, timeout: Duration) -> Result<(), Status> {
        match protocol {
            self::protocol::TCP => self.tcp = timeout,
            self::protocol::UDP => self.udp = timeout,
            0 => self.other = timeout,
            _ => return Err(Status::WrongParam),
        }
        Ok(())
    }
}

/// Connections of one address family in insertion order
#[derive(Debug)]
pub struct ConntrackTable {
    family: IpFamily,
    entries: BTreeMap<Seq, ConntrackEntry>,
    /// Directional key -> owning connection
    flows: HashMap<FlowKey, (Seq, Direction)>,
    next_seq: Seq,
}

impl ConntrackTable {
    pub fn new(family: IpFamily) -> Self {
        Self {
            family,
            entries: BTreeMap::new(),
            flows: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Register a connection.
    ///
    /// Creates a flow entry for each enabled direction. The route id of a
    /// disabled direction is stored exactly as supplied.
    pub fn add(&mut self, record: ConntrackRecord, now: Instant) -> Result<Seq, Status> {
        if record.family != self.family {
            return Err(Status::WrongParam);
        }

        let keys = Self::flow_keys(&record);
        if keys.len() == 2 && keys[0].0 == keys[1].0 {
            return Err(Status::WrongParam);
        }
        if keys.iter().any(|(key, _)| self.flows.contains_key(key)) {
            return Err(Status::AlreadyRegistered);
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        for (key, direction) in keys {
            self.flows.insert(key, (seq, direction));
        }
        self.entries.insert(
            seq,
            ConntrackEntry {
                record,
                created_at: now,
                last_seen: now,
            },
        );
        Ok(seq)
    }

    fn flow_keys(record: &ConntrackRecord) -> Vec<(FlowKey, Direction)> {
        let mut keys = Vec::with_capacity(2);
        if record.directions.orig_enabled() {
            keys.push((FlowKey::of(record.protocol, &record.orig), Direction::Orig));
        }
        if record.directions.reply_enabled() {
            keys.push((FlowKey::of(record.protocol, &record.reply), Direction::Reply));
        }
        keys
    }

    /// Find a connection by protocol and orig tuple.
    ///
    /// Only the orig addresses and ports take part in the match; reply fields
    /// of the request are ignored.
    pub fn find(&self, protocol: u16, orig: &Tuple) -> Option<Seq> {
        let key = FlowKey::of(protocol, orig);
        if let Some((seq, Direction::Orig)) = self.flows.get(&key) {
            return Some(*seq);
        }
        // Reply-only connections have no orig flow entry
        self.entries
            .iter()
            .find(|(_, entry)| FlowKey::of(entry.record.protocol, &entry.record.orig) == key)
            .map(|(seq, _)| *seq)
    }

    pub fn remove(&mut self, seq: Seq) -> Option<ConntrackEntry> {
        let entry = self.entries.remove(&seq)?;
        for (key, _) in Self::flow_keys(&entry.record) {
            if matches!(self.flows.get(&key), Some((owner, _)) if *owner == seq) {
                self.flows.remove(&key);
            }
        }
        Some(entry)
    }

    pub fn get(&self, seq: Seq) -> Option<&ConntrackEntry> {
        self.entries.get(&seq)
    }

    pub fn get_mut(&mut self, seq: Seq) -> Option<&mut ConntrackEntry> {
        self.entries.get_mut(&seq)
    }

    /// Resolve a packet's 5-tuple to a connection direction
    pub fn lookup(&self, key: &FlowKey) -> Option<(&ConntrackEntry, Direction)> {
        let (seq, direction) = self.flows.get(key)?;
        self.entries.get(seq).map(|entry| (entry, *direction))
    }

    /// Account a forwarded packet. Returns false if the flow is unknown.
    pub fn record_hit(&mut self, key: &FlowKey, bytes: u64, now: Instant) -> bool {
        let Some(&(seq, direction)) = self.flows.get(key) else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&seq) else {
            return false;
        };
        match direction {
            Direction::Orig => entry.record.orig_stats.record(bytes),
            Direction::Reply => entry.record.reply_stats.record(bytes),
        }
        entry.last_seen = now;
        true
    }

    /// Connections whose enabled directions forward through `route_id`.
    ///
    /// The stored route id of a disabled direction is ignored.
    pub fn using_route(&self, route_id: u32) -> Vec<Seq> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                let r = &entry.record;
                (r.directions.orig_enabled() && r.orig.route_id == route_id)
                    || (r.directions.reply_enabled() && r.reply.route_id == route_id)
            })
            .map(|(seq, _)| *seq)
            .collect()
    }

    /// Connections idle for longer than their protocol timeout
    pub fn expired(&self, now: Instant, timeouts: &ConntrackTimeouts) -> Vec<Seq> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                now.saturating_duration_since(entry.last_seen)
                    > timeouts.for_protocol(entry.record.protocol)
            })
            .map(|(seq, _)| *seq)
            .collect()
    }

    /// Number of directional flow entries
    pub fn directional_count(&self) -> usize {
        self.flows.len()
    }

    pub fn entries(&self) -> &BTreeMap<Seq, ConntrackEntry> {
        &self.entries
    }

    /// Get number of tracked connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.flows.clear();
    }
}
