//! Route database

use super::events::ClientId;
use super::query::Seq;
use crate::protocol::{IpFamily, MacAddr, RouteRecord, Status};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

/// A registered forwarding directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: u32,
    pub family: IpFamily,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    /// Egress interface name
    pub egress: String,
    /// Resolved egress interface id
    pub egress_id: u32,
    pub dst_addr: IpAddr,
    pub mtu: u16,
    /// Client notified when the route goes away. Not an ownership edge.
    pub owner: Option<ClientId>,
    pub hits: u32,
}

impl Route {
    pub fn to_record(&self) -> RouteRecord {
        RouteRecord {
            mtu: self.mtu,
            src_mac: self.src_mac,
            dst_mac: self.dst_mac,
            output_device: self.egress.clone(),
            id: self.id,
            family: Some(self.family),
            dst_addr: self.dst_addr,
            hits: self.hits,
        }
    }
}

/// Routes in insertion order, indexed by id
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: BTreeMap<Seq, Route>,
    by_id: HashMap<u32, Seq>,
    next_seq: Seq,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route. An existing route with the same id is left untouched.
    pub fn add(&mut self, route: Route) -> Result<(), Status> {
        if self.by_id.contains_key(&route.id) {
            return Err(Status::AlreadyRegistered);
        }
        self.next_seq += 1;
        self.by_id.insert(route.id, self.next_seq);
        self.entries.insert(self.next_seq, route);
        Ok(())
    }

    pub fn remove(&mut self, id: u32) -> Option<Route> {
        let seq = self.by_id.remove(&id)?;
        self.entries.remove(&seq)
    }

    pub fn get(&self, id: u32) -> Option<&Route> {
        self.by_id.get(&id).and_then(|seq| self.entries.get(seq))
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Route> {
        let seq = self.by_id.get(&id)?;
        self.entries.get_mut(seq)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Route ids in insertion order, optionally restricted to one family
    pub fn ids(&self, family: Option<IpFamily>) -> Vec<u32> {
        self.entries
            .values()
            .filter(|r| family.map_or(true, |f| r.family == f))
            .map(|r| r.id)
            .collect()
    }

    pub fn entries(&self) -> &BTreeMap<Seq, Route> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
