//! Engine context
//!
//! `Engine` owns the whole database behind one mutex. Every command runs to
//! completion under that mutex, so handlers see a single writer.

use super::conntrack::{ConntrackTable, ConntrackTimeouts, Direction, FlowKey};
use super::events::{ClientId, ClientTable, Notification};
use super::interfaces::InterfaceTable;
use super::query::QueryCursor;
use super::routes::{Route, RouteTable};
use super::session::SessionLock;
use crate::config::Config;
use crate::protocol::{
    cmd, Action, ConntrackRecord, HealthEvent, IpFamily, Message, RouteRecord, Status,
};
use crate::telemetry::MetricsRegistry;
use crate::Result;
use parking_lot::{Mutex, MutexGuard};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Database and per-resource protocol state
#[derive(Debug)]
pub struct EngineState {
    pub(crate) routes: RouteTable,
    pub(crate) conntracks_v4: ConntrackTable,
    pub(crate) conntracks_v6: ConntrackTable,
    pub(crate) interfaces: InterfaceTable,
    pub(crate) route_cursor: QueryCursor,
    pub(crate) conntrack_v4_cursor: QueryCursor,
    pub(crate) conntrack_v6_cursor: QueryCursor,
    pub(crate) phy_if_cursor: QueryCursor,
    pub(crate) session: SessionLock,
    pub(crate) clients: ClientTable,
    pub(crate) timeouts: ConntrackTimeouts,
    metrics: Arc<MetricsRegistry>,
}

impl EngineState {
    fn new(interfaces: InterfaceTable, timeouts: ConntrackTimeouts, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            routes: RouteTable::new(),
            conntracks_v4: ConntrackTable::new(IpFamily::V4),
            conntracks_v6: ConntrackTable::new(IpFamily::V6),
            interfaces,
            route_cursor: QueryCursor::new(),
            conntrack_v4_cursor: QueryCursor::new(),
            conntrack_v6_cursor: QueryCursor::new(),
            phy_if_cursor: QueryCursor::new(),
            session: SessionLock::new(),
            clients: ClientTable::new(),
            timeouts,
            metrics,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn session(&self) -> &SessionLock {
        &self.session
    }

    pub fn timeouts(&self) -> &ConntrackTimeouts {
        &self.timeouts
    }

    pub fn conntracks(&self, family: IpFamily) -> &ConntrackTable {
        match family {
            IpFamily::V4 => &self.conntracks_v4,
            IpFamily::V6 => &self.conntracks_v6,
        }
    }

    pub(crate) fn conntracks_mut(&mut self, family: IpFamily) -> &mut ConntrackTable {
        match family {
            IpFamily::V4 => &mut self.conntracks_v4,
            IpFamily::V6 => &mut self.conntracks_v6,
        }
    }

    pub(crate) fn update_gauges(&self) {
        self.metrics.set_table_sizes(
            self.routes.len(),
            self.conntracks_v4.len() + self.conntracks_v6.len(),
            self.clients.len(),
        );
    }

    // ------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------

    /// Register a route on behalf of `owner`
    pub fn add_route(
        &mut self,
        record: &RouteRecord,
        owner: Option<ClientId>,
    ) -> std::result::Result<(), Status> {
        if self.routes.contains(record.id) {
            return Err(Status::AlreadyRegistered);
        }
        let family = record.family.ok_or(Status::WrongParam)?;
        let egress = self
            .interfaces
            .resolve(&record.output_device)
            .ok_or(Status::WrongParam)?;

        let route = Route {
            id: record.id,
            family,
            src_mac: record.src_mac,
            dst_mac: record.dst_mac,
            egress: egress.name.clone(),
            egress_id: egress.id,
            dst_addr: record.dst_addr,
            mtu: record.mtu,
            owner,
            hits: 0,
        };
        self.routes.add(route)?;
        debug!(
            "route {} added via {} ({:?})",
            record.id, record.output_device, family
        );
        Ok(())
    }

    /// Remove one route and everything that depends on it.
    ///
    /// The owner is told first, then dependent conntracks of both families
    /// are removed, then the route itself. Only the outcome of the last step
    /// is returned; failures of the first two are logged.
    pub fn drop_route(&mut self, id: u32, out: &mut Vec<Notification>) -> std::result::Result<(), Status> {
        let Some(route) = self.routes.get(id).cloned() else {
            return Err(Status::EntryNotFound);
        };

        if let Some(owner) = route.owner {
            let event = Message::command_fixed(cmd::IP_ROUTE, route.to_record().encode(Action::Removed));
            match self.clients.unicast(owner, event) {
                Some(notification) => out.push(notification),
                None => warn!("route {}: owner {} not notified", id, owner),
            }
        }

        let metrics = self.metrics.clone();
        for family in [IpFamily::V4, IpFamily::V6] {
            let table = self.conntracks_mut(family);
            for seq in table.using_route(id) {
                if table.remove(seq).is_none() {
                    warn!("route {}: dependent {:?} conntrack {} already gone", id, family, seq);
                    continue;
                }
                metrics.conntracks_cascaded.inc();
            }
        }

        match self.routes.remove(id) {
            Some(_) => {
                debug!("route {} removed", id);
                Ok(())
            }
            None => Err(Status::InternalFailure),
        }
    }

    /// Drop every route, or every route of one family. Never stops early.
    pub fn drop_all_routes(&mut self, family: Option<IpFamily>, out: &mut Vec<Notification>) {
        for id in self.routes.ids(family) {
            if let Err(status) = self.drop_route(id, out) {
                warn!("failed to drop route {}: {}", id, status);
            }
        }
    }

    pub fn drop_all(&mut self, out: &mut Vec<Notification>) {
        self.drop_all_routes(None, out);
    }

    pub fn drop_all_v4(&mut self, out: &mut Vec<Notification>) {
        self.drop_all_routes(Some(IpFamily::V4), out);
    }

    pub fn drop_all_v6(&mut self, out: &mut Vec<Notification>) {
        self.drop_all_routes(Some(IpFamily::V6), out);
    }

    // ------------------------------------------------------------------
    // Conntracks
    // ------------------------------------------------------------------

    fn check_route(&self, family: IpFamily, route_id: u32) -> std::result::Result<(), Status> {
        match self.routes.get(route_id) {
            Some(route) if route.family == family => Ok(()),
            _ => Err(Status::WrongParam),
        }
    }

    pub fn add_conntrack(&mut self, record: ConntrackRecord, now: Instant) -> std::result::Result<(), Status> {
        let family = record.family;
        if record.directions.orig_enabled() {
            self.check_route(family, record.orig.route_id)?;
        }
        if record.directions.reply_enabled() {
            self.check_route(family, record.reply.route_id)?;
        }
        if record.is_nat() {
            debug!(
                "conntrack {} -> {} translated (pat: {})",
                record.orig.saddr,
                record.orig.daddr,
                record.is_pat()
            );
        }
        self.conntracks_mut(family).add(record, now)?;
        Ok(())
    }

    /// Change the TTL-decrement flag; nothing else is mutable in place
    pub fn update_conntrack(&mut self, record: &ConntrackRecord) -> std::result::Result<(), Status> {
        let table = self.conntracks_mut(record.family);
        let seq = table
            .find(record.protocol, &record.orig)
            .ok_or(Status::EntryNotFound)?;
        let entry = table.get_mut(seq).ok_or(Status::InternalFailure)?;
        entry.record.ttl_decrement = record.ttl_decrement;
        Ok(())
    }

    pub fn keep_alive_conntrack(&mut self, record: &ConntrackRecord, now: Instant) -> std::result::Result<(), Status> {
        let table = self.conntracks_mut(record.family);
        let seq = table
            .find(record.protocol, &record.orig)
            .ok_or(Status::EntryNotFound)?;
        let entry = table.get_mut(seq).ok_or(Status::InternalFailure)?;
        entry.last_seen = now;
        Ok(())
    }

    pub fn delete_conntrack(&mut self, record: &ConntrackRecord) -> std::result::Result<(), Status> {
        let table = self.conntracks_mut(record.family);
        let seq = table
            .find(record.protocol, &record.orig)
            .ok_or(Status::EntryNotFound)?;
        table.remove(seq).ok_or(Status::InternalFailure)?;
        Ok(())
    }

    /// Clear a family's conntracks, then drop all of its routes
    pub fn reset(&mut self, family: IpFamily, out: &mut Vec<Notification>) {
        let table = self.conntracks_mut(family);
        let removed = table.len();
        table.clear();
        self.drop_all_routes(Some(family), out);
        info!("{:?} reset: {} conntracks removed", family, removed);
    }

    pub fn reset_v4(&mut self, out: &mut Vec<Notification>) {
        self.reset(IpFamily::V4, out);
    }

    pub fn reset_v6(&mut self, out: &mut Vec<Notification>) {
        self.reset(IpFamily::V6, out);
    }

    pub fn set_timeout(&mut self, protocol: u16, seconds: u32) -> std::result::Result<(), Status> {
        if seconds == 0 {
            return Err(Status::WrongParam);
        }
        self.timeouts
            .set(protocol, Duration::from_secs(u64::from(seconds)))?;
        debug!("conntrack timeout for protocol {} set to {}s", protocol, seconds);
        Ok(())
    }

    /// Remove idle conntracks and announce each removal to every subscriber
    pub fn age_conntracks(&mut self, now: Instant, out: &mut Vec<Notification>) -> usize {
        let timeouts = self.timeouts.clone();
        let mut removed = 0;
        for family in [IpFamily::V4, IpFamily::V6] {
            let table = self.conntracks_mut(family);
            let mut records = Vec::new();
            for seq in table.expired(now, &timeouts) {
                if let Some(entry) = table.remove(seq) {
                    records.push(entry.record);
                }
            }
            for record in records {
                let event = Message::command_fixed(record.change_code(), record.encode(Action::Removed));
                out.extend(self.clients.broadcast(&event));
                removed += 1;
            }
        }
        if removed > 0 {
            self.metrics.conntracks_aged.add(removed as u64);
            debug!("aged out {} conntracks", removed);
        }
        removed
    }

    /// Account a forwarded packet against its connection and route
    pub fn account_packet(&mut self, family: IpFamily, key: &FlowKey, bytes: u64, now: Instant) -> bool {
        let table = self.conntracks_mut(family);
        let route_id = match table.lookup(key) {
            Some((entry, Direction::Orig)) => entry.record.orig.route_id,
            Some((entry, Direction::Reply)) => entry.record.reply.route_id,
            None => return false,
        };
        table.record_hit(key, bytes, now);
        if let Some(route) = self.routes.get_mut(route_id) {
            route.hits = route.hits.wrapping_add(1);
        }
        true
    }
}

/// The forwarding engine's control-plane context
#[derive(Debug)]
pub struct Engine {
    state: Mutex<EngineState>,
    metrics: Arc<MetricsRegistry>,
    running: AtomicBool,
}

impl Engine {
    /// Create an engine from configuration
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_metrics(config, Arc::new(MetricsRegistry::new()))
    }

    pub fn with_metrics(config: &Config, metrics: Arc<MetricsRegistry>) -> Result<Self> {
        let interfaces = InterfaceTable::from_config(&config.interfaces)?;
        let timeouts = ConntrackTimeouts {
            tcp: Duration::from_secs(u64::from(config.timeouts.tcp)),
            udp: Duration::from_secs(u64::from(config.timeouts.udp)),
            other: Duration::from_secs(u64::from(config.timeouts.other)),
        };
        info!("engine initialized with {} interfaces", interfaces.len());
        Ok(Self {
            state: Mutex::new(EngineState::new(interfaces, timeouts, metrics.clone())),
            metrics,
            running: AtomicBool::new(true),
        })
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop accepting commands and forget every client.
    ///
    /// The database is left in place; later commands fail with
    /// `InternalFailure`.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let mut state = self.state.lock();
            state.clients.clear();
            if let Some(holder) = state.session.holder() {
                state.session.release_for(holder);
            }
            state.update_gauges();
            info!("engine shut down");
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock()
    }

    /// Run `f` with read access to the database
    pub fn inspect<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Attach a back-channel to `client`
    pub fn register_client(&self, client: ClientId, back_channel: SocketAddr) {
        let mut state = self.state.lock();
        state.clients.register(client, back_channel);
        state.update_gauges();
    }

    /// Forget `client`, releasing the session lock if it holds it
    pub fn unregister_client(&self, client: ClientId) -> bool {
        let mut state = self.state.lock();
        let known = state.clients.unregister(client).is_some();
        if state.session.release_for(client) {
            info!("{} went away holding the session lock, released", client);
        }
        state.update_gauges();
        known
    }

    /// Stop broadcasting to a client whose back-channel failed
    pub fn mark_unreachable(&self, client: ClientId) {
        self.state.lock().clients.mark_unreachable(client);
    }

    /// Age out idle conntracks
    pub fn run_aging(&self, now: Instant) -> Vec<Notification> {
        let mut out = Vec::new();
        if !self.is_running() {
            return out;
        }
        let mut state = self.state.lock();
        state.age_conntracks(now, &mut out);
        state.update_gauges();
        out
    }

    /// Broadcast a health-monitor event to every subscriber
    pub fn raise_health_event(&self, event: &HealthEvent) -> Vec<Notification> {
        let message = Message::command_fixed(cmd::HEALTH_MONITOR_EVENT, event.encode());
        info!(
            "health event {} ({:?}): {}",
            event.id, event.severity, event.text
        );
        self.state.lock().clients.broadcast(&message)
    }

    /// Account a forwarded packet. Returns false for an unknown flow.
    pub fn account_packet(&self, family: IpFamily, key: &FlowKey, bytes: u64) -> bool {
        self.state
            .lock()
            .account_packet(family, key, bytes, Instant::now())
    }

    /// Take the session lock for an in-process caller.
    ///
    /// The lock is released when the guard is dropped. The guard must not be
    /// dropped inside `inspect`.
    pub fn lock_session(&self, client: ClientId) -> std::result::Result<SessionGuard<'_>, Status> {
        self.state.lock().session.lock(client)?;
        Ok(SessionGuard {
            engine: self,
            client,
        })
    }
}

/// Session lock held by an in-process caller
#[derive(Debug)]
pub struct SessionGuard<'a> {
    engine: &'a Engine,
    client: ClientId,
}

impl SessionGuard<'_> {
    pub fn client(&self) -> ClientId {
        self.client
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Err(status) = self.engine.state.lock().session.unlock(self.client) {
            debug!("{}: session already released ({})", self.client, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceConfig;
    use crate::protocol::{Directions, MacAddr, Tuple};

    fn client(port: u16) -> ClientId {
        ClientId(([127, 0, 0, 1], port).into())
    }

    fn engine() -> Engine {
        let mut config = Config::default();
        config.interfaces.push(InterfaceConfig::new("emac0"));
        config.interfaces.push(InterfaceConfig::new("emac1"));
        Engine::new(&config).unwrap()
    }

    fn route(id: u32, family: IpFamily) -> RouteRecord {
        RouteRecord {
            mtu: 0,
            src_mac: MacAddr([0x02, 0, 0, 0, 0, 1]),
            dst_mac: MacAddr([0x02, 0, 0, 0, 0, 2]),
            output_device: "emac0".into(),
            id,
            family: Some(family),
            dst_addr: match family {
                IpFamily::V4 => "10.0.0.1".parse().unwrap(),
                IpFamily::V6 => "fd00::1".parse().unwrap(),
            },
            hits: 0,
        }
    }

    fn ct(sport: u16, orig_route: u32, reply_route: u32) -> ConntrackRecord {
        ConntrackRecord::new(
            6,
            Tuple::new("10.0.0.5".parse().unwrap(), "8.8.8.8".parse().unwrap(), sport, 53)
                .with_route(orig_route),
            Tuple::new("8.8.8.8".parse().unwrap(), "10.0.0.5".parse().unwrap(), 53, sport)
                .with_route(reply_route),
        )
    }

    #[test]
    fn test_add_route_validation() {
        let engine = engine();
        let mut state = engine.lock_state();

        let mut bad = route(1, IpFamily::V4);
        bad.output_device = "emac9".into();
        assert_eq!(state.add_route(&bad, None), Err(Status::WrongParam));

        let mut no_family = route(1, IpFamily::V4);
        no_family.family = None;
        assert_eq!(state.add_route(&no_family, None), Err(Status::WrongParam));

        assert_eq!(state.add_route(&route(1, IpFamily::V4), None), Ok(()));
        assert_eq!(
            state.add_route(&route(1, IpFamily::V6), None),
            Err(Status::AlreadyRegistered)
        );
        assert_eq!(state.routes().get(1).unwrap().family, IpFamily::V4);

        // A repeated id is reported as such whatever else is wrong with it
        assert_eq!(state.add_route(&no_family, None), Err(Status::AlreadyRegistered));
        assert_eq!(state.add_route(&bad, None), Err(Status::AlreadyRegistered));
    }

    #[test]
    fn test_drop_route_cascades() {
        let engine = engine();
        let owner = client(1);
        engine.register_client(owner, ([127, 0, 0, 1], 9001).into());

        let mut state = engine.lock_state();
        state.add_route(&route(1, IpFamily::V4), Some(owner)).unwrap();
        state.add_route(&route(2, IpFamily::V4), None).unwrap();
        let now = Instant::now();
        state.add_conntrack(ct(1000, 1, 2), now).unwrap();
        state.add_conntrack(ct(1001, 2, 1), now).unwrap();
        state.add_conntrack(ct(1002, 2, 2), now).unwrap();

        let mut out = Vec::new();
        assert_eq!(state.drop_route(1, &mut out), Ok(()));

        assert!(!state.routes().contains(1));
        assert_eq!(state.conntracks(IpFamily::V4).len(), 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client, owner);
        assert_eq!(out[0].message.code(), cmd::IP_ROUTE);
        assert_eq!(out[0].message.action(), Some(Action::Removed.as_u16()));
        let removed = RouteRecord::decode(out[0].message.payload()).unwrap();
        assert_eq!(removed.id, 1);
    }

    #[test]
    fn test_drop_route_owner_without_back_channel() {
        let engine = engine();
        let mut state = engine.lock_state();
        state.add_route(&route(1, IpFamily::V4), Some(client(1))).unwrap();

        let mut out = Vec::new();
        assert_eq!(state.drop_route(1, &mut out), Ok(()));
        assert!(out.is_empty());
        assert_eq!(state.drop_route(1, &mut out), Err(Status::EntryNotFound));
    }

    #[test]
    fn test_drop_all_by_family() {
        let engine = engine();
        let mut state = engine.lock_state();
        state.add_route(&route(1, IpFamily::V4), None).unwrap();
        state.add_route(&route(2, IpFamily::V6), None).unwrap();
        state.add_route(&route(3, IpFamily::V4), None).unwrap();

        let mut out = Vec::new();
        state.drop_all_v4(&mut out);
        assert_eq!(state.routes().ids(None), vec![2]);
        state.drop_all_v6(&mut out);
        assert!(state.routes().is_empty());
    }

    #[test]
    fn test_conntrack_requires_known_routes() {
        let engine = engine();
        let mut state = engine.lock_state();
        state.add_route(&route(7, IpFamily::V4), None).unwrap();
        state.add_route(&route(8, IpFamily::V6), None).unwrap();
        let now = Instant::now();

        assert_eq!(state.add_conntrack(ct(1, 7, 11), now), Err(Status::WrongParam));
        // v6 route cannot carry a v4 connection
        assert_eq!(state.add_conntrack(ct(1, 7, 8), now), Err(Status::WrongParam));

        let mut one_way = ct(1, 7, 0);
        one_way.directions = Directions::OrigOnly;
        assert_eq!(state.add_conntrack(one_way, now), Ok(()));
        assert_eq!(state.conntracks(IpFamily::V4).directional_count(), 1);
    }

    #[test]
    fn test_update_keep_alive_delete() {
        let engine = engine();
        let mut state = engine.lock_state();
        state.add_route(&route(1, IpFamily::V4), None).unwrap();
        let start = Instant::now();
        state.add_conntrack(ct(1, 1, 1), start).unwrap();

        let mut change = ct(1, 0, 0);
        change.ttl_decrement = true;
        assert_eq!(state.update_conntrack(&change), Ok(()));

        let later = start + Duration::from_secs(30);
        assert_eq!(state.keep_alive_conntrack(&change, later), Ok(()));

        let entry = state.conntracks(IpFamily::V4).entries().values().next().unwrap();
        assert!(entry.record.ttl_decrement);
        assert_eq!(entry.record.orig.route_id, 1);
        assert_eq!(entry.last_seen, later);

        assert_eq!(state.delete_conntrack(&change), Ok(()));
        assert_eq!(state.delete_conntrack(&change), Err(Status::EntryNotFound));
        assert_eq!(state.update_conntrack(&change), Err(Status::EntryNotFound));
    }

    #[test]
    fn test_reset_clears_family() {
        let engine = engine();
        let mut state = engine.lock_state();
        state.add_route(&route(1, IpFamily::V4), None).unwrap();
        state.add_route(&route(2, IpFamily::V6), None).unwrap();
        state.add_conntrack(ct(1, 1, 1), Instant::now()).unwrap();

        let mut out = Vec::new();
        state.reset_v4(&mut out);
        assert!(state.conntracks(IpFamily::V4).is_empty());
        assert_eq!(state.routes().ids(None), vec![2]);
    }

    #[test]
    fn test_aging_broadcasts_removal() {
        let engine = engine();
        engine.register_client(client(1), ([127, 0, 0, 1], 9001).into());
        engine.register_client(client(2), ([127, 0, 0, 1], 9002).into());
        let start = Instant::now();
        {
            let mut state = engine.lock_state();
            state.add_route(&route(1, IpFamily::V4), None).unwrap();
            state.add_conntrack(ct(1, 1, 1), start).unwrap();
            state.set_timeout(6, 10).unwrap();
        }

        assert!(engine.run_aging(start + Duration::from_secs(5)).is_empty());
        let out = engine.run_aging(start + Duration::from_secs(11));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| n.message.code() == cmd::IPV4_CONNTRACK_CHANGE));
        assert!(engine.inspect(|s| s.conntracks(IpFamily::V4).is_empty()));
        assert_eq!(engine.metrics().conntracks_aged.get(), 1);
    }

    #[test]
    fn test_set_timeout_validation() {
        let engine = engine();
        let mut state = engine.lock_state();
        assert_eq!(state.set_timeout(17, 0), Err(Status::WrongParam));
        assert_eq!(state.set_timeout(47, 10), Err(Status::WrongParam));
        assert_eq!(state.set_timeout(0, 10), Ok(()));
        assert_eq!(state.timeouts().other, Duration::from_secs(10));
    }

    #[test]
    fn test_account_packet() {
        let engine = engine();
        let record = ct(1, 1, 1);
        {
            let mut state = engine.lock_state();
            state.add_route(&route(1, IpFamily::V4), None).unwrap();
            state.add_conntrack(record.clone(), Instant::now()).unwrap();
        }
        let key = FlowKey::of(6, &record.reply);
        assert!(engine.account_packet(IpFamily::V4, &key, 100));
        assert!(!engine.account_packet(IpFamily::V6, &key, 100));

        engine.inspect(|state| {
            let entry = state.conntracks(IpFamily::V4).entries().values().next().unwrap();
            assert_eq!(entry.record.reply_stats.bytes, 100);
            assert_eq!(state.routes().get(1).unwrap().hits, 1);
        });
    }

    #[test]
    fn test_session_guard_releases_on_drop() {
        let engine = engine();
        {
            let guard = engine.lock_session(client(1)).unwrap();
            assert_eq!(guard.client(), client(1));
            assert!(matches!(engine.lock_session(client(2)), Err(Status::AlreadyLocked)));
        }
        assert!(engine.lock_session(client(2)).is_ok());
    }

    #[test]
    fn test_unregister_releases_lock() {
        let engine = engine();
        engine.register_client(client(1), ([127, 0, 0, 1], 9001).into());
        engine.lock_state().session.lock(client(1)).unwrap();

        assert!(engine.unregister_client(client(1)));
        assert_eq!(engine.inspect(|s| s.session().holder()), None);
        assert!(!engine.unregister_client(client(1)));
    }

    #[test]
    fn test_health_event_broadcast() {
        let engine = engine();
        engine.register_client(client(1), ([127, 0, 0, 1], 9001).into());
        let event = HealthEvent {
            id: 3,
            severity: crate::protocol::Severity::Warning,
            text: "link down".into(),
        };
        let out = engine.raise_health_event(&event);
        assert_eq!(out.len(), 1);
        assert_eq!(HealthEvent::decode(out[0].message.payload()).unwrap(), event);
    }
}
