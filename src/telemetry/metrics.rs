//! Metrics collection for engine statistics.
//!
//! Provides thread-safe counters for tracking command dispatch and event
//! delivery at both the global and per-command level.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-command statistics.
#[derive(Debug, Default)]
pub struct CommandStats {
    /// Number of requests dispatched.
    pub requests: Counter,
    /// Number of requests answered with a non-OK status.
    pub failures: Counter,
}

impl CommandStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, ok: bool) {
        self.requests.inc();
        if !ok {
            self.failures.inc();
        }
    }
}

/// Global metrics registry for the engine.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Per-command statistics, keyed by command code.
    commands: RwLock<BTreeMap<u16, CommandStats>>,

    /// Datagrams that failed envelope decoding.
    pub messages_malformed: Counter,

    // Event delivery
    /// Notifications handed to a back-channel socket.
    pub notifications_sent: Counter,
    /// Notifications that could not be delivered.
    pub notifications_failed: Counter,

    // Database maintenance
    /// Conntracks removed because their route went away.
    pub conntracks_cascaded: Counter,
    /// Conntracks removed by aging.
    pub conntracks_aged: Counter,

    // Table size gauges
    /// Current number of routes.
    pub route_count: AtomicU64,
    /// Current number of conntracks, both families.
    pub conntrack_count: AtomicU64,
    /// Current number of clients with a back-channel.
    pub client_count: AtomicU64,
}

impl MetricsRegistry {
    /// Creates a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one dispatched command.
    pub fn record_command(&self, code: u16, ok: bool) {
        if let Some(stats) = self.commands.read().get(&code) {
            stats.record(ok);
            return;
        }
        self.commands.write().entry(code).or_default().record(ok);
    }

    /// Updates the table size gauges.
    pub fn set_table_sizes(&self, routes: usize, conntracks: usize, clients: usize) {
        self.route_count.store(routes as u64, Ordering::Relaxed);
        self.conntrack_count
            .store(conntracks as u64, Ordering::Relaxed);
        self.client_count.store(clients as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("messages_malformed".into(), self.messages_malformed.get()),
            ("notifications_sent".into(), self.notifications_sent.get()),
            (
                "notifications_failed".into(),
                self.notifications_failed.get(),
            ),
            ("conntracks_cascaded".into(), self.conntracks_cascaded.get()),
            ("conntracks_aged".into(), self.conntracks_aged.get()),
            (
                "route_count".into(),
                self.route_count.load(Ordering::Relaxed),
            ),
            (
                "conntrack_count".into(),
                self.conntrack_count.load(Ordering::Relaxed),
            ),
            (
                "client_count".into(),
                self.client_count.load(Ordering::Relaxed),
            ),
        ];

        // Per-command metrics
        for (code, stats) in self.commands.read().iter() {
            result.extend([
                (format!("cmd_{:04x}_requests", code), stats.requests.get()),
                (format!("cmd_{:04x}_failures", code), stats.failures.get()),
            ]);
        }

        result
    }
}
