//! Configuration types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Engine configuration (config.toml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address the engine server binds its command socket to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Seconds between conntrack aging passes, 0 disables aging
    #[serde(default = "default_aging_interval")]
    pub aging_interval: u64,
    /// Command reply timeout used by clients, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            aging_interval: default_aging_interval(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5400))
}

fn default_aging_interval() -> u64 {
    10
}

fn default_command_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// error, warn, info, debug, trace
    #[serde(default = "default_level")]
    pub level: String,
    /// pretty, compact, json
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

/// Conntrack idle timeouts in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_tcp_timeout")]
    pub tcp: u32,
    #[serde(default = "default_udp_timeout")]
    pub udp: u32,
    #[serde(default = "default_other_timeout")]
    pub other: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tcp: default_tcp_timeout(),
            udp: default_udp_timeout(),
            other: default_other_timeout(),
        }
    }
}

fn default_tcp_timeout() -> u32 {
    7200
}

fn default_udp_timeout() -> u32 {
    300
}

fn default_other_timeout() -> u32 {
    60
}

/// Physical interface known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    /// Defaults to the position in the list
    #[serde(default)]
    pub id: Option<u32>,
    /// `xx:xx:xx:xx:xx:xx`
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub promiscuous: bool,
}

fn default_enabled() -> bool {
    true
}

impl InterfaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            mac: None,
            enabled: true,
            promiscuous: false,
        }
    }
}
