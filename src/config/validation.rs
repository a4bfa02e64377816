//! Configuration validation

use super::Config;
use crate::protocol::{MacAddr, IFNAMSIZ};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_engine(config, &mut result);
    validate_logging(config, &mut result);
    validate_timeouts(config, &mut result);
    validate_interfaces(config, &mut result);

    result
}

fn validate_engine(config: &Config, result: &mut ValidationResult) {
    if config.engine.listen.port() == 0 {
        result.warn("engine.listen: port 0 binds an ephemeral port clients cannot know");
    }
    if config.engine.aging_interval == 0 {
        result.warn("engine.aging_interval: 0 disables conntrack aging");
    }
    if config.engine.command_timeout_ms == 0 {
        result.error("engine.command_timeout_ms: must be greater than 0");
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let level = config.logging.level.to_lowercase();
    if !["error", "warn", "info", "debug", "trace"].contains(&level.as_str()) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            config.logging.level
        ));
    }
    if !["pretty", "compact", "json"].contains(&config.logging.format.as_str()) {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            config.logging.format
        ));
    }
}

fn validate_timeouts(config: &Config, result: &mut ValidationResult) {
    for (name, value) in [
        ("tcp", config.timeouts.tcp),
        ("udp", config.timeouts.udp),
        ("other", config.timeouts.other),
    ] {
        if value == 0 {
            result.error(format!("timeouts.{}: must be greater than 0", name));
        }
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    if config.interfaces.is_empty() {
        result.warn("no interfaces defined, every route registration will fail");
    }

    let mut names = HashSet::new();
    let mut ids = HashSet::new();
    for (index, iface) in config.interfaces.iter().enumerate() {
        let name = &iface.name;
        if name.is_empty() {
            result.error(format!("interfaces[{}]: name must not be empty", index));
        } else if name.len() >= IFNAMSIZ {
            result.error(format!(
                "interfaces.{}: name longer than {} bytes",
                name,
                IFNAMSIZ - 1
            ));
        }
        if !names.insert(name.as_str()) {
            result.error(format!("interfaces.{}: defined more than once", name));
        }

        let id = iface.id.unwrap_or(index as u32);
        if !ids.insert(id) {
            result.error(format!("interfaces.{}: id {} already in use", name, id));
        }

        if let Some(mac) = &iface.mac {
            match mac.parse::<MacAddr>() {
                Ok(addr) if addr.is_multicast() => {
                    result.error(format!("interfaces.{}: mac {} is multicast", name, mac))
                }
                Ok(_) => {}
                Err(_) => result.error(format!("interfaces.{}: invalid mac '{}'", name, mac)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceConfig;

    fn make_config() -> Config {
        let mut config = Config::default();
        config.interfaces.push(InterfaceConfig::new("emac0"));
        config
    }

    #[test]
    fn test_valid_minimal_config() {
        let config = make_config();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_no_interfaces_warning() {
        let result = validate(&Config::default());
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("no interfaces")));
    }

    #[test]
    fn test_duplicate_interface_name() {
        let mut config = make_config();
        let mut dup = InterfaceConfig::new("emac0");
        dup.id = Some(9);
        config.interfaces.push(dup);
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("more than once")));
    }

    #[test]
    fn test_duplicate_interface_id() {
        let mut config = make_config();
        let mut other = InterfaceConfig::new("emac1");
        other.id = Some(0);
        config.interfaces.push(other);
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("id 0")));
    }

    #[test]
    fn test_interface_name_too_long() {
        let mut config = make_config();
        config.interfaces[0].name = "a-very-long-interface".into();
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_invalid_mac() {
        let mut config = make_config();
        config.interfaces[0].mac = Some("02:00:00".into());
        assert!(validate(&config).has_errors());

        config.interfaces[0].mac = Some("01:00:5e:00:00:01".into());
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("multicast")));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = make_config();
        config.timeouts.udp = 0;
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("timeouts.udp")));
    }

    #[test]
    fn test_unknown_log_level_warns() {
        let mut config = make_config();
        config.logging.level = "verbose".into();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 1);
    }
}
