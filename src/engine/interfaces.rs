//! Physical interface database
//!
//! Interfaces come from the engine configuration and are never created or
//! destroyed over FCI. Clients may only toggle the enabled and promiscuous
//! bits, and only while holding the session lock.

use super::query::Seq;
use crate::config::InterfaceConfig;
use crate::protocol::{MacAddr, PhyIfRecord, Status};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyIf {
    pub id: u32,
    pub name: String,
    pub mac: MacAddr,
    pub enabled: bool,
    pub promiscuous: bool,
    pub rx_packets: u32,
    pub tx_packets: u32,
}

impl PhyIf {
    pub fn to_record(&self) -> PhyIfRecord {
        PhyIfRecord {
            id: self.id,
            name: self.name.clone(),
            mac: self.mac,
            enabled: self.enabled,
            promiscuous: self.promiscuous,
            rx_packets: self.rx_packets,
            tx_packets: self.tx_packets,
        }
    }
}

/// Locally administered MAC for interfaces configured without one
fn default_mac(id: u32) -> MacAddr {
    let b = id.to_be_bytes();
    MacAddr([0x02, 0x00, b[0], b[1], b[2], b[3]])
}

#[derive(Debug, Default)]
pub struct InterfaceTable {
    entries: BTreeMap<Seq, PhyIf>,
    by_name: HashMap<String, Seq>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table in configuration order
    pub fn from_config(interfaces: &[InterfaceConfig]) -> Result<Self> {
        let mut table = Self::new();
        for (index, iface) in interfaces.iter().enumerate() {
            let id = iface.id.unwrap_or(index as u32);
            let mac = match &iface.mac {
                Some(mac) => mac.parse()?,
                None => default_mac(id),
            };
            table.insert(PhyIf {
                id,
                name: iface.name.clone(),
                mac,
                enabled: iface.enabled,
                promiscuous: iface.promiscuous,
                rx_packets: 0,
                tx_packets: 0,
            })?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, iface: PhyIf) -> Result<()> {
        if self.by_name.contains_key(&iface.name) {
            return Err(Error::Config(format!(
                "interface {} defined more than once",
                iface.name
            )));
        }
        if self.entries.values().any(|i| i.id == iface.id) {
            return Err(Error::Config(format!(
                "interface id {} already in use",
                iface.id
            )));
        }
        let seq = self.entries.len() as Seq + 1;
        self.by_name.insert(iface.name.clone(), seq);
        self.entries.insert(seq, iface);
        Ok(())
    }

    /// Resolve an egress interface by name
    pub fn resolve(&self, name: &str) -> Option<&PhyIf> {
        self.by_name.get(name).and_then(|seq| self.entries.get(seq))
    }

    pub fn get_by_id(&self, id: u32) -> Option<&PhyIf> {
        self.entries.values().find(|i| i.id == id)
    }

    /// Apply the mutable bits of `record` to the interface with the same id
    pub fn update(&mut self, record: &PhyIfRecord) -> std::result::Result<(), Status> {
        let iface = self
            .entries
            .values_mut()
            .find(|i| i.id == record.id)
            .ok_or(Status::EntryNotFound)?;
        iface.enabled = record.enabled;
        iface.promiscuous = record.promiscuous;
        Ok(())
    }

    pub fn entries(&self) -> &BTreeMap<Seq, PhyIf> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> InterfaceTable {
        let mut emac1 = InterfaceConfig::new("emac1");
        emac1.mac = Some("02:11:22:33:44:55".into());
        InterfaceTable::from_config(&[InterfaceConfig::new("emac0"), emac1]).unwrap()
    }

    #[test]
    fn test_from_config() {
        let table = table();
        assert_eq!(table.len(), 2);

        let emac0 = table.resolve("emac0").unwrap();
        assert_eq!(emac0.id, 0);
        assert_eq!(emac0.mac, MacAddr([0x02, 0, 0, 0, 0, 0]));

        let emac1 = table.resolve("emac1").unwrap();
        assert_eq!(emac1.id, 1);
        assert_eq!(emac1.mac.to_string(), "02:11:22:33:44:55");

        assert!(table.resolve("emac9").is_none());
    }

    #[test]
    fn test_config_order_preserved() {
        let table = table();
        let names: Vec<&str> = table.entries().values().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["emac0", "emac1"]);
    }

    #[test]
    fn test_duplicates_rejected() {
        let result = InterfaceTable::from_config(&[
            InterfaceConfig::new("emac0"),
            InterfaceConfig::new("emac0"),
        ]);
        assert!(matches!(result, Err(Error::Config(_))));

        let mut other = InterfaceConfig::new("emac1");
        other.id = Some(0);
        let result = InterfaceTable::from_config(&[InterfaceConfig::new("emac0"), other]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_mac_rejected() {
        let mut iface = InterfaceConfig::new("emac0");
        iface.mac = Some("nope".into());
        assert!(InterfaceTable::from_config(&[iface]).is_err());
    }

    #[test]
    fn test_update_only_touches_flags() {
        let mut table = table();
        let mut record = table.resolve("emac1").unwrap().to_record();
        record.enabled = false;
        record.promiscuous = true;
        record.name = "renamed".into();
        record.rx_packets = 99;

        table.update(&record).unwrap();
        let emac1 = table.get_by_id(1).unwrap();
        assert!(!emac1.enabled);
        assert!(emac1.promiscuous);
        assert_eq!(emac1.name, "emac1");
        assert_eq!(emac1.rx_packets, 0);

        record.id = 42;
        assert_eq!(table.update(&record), Err(Status::EntryNotFound));
    }
}
