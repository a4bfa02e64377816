//! Physical interface record
//!
//! ```text
//!  0 action:u16   2 flags:u16 (bit0 enabled, bit1 promiscuous)
//!  4 id:u32       8 name[16]
//! 24 mac[6]      30 reserved:u16
//! 32 rx_packets:u32  36 tx_packets:u32
//! ```

use super::codes::{cmd, Action};
use super::types::{read_name, read_u16, read_u32, write_name, MacAddr};
use crate::{Error, Result};

/// Encoded size of a physical interface record
pub const PHY_IF_RECORD_LEN: usize = 40;

const FLAG_ENABLED: u16 = 1 << 0;
const FLAG_PROMISC: u16 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyIfRecord {
    pub id: u32,
    pub name: String,
    pub mac: MacAddr,
    pub enabled: bool,
    pub promiscuous: bool,
    pub rx_packets: u32,
    pub tx_packets: u32,
}

impl PhyIfRecord {
    pub fn encode(&self, action: Action) -> Vec<u8> {
        let mut buf = vec![0u8; PHY_IF_RECORD_LEN];
        let mut flags = 0u16;
        if self.enabled {
            flags |= FLAG_ENABLED;
        }
        if self.promiscuous {
            flags |= FLAG_PROMISC;
        }
        buf[0..2].copy_from_slice(&action.as_u16().to_be_bytes());
        buf[2..4].copy_from_slice(&flags.to_be_bytes());
        buf[4..8].copy_from_slice(&self.id.to_be_bytes());
        write_name(&mut buf[8..24], &self.name);
        buf[24..30].copy_from_slice(&self.mac.0);
        buf[32..36].copy_from_slice(&self.rx_packets.to_be_bytes());
        buf[36..40].copy_from_slice(&self.tx_packets.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != PHY_IF_RECORD_LEN {
            return Err(Error::MalformedRecord {
                code: cmd::PHY_IF,
                expected: PHY_IF_RECORD_LEN,
                actual: buf.len(),
            });
        }
        let flags = read_u16(buf, 2);
        Ok(Self {
            id: read_u32(buf, 4),
            name: read_name(&buf[8..24]),
            mac: MacAddr::from_slice(&buf[24..30]),
            enabled: flags & FLAG_ENABLED != 0,
            promiscuous: flags & FLAG_PROMISC != 0,
            rx_packets: read_u32(buf, 32),
            tx_packets: read_u32(buf, 36),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phy_if_record() {
        let record = PhyIfRecord {
            id: 2,
            name: "emac2".into(),
            mac: MacAddr([0x02, 0, 0, 0, 0, 0x22]),
            enabled: true,
            promiscuous: false,
            rx_packets: 10,
            tx_packets: 20,
        };
        let buf = record.encode(Action::Update);
        assert_eq!(&buf[0..4], &[0, 4, 0, 1]);
        assert_eq!(PhyIfRecord::decode(&buf).unwrap(), record);
    }
}
