//! FCI wire codec
//!
//! Fixed layouts for the message envelope and the command records. Record
//! fields are big-endian; nothing here depends on host struct layout.

pub mod codes;
pub mod conntrack;
pub mod health;
pub mod interface;
pub mod message;
pub mod record;
pub mod route;
pub mod timeout;
pub mod types;

pub use codes::{cmd, Action, Status};
pub use conntrack::{ConntrackRecord, Directions, HitStats, Tuple};
pub use health::{HealthEvent, Severity};
pub use interface::PhyIfRecord;
pub use message::{ClientRegistration, Message, MessageKind, Reply, MAX_DATAGRAM_LEN, MAX_PAYLOAD_LEN};
pub use record::Record;
pub use route::RouteRecord;
pub use timeout::TimeoutRecord;
pub use types::{IpFamily, MacAddr, IFNAMSIZ};
