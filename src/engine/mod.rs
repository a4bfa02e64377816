//! Engine-side command processing
//!
//! The database (routes, conntracks, interfaces), the QUERY cursors, the
//! session lock and the client registry, plus the dispatcher that drives
//! them from decoded messages.

mod context;
pub mod conntrack;
mod dispatcher;
pub mod events;
pub mod interfaces;
pub mod query;
pub mod routes;
pub mod session;

pub use context::{Engine, EngineState, SessionGuard};
pub use conntrack::{ConntrackEntry, ConntrackTable, ConntrackTimeouts, Direction, FlowKey};
pub use dispatcher::Dispatch;
pub use events::{ClientId, ClientRecord, ClientTable, Notification};
pub use interfaces::{InterfaceTable, PhyIf};
pub use query::{CursorState, QueryCursor};
pub use routes::{Route, RouteTable};
pub use session::SessionLock;
