//! FCI - forwarding engine control interface
//!
//! A command/query protocol between control-plane clients and a packet
//! forwarding engine. Clients register routes and connection-tracking
//! entries, query the engine's tables, and receive asynchronous events on a
//! back-channel. The engine side keeps the database and answers commands.

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod telemetry;
pub mod transport;

pub use error::{Error, Result};
