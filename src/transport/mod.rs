//! UDP transport
//!
//! Client side: a command channel with one request in flight and an
//! optional back-channel served by a listener task. Engine side: a server
//! that hosts an [`Engine`](crate::engine::Engine).

pub mod client;
pub mod listener;
pub mod server;

pub use client::{ClientFuture, FciClient};
pub use listener::{EventAction, EventCallback, EventListener};
pub use server::{EngineServer, ServerHandle};

use std::time::Duration;

/// Command reply timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
