//! Client registry and event notifications
//!
//! Handlers never write to sockets. They queue `Notification`s that the
//! hosting server delivers to back-channel addresses after the command has
//! been answered.

use crate::protocol::Message;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Identity of a client: the address of its command socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub SocketAddr);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client@{}", self.0)
    }
}

/// Engine-side view of a client with a back-channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: ClientId,
    pub back_channel: SocketAddr,
    /// Cleared when a delivery to the back-channel fails
    pub alive: bool,
}

/// An event message addressed to one client's back-channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub client: ClientId,
    pub addr: SocketAddr,
    pub message: Message,
}

/// Clients that registered a back-channel
#[derive(Debug, Default)]
pub struct ClientTable {
    clients: BTreeMap<ClientId, ClientRecord>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the back-channel of `id`
    pub fn register(&mut self, id: ClientId, back_channel: SocketAddr) {
        debug!("{} registered back-channel {}", id, back_channel);
        self.clients.insert(
            id,
            ClientRecord {
                id,
                back_channel,
                alive: true,
            },
        );
    }

    pub fn unregister(&mut self, id: ClientId) -> Option<ClientRecord> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&ClientRecord> {
        self.clients.get(&id)
    }

    pub fn mark_unreachable(&mut self, id: ClientId) {
        if let Some(record) = self.clients.get_mut(&id) {
            record.alive = false;
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
    }

    /// Address `message` to a single client.
    ///
    /// A client without a back-channel is logged and skipped.
    pub fn unicast(&self, id: ClientId, message: Message) -> Option<Notification> {
        match self.clients.get(&id) {
            Some(record) => Some(Notification {
                client: id,
                addr: record.back_channel,
                message,
            }),
            None => {
                warn!(
                    "{} has no back-channel, dropping event {:#06x}",
                    id,
                    message.code()
                );
                None
            }
        }
    }

    /// Address `message` to every live subscriber
    pub fn broadcast(&self, message: &Message) -> Vec<Notification> {
        self.clients
            .values()
            .filter(|record| record.alive)
            .map(|record| Notification {
                client: record.id,
                addr: record.back_channel,
                message: message.clone(),
            })
            .collect()
    }
}
