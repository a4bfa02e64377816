//! Engine server
//!
//! Hosts an [`Engine`] on a UDP socket. One task serializes everything:
//! commands, the aging timer, and events raised from outside through a
//! [`ServerHandle`]. Replies go out before the notifications a command
//! produced.

use crate::engine::{ClientId, Engine, Notification};
use crate::protocol::{HealthEvent, Message, MAX_DATAGRAM_LEN};
use crate::{Error, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const EVENT_QUEUE_LEN: usize = 64;

/// Quiet period that ends the shutdown drain
const DRAIN_GRACE: Duration = Duration::from_millis(20);

/// Most datagrams answered after shutdown was requested
const DRAIN_MAX: usize = 64;

pub struct EngineServer {
    socket: UdpSocket,
    engine: Arc<Engine>,
    aging_interval: Option<Duration>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
    events_tx: mpsc::Sender<HealthEvent>,
    events_rx: mpsc::Receiver<HealthEvent>,
}

/// Control handle for a running server
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown_tx: broadcast::Sender<()>,
    events_tx: mpsc::Sender<HealthEvent>,
}

impl ServerHandle {
    /// Ask the server loop to exit
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Broadcast a health-monitor event to every subscribed client
    pub async fn raise_health_event(&self, event: HealthEvent) -> Result<()> {
        self.events_tx.send(event).await.map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "engine server stopped",
            ))
        })
    }
}

impl EngineServer {
    /// Bind the command socket
    pub async fn bind(addr: SocketAddr, engine: Arc<Engine>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_LEN);
        Ok(Self {
            socket,
            engine,
            aging_interval: None,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx,
        })
    }

    /// Run conntrack aging every `period`; `None` disables it
    pub fn with_aging_interval(mut self, period: Option<Duration>) -> Self {
        self.aging_interval = period.filter(|p| !p.is_zero());
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown_tx: self.shutdown_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }

    /// Serve until shut down. The engine is shut down on return.
    pub async fn run(mut self) -> Result<()> {
        let local = self.socket.local_addr()?;
        info!("engine server listening on {}", local);

        let aging_enabled = self.aging_interval.is_some();
        let mut aging = interval(self.aging_interval.unwrap_or(Duration::from_secs(3600)));
        aging.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("engine server shutdown signal received");
                    break;
                }
                Some(event) = self.events_rx.recv() => {
                    let notifications = self.engine.raise_health_event(&event);
                    self.deliver(notifications).await;
                }
                _ = aging.tick(), if aging_enabled => {
                    let notifications = self.engine.run_aging(Instant::now().into_std());
                    self.deliver(notifications).await;
                }
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, peer)) => self.handle_datagram(&buf[..n], peer).await,
                        Err(e) => warn!("engine server receive error: {}", e),
                    }
                }
            }
        }

        self.drain(&mut buf).await;
        self.engine.shutdown();
        Ok(())
    }

    /// Answer commands already queued on the socket at shutdown
    async fn drain(&self, buf: &mut [u8]) {
        for _ in 0..DRAIN_MAX {
            match timeout(DRAIN_GRACE, self.socket.recv_from(buf)).await {
                Ok(Ok((n, peer))) => self.handle_datagram(&buf[..n], peer).await,
                Ok(Err(e)) => {
                    debug!("engine server drain stopped: {}", e);
                    break;
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        trace!("engine server received {} bytes from {}", datagram.len(), peer);

        let msg = match Message::decode(datagram) {
            Ok(m) => m,
            Err(e) => {
                self.engine.metrics().messages_malformed.inc();
                debug!("malformed message from {}: {}", peer, e);
                return;
            }
        };

        let dispatch = self.engine.dispatch(ClientId(peer), &msg);
        if let Err(e) = self.socket.send_to(&dispatch.reply.encode(), peer).await {
            warn!("failed to reply to {}: {}", peer, e);
        }
        self.deliver(dispatch.notifications).await;
    }

    /// Send events to back-channels. A failed send marks the client
    /// unreachable and is otherwise ignored.
    async fn deliver(&self, notifications: Vec<Notification>) {
        let metrics = self.engine.metrics();
        for notification in notifications {
            let datagram = notification.message.encode();
            match self.socket.send_to(&datagram, notification.addr).await {
                Ok(_) => {
                    metrics.notifications_sent.inc();
                    trace!(
                        "event {:#06x} delivered to {}",
                        notification.message.code(),
                        notification.client
                    );
                }
                Err(e) => {
                    metrics.notifications_failed.inc();
                    warn!(
                        "event delivery to {} ({}) failed: {}",
                        notification.client, notification.addr, e
                    );
                    self.engine.mark_unreachable(notification.client);
                }
            }
        }
    }
}
