//! Back-channel listener
//!
//! One task per registered callback. The task owns the back-channel socket;
//! the socket is closed when the task ends, whether the callback asked to
//! stop, the listener was canceled, or the receive failed hard.

use crate::protocol::{Message, MessageKind, MAX_DATAGRAM_LEN};
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// What the listener does after a callback returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Continue,
    Stop,
}

/// Receiver of back-channel events
pub trait EventCallback: Send + 'static {
    fn on_event(&mut self, code: u16, payload: &[u8]) -> EventAction;
}

impl<F> EventCallback for F
where
    F: FnMut(u16, &[u8]) -> EventAction + Send + 'static,
{
    fn on_event(&mut self, code: u16, payload: &[u8]) -> EventAction {
        self(code, payload)
    }
}

/// Handle to a running listener task
#[derive(Debug)]
pub struct EventListener {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl EventListener {
    /// Start listening on `socket`
    pub fn spawn(socket: UdpSocket, callback: Box<dyn EventCallback>) -> io::Result<Self> {
        let local_addr = socket.local_addr()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(listen(socket, callback, shutdown_rx));
        debug!("event listener started on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True once the task has ended on its own
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the task and wait for it. The socket is closed on return.
    pub async fn cancel(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("event listener on {} ended abnormally: {}", self.local_addr, e);
            }
        }
        debug!("event listener on {} stopped", self.local_addr);
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.shutdown_tx.send(());
        }
    }
}

/// Errors after which the next receive may succeed
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
    )
}

async fn listen(
    socket: UdpSocket,
    mut callback: Box<dyn EventCallback>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                trace!("event listener canceled");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                let (n, peer) = match result {
                    Ok(r) => r,
                    Err(e) if is_transient(&e) => {
                        warn!("back-channel receive error: {}", e);
                        continue;
                    }
                    Err(e) => {
                        error!("back-channel receive failed, listener exiting: {}", e);
                        break;
                    }
                };

                let msg = match Message::decode(&buf[..n]) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!("dropping malformed event from {}: {}", peer, e);
                        continue;
                    }
                };
                if msg.kind() != MessageKind::Cmd {
                    trace!("ignoring {:?} message on back-channel", msg.kind());
                    continue;
                }

                if callback.on_event(msg.code(), msg.payload()) == EventAction::Stop {
                    debug!("event callback requested stop");
                    break;
                }
            }
        }
    }
}
