//! FCI client
//!
//! A client owns a command socket connected to the engine and, once a
//! callback is registered, a back-channel served by an [`EventListener`].
//! Commands are strictly sequential: `send` takes `&mut self`, so at most
//! one request is outstanding per client.

use super::listener::{EventCallback, EventListener};
use super::DEFAULT_TIMEOUT;
use crate::config::EngineConfig;
use crate::protocol::record::{self, Record};
use crate::protocol::{
    cmd, Action, ClientRegistration, ConntrackRecord, IpFamily, MacAddr, Message, MessageKind,
    PhyIfRecord, Reply, RouteRecord, Status, TimeoutRecord, Tuple, MAX_DATAGRAM_LEN,
};
use crate::{Error, Result};
use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Future returned by the body of [`FciClient::with_session_lock`]
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

#[derive(Debug)]
pub struct FciClient {
    socket: UdpSocket,
    engine_addr: SocketAddr,
    timeout: Duration,
    listener: Option<EventListener>,
}

impl FciClient {
    /// Bind a command socket and connect it to the engine
    pub async fn open(engine_addr: SocketAddr) -> Result<Self> {
        let bind: SocketAddr = match engine_addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(engine_addr).await?;
        debug!("fci client {} connected to {}", socket.local_addr()?, engine_addr);
        Ok(Self {
            socket,
            engine_addr,
            timeout: DEFAULT_TIMEOUT,
            listener: None,
        })
    }

    /// Open a client for the engine described by `config`
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let mut client = Self::open(config.listen).await?;
        if config.command_timeout_ms > 0 {
            client.set_timeout(Duration::from_millis(config.command_timeout_ms));
        }
        Ok(client)
    }

    /// Address the engine knows this client by
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn engine_addr(&self) -> SocketAddr {
        self.engine_addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send one message and wait for its reply.
    ///
    /// Replies to earlier, timed-out requests are discarded. Expiry of the
    /// receive timeout is `Error::Timeout`; transport errors are never retried.
    pub async fn send(&mut self, msg: &Message) -> Result<Reply> {
        self.socket.send(&msg.encode()).await?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            let n = timeout_at(deadline, self.socket.recv(&mut buf))
                .await
                .map_err(|_| Error::Timeout(self.timeout))??;
            let reply = Message::decode(&buf[..n])?;
            if reply.code() != msg.code() {
                debug!(
                    "discarding stale reply {:#06x} while waiting for {:#06x}",
                    reply.code(),
                    msg.code()
                );
                continue;
            }
            return Reply::from_message(&reply);
        }
    }

    async fn command(&mut self, code: u16, action: Action, record: &Record) -> Result<Reply> {
        let msg = record::encode(code, action, record)?;
        self.send(&msg).await
    }

    /// Like `command`, with a non-OK status turned into `Error::Status`
    async fn command_ok(&mut self, code: u16, action: Action, record: &Record) -> Result<Reply> {
        let reply = self.command(code, action, record).await?;
        if reply.status.is_ok() {
            Ok(reply)
        } else {
            Err(Error::Status {
                code,
                status: reply.status,
            })
        }
    }

    /// Run QUERY then QUERY_CONT until the engine reports the end of the list
    async fn query_all<T>(
        &mut self,
        code: u16,
        template: &Record,
        decode: impl Fn(&[u8]) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut action = Action::Query;
        loop {
            let reply = self.command(code, action, template).await?;
            match reply.status {
                Status::Ok => items.push(decode(&reply.record)?),
                Status::EntryNotFound => return Ok(items),
                status => return Err(Error::Status { code, status }),
            }
            action = Action::QueryCont;
        }
    }

    // ------------------------------------------------------------------
    // Back-channel
    // ------------------------------------------------------------------

    /// Register an event callback, replacing any existing one.
    ///
    /// Opens the back-channel socket, announces it to the engine and starts
    /// the listener. If announcing fails the socket is closed and the
    /// original error returned.
    pub async fn register_callback<C: EventCallback>(&mut self, callback: C) -> Result<()> {
        if let Some(previous) = self.listener.take() {
            previous.cancel().await;
        }

        let local_ip = self.socket.local_addr()?.ip();
        let socket = UdpSocket::bind((local_ip, 0)).await?;
        let addr = socket.local_addr()?;

        let msg = Message::new(
            MessageKind::ClientRegister,
            0,
            ClientRegistration { addr }.encode(),
        )?;
        let reply = self.send(&msg).await?;
        if !reply.status.is_ok() {
            return Err(Error::Status {
                code: 0,
                status: reply.status,
            });
        }

        self.listener = Some(EventListener::spawn(socket, Box::new(callback))?);
        info!("back-channel registered on {}", addr);
        Ok(())
    }

    /// Withdraw the callback and tear down the back-channel
    pub async fn unregister_callback(&mut self) -> Result<()> {
        let listener = self.listener.take().ok_or(Error::NotRegistered)?;
        let result = self.send_unregister().await;
        listener.cancel().await;
        result
    }

    async fn send_unregister(&mut self) -> Result<()> {
        let msg = Message::new(MessageKind::ClientUnregister, 0, Vec::new())?;
        let reply = self.send(&msg).await?;
        if reply.status.is_ok() {
            Ok(())
        } else {
            Err(Error::Status {
                code: 0,
                status: reply.status,
            })
        }
    }

    pub fn has_callback(&self) -> bool {
        self.listener.is_some()
    }

    /// Local address of the back-channel, while one is registered
    pub fn back_channel_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(EventListener::local_addr)
    }

    /// Say goodbye to the engine and release every socket.
    ///
    /// The engine forgets the client and releases the session lock if the
    /// client held it.
    pub async fn close(mut self) -> Result<()> {
        let result = self.send_unregister().await;
        if let Some(listener) = self.listener.take() {
            listener.cancel().await;
        }
        result
    }

    // ------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------

    pub async fn register_route(&mut self, route: &RouteRecord) -> Result<()> {
        self.command_ok(cmd::IP_ROUTE, Action::Register, &Record::Route(route.clone()))
            .await
            .map(drop)
    }

    pub async fn deregister_route(&mut self, id: u32) -> Result<()> {
        let record = Record::Route(RouteRecord::with_id(id));
        self.command_ok(cmd::IP_ROUTE, Action::Deregister, &record)
            .await
            .map(drop)
    }

    /// List every route, oldest first
    pub async fn query_routes(&mut self) -> Result<Vec<RouteRecord>> {
        let template = Record::Route(RouteRecord::with_id(0));
        self.query_all(cmd::IP_ROUTE, &template, RouteRecord::decode)
            .await
    }

    // ------------------------------------------------------------------
    // Conntracks
    // ------------------------------------------------------------------

    pub async fn register_conntrack(&mut self, ct: &ConntrackRecord) -> Result<()> {
        self.command_ok(ct.code(), Action::Register, &Record::Conntrack(ct.clone()))
            .await
            .map(drop)
    }

    /// Change the TTL-decrement flag of an existing conntrack
    pub async fn update_conntrack(&mut self, ct: &ConntrackRecord) -> Result<()> {
        self.command_ok(ct.code(), Action::Update, &Record::Conntrack(ct.clone()))
            .await
            .map(drop)
    }

    pub async fn keep_alive_conntrack(&mut self, ct: &ConntrackRecord) -> Result<()> {
        self.command_ok(ct.code(), Action::KeepAlive, &Record::Conntrack(ct.clone()))
            .await
            .map(drop)
    }

    pub async fn deregister_conntrack(&mut self, ct: &ConntrackRecord) -> Result<()> {
        self.command_ok(ct.code(), Action::Deregister, &Record::Conntrack(ct.clone()))
            .await
            .map(drop)
    }

    /// List every conntrack of `family`, oldest first
    pub async fn query_conntracks(&mut self, family: IpFamily) -> Result<Vec<ConntrackRecord>> {
        let unspecified = family.unspecified();
        let template = ConntrackRecord::new(
            0,
            Tuple::new(unspecified, unspecified, 0, 0),
            Tuple::new(unspecified, unspecified, 0, 0),
        );
        let code = template.code();
        self.query_all(code, &Record::Conntrack(template), |buf| {
            ConntrackRecord::decode(family, buf)
        })
        .await
    }

    /// Remove every conntrack and route of `family`
    pub async fn reset(&mut self, family: IpFamily) -> Result<()> {
        let code = match family {
            IpFamily::V4 => cmd::IPV4_RESET,
            IpFamily::V6 => cmd::IPV6_RESET,
        };
        self.command_ok(code, Action::Register, &Record::Empty)
            .await
            .map(drop)
    }

    /// Set the conntrack idle timeout of a protocol class (0 for "others")
    pub async fn set_conntrack_timeout(&mut self, protocol: u16, timeout_secs: u32) -> Result<()> {
        let record = Record::Timeout(TimeoutRecord {
            protocol,
            timeout_secs,
        });
        self.command_ok(cmd::IPV4_SET_TIMEOUT, Action::Register, &record)
            .await
            .map(drop)
    }

    // ------------------------------------------------------------------
    // Interfaces and the session lock
    // ------------------------------------------------------------------

    pub async fn lock_session(&mut self) -> Result<()> {
        self.command_ok(cmd::IF_LOCK_SESSION, Action::Register, &Record::Empty)
            .await
            .map(drop)
    }

    pub async fn unlock_session(&mut self) -> Result<()> {
        self.command_ok(cmd::IF_UNLOCK_SESSION, Action::Register, &Record::Empty)
            .await
            .map(drop)
    }

    /// Run `body` while holding the session lock.
    ///
    /// The lock is released on every return path of `body`. An unlock
    /// failure is reported only if `body` itself succeeded.
    pub async fn with_session_lock<T, F>(&mut self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut FciClient) -> ClientFuture<'a, T>,
    {
        self.lock_session().await?;
        let result = body(self).await;
        let unlocked = self.unlock_session().await;
        match (result, unlocked) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), unlocked) => {
                if let Err(unlock_err) = unlocked {
                    warn!("session unlock after failure also failed: {}", unlock_err);
                }
                Err(e)
            }
        }
    }

    /// List every physical interface
    pub async fn query_phy_ifs(&mut self) -> Result<Vec<PhyIfRecord>> {
        let template = Record::PhyIf(PhyIfRecord {
            id: 0,
            name: String::new(),
            mac: MacAddr::ZERO,
            enabled: false,
            promiscuous: false,
            rx_packets: 0,
            tx_packets: 0,
        });
        self.query_all(cmd::PHY_IF, &template, PhyIfRecord::decode)
            .await
    }

    /// Update the enabled/promiscuous bits. Requires the session lock.
    pub async fn update_phy_if(&mut self, iface: &PhyIfRecord) -> Result<()> {
        self.command_ok(cmd::PHY_IF, Action::Update, &Record::PhyIf(iface.clone()))
            .await
            .map(drop)
    }
}
