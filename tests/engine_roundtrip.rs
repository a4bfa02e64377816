//! Client and engine talking over real UDP sockets on loopback

use fci::config::{Config, InterfaceConfig};
use fci::engine::Engine;
use fci::protocol::{
    cmd, Action, ConntrackRecord, Directions, HealthEvent, IpFamily, MacAddr, RouteRecord,
    Severity, Status, Tuple,
};
use fci::transport::{EngineServer, EventAction, FciClient, ServerHandle};
use fci::Error;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    addr: SocketAddr,
    handle: ServerHandle,
    engine: Arc<Engine>,
    task: JoinHandle<fci::Result<()>>,
}

impl Harness {
    async fn start() -> Self {
        let mut config = Config::default();
        config.interfaces = vec![InterfaceConfig::new("emac0"), InterfaceConfig::new("emac1")];
        let engine = Arc::new(Engine::new(&config).unwrap());
        let server = EngineServer::bind("127.0.0.1:0".parse().unwrap(), engine.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(server.run());
        Self {
            addr,
            handle,
            engine,
            task,
        }
    }

    async fn client(&self) -> FciClient {
        let mut client = FciClient::open(self.addr).await.unwrap();
        client.set_timeout(Duration::from_secs(2));
        client
    }

    async fn stop(self) {
        self.handle.shutdown();
        self.task.await.unwrap().unwrap();
    }
}

fn route(id: u32, dst: &str) -> RouteRecord {
    let dst_addr: IpAddr = dst.parse().unwrap();
    RouteRecord {
        mtu: 1500,
        src_mac: MacAddr([0x02, 0, 0, 0, 0, 0x01]),
        dst_mac: MacAddr([0x02, 0, 0, 0, 0, 0x02]),
        output_device: "emac1".to_string(),
        id,
        family: Some(IpFamily::of(&dst_addr)),
        dst_addr,
        hits: 0,
    }
}

fn tcp_flow(orig_route: u32, reply_route: u32) -> ConntrackRecord {
    let orig = Tuple::new(
        "10.0.0.1".parse().unwrap(),
        "192.168.1.1".parse().unwrap(),
        40000,
        443,
    )
    .with_route(orig_route);
    let reply = orig.reversed().with_route(reply_route);
    ConntrackRecord::new(6, orig, reply)
}

/// Wait for the next callback invocation
async fn next_event(rx: &mut mpsc::UnboundedReceiver<(u16, Vec<u8>)>) -> (u16, Vec<u8>) {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event delivered")
        .expect("listener gone")
}

fn status_of(err: Error) -> Status {
    match err {
        Error::Status { status, .. } => status,
        other => panic!("expected a status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_health_event_reaches_callback_once() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .register_callback(move |code: u16, payload: &[u8]| {
            let _ = tx.send((code, payload.to_vec()));
            EventAction::Continue
        })
        .await
        .unwrap();
    let back_channel = client.back_channel_addr().unwrap();

    let event = HealthEvent {
        id: 7,
        severity: Severity::Warning,
        text: "fan speed low".to_string(),
    };
    harness.handle.raise_health_event(event.clone()).await.unwrap();

    let (code, payload) = next_event(&mut rx).await;
    assert_eq!(code, cmd::HEALTH_MONITOR_EVENT);
    assert_eq!(HealthEvent::decode(&payload).unwrap(), event);

    client.unregister_callback().await.unwrap();
    assert!(!client.has_callback());
    assert!(rx.recv().await.is_none());

    // Back-channel socket is released
    assert!(UdpSocket::bind(back_channel).await.is_ok());

    // Unregistered clients get nothing
    harness.handle.raise_health_event(event).await.unwrap();
    assert!(matches!(
        client.unregister_callback().await,
        Err(Error::NotRegistered)
    ));

    client.close().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn test_route_removal_notifies_owner() {
    let harness = Harness::start().await;
    let mut owner = harness.client().await;
    let mut other = harness.client().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    owner
        .register_callback(move |code: u16, payload: &[u8]| {
            let _ = tx.send((code, payload.to_vec()));
            EventAction::Continue
        })
        .await
        .unwrap();

    owner.register_route(&route(1, "192.168.1.1")).await.unwrap();
    owner.register_route(&route(2, "192.168.1.2")).await.unwrap();
    other.register_conntrack(&tcp_flow(1, 2)).await.unwrap();

    // Removed by another client; the owner still hears about it
    other.deregister_route(1).await.unwrap();

    let (code, payload) = next_event(&mut rx).await;
    assert_eq!(code, cmd::IP_ROUTE);
    assert_eq!(&payload[0..2], &Action::Removed.as_u16().to_be_bytes());
    assert_eq!(RouteRecord::decode(&payload).unwrap().id, 1);

    // The conntrack using route 1 went with it
    assert!(other.query_conntracks(IpFamily::V4).await.unwrap().is_empty());
    assert_eq!(harness.engine.metrics().conntracks_cascaded.get(), 1);

    let err = other.deregister_route(1).await.unwrap_err();
    assert_eq!(status_of(err), Status::EntryNotFound);

    owner.close().await.unwrap();
    other.close().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn test_query_routes_in_insertion_order() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    assert!(client.query_routes().await.unwrap().is_empty());

    for (id, dst) in [(30, "10.0.0.30"), (10, "10.0.0.10"), (20, "2001:db8::20")] {
        client.register_route(&route(id, dst)).await.unwrap();
    }
    let err = client
        .register_route(&route(10, "10.0.0.99"))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), Status::AlreadyRegistered);

    let routes = client.query_routes().await.unwrap();
    let ids: Vec<u32> = routes.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![30, 10, 20]);
    assert_eq!(routes[2].family, Some(IpFamily::V6));
    assert_eq!(routes[2].dst_addr, "2001:db8::20".parse::<IpAddr>().unwrap());
    assert_eq!(routes[0].output_device, "emac1");

    client.close().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn test_conntrack_nat_query() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    client.register_route(&route(1, "192.168.1.1")).await.unwrap();
    client.register_route(&route(2, "10.0.0.1")).await.unwrap();

    // Destination NAT: reply comes from the real server
    let mut nat = tcp_flow(1, 2);
    nat.reply.saddr = "172.16.0.5".parse().unwrap();
    nat.reply.sport = 8443;
    assert!(nat.is_nat());
    assert!(nat.is_pat());
    client.register_conntrack(&nat).await.unwrap();

    // Reply-only flow on a different tuple
    let mut half = tcp_flow(0, 2);
    half.orig.sport = 40001;
    half.reply = half.orig.reversed().with_route(2);
    half.directions = Directions::ReplyOnly;
    client.register_conntrack(&half).await.unwrap();

    let err = client.register_conntrack(&nat).await.unwrap_err();
    assert_eq!(status_of(err), Status::AlreadyRegistered);

    let listed = client.query_conntracks(IpFamily::V4).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].orig, nat.orig);
    assert_eq!(listed[0].reply, nat.reply);
    assert_eq!(listed[1].directions, Directions::ReplyOnly);
    assert!(client.query_conntracks(IpFamily::V6).await.unwrap().is_empty());

    // Timeout for the connection's protocol
    client.set_conntrack_timeout(6, 60).await.unwrap();
    let err = client.set_conntrack_timeout(6, 0).await.unwrap_err();
    assert_eq!(status_of(err), Status::WrongParam);

    client.deregister_conntrack(&nat).await.unwrap();
    client.reset(IpFamily::V4).await.unwrap();
    assert!(client.query_conntracks(IpFamily::V4).await.unwrap().is_empty());
    assert!(client.query_routes().await.unwrap().is_empty());

    client.close().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn test_session_lock_errors() {
    let harness = Harness::start().await;
    let mut a = harness.client().await;
    let mut b = harness.client().await;

    let err = a.unlock_session().await.unwrap_err();
    assert_eq!(status_of(err), Status::NotLocked);

    a.lock_session().await.unwrap();
    let err = a.lock_session().await.unwrap_err();
    assert_eq!(status_of(err), Status::AlreadyLocked);
    let err = b.lock_session().await.unwrap_err();
    assert_eq!(status_of(err), Status::AlreadyLocked);
    let err = b.unlock_session().await.unwrap_err();
    assert_eq!(status_of(err), Status::WrongSession);

    a.unlock_session().await.unwrap();
    b.lock_session().await.unwrap();
    b.unlock_session().await.unwrap();

    a.close().await.unwrap();
    b.close().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn test_phy_if_update_under_lock() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    let ifaces = client.query_phy_ifs().await.unwrap();
    assert_eq!(ifaces.len(), 2);
    assert_eq!(ifaces[0].name, "emac0");
    assert!(ifaces[1].enabled);

    let mut emac1 = ifaces[1].clone();
    emac1.enabled = false;
    emac1.promiscuous = true;

    // Not without the lock
    let err = client.update_phy_if(&emac1).await.unwrap_err();
    assert_eq!(status_of(err), Status::WrongSession);

    let update = emac1.clone();
    let listed = client
        .with_session_lock(move |c| {
            Box::pin(async move {
                c.update_phy_if(&update).await?;
                c.query_phy_ifs().await
            })
        })
        .await
        .unwrap();
    assert!(!listed[1].enabled);
    assert!(listed[1].promiscuous);

    // Lock was released on the way out
    client.lock_session().await.unwrap();
    client.unlock_session().await.unwrap();

    client.close().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn test_close_releases_lock() {
    let harness = Harness::start().await;
    let mut a = harness.client().await;
    let mut b = harness.client().await;

    a.lock_session().await.unwrap();
    a.close().await.unwrap();

    b.lock_session().await.unwrap();
    b.close().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn test_commands_fail_after_shutdown() {
    let harness = Harness::start().await;
    let engine = harness.engine.clone();
    let addr = harness.addr;
    harness.stop().await;
    assert!(!engine.is_running());

    // Nobody answers any more
    let mut client = FciClient::open(addr).await.unwrap();
    client.set_timeout(Duration::from_millis(200));
    let err = client.query_routes().await.unwrap_err();
    assert!(err.is_transport());
}
