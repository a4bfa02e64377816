//! Command dispatcher
//!
//! Validation happens in a fixed order before any handler runs: engine
//! running, known code, exact record size, known action, decodable fields.
//! A rejected command never touches the database.

use super::context::{Engine, EngineState};
use super::events::{ClientId, Notification};
use super::query::QueryCursor;
use crate::protocol::record::{self, Record};
use crate::protocol::{
    cmd, Action, ClientRegistration, ConntrackRecord, IpFamily, Message, MessageKind,
    PhyIfRecord, Reply, RouteRecord, Status, TimeoutRecord,
};
use crate::Error;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, trace};

/// Outcome of one command: the reply for the caller and the events to
/// deliver once the reply is on its way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub reply: Message,
    pub notifications: Vec<Notification>,
}

type HandlerResult = std::result::Result<Reply, Status>;

fn done(result: std::result::Result<(), Status>) -> HandlerResult {
    result.map(|()| Reply::ok())
}

/// Serve QUERY / QUERY_CONT from one collection
fn query<V>(
    cursor: &mut QueryCursor,
    map: &BTreeMap<u64, V>,
    action: Action,
    encode: impl Fn(&V) -> Vec<u8>,
) -> HandlerResult {
    let value = match action {
        Action::Query => cursor.first(map)?,
        _ => cursor.next(map)?,
    };
    Ok(Reply::with_record(encode(value)))
}

impl Engine {
    /// Execute one message received from `client`
    pub fn dispatch(&self, client: ClientId, msg: &Message) -> Dispatch {
        let mut notifications = Vec::new();

        let reply = if !self.is_running() {
            Reply::status(Status::InternalFailure)
        } else {
            match msg.kind() {
                MessageKind::ClientRegister => self.handle_client_register(client, msg),
                MessageKind::ClientUnregister => {
                    self.unregister_client(client);
                    Reply::ok()
                }
                MessageKind::Cmd => {
                    let mut state = self.lock_state();
                    let reply = state
                        .execute(client, msg, Instant::now(), &mut notifications)
                        .unwrap_or_else(Reply::status);
                    state.update_gauges();
                    reply
                }
            }
        };

        self.metrics().record_command(msg.code(), reply.status.is_ok());
        debug!(
            "{} cmd {:#06x} action {:?} -> {}",
            client,
            msg.code(),
            msg.action(),
            reply.status
        );

        Dispatch {
            reply: reply.into_message(msg.code()),
            notifications,
        }
    }

    fn handle_client_register(&self, client: ClientId, msg: &Message) -> Reply {
        match ClientRegistration::decode(msg.payload()) {
            Ok(registration) => {
                self.register_client(client, registration.addr);
                Reply::ok()
            }
            Err(e) => {
                debug!("{}: bad registration: {}", client, e);
                Reply::status(Status::WrongSize)
            }
        }
    }
}

impl EngineState {
    fn execute(
        &mut self,
        client: ClientId,
        msg: &Message,
        now: Instant,
        out: &mut Vec<Notification>,
    ) -> HandlerResult {
        let code = msg.code();
        let expected = record::record_len(code).ok_or(Status::UnknownCommand)?;
        if msg.len() != expected {
            return Err(Status::WrongSize);
        }

        let action = if record::has_action(code) {
            let raw = msg.action().ok_or(Status::WrongSize)?;
            Some(Action::from_u16(raw).ok_or(Status::UnknownAction)?)
        } else {
            None
        };

        let (_, _, record) = record::decode(msg).map_err(|e| match e {
            Error::MalformedRecord { .. } => Status::WrongSize,
            _ => Status::WrongParam,
        })?;
        trace!("{} {:#06x}: {:?}", client, code, record);

        match (code, action, record) {
            (cmd::IP_ROUTE, Some(action), Record::Route(r)) => self.handle_route(client, action, &r, out),
            (cmd::IPV4_CONNTRACK | cmd::IPV6_CONNTRACK, Some(action), Record::Conntrack(r)) => {
                self.handle_conntrack(action, r, now)
            }
            (cmd::IPV4_RESET, _, _) => {
                self.reset_v4(out);
                Ok(Reply::ok())
            }
            (cmd::IPV6_RESET, _, _) => {
                self.reset_v6(out);
                Ok(Reply::ok())
            }
            (cmd::IPV4_SET_TIMEOUT, _, Record::Timeout(t)) => self.handle_timeout(&t),
            (cmd::IF_LOCK_SESSION, _, _) => done(self.session.lock(client)),
            (cmd::IF_UNLOCK_SESSION, _, _) => done(self.session.unlock(client)),
            (cmd::PHY_IF, Some(action), Record::PhyIf(r)) => self.handle_phy_if(client, action, &r),
            // Event-only codes are never accepted as commands
            _ => Err(Status::UnknownCommand),
        }
    }

    fn handle_route(
        &mut self,
        client: ClientId,
        action: Action,
        record: &RouteRecord,
        out: &mut Vec<Notification>,
    ) -> HandlerResult {
        match action {
            Action::Register => done(self.add_route(record, Some(client))),
            Action::Deregister => done(self.drop_route(record.id, out)),
            Action::Query | Action::QueryCont => query(
                &mut self.route_cursor,
                self.routes.entries(),
                action,
                |route| route.to_record().encode(action),
            ),
            _ => Err(Status::UnknownAction),
        }
    }

    fn handle_conntrack(&mut self, action: Action, record: ConntrackRecord, now: Instant) -> HandlerResult {
        match action {
            Action::Register => done(self.add_conntrack(record, now)),
            Action::Deregister => done(self.delete_conntrack(&record)),
            Action::Update => done(self.update_conntrack(&record)),
            Action::KeepAlive => done(self.keep_alive_conntrack(&record, now)),
            Action::Query | Action::QueryCont => {
                let (cursor, table) = match record.family {
                    IpFamily::V4 => (&mut self.conntrack_v4_cursor, &self.conntracks_v4),
                    IpFamily::V6 => (&mut self.conntrack_v6_cursor, &self.conntracks_v6),
                };
                query(cursor, table.entries(), action, |entry| {
                    entry.record.encode(action)
                })
            }
            _ => Err(Status::UnknownAction),
        }
    }

    fn handle_timeout(&mut self, record: &TimeoutRecord) -> HandlerResult {
        done(self.set_timeout(record.protocol, record.timeout_secs))
    }

    /// Interface UPDATE reads and conditionally writes the interface
    /// database; the caller must hold the session lock.
    fn handle_phy_if(&mut self, client: ClientId, action: Action, record: &PhyIfRecord) -> HandlerResult {
        match action {
            Action::Update => {
                if !self.session.is_held_by(client) {
                    return Err(Status::WrongSession);
                }
                done(self.interfaces.update(record))
            }
            Action::Query | Action::QueryCont => query(
                &mut self.phy_if_cursor,
                self.interfaces.entries(),
                action,
                |iface| iface.to_record().encode(action),
            ),
            _ => Err(Status::UnknownAction),
        }
    }
}
