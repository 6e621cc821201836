//! A player session: one task that owns the client connection, its
//! backend connections, the player state and every packet handler.

use crate::{
    command::CommandSource,
    config::ServerInfo,
    connection::{BoxedStream, ConnKey, Connection, ConnectionError, ConnectionOptions},
    messages::translate,
    player::ConnectedPlayer,
    protocol::{
        component::Component,
        packet::{InboundPacket, Packet, RawPacket, SystemChat},
        ConnectionState, Direction, ProtocolVersion,
    },
    proxy::ProxyServer,
    switch::{ConnectFailure, ConnectionResult},
};
use ahash::AHashMap;
use bytes::Bytes;
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::{select, sync::oneshot};
use tokio_util::sync::CancellationToken;

mod backend;
mod client;
mod handler;
mod handshake;
mod login;

pub(crate) use backend::{
    BackendConfigHandler, BackendLoginHandler, BackendPlayHandler, TransitionHandler,
};
pub(crate) use client::{ClientConfigHandler, ClientPlayHandler, InitialConnectHandler};
pub use handler::SessionHandler;
pub(crate) use handshake::{HandshakeHandler, StatusHandler};
pub(crate) use login::LoginHandler;

/// Capacity of the channel reader tasks feed. Full means the readers wait.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Work sent to a session from another task.
pub type SessionTask = Box<dyn FnOnce(&mut Session) + Send>;

/// What the IO tasks of a session report.
pub enum SessionEvent {
    Data { key: ConnKey, data: Bytes },
    Closed {
        key: ConnKey,
        error: Option<ConnectionError>,
    },
}

#[derive(strum::IntoStaticStr)]
pub(crate) enum ClientHandler {
    Handshake(HandshakeHandler),
    Status(StatusHandler),
    Login(LoginHandler),
    Config(ClientConfigHandler),
    Play(ClientPlayHandler),
    InitialConnect(InitialConnectHandler),
}

impl ClientHandler {
    fn as_handler(&mut self) -> &mut dyn SessionHandler {
        match self {
            ClientHandler::Handshake(handler) => handler,
            ClientHandler::Status(handler) => handler,
            ClientHandler::Login(handler) => handler,
            ClientHandler::Config(handler) => handler,
            ClientHandler::Play(handler) => handler,
            ClientHandler::InitialConnect(handler) => handler,
        }
    }
}

#[derive(strum::IntoStaticStr)]
pub(crate) enum BackendHandler {
    Login(BackendLoginHandler),
    Config(BackendConfigHandler),
    Transition(TransitionHandler),
    Play(BackendPlayHandler),
}

impl BackendHandler {
    fn as_handler(&mut self) -> &mut dyn SessionHandler {
        match self {
            BackendHandler::Login(handler) => handler,
            BackendHandler::Config(handler) => handler,
            BackendHandler::Transition(handler) => handler,
            BackendHandler::Play(handler) => handler,
        }
    }
}

/// A backend connection and what the session knows about it.
pub(crate) struct BackendSlot {
    pub(crate) conn: Connection,
    handler: Option<BackendHandler>,
    pub(crate) server: ServerInfo,
    /// Resolved once the switch to this backend ends.
    pub(crate) resolver: Option<oneshot::Sender<ConnectionResult>>,
    /// Set once JoinGame from this backend was handled.
    pub(crate) joined: bool,
}

/// Facts from the client's handshake.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandshakeInfo {
    pub(crate) virtual_host: String,
    pub(crate) legacy_forge: bool,
}

pub struct Session {
    pub(crate) proxy: Arc<ProxyServer>,
    pub(crate) client: Connection,
    client_handler: Option<ClientHandler>,
    pub(crate) backends: AHashMap<u64, BackendSlot>,
    next_backend: u64,
    pub(crate) player: Option<ConnectedPlayer>,
    pub(crate) handshake: HandshakeInfo,
    events: flume::Sender<SessionEvent>,
    tasks: flume::Sender<SessionTask>,
    cancel: CancellationToken,
}

/// Runs the session of a freshly accepted client until it disconnects.
pub async fn serve(proxy: Arc<ProxyServer>, stream: BoxedStream, remote: SocketAddr) {
    let (events, event_rx) = flume::bounded(EVENT_CHANNEL_CAPACITY);
    let (tasks, task_rx) = flume::unbounded();
    let cancel = proxy.shutdown_token().child_token();
    let client = Connection::spawn(
        stream,
        ConnectionOptions {
            key: ConnKey::Client,
            remote,
            inbound: Direction::Serverbound,
            version: ProtocolVersion::MINIMUM,
            read_timeout: proxy.config.read_timeout(),
        },
        events.clone(),
        &cancel,
    );

    let mut session = Session {
        proxy,
        client,
        client_handler: Some(ClientHandler::Handshake(HandshakeHandler)),
        backends: AHashMap::new(),
        next_backend: 0,
        player: None,
        handshake: HandshakeInfo::default(),
        events,
        tasks,
        cancel,
    };
    session.run(event_rx, task_rx).await;
}

impl Session {
    async fn run(
        &mut self,
        events: flume::Receiver<SessionEvent>,
        tasks: flume::Receiver<SessionTask>,
    ) {
        let cancel = self.cancel.clone();
        while !self.client.is_closed() {
            select! {
                _ = cancel.cancelled() => {
                    self.client.close(Some(translate("velocity.kick.shutdown", [])));
                }
                event = events.recv_async() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
                task = tasks.recv_async() => match task {
                    Ok(task) => task(self),
                    Err(_) => break,
                },
            }
        }
        self.teardown();
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Data { key, data } => self.receive(key, &data),
            SessionEvent::Closed { key, error } => self.connection_lost(key, error),
        }
    }

    fn receive(&mut self, key: ConnKey, data: &[u8]) {
        match self.connection_mut(key) {
            Some(conn) => conn.give_data(data),
            None => return,
        }
        loop {
            let next = match self.connection_mut(key) {
                Some(conn) if !conn.is_closed() => conn.next_packet(),
                _ => return,
            };
            match next {
                Ok(Some(packet)) => self.dispatch(key, packet),
                Ok(None) => return,
                Err(e) => {
                    self.connection_failed(key, e);
                    return;
                }
            }
        }
    }

    fn dispatch(&mut self, key: ConnKey, inbound: InboundPacket) {
        match key {
            ConnKey::Client => self.with_client_handler(|handler, session| {
                handler::deliver(handler.as_handler(), session, &inbound)
            }),
            ConnKey::Backend(id) => self.with_backend_handler(id, |handler, session| {
                handler::deliver(handler.as_handler(), session, &inbound)
            }),
        }
    }

    pub(crate) fn connection_mut(&mut self, key: ConnKey) -> Option<&mut Connection> {
        match key {
            ConnKey::Client => Some(&mut self.client),
            ConnKey::Backend(id) => self.backends.get_mut(&id).map(|slot| &mut slot.conn),
        }
    }

    pub(crate) fn backend_mut(&mut self, id: u64) -> Option<&mut Connection> {
        self.backends.get_mut(&id).map(|slot| &mut slot.conn)
    }

    /// Runs `f` with the client handler taken out of the session. The
    /// handler goes back unless `f` installed another one.
    pub(crate) fn with_client_handler(
        &mut self,
        f: impl FnOnce(&mut ClientHandler, &mut Session),
    ) {
        let Some(mut handler) = self.client_handler.take() else {
            return;
        };
        f(&mut handler, self);
        if self.client_handler.is_none() {
            self.client_handler = Some(handler);
        }
    }

    /// Like [`with_client_handler`](Self::with_client_handler). If `f`
    /// removed the backend, the handler learns it was disconnected.
    pub(crate) fn with_backend_handler(
        &mut self,
        id: u64,
        f: impl FnOnce(&mut BackendHandler, &mut Session),
    ) {
        let Some(mut handler) = self
            .backends
            .get_mut(&id)
            .and_then(|slot| slot.handler.take())
        else {
            return;
        };
        f(&mut handler, self);
        match self.backends.get_mut(&id) {
            Some(slot) => {
                if slot.handler.is_none() {
                    slot.handler = Some(handler);
                }
            }
            None => handler.as_handler().disconnected(self),
        }
    }

    /// Closes a backend and drops it from the session. Its handler is told
    /// unless it is running, in which case
    /// [`with_backend_handler`](Self::with_backend_handler) tells it.
    pub(crate) fn remove_backend(&mut self, id: u64) -> Option<BackendSlot> {
        let mut slot = self.backends.remove(&id)?;
        slot.conn.close(None);
        if let Some(mut handler) = slot.handler.take() {
            handler.as_handler().disconnected(self);
        }
        Some(slot)
    }

    pub(crate) fn awaiting_initial_connect(&self) -> bool {
        matches!(self.client_handler, Some(ClientHandler::InitialConnect(_)))
    }

    pub(crate) fn set_client_handler(&mut self, handler: ClientHandler) {
        tracing::debug!(
            "{}: client handler is now {}",
            self.describe(),
            <&'static str>::from(&handler)
        );
        self.client_handler = Some(handler);
    }

    pub(crate) fn set_backend_handler(&mut self, id: u64, handler: BackendHandler) {
        let name = <&'static str>::from(&handler);
        if let Some(slot) = self.backends.get_mut(&id) {
            tracing::debug!("backend #{id} ({}): handler is now {name}", slot.server.name);
            slot.handler = Some(handler);
        }
    }

    pub(crate) fn add_backend(
        &mut self,
        conn: Connection,
        server: ServerInfo,
        handler: BackendHandler,
    ) {
        let ConnKey::Backend(id) = conn.key() else {
            return;
        };
        self.backends.insert(
            id,
            BackendSlot {
                conn,
                handler: Some(handler),
                server,
                resolver: None,
                joined: false,
            },
        );
    }

    pub(crate) fn next_backend_key(&mut self) -> ConnKey {
        self.next_backend += 1;
        ConnKey::Backend(self.next_backend)
    }

    pub(crate) fn events(&self) -> flume::Sender<SessionEvent> {
        self.events.clone()
    }

    pub(crate) fn task_sender(&self) -> flume::Sender<SessionTask> {
        self.tasks.clone()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs `future` on its own task and applies `then` to the session
    /// with its output. Nothing is applied once the session has ended.
    pub(crate) fn spawn_then<T, F, G>(&self, future: F, then: G)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        G: FnOnce(&mut Session, T) + Send + 'static,
    {
        let tasks = self.tasks.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let value = select! {
                _ = cancel.cancelled() => return,
                value = future => value,
            };
            let task: SessionTask = Box::new(move |session: &mut Session| {
                if !session.cancel.is_cancelled() {
                    then(session, value);
                }
            });
            tasks.send(task).ok();
        });
    }

    /// Name of the player, or the client address before login.
    pub(crate) fn describe(&self) -> String {
        match &self.player {
            Some(player) => format!("[{}]", player.handle.username()),
            None => format!("[{}]", self.client.remote_address()),
        }
    }

    pub(crate) fn player(&self) -> Option<&ConnectedPlayer> {
        self.player.as_ref()
    }

    pub(crate) fn player_mut(&mut self) -> Option<&mut ConnectedPlayer> {
        self.player.as_mut()
    }

    pub(crate) fn command_source(&self) -> Option<CommandSource> {
        self.player
            .as_ref()
            .map(|player| CommandSource::Player(player.handle.clone()))
    }

    /// The backend the player is playing on.
    pub(crate) fn connected_backend(&self) -> Option<u64> {
        self.player.as_ref().and_then(|player| player.connected)
    }

    /// Where client packets go while configuring: the backend being
    /// switched to, else the current one.
    pub(crate) fn route_backend(&self) -> Option<u64> {
        self.player
            .as_ref()
            .and_then(|player| player.in_flight.or(player.connected))
    }

    pub(crate) fn forward_to_backend(&mut self, id: Option<u64>, raw: &RawPacket) {
        if let Some(conn) = id.and_then(|id| self.backend_mut(id)) {
            conn.write_raw(raw);
        }
    }

    pub(crate) fn write_to_connected(&mut self, packet: impl Into<Packet>) {
        if let Some(conn) = self.connected_backend().and_then(|id| self.backend_mut(id)) {
            conn.write(packet);
        }
    }

    pub(crate) fn client_failed(&mut self, error: ConnectionError) {
        self.connection_failed(ConnKey::Client, error);
    }

    pub fn send_player_message(&mut self, message: Component) {
        if self.client.state() == ConnectionState::Play {
            self.client.write(SystemChat::new(message));
        } else {
            tracing::debug!("{} not in play, dropping message: {message}", self.describe());
        }
    }

    pub fn disconnect(&mut self, reason: Component) {
        if !self.client.is_closed() {
            tracing::info!("{} disconnected: {}", self.describe(), reason.plain_text());
            self.client.close(Some(reason));
        }
    }

    /// A connection failed to decode or broke a protocol rule.
    fn connection_failed(&mut self, key: ConnKey, error: ConnectionError) {
        match key {
            ConnKey::Client => {
                tracing::warn!("{}: {error}", self.describe());
                let reason = matches!(
                    self.client.state(),
                    ConnectionState::Config | ConnectionState::Play
                )
                .then(|| translate("velocity.error.player-connection-error", []));
                self.client.close(reason);
            }
            ConnKey::Backend(id) => {
                tracing::warn!("{} backend #{id}: {error}", self.describe());
                self.backend_failed(id, ConnectFailure::Error(error.to_string()));
            }
        }
    }

    fn connection_lost(&mut self, key: ConnKey, error: Option<ConnectionError>) {
        match key {
            ConnKey::Client => {
                match error {
                    Some(e) => tracing::info!("{} lost connection: {e}", self.describe()),
                    None => tracing::info!("{} has disconnected", self.describe()),
                }
                self.client.close(None);
            }
            ConnKey::Backend(id) => {
                if !self.backends.contains_key(&id) {
                    return;
                }
                let reason =
                    error.map_or_else(|| "connection closed".to_owned(), |e| e.to_string());
                self.backend_failed(id, ConnectFailure::Error(reason));
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut handler) = self.client_handler.take() {
            handler.as_handler().disconnected(self);
        }
        let ids: Vec<u64> = self.backends.keys().copied().collect();
        for id in ids {
            self.remove_backend(id);
        }
        self.cancel.cancel();

        if let Some(player) = &self.player {
            let handle = player.handle.clone();
            self.proxy.players.unregister(&handle);
            tracing::info!("{} has left the proxy", self.describe());
            let hooks = Arc::clone(&self.proxy.hooks);
            tokio::spawn(async move { hooks.disconnect(&handle).await });
        }
    }
}

#[cfg(test)]
mod tests;
