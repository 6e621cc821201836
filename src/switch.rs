//! Connecting a player to backends: the initial connection, server
//! switches, and what happens when a backend fails or kicks the player.
//!
//! At most one switch runs per player. A switch opens a new backend next
//! to the current one, logs it in, and swaps the two once the new backend
//! sends JoinGame. Until then the player keeps playing where they are.

use crate::{
    config::ServerInfo,
    connection::{BoxedStream, ConnKey, Connection, ConnectionError, ConnectionOptions},
    forwarding::{self, ForwardingMode},
    messages::translate,
    player::Reconfiguration,
    protocol::{
        component::Component,
        packet::{BossBar, Handshake, JoinGame, NextState, Respawn, ServerLogin},
        plugin_message, ConnectionState, Direction, ProtocolVersion,
    },
    session::{
        BackendHandler, BackendLoginHandler, BackendPlayHandler, ClientHandler, ClientPlayHandler,
        Session,
    },
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::oneshot;

/// Outcome of a connection request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionResult {
    Success,
    AlreadyConnected,
    ConnectionInProgress,
    /// An event hook cancelled the connection.
    ConnectionCancelled,
    /// The server refused the player.
    ServerDisconnected(Component),
    Failed(String),
}

/// Why a backend went away.
#[derive(Debug, Clone)]
pub(crate) enum ConnectFailure {
    /// The backend sent a Disconnect.
    Disconnected(Component),
    Error(String),
}

impl ConnectFailure {
    fn reason(&self) -> Component {
        match self {
            ConnectFailure::Disconnected(reason) => reason.clone(),
            ConnectFailure::Error(message) => Component::text(message),
        }
    }

    fn result(&self) -> ConnectionResult {
        match self {
            ConnectFailure::Disconnected(reason) => {
                ConnectionResult::ServerDisconnected(reason.clone())
            }
            ConnectFailure::Error(message) => ConnectionResult::Failed(message.clone()),
        }
    }
}

fn resolve(resolver: Option<oneshot::Sender<ConnectionResult>>, result: ConnectionResult) {
    if let Some(resolver) = resolver {
        resolver.send(result).ok();
    }
}

/// The dimension id the client is moved through so it drops its world.
fn other_dimension(dimension: i32) -> i32 {
    if dimension == 0 {
        -1
    } else {
        0
    }
}

impl Session {
    /// Connects to the first server of the try list.
    pub(crate) fn connect_initial(&mut self) {
        match self.next_server(None) {
            Some(server) => self.try_server(server),
            None => self.disconnect(translate("velocity.error.no-available-servers", [])),
        }
    }

    /// Connects to a try list server, which is not offered again until a
    /// switch succeeds.
    fn try_server(&mut self, name: String) {
        if let Some(player) = self.player_mut() {
            player.tried_servers.push(name.clone());
        }
        self.request_connect(&name, None);
    }

    /// The next try list server not attempted yet, other than `exclude`
    /// and the current one.
    fn next_server(&self, exclude: Option<&str>) -> Option<String> {
        let player = self.player.as_ref()?;
        let current = player.handle.current_server();
        self.proxy
            .config
            .try_servers
            .iter()
            .find(|name| {
                !player.tried_servers.contains(name)
                    && Some(name.as_str()) != exclude
                    && current.as_deref() != Some(name.as_str())
            })
            .cloned()
    }

    fn has_working_backend(&self) -> bool {
        self.connected_backend()
            .and_then(|id| self.backends.get(&id))
            .is_some_and(|slot| slot.joined)
    }

    /// Starts a switch to `name`. The outcome goes to `resolver`.
    pub(crate) fn request_connect(
        &mut self,
        name: &str,
        resolver: Option<oneshot::Sender<ConnectionResult>>,
    ) {
        let Some(server) = self.proxy.server(name) else {
            resolve(resolver, ConnectionResult::Failed(format!("unknown server '{name}'")));
            return;
        };
        let Some(player) = self.player.as_ref() else {
            resolve(resolver, ConnectionResult::Failed("not logged in".to_owned()));
            return;
        };
        if let Some(slot) = player.connected.and_then(|id| self.backends.get(&id)) {
            if slot.server.name == server.name {
                resolve(resolver, ConnectionResult::AlreadyConnected);
                return;
            }
            if !slot.joined {
                resolve(resolver, ConnectionResult::ConnectionInProgress);
                return;
            }
        }
        if player.connecting || player.in_flight.is_some() {
            resolve(resolver, ConnectionResult::ConnectionInProgress);
            return;
        }

        let handle = player.handle.clone();
        if let Some(player) = self.player.as_mut() {
            player.connecting = true;
        }
        let hooks = Arc::clone(&self.proxy.hooks);
        self.spawn_then(
            async move { hooks.pre_connect(&handle, &server).await },
            move |session, target| match target {
                Some(target) => session.open_backend(target, resolver),
                None => {
                    if let Some(player) = session.player_mut() {
                        player.connecting = false;
                    }
                    resolve(resolver, ConnectionResult::ConnectionCancelled);
                }
            },
        );
    }

    fn open_backend(
        &mut self,
        server: ServerInfo,
        resolver: Option<oneshot::Sender<ConnectionResult>>,
    ) {
        if self.proxy.config.forwarding_mode == ForwardingMode::Modern
            && self.client.version() < ProtocolVersion::V1_13
        {
            if let Some(player) = self.player_mut() {
                player.connecting = false;
            }
            let reason = translate("velocity.error.modern-forwarding-needs-new-client", []);
            self.connect_failed(&server, resolver, ConnectFailure::Disconnected(reason), false);
            return;
        }

        let connector = Arc::clone(&self.proxy.connector);
        let timeout = self.proxy.config.connection_timeout();
        let target = server.clone();
        self.spawn_then(
            async move {
                match tokio::time::timeout(timeout, connector.connect(&target)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("connection timed out")),
                }
            },
            move |session, result| {
                if let Some(player) = session.player_mut() {
                    player.connecting = false;
                }
                match result {
                    Ok((stream, remote)) => {
                        session.attach_backend(server, stream, remote, resolver)
                    }
                    Err(e) => {
                        let error = ConnectionError::BackendConnectFailure(e);
                        tracing::warn!(
                            "{} cannot reach {}: {error:#}",
                            session.describe(),
                            server.name
                        );
                        let failure = ConnectFailure::Error(format!("{error:#}"));
                        session.connect_failed(&server, resolver, failure, false);
                    }
                }
            },
        );
    }

    /// The address the backend sees in the handshake.
    fn backend_address(&self, server: &ServerInfo) -> String {
        let host = server
            .address
            .rsplit_once(':')
            .map_or(server.address.as_str(), |(host, _)| host);
        let Some(player) = self.player.as_ref() else {
            return host.to_owned();
        };
        match self.proxy.config.forwarding_mode {
            ForwardingMode::Legacy => forwarding::legacy_address(
                host,
                player.handle.remote_address().ip(),
                player.handle.profile(),
            ),
            ForwardingMode::None if player.legacy_forge => format!("{host}\0FML\0"),
            ForwardingMode::None | ForwardingMode::Modern => host.to_owned(),
        }
    }

    fn attach_backend(
        &mut self,
        server: ServerInfo,
        stream: BoxedStream,
        remote: SocketAddr,
        resolver: Option<oneshot::Sender<ConnectionResult>>,
    ) {
        let Some((username, uuid)) = self
            .player
            .as_ref()
            .map(|player| (player.handle.username().to_owned(), player.handle.uuid()))
        else {
            return;
        };
        let key = self.next_backend_key();
        let ConnKey::Backend(id) = key else {
            return;
        };
        let version = self.client.version();
        let mut conn = Connection::spawn(
            stream,
            ConnectionOptions {
                key,
                remote,
                inbound: Direction::Clientbound,
                version,
                read_timeout: self.proxy.config.read_timeout(),
            },
            self.events(),
            self.cancel_token(),
        );
        conn.write(Handshake {
            protocol_version: version.protocol(),
            server_address: self.backend_address(&server),
            port: remote.port(),
            next_state: NextState::Login,
        });
        conn.set_state(ConnectionState::Login);
        conn.write(ServerLogin {
            username,
            player_key: None,
            holder_uuid: Some(uuid),
        });

        tracing::info!("{} connecting to {}", self.describe(), server.name);
        self.add_backend(conn, server, BackendHandler::Login(BackendLoginHandler::new(id)));
        if let Some(slot) = self.backends.get_mut(&id) {
            slot.resolver = resolver;
        }
        if let Some(player) = self.player_mut() {
            player.in_flight = Some(id);
        }
    }

    /// Handles a backend that disconnected the player, broke or failed to
    /// connect.
    pub(crate) fn backend_failed(&mut self, id: u64, failure: ConnectFailure) {
        let Some(mut slot) = self.remove_backend(id) else {
            return;
        };
        let Some(player) = self.player.as_mut() else {
            return;
        };

        if player.in_flight == Some(id) {
            player.in_flight = None;
            // A client told to reconfigure cannot return to its old server.
            // It stays pending so the client's ack still moves it along.
            let mut abandoned = None;
            if let Reconfiguration::AwaitingAck(queued) = &mut player.reconfiguration {
                queued.clear();
                abandoned = player.connected;
                player.handle.set_current_server(None);
            }
            if let Some(previous) = abandoned {
                self.release_backend(previous);
            }
            let resolver = slot.resolver.take();
            self.connect_failed(&slot.server, resolver, failure, false);
        } else if player.connected == Some(id) {
            player.connected = None;
            player.handle.set_current_server(None);
            if player.in_flight.is_some() {
                tracing::info!(
                    "{} lost {} during a switch: {}",
                    self.describe(),
                    slot.server.name,
                    failure.reason().plain_text()
                );
                return;
            }
            self.connect_failed(&slot.server, None, failure, true);
        }
    }

    /// Tells the player a backend failed and decides where they go next.
    fn connect_failed(
        &mut self,
        server: &ServerInfo,
        resolver: Option<oneshot::Sender<ConnectionResult>>,
        failure: ConnectFailure,
        kicked: bool,
    ) {
        let name = Component::text(&server.name);
        let message = if kicked {
            translate("velocity.error.moved-to-new-server", [name, failure.reason()])
        } else {
            translate("velocity.error.cant-connect", [name, failure.reason()])
        };
        tracing::info!("{} {}", self.describe(), message.plain_text());
        resolve(resolver, failure.result());

        if self.has_working_backend() {
            self.send_player_message(message);
            return;
        }
        match self.next_server(Some(&server.name)) {
            Some(next) => {
                self.send_player_message(message);
                self.try_server(next);
            }
            None => self.disconnect(message),
        }
    }

    /// Closes a backend the player has left.
    pub(crate) fn release_backend(&mut self, id: u64) {
        if let Some(slot) = self.remove_backend(id) {
            tracing::debug!("{} left {}", self.describe(), slot.server.name);
        }
        if let Some(player) = self.player_mut() {
            if player.connected == Some(id) {
                player.connected = None;
            }
        }
    }

    /// The backend `id` sent JoinGame. Makes it the player's server.
    pub(crate) fn finish_switch(&mut self, id: u64, join: &JoinGame) {
        let Some(player) = self.player.as_ref() else {
            return;
        };
        if player.connected == Some(id) {
            // Rejoin after the current backend reconfigured the client.
            self.client.write(join.clone());
            self.set_backend_handler(id, BackendHandler::Play(BackendPlayHandler::new(id)));
            return;
        }

        let previous = player.connected;
        let legacy_forge = player.legacy_forge;
        let version = self.client.version();
        if let Some(previous) = previous {
            self.release_backend(previous);
        }

        if previous.is_none() || version >= ProtocolVersion::V1_20_2 {
            self.client.delayed_write(join.clone());
        } else if legacy_forge {
            // Forge clients only reset their state on a real dimension
            // change, so pass through a different one first.
            self.client.delayed_write(join.clone());
            let mut temporary = Respawn::from_join_game(join);
            temporary.dimension = other_dimension(join.dimension);
            if let Some(info) = &mut temporary.dimension_info {
                let level = info.level_name.as_deref().unwrap_or("world");
                info.level_name = Some(format!("{level}_temp"));
            }
            self.client.delayed_write(temporary);
            self.client.delayed_write(Respawn::from_join_game(join));
        } else {
            let mut rejoin = join.clone();
            if version < ProtocolVersion::V1_16 {
                rejoin.dimension = other_dimension(join.dimension);
            }
            self.client.delayed_write(rejoin);
            self.client.delayed_write(Respawn::from_join_game(join));
        }

        let Some(player) = self.player.as_mut() else {
            return;
        };
        // Bars of a server left while the client was configuring.
        for uuid in player.boss_bars.drain() {
            self.client.delayed_write(BossBar::remove(uuid));
        }

        let mut channels: Vec<String> = player.known_channels.iter().cloned().collect();
        channels.extend(self.proxy.channels.all());
        channels.sort();
        channels.dedup();
        let queued: Vec<_> = player.queued_messages.drain(..).collect();
        // 1.20.2+ backends got both while configuring. A first join already
        // has the brand among the queued messages.
        let resend = if version >= ProtocolVersion::V1_20_2 {
            (None, None)
        } else {
            let brand = previous.and(player.brand.clone());
            (player.settings.clone(), brand)
        };
        player.connected = Some(id);
        player.in_flight = None;
        player.tried_servers.clear();
        let handle = player.handle.clone();

        let Some(slot) = self.backends.get_mut(&id) else {
            return;
        };
        let backend = &mut slot.conn;
        if !channels.is_empty() {
            backend.delayed_write(plugin_message::register_channels(
                version,
                channels.iter().map(String::as_str),
            ));
        }
        for message in queued {
            backend.delayed_write(message);
        }
        let (settings, brand) = resend;
        if let Some(settings) = settings {
            backend.delayed_write(settings);
        }
        if let Some(brand) = brand {
            backend.delayed_write(brand);
        }
        backend.flush();
        slot.joined = true;
        let resolver = slot.resolver.take();
        let server = slot.server.name.clone();
        self.client.flush();

        resolve(resolver, ConnectionResult::Success);
        tracing::info!("{} has connected to {server}", self.describe());
        handle.set_current_server(Some(server));

        if self.awaiting_initial_connect() {
            self.set_client_handler(ClientHandler::Play(ClientPlayHandler));
        }
        self.set_backend_handler(id, BackendHandler::Play(BackendPlayHandler::new(id)));
    }
}
