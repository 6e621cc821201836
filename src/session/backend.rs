use crate::{
    forwarding::{self, ForwardingMode, PLAYER_INFO_CHANNEL},
    messages::translate,
    player::Reconfiguration,
    protocol::{
        packet::{
            AvailableCommands, BossBar, Disconnect, EncryptionRequest, JoinGame, KeepAlive,
            LoginAcknowledged, LoginPluginMessage, LoginPluginResponse, Offer, Packet,
            PluginMessage, RawPacket, ServerLoginSuccess, SetCompression, StartUpdate,
            TabCompleteResponse,
        },
        plugin_message,
        registry::{registry, EncodeError},
        ConnectionState, Direction, ProtocolVersion,
    },
    proxy::PROXY_BRAND,
    session::{BackendHandler, Session, SessionHandler},
    switch::ConnectFailure,
};
use bytes::Bytes;

/// Logs a backend in on behalf of the player.
pub(crate) struct BackendLoginHandler {
    id: u64,
    forwarding_sent: bool,
}

impl BackendLoginHandler {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            forwarding_sent: false,
        }
    }

    fn forwarding_response(
        &self,
        session: &Session,
        request: &LoginPluginMessage,
    ) -> Option<Bytes> {
        let config = &session.proxy.config;
        if request.channel != PLAYER_INFO_CHANNEL
            || config.forwarding_mode != ForwardingMode::Modern
        {
            return None;
        }
        let player = session.player()?;
        let payload = forwarding::modern_payload(
            config.forwarding_secret.as_bytes(),
            player.handle.remote_address().ip(),
            player.handle.profile(),
        );
        match payload {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::error!("Unable to sign forwarding data: {e}");
                None
            }
        }
    }
}

impl SessionHandler for BackendLoginHandler {
    fn handle_encryption_request(
        &mut self,
        session: &mut Session,
        _request: &EncryptionRequest,
    ) -> bool {
        session.backend_failed(
            self.id,
            ConnectFailure::Error("the server is in online mode".to_owned()),
        );
        true
    }

    fn handle_set_compression(&mut self, session: &mut Session, packet: &SetCompression) -> bool {
        let level = session.proxy.config.compression();
        if let Some(backend) = session.backend_mut(self.id) {
            backend.set_compression(packet.threshold, level);
        }
        true
    }

    fn handle_login_plugin_message(
        &mut self,
        session: &mut Session,
        request: &LoginPluginMessage,
    ) -> bool {
        let response = match self.forwarding_response(session, request) {
            Some(data) => {
                self.forwarding_sent = true;
                LoginPluginResponse {
                    id: request.id,
                    success: true,
                    data,
                }
            }
            None => LoginPluginResponse {
                id: request.id,
                success: false,
                data: Bytes::new(),
            },
        };
        if let Some(backend) = session.backend_mut(self.id) {
            backend.write(response);
        }
        true
    }

    fn handle_disconnect(&mut self, session: &mut Session, disconnect: &Disconnect) -> bool {
        session.backend_failed(self.id, ConnectFailure::Disconnected(disconnect.reason.clone()));
        true
    }

    fn handle_server_login_success(
        &mut self,
        session: &mut Session,
        _success: &ServerLoginSuccess,
    ) -> bool {
        if session.proxy.config.forwarding_mode == ForwardingMode::Modern && !self.forwarding_sent {
            let reason = translate("velocity.error.modern-forwarding-failed", []);
            session.backend_failed(self.id, ConnectFailure::Disconnected(reason));
            return true;
        }

        let id = self.id;
        let (settings, brand) = session
            .player()
            .map(|player| (player.settings.clone(), player.brand.clone()))
            .unwrap_or_default();
        let Some(backend) = session.backend_mut(id) else {
            return true;
        };
        if backend.version() >= ProtocolVersion::V1_20_2 {
            backend.write(LoginAcknowledged);
            backend.set_state(ConnectionState::Config);
            // The client sent these while no backend could take them.
            if let Some(settings) = settings {
                backend.delayed_write(settings);
            }
            if let Some(brand) = brand {
                backend.delayed_write(brand);
            }
            backend.flush();
            let handler = BackendConfigHandler::new(id);
            session.set_backend_handler(id, BackendHandler::Config(handler));
            if session.client.state() == ConnectionState::Play {
                let Some(player) = session.player_mut() else {
                    return true;
                };
                if !matches!(player.reconfiguration, Reconfiguration::AwaitingAck(_)) {
                    player.reconfiguration = Reconfiguration::AwaitingAck(Vec::new());
                    session.client.write(StartUpdate);
                }
            }
        } else {
            backend.set_state(ConnectionState::Play);
            session.set_backend_handler(id, BackendHandler::Transition(TransitionHandler::new(id)));
        }
        true
    }

    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        tracing::debug!(
            "{} backend #{}: ignoring packet {:#04x} during login",
            session.describe(),
            self.id,
            raw.id
        );
    }
}

/// Relays a backend configuring the client.
pub(crate) struct BackendConfigHandler {
    id: u64,
}

impl BackendConfigHandler {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    /// Sends a frame to the client, or holds it while the client has yet
    /// to acknowledge the reconfiguration.
    fn relay(&self, session: &mut Session, raw: &RawPacket) {
        let held = match session.player_mut() {
            Some(player) => player.reconfiguration.hold(raw),
            None => Ok(false),
        };
        match held {
            Ok(true) => {}
            Ok(false) => session.client.write_raw(raw),
            Err(e) => {
                tracing::warn!("{} backend #{}: {e}", session.describe(), self.id);
                session.backend_failed(self.id, ConnectFailure::Error(e.to_string()));
            }
        }
    }

    fn relay_packet(&self, session: &mut Session, packet: Packet) {
        match config_frame(session.client.version(), &packet) {
            Ok(raw) => self.relay(session, &raw),
            Err(e) => tracing::warn!("{}: not relaying: {e}", session.describe()),
        }
    }
}

/// Encodes a clientbound configuration packet.
fn config_frame(version: ProtocolVersion, packet: &Packet) -> Result<RawPacket, EncodeError> {
    let state = ConnectionState::Config;
    let direction = Direction::Clientbound;
    let kind = packet.kind();
    let id = registry()
        .packet_id(state, direction, version, kind)
        .ok_or(EncodeError::Unmapped {
            kind,
            state,
            direction,
            version,
        })?;
    let frame = registry().encode(state, direction, version, packet)?;
    Ok(RawPacket {
        id,
        frame: Bytes::from(frame),
    })
}

impl SessionHandler for BackendConfigHandler {
    fn handle_plugin_message(&mut self, session: &mut Session, message: &PluginMessage) -> bool {
        if !plugin_message::is_brand(message) {
            return false;
        }
        let brand = plugin_message::rewrite_brand(message, PROXY_BRAND);
        self.relay_packet(session, brand.into());
        true
    }

    fn handle_disconnect(&mut self, session: &mut Session, disconnect: &Disconnect) -> bool {
        session.backend_failed(self.id, ConnectFailure::Disconnected(disconnect.reason.clone()));
        true
    }

    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        self.relay(session, raw);
    }
}

/// A backend that finished login or configuration and has yet to send
/// JoinGame.
pub(crate) struct TransitionHandler {
    id: u64,
}

impl TransitionHandler {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }
}

impl SessionHandler for TransitionHandler {
    fn handle_keep_alive(&mut self, session: &mut Session, keep_alive: &KeepAlive) -> bool {
        if let Some(backend) = session.backend_mut(self.id) {
            backend.write(*keep_alive);
        }
        true
    }

    fn handle_plugin_message(&mut self, session: &mut Session, message: &PluginMessage) -> bool {
        if plugin_message::is_brand(message) {
            session
                .client
                .write(plugin_message::rewrite_brand(message, PROXY_BRAND));
        } else {
            session.client.write(message.clone());
        }
        true
    }

    fn handle_disconnect(&mut self, session: &mut Session, disconnect: &Disconnect) -> bool {
        session.backend_failed(self.id, ConnectFailure::Disconnected(disconnect.reason.clone()));
        true
    }

    fn handle_join_game(&mut self, session: &mut Session, join: &JoinGame) -> bool {
        session.finish_switch(self.id, join);
        true
    }

    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        tracing::debug!(
            "{} backend #{}: dropping packet {:#04x} before JoinGame",
            session.describe(),
            self.id,
            raw.id
        );
    }
}

/// The backend the player is playing on.
pub(crate) struct BackendPlayHandler {
    id: u64,
}

impl BackendPlayHandler {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    fn is_current(&self, session: &Session) -> bool {
        session.connected_backend() == Some(self.id)
    }
}

impl SessionHandler for BackendPlayHandler {
    fn handle_keep_alive(&mut self, _session: &mut Session, _packet: &KeepAlive) -> bool {
        false
    }

    fn handle_disconnect(&mut self, session: &mut Session, disconnect: &Disconnect) -> bool {
        session.backend_failed(self.id, ConnectFailure::Disconnected(disconnect.reason.clone()));
        true
    }

    fn handle_boss_bar(&mut self, session: &mut Session, boss_bar: &BossBar) -> bool {
        if !self.is_current(session) {
            return false;
        }
        if let Some(player) = session.player_mut() {
            match boss_bar.action {
                BossBar::ADD => {
                    player.boss_bars.insert(boss_bar.uuid);
                }
                BossBar::REMOVE => {
                    player.boss_bars.remove(&boss_bar.uuid);
                }
                _ => {}
            }
        }
        false
    }

    fn handle_plugin_message(&mut self, session: &mut Session, message: &PluginMessage) -> bool {
        if !plugin_message::is_brand(message) || !self.is_current(session) {
            return false;
        }
        session
            .client
            .write(plugin_message::rewrite_brand(message, PROXY_BRAND));
        true
    }

    fn handle_available_commands(
        &mut self,
        session: &mut Session,
        commands: &AvailableCommands,
    ) -> bool {
        if !session.proxy.config.announce_proxy_commands || !self.is_current(session) {
            return false;
        }
        let Some(source) = session.command_source() else {
            return false;
        };
        let mut graph = commands.graph.clone();
        session.proxy.commands.inject(&source, &mut graph);
        session.client.write(AvailableCommands { graph });
        true
    }

    fn handle_tab_complete_response(
        &mut self,
        session: &mut Session,
        response: &TabCompleteResponse,
    ) -> bool {
        let Some(prefix) = session
            .player_mut()
            .and_then(|player| player.outstanding_tab_complete.take())
        else {
            return false;
        };
        let Some(source) = session.command_source() else {
            return false;
        };
        let mut merged = response.clone();
        for alias in session.proxy.commands.suggest_aliases(&source, &prefix) {
            let text = format!("/{alias}");
            if !merged.offers.iter().any(|offer| offer.text == text) {
                merged.offers.push(Offer::new(text));
            }
        }
        session.client.write(merged);
        true
    }

    fn handle_start_update(&mut self, session: &mut Session, _packet: &StartUpdate) -> bool {
        if let Some(player) = session.player_mut() {
            player.reconfiguration = Reconfiguration::BackendInitiated;
        }
        false
    }

    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        if self.is_current(session) {
            session.client.write_raw(raw);
        }
    }

    /// Takes down the boss bars this server showed. A client that is
    /// configuring keeps them until the next JoinGame.
    fn disconnected(&mut self, session: &mut Session) {
        if session.client.is_closed() || session.client.state() != ConnectionState::Play {
            return;
        }
        let Some(player) = session.player_mut() else {
            return;
        };
        let boss_bars: Vec<_> = player.boss_bars.drain().collect();
        for uuid in boss_bars {
            session.client.delayed_write(BossBar::remove(uuid));
        }
        session.client.flush();
    }
}
