use crate::{
    auth::{self, AuthError, GameProfile},
    connection::{AuthFailureKind, ConnectionError},
    messages::translate,
    player::{ConnectedPlayer, PlayerHandle, PlayerInfo},
    protocol::{
        component::Component,
        packet::{
            EncryptionRequest, EncryptionResponse, LoginAcknowledged, LoginPluginResponse,
            RawPacket, ServerLogin, ServerLoginSuccess, SetCompression,
        },
        ConnectionState, ProtocolVersion,
    },
    session::{ClientConfigHandler, ClientHandler, InitialConnectHandler, Session, SessionHandler},
};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginState {
    Start,
    PreLogin,
    EncryptionRequested,
    Authenticating,
    Finishing,
    /// ServerLoginSuccess was sent to a 1.20.2+ client.
    SuccessSent,
    Acknowledged,
}

/// Authenticates a client and registers the player.
pub(crate) struct LoginHandler {
    state: LoginState,
    login: Option<ServerLogin>,
    verify_token: [u8; 4],
}

impl LoginHandler {
    pub(crate) fn new() -> Self {
        Self {
            state: LoginState::Start,
            login: None,
            verify_token: [0; 4],
        }
    }

    fn username(&self) -> &str {
        self.login.as_ref().map_or("", |login| &login.username)
    }

    fn pre_login_done(&mut self, session: &mut Session, result: Result<(), Component>) {
        if let Err(reason) = result {
            session.disconnect(reason);
            return;
        }
        if session.proxy.config.online_mode {
            self.verify_token = rand::random();
            self.state = LoginState::EncryptionRequested;
            session.client.write(EncryptionRequest {
                server_id: String::new(),
                public_key: session.proxy.key_pair().public_der().to_vec(),
                verify_token: self.verify_token.to_vec(),
            });
        } else {
            let profile = GameProfile::offline(self.username());
            self.authenticated(session, profile);
        }
    }

    fn session_checked(
        &mut self,
        session: &mut Session,
        result: anyhow::Result<Option<GameProfile>>,
    ) {
        match result {
            Ok(Some(profile)) => self.authenticated(session, profile),
            Ok(None) => {
                let error = ConnectionError::AuthFailure {
                    kind: AuthFailureKind::Permanent,
                    message: format!("{} has not joined with the session server", self.username()),
                };
                tracing::info!("{}: {error}", session.describe());
                session.disconnect(translate("velocity.error.online-mode-only", []));
            }
            Err(e) => {
                let error = ConnectionError::AuthFailure {
                    kind: AuthFailureKind::Transient,
                    message: format!("{e:#}"),
                };
                tracing::error!(
                    "Unable to authenticate {} with the session server: {error}",
                    self.username()
                );
                session.disconnect(translate("multiplayer.disconnect.authservers_down", []));
            }
        }
    }

    fn authenticated(&mut self, session: &mut Session, profile: GameProfile) {
        if session.proxy.players.contains(profile.id, &profile.name) {
            session.disconnect(translate("velocity.error.already-connected-proxy", []));
            return;
        }
        self.state = LoginState::Finishing;
        let hooks = Arc::clone(&session.proxy.hooks);
        session.spawn_then(
            async move {
                let result = hooks.login(&profile).await;
                (profile, result)
            },
            |session, (profile, result)| {
                with_login(session, |login, session| login.complete(session, profile, result))
            },
        );
    }

    fn complete(
        &mut self,
        session: &mut Session,
        profile: GameProfile,
        result: Result<(), Component>,
    ) {
        if let Err(reason) = result {
            session.disconnect(reason);
            return;
        }

        let hooks = Arc::clone(&session.proxy.hooks);
        let permission_profile = profile.clone();
        let info = PlayerInfo {
            profile: profile.clone(),
            version: session.client.version(),
            remote: session.client.remote_address(),
            current_server: RwLock::new(None),
            permissions: Arc::new(move |permission: &str| {
                hooks.permission(&permission_profile, permission)
            }),
        };
        let handle = PlayerHandle::new(info, session.task_sender());
        if !session.proxy.players.register(handle.clone()) {
            session.disconnect(translate("velocity.error.already-connected-proxy", []));
            return;
        }
        session.player = Some(ConnectedPlayer::new(handle, session.handshake.legacy_forge));

        let threshold = session.proxy.config.compression_threshold;
        if threshold >= 0 {
            session.client.write(SetCompression { threshold });
            session
                .client
                .set_compression(threshold, session.proxy.config.compression());
        }
        session.client.write(ServerLoginSuccess {
            uuid: profile.id,
            username: profile.name,
            properties: profile.properties,
        });
        tracing::info!(
            "{} ({}) has connected with {}",
            session.describe(),
            session.client.remote_address(),
            session.client.version()
        );

        if session.client.version() >= ProtocolVersion::V1_20_2 {
            self.state = LoginState::SuccessSent;
        } else {
            self.state = LoginState::Acknowledged;
            session.client.set_state(ConnectionState::Play);
            session.set_client_handler(ClientHandler::InitialConnect(InitialConnectHandler));
            session.connect_initial();
        }
    }
}

fn with_login(session: &mut Session, f: impl FnOnce(&mut LoginHandler, &mut Session)) {
    session.with_client_handler(|handler, session| {
        if let ClientHandler::Login(login) = handler {
            f(login, session);
        }
    });
}

fn violation(session: &mut Session, message: &str) {
    let error = ConnectionError::violation(message);
    tracing::warn!("{}: {error}", session.describe());
    session.client.close(None);
}

impl SessionHandler for LoginHandler {
    fn handle_server_login(&mut self, session: &mut Session, login: &ServerLogin) -> bool {
        if self.state != LoginState::Start {
            violation(session, "duplicate ServerLogin");
            return true;
        }
        self.state = LoginState::PreLogin;
        self.login = Some(login.clone());

        let hooks = Arc::clone(&session.proxy.hooks);
        let username = login.username.clone();
        let remote = session.client.remote_address();
        session.spawn_then(
            async move { hooks.pre_login(&username, remote).await },
            |session, result| {
                with_login(session, |login, session| login.pre_login_done(session, result))
            },
        );
        true
    }

    fn handle_encryption_response(
        &mut self,
        session: &mut Session,
        response: &EncryptionResponse,
    ) -> bool {
        if self.state != LoginState::EncryptionRequested {
            violation(session, "unexpected EncryptionResponse");
            return true;
        }
        let player_key = self.login.as_ref().and_then(|login| login.player_key.as_ref());
        let secret = match auth::verify_response(
            session.proxy.key_pair(),
            response,
            &self.verify_token,
            player_key,
        ) {
            Ok(secret) => secret,
            Err(e) => {
                tracing::warn!("{} failed encryption: {e}", session.describe());
                let key = match e {
                    AuthError::MissingPlayerKey
                    | AuthError::InvalidPlayerKey
                    | AuthError::BadSignature => {
                        "multiplayer.disconnect.invalid_public_key_signature"
                    }
                    _ => "multiplayer.disconnect.invalid_player_data",
                };
                session.disconnect(translate(key, []));
                return true;
            }
        };
        if let Err(e) = session.client.enable_encryption(secret) {
            tracing::warn!("{}: {e}", session.describe());
            session.client.close(None);
            return true;
        }
        self.state = LoginState::Authenticating;

        let hash = auth::server_hash("", &secret, session.proxy.key_pair().public_der());
        let ip = session
            .proxy
            .config
            .prevent_client_proxy_connections
            .then(|| session.client.remote_address().ip());
        let service = Arc::clone(&session.proxy.session_service);
        let username = self.username().to_owned();
        session.spawn_then(
            async move { service.has_joined(&username, &hash, ip).await },
            |session, result| {
                with_login(session, |login, session| login.session_checked(session, result))
            },
        );
        true
    }

    fn handle_login_plugin_response(
        &mut self,
        _session: &mut Session,
        _response: &LoginPluginResponse,
    ) -> bool {
        true
    }

    fn handle_login_acknowledged(
        &mut self,
        session: &mut Session,
        _packet: &LoginAcknowledged,
    ) -> bool {
        if self.state != LoginState::SuccessSent {
            tracing::warn!(
                "{} acknowledged a login that was not finished",
                session.describe()
            );
            session
                .client
                .close(Some(translate("multiplayer.disconnect.invalid_player_data", [])));
            return true;
        }
        self.state = LoginState::Acknowledged;
        session.client.set_state(ConnectionState::Config);
        session.set_client_handler(ClientHandler::Config(ClientConfigHandler));
        session.connect_initial();
        true
    }

    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        tracing::debug!(
            "{}: ignoring packet {:#04x} during login",
            session.describe(),
            raw.id
        );
    }
}
