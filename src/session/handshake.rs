use crate::{
    messages::translate,
    protocol::{
        component::Component,
        packet::{Handshake, NextState, RawPacket, StatusPing, StatusRequest, StatusResponse},
        ConnectionState, ProtocolVersion,
    },
    session::{ClientHandler, HandshakeInfo, LoginHandler, Session, SessionHandler},
};

/// The first handler of every client. Anything but a handshake closes
/// the connection.
pub(crate) struct HandshakeHandler;

impl SessionHandler for HandshakeHandler {
    fn handle_handshake(&mut self, session: &mut Session, handshake: &Handshake) -> bool {
        session.handshake = HandshakeInfo {
            virtual_host: handshake.clean_address().to_owned(),
            legacy_forge: handshake.is_legacy_forge(),
        };
        let version = ProtocolVersion::from_protocol(handshake.protocol_version);
        match handshake.next_state {
            NextState::Status => {
                session
                    .client
                    .set_version(version.unwrap_or(ProtocolVersion::MAXIMUM));
                session.client.set_state(ConnectionState::Status);
                session.set_client_handler(ClientHandler::Status(StatusHandler {
                    client_protocol: handshake.protocol_version,
                    answered: false,
                }));
            }
            NextState::Login => start_login(session, handshake.protocol_version, version),
        }
        true
    }

    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        tracing::debug!("{}: packet {:#04x} before handshake", session.describe(), raw.id);
        session.client.close(None);
    }
}

fn start_login(session: &mut Session, protocol: i32, version: Option<ProtocolVersion>) {
    session.client.set_state(ConnectionState::Login);
    let Some(version) = version else {
        let too_old = protocol < ProtocolVersion::MINIMUM.protocol();
        let (fallback, key) = if too_old {
            (ProtocolVersion::MINIMUM, "multiplayer.disconnect.outdated_client")
        } else {
            (ProtocolVersion::MAXIMUM, "multiplayer.disconnect.outdated_server")
        };
        session.client.set_version(fallback);
        session.disconnect(translate(
            key,
            [Component::text(ProtocolVersion::supported_range())],
        ));
        return;
    };
    session.client.set_version(version);

    let ip = session.client.remote_address().ip();
    if !session.proxy.login_limiter().attempt(ip) {
        session.disconnect(translate("velocity.error.logging-in-too-fast", []));
        return;
    }
    tracing::debug!(
        "{} logging in with {version} to {}",
        session.describe(),
        session.handshake.virtual_host
    );
    session.set_client_handler(ClientHandler::Login(LoginHandler::new()));
}

/// Answers a server list ping.
pub(crate) struct StatusHandler {
    client_protocol: i32,
    answered: bool,
}

impl SessionHandler for StatusHandler {
    fn handle_status_request(&mut self, session: &mut Session, _packet: &StatusRequest) -> bool {
        if self.answered {
            session.client.close(None);
            return true;
        }
        self.answered = true;
        let json = session.proxy.status_json(self.client_protocol);
        session.client.write(StatusResponse { json });
        true
    }

    fn handle_status_ping(&mut self, session: &mut Session, ping: &StatusPing) -> bool {
        session.client.write(*ping);
        session.client.close(None);
        true
    }

    fn handle_generic(&mut self, session: &mut Session, _raw: &RawPacket) {
        session.client.close(None);
    }
}
