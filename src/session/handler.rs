//! Double dispatch from decoded packets to session handlers.

use crate::{
    protocol::packet::{self, InboundPacket, Packet, RawPacket},
    session::Session,
};

macro_rules! session_handler {
    ($($variant:ident => $method:ident),* $(,)?) => {
        /// Reacts to the packets of one connection in one phase.
        ///
        /// A `handle_*` method returns `true` when it consumed the packet.
        /// Otherwise the frame is passed to [`SessionHandler::handle_generic`],
        /// which relay handlers use to forward it unchanged.
        pub trait SessionHandler: Send {
            $(
                fn $method(&mut self, _session: &mut Session, _packet: &packet::$variant) -> bool {
                    false
                }
            )*

            /// A decoded packet the handler did not consume.
            fn handle_generic(&mut self, _session: &mut Session, _raw: &RawPacket) {}

            /// A frame with no decoder in the current state.
            fn handle_unknown(&mut self, session: &mut Session, raw: &RawPacket) {
                self.handle_generic(session, raw);
            }

            /// The connection closed while this handler was active.
            fn disconnected(&mut self, _session: &mut Session) {}
        }

        impl Packet {
            /// Calls the handler method for this packet.
            pub fn dispatch(
                &self,
                handler: &mut dyn SessionHandler,
                session: &mut Session,
            ) -> bool {
                match self {
                    $(Packet::$variant(packet) => handler.$method(session, packet),)*
                }
            }
        }
    };
}

session_handler! {
    Handshake => handle_handshake,
    StatusRequest => handle_status_request,
    StatusResponse => handle_status_response,
    StatusPing => handle_status_ping,
    ServerLogin => handle_server_login,
    EncryptionRequest => handle_encryption_request,
    EncryptionResponse => handle_encryption_response,
    ServerLoginSuccess => handle_server_login_success,
    SetCompression => handle_set_compression,
    LoginPluginMessage => handle_login_plugin_message,
    LoginPluginResponse => handle_login_plugin_response,
    LoginAcknowledged => handle_login_acknowledged,
    Disconnect => handle_disconnect,
    KeepAlive => handle_keep_alive,
    PluginMessage => handle_plugin_message,
    ClientSettings => handle_client_settings,
    FinishedUpdate => handle_finished_update,
    StartUpdate => handle_start_update,
    JoinGame => handle_join_game,
    Respawn => handle_respawn,
    BossBar => handle_boss_bar,
    LegacyChat => handle_legacy_chat,
    PlayerChat => handle_player_chat,
    PlayerCommand => handle_player_command,
    SystemChat => handle_system_chat,
    TabCompleteRequest => handle_tab_complete_request,
    TabCompleteResponse => handle_tab_complete_response,
    AvailableCommands => handle_available_commands,
}

pub(crate) fn deliver(
    handler: &mut dyn SessionHandler,
    session: &mut Session,
    inbound: &InboundPacket,
) {
    match &inbound.packet {
        Some(packet) => {
            if !packet.dispatch(handler, session) {
                handler.handle_generic(session, &inbound.raw);
            }
        }
        None => handler.handle_unknown(session, &inbound.raw),
    }
}
