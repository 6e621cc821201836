use crate::{
    connection::ConnectionError,
    events::ChatResult,
    player::Reconfiguration,
    protocol::{
        packet::{
            ClientSettings, FinishedUpdate, KeepAlive, LegacyChat, Offer, Packet, PlayerChat,
            PlayerCommand, PluginMessage, RawPacket, TabCompleteRequest, TabCompleteResponse,
        },
        plugin_message, ConnectionState, ProtocolVersion,
    },
    session::{
        BackendConfigHandler, BackendHandler, ClientHandler, Session, SessionHandler,
        TransitionHandler,
    },
};
use std::sync::Arc;

/// Records what the proxy must remember from a client plugin message.
fn track_plugin_message(
    session: &mut Session,
    message: &PluginMessage,
) -> Result<(), ConnectionError> {
    let Some(player) = session.player_mut() else {
        return Ok(());
    };
    if plugin_message::is_register(message) {
        player.register_channels(plugin_message::channels(message))?;
    } else if plugin_message::is_unregister(message) {
        player.unregister_channels(plugin_message::channels(message));
    } else if plugin_message::is_brand(message) {
        player.brand = Some(message.clone());
    }
    Ok(())
}

fn client_violation(session: &mut Session, error: ConnectionError) {
    session.client_failed(error);
}

fn record_settings(session: &mut Session, settings: &ClientSettings) {
    if let Some(player) = session.player_mut() {
        player.settings = Some(settings.clone());
    }
}

/// The client is in the configuration state, talking to the backend being
/// joined or to the current one while it reconfigures.
pub(crate) struct ClientConfigHandler;

impl SessionHandler for ClientConfigHandler {
    fn handle_client_settings(&mut self, session: &mut Session, settings: &ClientSettings) -> bool {
        record_settings(session, settings);
        false
    }

    fn handle_plugin_message(&mut self, session: &mut Session, message: &PluginMessage) -> bool {
        if let Err(e) = track_plugin_message(session, message) {
            client_violation(session, e);
            return true;
        }
        false
    }

    fn handle_finished_update(&mut self, session: &mut Session, _packet: &FinishedUpdate) -> bool {
        let Some(id) = session.route_backend() else {
            return true;
        };
        if let Some(backend) = session.backend_mut(id) {
            backend.write(FinishedUpdate);
            backend.set_state(ConnectionState::Play);
        }
        session.client.set_state(ConnectionState::Play);
        if let Some(player) = session.player_mut() {
            player.reconfiguration = Reconfiguration::None;
        }
        session.set_client_handler(ClientHandler::Play(ClientPlayHandler));
        session.set_backend_handler(id, BackendHandler::Transition(TransitionHandler::new(id)));
        true
    }

    /// Settings and brand the backend cannot take yet are replayed once it
    /// reaches configuration.
    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        let id = session.route_backend().filter(|id| {
            session
                .backends
                .get(id)
                .is_some_and(|slot| slot.conn.state() == ConnectionState::Config)
        });
        session.forward_to_backend(id, raw);
    }
}

/// The player is playing on a backend.
pub(crate) struct ClientPlayHandler;

impl ClientPlayHandler {
    /// Runs a proxy command, or returns false to let the backend have it.
    fn run_command(session: &mut Session, input: &str, original: Packet) -> bool {
        let Some(source) = session.command_source() else {
            return false;
        };
        let alias = input.split_whitespace().next().unwrap_or_default();
        if !session.proxy.commands.has_command_for(alias, &source) {
            return false;
        }
        let proxy = Arc::clone(&session.proxy);
        let input = input.to_owned();
        session.spawn_then(
            async move { proxy.commands.execute(source, &input).await },
            move |session, result| match result {
                Ok(true) => {}
                Ok(false) => session.write_to_connected(original),
                Err(e) => session.send_player_message(e.message()),
            },
        );
        true
    }

    fn run_chat(session: &mut Session, message: String, signed: Option<PlayerChat>) -> bool {
        let Some(player) = session.player() else {
            return true;
        };
        let handle = player.handle.clone();
        let hooks = Arc::clone(&session.proxy.hooks);
        let text = message.clone();
        session.spawn_then(
            async move { hooks.chat(&handle, &text).await },
            move |session, result| match (result, signed) {
                (ChatResult::Deny, _) => {
                    tracing::debug!("{} chat denied: {message}", session.describe());
                }
                (ChatResult::Allow, Some(chat)) => session.write_to_connected(chat),
                (ChatResult::Replace(_), Some(chat)) => {
                    tracing::warn!(
                        "{}: signed chat cannot be altered, sending it unchanged",
                        session.describe()
                    );
                    session.write_to_connected(chat);
                }
                (ChatResult::Allow, None) => session.write_to_connected(LegacyChat { message }),
                (ChatResult::Replace(message), None) => {
                    session.write_to_connected(LegacyChat { message })
                }
            },
        );
        true
    }
}

impl SessionHandler for ClientPlayHandler {
    fn handle_keep_alive(&mut self, _session: &mut Session, _packet: &KeepAlive) -> bool {
        false
    }

    fn handle_client_settings(&mut self, session: &mut Session, settings: &ClientSettings) -> bool {
        record_settings(session, settings);
        false
    }

    fn handle_plugin_message(&mut self, session: &mut Session, message: &PluginMessage) -> bool {
        if let Err(e) = track_plugin_message(session, message) {
            client_violation(session, e);
            return true;
        }
        if session.connected_backend().is_some() {
            return false;
        }
        let queued = match session.player_mut() {
            Some(player) => player.queue_plugin_message(message.clone()),
            None => Ok(()),
        };
        if let Err(e) = queued {
            client_violation(session, e);
        }
        true
    }

    fn handle_legacy_chat(&mut self, session: &mut Session, chat: &LegacyChat) -> bool {
        match chat.message.strip_prefix('/') {
            Some(command) => Self::run_command(session, command, chat.clone().into()),
            None => Self::run_chat(session, chat.message.clone(), None),
        }
    }

    fn handle_player_command(&mut self, session: &mut Session, command: &PlayerCommand) -> bool {
        Self::run_command(session, &command.command, command.clone().into())
    }

    fn handle_player_chat(&mut self, session: &mut Session, chat: &PlayerChat) -> bool {
        Self::run_chat(session, chat.message.clone(), Some(chat.clone()))
    }

    fn handle_tab_complete_request(
        &mut self,
        session: &mut Session,
        request: &TabCompleteRequest,
    ) -> bool {
        let Some(text) = request.command.strip_prefix('/') else {
            return false;
        };
        let Some(source) = session.command_source() else {
            return false;
        };
        let Some(space) = text.find(' ') else {
            // Pre-1.13 clients ask the server for aliases. The reply from
            // the backend gets the proxy's aliases merged in.
            if session.client.version() < ProtocolVersion::V1_13 {
                if let Some(player) = session.player_mut() {
                    player.outstanding_tab_complete = Some(text.to_owned());
                }
            }
            return false;
        };
        if !session.proxy.commands.has_command_for(&text[..space], &source) {
            return false;
        }

        let proxy = Arc::clone(&session.proxy);
        let input = text.to_owned();
        let request = request.clone();
        session.spawn_then(
            async move { proxy.commands.suggest(source, &input).await },
            move |session, suggestions| {
                let split = request.command.rfind(' ').map_or(0, |i| i + 1);
                let start = request.command[..split].chars().count();
                let length = request.command[split..].chars().count();
                session.client.write(TabCompleteResponse {
                    transaction_id: request.transaction_id,
                    start: start as i32,
                    length: length as i32,
                    offers: suggestions.into_iter().map(Offer::new).collect(),
                });
            },
        );
        true
    }

    /// The client acknowledged a StartUpdate.
    fn handle_finished_update(&mut self, session: &mut Session, _packet: &FinishedUpdate) -> bool {
        let Some(player) = session.player_mut() else {
            return true;
        };
        match std::mem::take(&mut player.reconfiguration) {
            Reconfiguration::AwaitingAck(queued) => {
                let previous = player.connected.take();
                session.client.set_state(ConnectionState::Config);
                session.set_client_handler(ClientHandler::Config(ClientConfigHandler));
                if let Some(previous) = previous {
                    session.release_backend(previous);
                }
                for raw in &queued {
                    session.client.delayed_write_raw(raw);
                }
                session.client.flush();
            }
            Reconfiguration::BackendInitiated => {
                let Some(id) = session.connected_backend() else {
                    return true;
                };
                if let Some(backend) = session.backend_mut(id) {
                    backend.write(FinishedUpdate);
                    backend.set_state(ConnectionState::Config);
                }
                session.client.set_state(ConnectionState::Config);
                session.set_client_handler(ClientHandler::Config(ClientConfigHandler));
                let handler = BackendConfigHandler::new(id);
                session.set_backend_handler(id, BackendHandler::Config(handler));
            }
            Reconfiguration::None => {
                tracing::debug!("{}: configuration ack without StartUpdate", session.describe());
            }
        }
        true
    }

    fn handle_generic(&mut self, session: &mut Session, raw: &RawPacket) {
        let id = session.connected_backend();
        session.forward_to_backend(id, raw);
    }
}

/// A pre-1.20.2 client in play that has not joined a backend yet.
pub(crate) struct InitialConnectHandler;

impl SessionHandler for InitialConnectHandler {
    fn handle_client_settings(&mut self, session: &mut Session, settings: &ClientSettings) -> bool {
        record_settings(session, settings);
        true
    }

    fn handle_plugin_message(&mut self, session: &mut Session, message: &PluginMessage) -> bool {
        let result =
            track_plugin_message(session, message).and_then(|()| match session.player_mut() {
                Some(player) => player.queue_plugin_message(message.clone()),
                None => Ok(()),
            });
        if let Err(e) = result {
            client_violation(session, e);
        }
        true
    }

    fn handle_generic(&mut self, _session: &mut Session, _raw: &RawPacket) {}
}
