//! Players: the shared handle other tasks use, the state owned by the
//! session, and the registry of everyone online.

use crate::{
    auth::GameProfile,
    connection::ConnectionError,
    protocol::{
        component::Component,
        packet::{ClientSettings, GameProfileProperty, PluginMessage, RawPacket},
        ProtocolVersion,
    },
    session::{Session, SessionTask},
    switch::ConnectionResult,
};
use ahash::AHashSet;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use std::{collections::VecDeque, fmt, net::SocketAddr, sync::Arc};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Most plugin channels a client may register.
pub const MAX_KNOWN_CHANNELS: usize = 1024;

/// Most plugin messages held back while no backend has joined.
pub const MAX_QUEUED_PLUGIN_MESSAGES: usize = 128;

/// Most configuration frames held back while the client has yet to
/// acknowledge a StartUpdate.
pub const MAX_QUEUED_CONFIG_PACKETS: usize = 1024;

pub type PermissionFn = Arc<dyn Fn(&str) -> Option<bool> + Send + Sync>;

/// Immutable facts about a player plus the server they are on.
pub struct PlayerInfo {
    pub profile: GameProfile,
    pub version: ProtocolVersion,
    pub remote: SocketAddr,
    pub(crate) current_server: RwLock<Option<String>>,
    pub(crate) permissions: PermissionFn,
}

/// A cheap, cloneable reference to an online player.
///
/// Every action goes through the player's session, so it is safe to call
/// from any task.
#[derive(Clone)]
pub struct PlayerHandle {
    info: Arc<PlayerInfo>,
    tasks: flume::Sender<SessionTask>,
}

impl fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("username", &self.info.profile.name)
            .field("uuid", &self.info.profile.id)
            .finish()
    }
}

impl PlayerHandle {
    pub(crate) fn new(info: PlayerInfo, tasks: flume::Sender<SessionTask>) -> Self {
        Self {
            info: Arc::new(info),
            tasks,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.info.profile.id
    }

    pub fn username(&self) -> &str {
        &self.info.profile.name
    }

    pub fn profile(&self) -> &GameProfile {
        &self.info.profile
    }

    pub fn properties(&self) -> &[GameProfileProperty] {
        &self.info.profile.properties
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.info.version
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.info.remote
    }

    pub fn current_server(&self) -> Option<String> {
        self.info.current_server.read().clone()
    }

    pub fn permission_value(&self, permission: &str) -> Option<bool> {
        (self.info.permissions)(permission)
    }

    pub(crate) fn same_player(&self, other: &PlayerHandle) -> bool {
        Arc::ptr_eq(&self.info, &other.info)
    }

    pub(crate) fn set_current_server(&self, server: Option<String>) {
        *self.info.current_server.write() = server;
    }

    fn run(&self, task: impl FnOnce(&mut Session) + Send + 'static) -> bool {
        self.tasks.send(Box::new(task)).is_ok()
    }

    /// Shows a chat message. Ignored if the player is not in play.
    pub fn send_message(&self, message: Component) {
        self.run(move |session| session.send_player_message(message));
    }

    pub fn disconnect(&self, reason: Component) {
        self.run(move |session| session.disconnect(reason));
    }

    /// Switches the player to `server` and waits for the outcome.
    pub async fn connect(&self, server: &str) -> ConnectionResult {
        let (resolver, result) = oneshot::channel();
        let server = server.to_owned();
        if !self.run(move |session| session.request_connect(&server, Some(resolver))) {
            return ConnectionResult::Failed("player disconnected".to_owned());
        }
        result
            .await
            .unwrap_or_else(|_| ConnectionResult::Failed("player disconnected".to_owned()))
    }
}

/// What the proxy does while a backend reconfigures the client.
#[derive(Debug, Default)]
pub(crate) enum Reconfiguration {
    #[default]
    None,
    /// StartUpdate was sent for a server switch. Frames from the new
    /// backend wait here until the client acknowledges it.
    AwaitingAck(Vec<RawPacket>),
    /// The current backend sent StartUpdate itself.
    BackendInitiated,
}

impl Reconfiguration {
    /// Holds a frame for the client if it has yet to acknowledge the
    /// StartUpdate. `Ok(false)` means the frame can be sent right away.
    pub(crate) fn hold(&mut self, raw: &RawPacket) -> Result<bool, ConnectionError> {
        let Reconfiguration::AwaitingAck(queued) = self else {
            return Ok(false);
        };
        if queued.len() >= MAX_QUEUED_CONFIG_PACKETS {
            return Err(ConnectionError::violation(format!(
                "more than {MAX_QUEUED_CONFIG_PACKETS} configuration packets before the client \
                 acknowledged the switch"
            )));
        }
        queued.push(raw.clone());
        Ok(true)
    }
}

/// Player state owned by the session.
pub struct ConnectedPlayer {
    pub(crate) handle: PlayerHandle,
    /// Backend the player is playing on.
    pub(crate) connected: Option<u64>,
    /// Backend a switch is in progress to.
    pub(crate) in_flight: Option<u64>,
    /// A switch was requested but no backend was opened yet.
    pub(crate) connecting: bool,
    pub(crate) known_channels: AHashSet<String>,
    pub(crate) boss_bars: AHashSet<Uuid>,
    pub(crate) settings: Option<ClientSettings>,
    pub(crate) brand: Option<PluginMessage>,
    pub(crate) queued_messages: VecDeque<PluginMessage>,
    pub(crate) tried_servers: Vec<String>,
    pub(crate) reconfiguration: Reconfiguration,
    /// Text of a pre-1.13 tab completion forwarded to the backend.
    pub(crate) outstanding_tab_complete: Option<String>,
    pub(crate) legacy_forge: bool,
}

impl ConnectedPlayer {
    pub(crate) fn new(handle: PlayerHandle, legacy_forge: bool) -> Self {
        Self {
            handle,
            connected: None,
            in_flight: None,
            connecting: false,
            known_channels: AHashSet::new(),
            boss_bars: AHashSet::new(),
            settings: None,
            brand: None,
            queued_messages: VecDeque::new(),
            tried_servers: Vec::new(),
            reconfiguration: Reconfiguration::None,
            outstanding_tab_complete: None,
            legacy_forge,
        }
    }

    pub fn handle(&self) -> &PlayerHandle {
        &self.handle
    }

    pub(crate) fn register_channels(
        &mut self,
        channels: impl IntoIterator<Item = String>,
    ) -> Result<(), ConnectionError> {
        for channel in channels {
            if self.known_channels.len() >= MAX_KNOWN_CHANNELS
                && !self.known_channels.contains(&channel)
            {
                return Err(ConnectionError::violation(format!(
                    "more than {MAX_KNOWN_CHANNELS} plugin channels registered"
                )));
            }
            self.known_channels.insert(channel);
        }
        Ok(())
    }

    pub(crate) fn unregister_channels(&mut self, channels: impl IntoIterator<Item = String>) {
        for channel in channels {
            self.known_channels.remove(&channel);
        }
    }

    pub(crate) fn queue_plugin_message(
        &mut self,
        message: PluginMessage,
    ) -> Result<(), ConnectionError> {
        if self.queued_messages.len() >= MAX_QUEUED_PLUGIN_MESSAGES {
            return Err(ConnectionError::violation(
                "too many plugin messages before joining a server",
            ));
        }
        self.queued_messages.push_back(message);
        Ok(())
    }
}

/// Every online player, by UUID and by lowercase name.
#[derive(Default)]
pub struct PlayerRegistry {
    by_uuid: DashMap<Uuid, PlayerHandle>,
    by_name: DashMap<String, Uuid>,
}

impl PlayerRegistry {
    /// Adds a player unless one with the same UUID or name is online.
    pub fn register(&self, handle: PlayerHandle) -> bool {
        let Entry::Vacant(by_uuid) = self.by_uuid.entry(handle.uuid()) else {
            return false;
        };
        let Entry::Vacant(by_name) = self.by_name.entry(handle.username().to_lowercase()) else {
            return false;
        };
        by_name.insert(handle.uuid());
        by_uuid.insert(handle);
        true
    }

    /// Removes `handle`, leaving a different player with the same UUID alone.
    pub fn unregister(&self, handle: &PlayerHandle) {
        let removed = self
            .by_uuid
            .remove_if(&handle.uuid(), |_, registered| registered.same_player(handle));
        if removed.is_some() {
            self.by_name
                .remove_if(&handle.username().to_lowercase(), |_, uuid| *uuid == handle.uuid());
        }
    }

    pub fn contains(&self, uuid: Uuid, username: &str) -> bool {
        self.by_uuid.contains_key(&uuid) || self.by_name.contains_key(&username.to_lowercase())
    }

    pub fn get(&self, uuid: Uuid) -> Option<PlayerHandle> {
        self.by_uuid.get(&uuid).map(|entry| entry.value().clone())
    }

    pub fn get_by_name(&self, username: &str) -> Option<PlayerHandle> {
        let uuid = *self.by_name.get(&username.to_lowercase())?;
        self.get(uuid)
    }

    pub fn count(&self) -> usize {
        self.by_uuid.len()
    }

    pub fn all(&self) -> Vec<PlayerHandle> {
        self.by_uuid.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn on_server(&self, server: &str) -> Vec<PlayerHandle> {
        self.by_uuid
            .iter()
            .filter(|entry| entry.current_server().as_deref() == Some(server))
            .map(|entry| entry.value().clone())
            .collect()
    }
}
