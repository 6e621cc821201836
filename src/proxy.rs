//! The proxy server: state shared by every session, and the listener loop.

use crate::{
    auth::{MojangSessionService, ServerKeyPair, SessionService},
    command::{builtin, CommandManager},
    config::{Config, ServerInfo},
    connection::BoxedStream,
    events::{EventHooks, NoHooks},
    player::PlayerRegistry,
    protocol::{component::Component, ProtocolVersion},
    session,
};
use anyhow::Context;
use async_trait::async_trait;
use mini_moka::sync::Cache;
use parking_lot::RwLock;
use std::{
    collections::BTreeSet,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Appended to the brand backends report to the client.
pub const PROXY_BRAND: &str = "SwitchProxy";

/// How long sessions get to send their goodbyes on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Opens connections to backend servers.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, server: &ServerInfo) -> anyhow::Result<(BoxedStream, SocketAddr)>;
}

pub struct TcpConnector;

#[async_trait]
impl BackendConnector for TcpConnector {
    async fn connect(&self, server: &ServerInfo) -> anyhow::Result<(BoxedStream, SocketAddr)> {
        let stream = TcpStream::connect(&server.address)
            .await
            .with_context(|| format!("failed to connect to {}", server.address))?;
        stream.set_nodelay(true)?;
        let remote = stream.peer_addr()?;
        Ok((Box::new(stream), remote))
    }
}

/// Refuses logins from an address seen less than an interval ago.
pub struct LoginLimiter {
    last_attempts: Cache<IpAddr, Instant>,
    interval: Duration,
}

impl LoginLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_attempts: Cache::builder()
                .max_capacity(65_536)
                .time_to_live(interval.max(Duration::from_millis(1)))
                .build(),
            interval,
        }
    }

    pub fn attempt(&self, ip: IpAddr) -> bool {
        if self.interval.is_zero() {
            return true;
        }
        let now = Instant::now();
        if let Some(last) = self.last_attempts.get(&ip) {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_attempts.insert(ip, now);
        true
    }
}

/// Plugin channels the proxy itself listens on. Announced to every
/// backend a player joins.
#[derive(Default)]
pub struct ChannelRegistrar {
    channels: RwLock<BTreeSet<String>>,
}

impl ChannelRegistrar {
    pub fn register(&self, channel: impl Into<String>) {
        self.channels.write().insert(channel.into());
    }

    pub fn unregister(&self, channel: &str) {
        self.channels.write().remove(channel);
    }

    pub fn all(&self) -> Vec<String> {
        self.channels.read().iter().cloned().collect()
    }
}

pub struct ProxyServer {
    pub config: Config,
    pub players: PlayerRegistry,
    pub commands: CommandManager,
    pub channels: ChannelRegistrar,
    pub(crate) hooks: Arc<dyn EventHooks>,
    pub(crate) session_service: Arc<dyn SessionService>,
    pub(crate) connector: Arc<dyn BackendConnector>,
    key_pair: ServerKeyPair,
    limiter: LoginLimiter,
    sessions: TaskTracker,
    shutdown: CancellationToken,
}

pub struct ProxyBuilder {
    config: Config,
    hooks: Arc<dyn EventHooks>,
    session_service: Arc<dyn SessionService>,
    connector: Arc<dyn BackendConnector>,
}

impl ProxyBuilder {
    pub fn hooks(mut self, hooks: Arc<dyn EventHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn session_service(mut self, service: Arc<dyn SessionService>) -> Self {
        self.session_service = service;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn BackendConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn build(self) -> anyhow::Result<Arc<ProxyServer>> {
        self.config.validate()?;
        let key_pair = ServerKeyPair::generate()?;
        let proxy = Arc::new(ProxyServer {
            players: PlayerRegistry::default(),
            commands: CommandManager::new(),
            channels: ChannelRegistrar::default(),
            hooks: self.hooks,
            session_service: self.session_service,
            connector: self.connector,
            key_pair,
            limiter: LoginLimiter::new(self.config.login_ratelimit()),
            sessions: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config: self.config,
        });
        builtin::register(&proxy)?;
        Ok(proxy)
    }
}

impl ProxyServer {
    pub fn builder(config: Config) -> ProxyBuilder {
        ProxyBuilder {
            config,
            hooks: Arc::new(NoHooks),
            session_service: Arc::new(MojangSessionService::default()),
            connector: Arc::new(TcpConnector),
        }
    }

    pub fn server(&self, name: &str) -> Option<ServerInfo> {
        self.config.servers.get(name).map(|address| ServerInfo {
            name: name.to_owned(),
            address: address.clone(),
        })
    }

    pub(crate) fn key_pair(&self) -> &ServerKeyPair {
        &self.key_pair
    }

    pub(crate) fn login_limiter(&self) -> &LoginLimiter {
        &self.limiter
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Disconnects every player and stops accepting connections.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Shutting down with {} players online", self.players.count());
            self.shutdown.cancel();
        }
    }

    /// The server list entry, shown in the client's version when it is
    /// supported.
    pub(crate) fn status_json(&self, client_protocol: i32) -> String {
        let (name, protocol) = match ProtocolVersion::from_protocol(client_protocol) {
            Some(version) => (version.name().to_owned(), version.protocol()),
            None => (
                format!("{PROXY_BRAND} {}", ProtocolVersion::supported_range()),
                ProtocolVersion::MAXIMUM.protocol(),
            ),
        };
        serde_json::json!({
            "version": { "name": name, "protocol": protocol },
            "players": {
                "max": self.config.show_max_players,
                "online": self.players.count(),
                "sample": [],
            },
            "description": Component::text(&self.config.motd).as_json(),
        })
        .to_string()
    }

    /// Accepts clients until [`shutdown`](Self::shutdown) is called, then
    /// waits for their sessions to close.
    pub async fn run(self: &Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("Listening on {}", listener.local_addr()?);
        loop {
            let accepted = select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, remote) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept a connection: {e}");
                    continue;
                }
            };

            tracing::debug!("Accepted connection from {remote}");
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!("Cannot disable Nagle for {remote}: {e}");
            }
            let proxy = Arc::clone(self);
            self.sessions
                .spawn(async move { session::serve(proxy, Box::new(stream), remote).await });
        }

        self.sessions.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.sessions.wait())
            .await
            .is_err()
        {
            tracing::warn!("{} sessions did not close in time", self.sessions.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_limiter_refuses_quick_retries() {
        let limiter = LoginLimiter::new(Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.attempt(ip));
        assert!(!limiter.attempt(ip));
        assert!(limiter.attempt("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn disabled_login_limiter_allows_everything() {
        let limiter = LoginLimiter::new(Duration::ZERO);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.attempt(ip));
        assert!(limiter.attempt(ip));
    }

    #[test]
    fn status_reports_supported_version() {
        let mut config = Config::default();
        config.motd = "hello".to_owned();
        let proxy = ProxyServer::builder(config).build().unwrap();

        let status: serde_json::Value =
            serde_json::from_str(&proxy.status_json(ProtocolVersion::V1_12_2.protocol())).unwrap();
        assert_eq!(status["version"]["protocol"], 340);
        assert_eq!(status["players"]["online"], 0);

        let status: serde_json::Value = serde_json::from_str(&proxy.status_json(1)).unwrap();
        assert_eq!(status["version"]["protocol"], ProtocolVersion::MAXIMUM.protocol());
        assert!(status["version"]["name"]
            .as_str()
            .unwrap()
            .starts_with(PROXY_BRAND));
    }
}
