use crate::{
    config::{Config, ServerInfo},
    connection::{BoxedStream, ConnKey, Connection, ConnectionOptions},
    player::MAX_KNOWN_CHANNELS,
    protocol::{
        component::Component,
        packet::{
            BossBar, ClientSettings, Disconnect, FinishedUpdate, Handshake, InboundPacket,
            JoinGame, LoginAcknowledged, NextState, Packet, PacketKind, PluginMessage,
            ServerLogin, ServerLoginSuccess, StartUpdate, StatusPing, StatusRequest,
        },
        plugin_message,
        registry::registry,
        ConnectionState, Direction, ProtocolVersion,
    },
    proxy::{BackendConnector, ProxyServer},
    session::{self, SessionEvent},
    switch::ConnectionResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::io::{duplex, DuplexStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Hands the backend side of every connection to the test. `broken`
/// refuses connections and `slow` never answers.
struct TestConnector {
    backends: flume::Sender<(String, DuplexStream)>,
}

#[async_trait]
impl BackendConnector for TestConnector {
    async fn connect(&self, server: &ServerInfo) -> anyhow::Result<(BoxedStream, SocketAddr)> {
        match server.name.as_str() {
            "broken" => anyhow::bail!("connection refused"),
            "slow" => std::future::pending().await,
            _ => {
                let (proxy_side, backend_side) = duplex(64 * 1024);
                self.backends.send((server.name.clone(), backend_side))?;
                Ok((Box::new(proxy_side), server.address.parse()?))
            }
        }
    }
}

/// The far end of a connection, driven by the test.
struct Peer {
    conn: Connection,
    events: flume::Receiver<SessionEvent>,
    _cancel: CancellationToken,
}

impl Peer {
    fn new(stream: DuplexStream, inbound: Direction, version: ProtocolVersion) -> Self {
        let (events_tx, events) = flume::unbounded();
        let cancel = CancellationToken::new();
        let conn = Connection::spawn(
            Box::new(stream),
            ConnectionOptions {
                key: ConnKey::Client,
                remote: "127.0.0.1:40000".parse().unwrap(),
                inbound,
                version,
                read_timeout: Duration::from_secs(30),
            },
            events_tx,
            &cancel,
        );
        Self {
            conn,
            events,
            _cancel: cancel,
        }
    }

    /// The next frame, or `None` once the other side closed.
    async fn recv(&mut self) -> Option<InboundPacket> {
        loop {
            if let Some(packet) = self.conn.next_packet().unwrap() {
                return Some(packet);
            }
            let event = tokio::time::timeout(TIMEOUT, self.events.recv_async())
                .await
                .expect("timed out waiting for a packet")
                .ok()?;
            match event {
                SessionEvent::Data { data, .. } => self.conn.give_data(&data),
                SessionEvent::Closed { .. } => return None,
            }
        }
    }

    /// The next packet that decodes, skipping opaque frames.
    async fn expect(&mut self) -> Packet {
        loop {
            let inbound = self.recv().await.expect("connection closed");
            if let Some(packet) = inbound.packet {
                return packet;
            }
        }
    }
}

struct Harness {
    proxy: Arc<ProxyServer>,
    backends: flume::Receiver<(String, DuplexStream)>,
}

impl Harness {
    fn new() -> Self {
        Self::with_try_servers(&["lobby"])
    }

    fn with_try_servers(try_servers: &[&str]) -> Self {
        let mut config = Config::default();
        config.online_mode = false;
        config.compression_threshold = -1;
        config.login_ratelimit_ms = 0;
        config.connection_timeout_ms = 60_000;
        let servers = [("lobby", 30001), ("survival", 30002), ("broken", 30003), ("slow", 30004)];
        for (name, port) in servers {
            config
                .servers
                .insert(name.to_owned(), format!("127.0.0.1:{port}"));
        }
        config.try_servers = try_servers.iter().map(|name| name.to_string()).collect();

        let (backends_tx, backends) = flume::unbounded();
        let proxy = ProxyServer::builder(config)
            .connector(Arc::new(TestConnector {
                backends: backends_tx,
            }))
            .build()
            .unwrap();
        Self { proxy, backends }
    }

    fn connect(&self, version: ProtocolVersion) -> Peer {
        let (client_side, proxy_side) = duplex(64 * 1024);
        tokio::spawn(session::serve(
            Arc::clone(&self.proxy),
            Box::new(proxy_side),
            "127.0.0.1:50000".parse().unwrap(),
        ));
        Peer::new(client_side, Direction::Clientbound, version)
    }

    async fn next_backend(&self, version: ProtocolVersion) -> (String, Peer) {
        let (name, stream) = tokio::time::timeout(TIMEOUT, self.backends.recv_async())
            .await
            .expect("no backend connection")
            .unwrap();
        (name, Peer::new(stream, Direction::Serverbound, version))
    }

    /// Sends the handshake and login start of a client.
    fn start_login(&self, username: &str, version: ProtocolVersion) -> Peer {
        let mut client = self.connect(version);
        client.conn.write(Handshake {
            protocol_version: version.protocol(),
            server_address: "localhost".to_owned(),
            port: 25577,
            next_state: NextState::Login,
        });
        client.conn.set_state(ConnectionState::Login);
        client.conn.write(ServerLogin {
            username: username.to_owned(),
            player_key: None,
            holder_uuid: Some(Uuid::new_v4()),
        });
        client
    }

    /// Waits for the proxy to open `server` and reads its login start.
    /// The backend is left in the login state.
    async fn accept_backend(&self, server: &str, version: ProtocolVersion) -> (Peer, ServerLogin) {
        let (name, mut backend) = self.next_backend(version).await;
        assert_eq!(name, server);
        let Packet::Handshake(handshake) = backend.expect().await else {
            panic!("expected handshake");
        };
        assert_eq!(handshake.server_address, "127.0.0.1");
        assert_eq!(handshake.next_state, NextState::Login);
        backend.conn.set_state(ConnectionState::Login);
        let Packet::ServerLogin(login) = backend.expect().await else {
            panic!("expected login");
        };
        (backend, login)
    }

    /// Accepts a pre-1.20.2 player on `server` and sends JoinGame.
    async fn join_backend(&self, server: &str, version: ProtocolVersion, entity_id: i32) -> Peer {
        let (mut backend, login) = self.accept_backend(server, version).await;
        let uuid = login.holder_uuid.unwrap_or_default();
        backend.conn.write(ServerLoginSuccess {
            uuid,
            username: login.username,
            properties: Vec::new(),
        });
        backend.conn.set_state(ConnectionState::Play);
        backend.conn.write(join_game(entity_id));
        backend
    }

    /// Logs a 1.12.2 client in and lets the lobby accept it.
    async fn join_lobby(&self, username: &str) -> (Peer, Peer) {
        let version = ProtocolVersion::V1_12_2;
        let mut client = self.start_login(username, version);
        let Packet::ServerLoginSuccess(success) = client.expect().await else {
            panic!("expected login success");
        };
        assert_eq!(success.username, username);
        client.conn.set_state(ConnectionState::Play);

        let backend = self.join_backend("lobby", version, 1).await;
        let Packet::JoinGame(join) = client.expect().await else {
            panic!("expected join game");
        };
        assert_eq!(join.entity_id, 1);
        (client, backend)
    }

    /// Logs a 1.20.2 client in through the configuration phase. The
    /// client's settings and brand must reach the lobby, whose brand
    /// reaches the client.
    async fn join_lobby_configured(&self, username: &str) -> (Peer, Peer) {
        let version = ProtocolVersion::V1_20_2;
        let mut client = self.start_login(username, version);
        let Packet::ServerLoginSuccess(_) = client.expect().await else {
            panic!("expected login success");
        };
        client.conn.write(LoginAcknowledged);
        client.conn.set_state(ConnectionState::Config);
        client.conn.write(settings());
        client.conn.write(brand("vanilla"));

        let (mut lobby, login) = self.accept_backend("lobby", version).await;
        lobby.conn.write(ServerLoginSuccess {
            uuid: login.holder_uuid.unwrap_or_default(),
            username: login.username,
            properties: Vec::new(),
        });
        let Packet::LoginAcknowledged(_) = lobby.expect().await else {
            panic!("expected login acknowledgement");
        };
        lobby.conn.set_state(ConnectionState::Config);

        let mut replayed = vec![lobby.expect().await, lobby.expect().await];
        replayed.sort_by_key(|packet| packet.kind() != PacketKind::ClientSettings);
        match &replayed[..] {
            [Packet::ClientSettings(received), Packet::PluginMessage(message)] => {
                assert_eq!(*received, settings());
                assert!(plugin_message::is_brand(message));
                assert_eq!(plugin_message::read_brand(&message.data), "vanilla");
            }
            other => panic!("unexpected {other:?}"),
        }

        lobby.conn.write(brand("Paper"));
        lobby.conn.write(FinishedUpdate);
        let Packet::PluginMessage(message) = client.expect().await else {
            panic!("expected brand");
        };
        assert_eq!(plugin_message::read_brand(&message.data), "Paper (SwitchProxy)");
        let Packet::FinishedUpdate(_) = client.expect().await else {
            panic!("expected end of configuration");
        };
        client.conn.write(FinishedUpdate);
        client.conn.set_state(ConnectionState::Play);

        let Packet::FinishedUpdate(_) = lobby.expect().await else {
            panic!("expected configuration acknowledgement");
        };
        lobby.conn.set_state(ConnectionState::Play);
        lobby.conn.write(join_game(1));
        let Packet::JoinGame(join) = client.expect().await else {
            panic!("expected join game");
        };
        assert_eq!(join.entity_id, 1);
        (client, lobby)
    }
}

fn join_game(entity_id: i32) -> JoinGame {
    let mut join = JoinGame::empty(entity_id);
    join.max_players = 20;
    join.level_type = Some("default".to_owned());
    join
}

fn settings() -> ClientSettings {
    ClientSettings {
        locale: "en_us".to_owned(),
        view_distance: 8,
        chat_visibility: 0,
        chat_colors: true,
        skin_parts: 0x7f,
        main_hand: 1,
        text_filtering: false,
        client_listing: true,
    }
}

fn brand(name: &str) -> PluginMessage {
    let mut data = vec![name.len() as u8];
    data.extend_from_slice(name.as_bytes());
    PluginMessage::new("minecraft:brand", data)
}

fn is_kind(inbound: &InboundPacket, version: ProtocolVersion, kind: PacketKind) -> bool {
    registry().packet_id(ConnectionState::Play, Direction::Clientbound, version, kind)
        == Some(inbound.raw.id)
}

#[tokio::test]
async fn outdated_clients_are_told_the_supported_range() {
    let harness = Harness::new();
    let mut client = harness.connect(ProtocolVersion::MINIMUM);
    client.conn.write(Handshake {
        protocol_version: 5,
        server_address: "localhost".to_owned(),
        port: 25577,
        next_state: NextState::Login,
    });
    client.conn.set_state(ConnectionState::Login);

    let Packet::Disconnect(Disconnect { reason }) = client.expect().await else {
        panic!("expected disconnect");
    };
    assert!(reason
        .to_json_string()
        .contains("multiplayer.disconnect.outdated_client"));
    assert!(client.recv().await.is_none());
}

#[tokio::test]
async fn status_is_answered() {
    let harness = Harness::new();
    let mut client = harness.connect(ProtocolVersion::V1_20_3);
    client.conn.write(Handshake {
        protocol_version: ProtocolVersion::V1_20_3.protocol(),
        server_address: "localhost".to_owned(),
        port: 25577,
        next_state: NextState::Status,
    });
    client.conn.set_state(ConnectionState::Status);
    client.conn.write(StatusRequest);

    let Packet::StatusResponse(response) = client.expect().await else {
        panic!("expected status");
    };
    let status: serde_json::Value = serde_json::from_str(&response.json).unwrap();
    assert_eq!(status["version"]["protocol"], ProtocolVersion::V1_20_3.protocol());

    client.conn.write(StatusPing { payload: 42 });
    let Packet::StatusPing(pong) = client.expect().await else {
        panic!("expected pong");
    };
    assert_eq!(pong.payload, 42);
    assert!(client.recv().await.is_none());
}

#[tokio::test]
async fn login_acknowledged_before_success_is_rejected() {
    let harness = Harness::new();
    let version = ProtocolVersion::V1_20_2;
    let mut client = harness.connect(version);
    client.conn.write(Handshake {
        protocol_version: version.protocol(),
        server_address: "localhost".to_owned(),
        port: 25577,
        next_state: NextState::Login,
    });
    client.conn.set_state(ConnectionState::Login);
    client.conn.write(LoginAcknowledged);

    let Packet::Disconnect(Disconnect { reason }) = client.expect().await else {
        panic!("expected disconnect");
    };
    assert!(reason
        .to_json_string()
        .contains("multiplayer.disconnect.invalid_player_data"));
}

#[tokio::test]
async fn players_join_the_first_try_server() {
    let harness = Harness::new();
    let (_client, _backend) = harness.join_lobby("Steve").await;

    let player = harness.proxy.players.get_by_name("steve").unwrap();
    assert_eq!(player.current_server().as_deref(), Some("lobby"));
    assert_eq!(harness.proxy.players.on_server("lobby").len(), 1);
}

#[tokio::test]
async fn failed_switch_keeps_the_player_where_they_are() {
    let harness = Harness::new();
    let (mut client, _backend) = harness.join_lobby("Steve").await;
    let player = harness.proxy.players.get_by_name("Steve").unwrap();

    match player.connect("broken").await {
        ConnectionResult::Failed(message) => assert!(message.contains("connection refused")),
        other => panic!("unexpected {other:?}"),
    }
    let message = client.recv().await.expect("connection closed");
    assert!(is_kind(&message, ProtocolVersion::V1_12_2, PacketKind::SystemChat));
    assert_eq!(player.current_server().as_deref(), Some("lobby"));
    assert_eq!(player.connect("lobby").await, ConnectionResult::AlreadyConnected);
}

#[tokio::test]
async fn only_one_switch_runs_at_a_time() {
    let harness = Harness::new();
    let (_client, _backend) = harness.join_lobby("Steve").await;
    let player = harness.proxy.players.get_by_name("Steve").unwrap();

    let first = player.connect("slow");
    tokio::pin!(first);
    assert!(futures::poll!(&mut first).is_pending());
    assert_eq!(
        player.connect("survival").await,
        ConnectionResult::ConnectionInProgress
    );
    assert_eq!(
        player.connect("missing").await,
        ConnectionResult::Failed("unknown server 'missing'".to_owned())
    );
}

#[tokio::test]
async fn kicked_players_without_fallback_are_disconnected() {
    let harness = Harness::new();
    let (mut client, mut backend) = harness.join_lobby("Steve").await;

    backend.conn.write(Disconnect {
        reason: Component::text("banned"),
    });
    let Packet::Disconnect(Disconnect { reason }) = client.expect().await else {
        panic!("expected disconnect");
    };
    assert_eq!(reason.plain_text(), "You were kicked from lobby: banned");
    assert!(client.recv().await.is_none());

    tokio::time::timeout(TIMEOUT, async {
        while harness.proxy.players.count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("player was not unregistered");
}

#[tokio::test]
async fn duplicate_logins_are_refused() {
    let harness = Harness::new();
    let (_client, _backend) = harness.join_lobby("Steve").await;

    let mut second = harness.start_login("steve", ProtocolVersion::V1_12_2);
    let Packet::Disconnect(Disconnect { reason }) = second.expect().await else {
        panic!("expected disconnect");
    };
    assert_eq!(reason.plain_text(), "You are already connected to this proxy!");
}

#[tokio::test]
async fn settings_and_queued_messages_reach_the_first_server() {
    let harness = Harness::new();
    let version = ProtocolVersion::V1_12_2;
    let mut client = harness.start_login("Steve", version);
    let Packet::ServerLoginSuccess(_) = client.expect().await else {
        panic!("expected login success");
    };
    client.conn.set_state(ConnectionState::Play);
    client.conn.write(PluginMessage::new("mod:hello", vec![1u8, 2, 3]));
    client.conn.write(settings());

    let mut lobby = harness.join_backend("lobby", version, 1).await;
    let Packet::PluginMessage(message) = lobby.expect().await else {
        panic!("expected queued plugin message");
    };
    assert_eq!(message.channel, "mod:hello");
    assert_eq!(message.data, Bytes::from_static(&[1, 2, 3]));
    let Packet::ClientSettings(received) = lobby.expect().await else {
        panic!("expected client settings");
    };
    assert_eq!(received, settings());

    let Packet::JoinGame(join) = client.expect().await else {
        panic!("expected join game");
    };
    assert_eq!(join.entity_id, 1);
}

#[tokio::test]
async fn switching_servers_moves_the_client_state_along() {
    let harness = Harness::new();
    let version = ProtocolVersion::V1_12_2;
    let (mut client, mut lobby) = harness.join_lobby("Steve").await;
    let player = harness.proxy.players.get_by_name("Steve").unwrap();

    client
        .conn
        .write(plugin_message::register_channels(version, ["mod:sync"]));
    client.conn.write(settings());
    let Packet::PluginMessage(register) = lobby.expect().await else {
        panic!("expected REGISTER");
    };
    assert!(plugin_message::is_register(&register));
    let Packet::ClientSettings(_) = lobby.expect().await else {
        panic!("expected client settings");
    };

    let bar = Uuid::new_v4();
    lobby.conn.write(BossBar {
        uuid: bar,
        action: BossBar::ADD,
        data: Bytes::from_static(&[0, 0]),
    });
    let Packet::BossBar(shown) = client.expect().await else {
        panic!("expected boss bar");
    };
    assert_eq!(shown.uuid, bar);

    let switch = {
        let player = player.clone();
        tokio::spawn(async move { player.connect("survival").await })
    };
    let mut survival = harness.join_backend("survival", version, 2).await;

    let Packet::BossBar(removed) = client.expect().await else {
        panic!("expected boss bar removal");
    };
    assert_eq!((removed.uuid, removed.action), (bar, BossBar::REMOVE));
    let Packet::JoinGame(join) = client.expect().await else {
        panic!("expected join game");
    };
    assert_eq!(join.entity_id, 2);
    assert_eq!(join.dimension, -1);
    let respawn = client.recv().await.expect("connection closed");
    assert!(is_kind(&respawn, version, PacketKind::Respawn));

    let Packet::PluginMessage(register) = survival.expect().await else {
        panic!("expected REGISTER");
    };
    assert_eq!(plugin_message::channels(&register), ["mod:sync"]);
    let Packet::ClientSettings(received) = survival.expect().await else {
        panic!("expected client settings");
    };
    assert_eq!(received, settings());

    assert_eq!(switch.await.unwrap(), ConnectionResult::Success);
    assert_eq!(player.current_server().as_deref(), Some("survival"));
    assert!(lobby.recv().await.is_none());
}

#[tokio::test]
async fn configuration_runs_between_login_and_join() {
    let harness = Harness::new();
    let (_client, _lobby) = harness.join_lobby_configured("Alex").await;

    let player = harness.proxy.players.get_by_name("Alex").unwrap();
    assert_eq!(player.current_server().as_deref(), Some("lobby"));
}

#[tokio::test]
async fn backends_may_reconfigure_the_client() {
    let harness = Harness::new();
    let (mut client, mut lobby) = harness.join_lobby_configured("Alex").await;

    lobby.conn.write(StartUpdate);
    let Packet::StartUpdate(_) = client.expect().await else {
        panic!("expected start of configuration");
    };
    client.conn.write(FinishedUpdate);
    client.conn.set_state(ConnectionState::Config);

    let Packet::FinishedUpdate(_) = lobby.expect().await else {
        panic!("expected configuration acknowledgement");
    };
    lobby.conn.set_state(ConnectionState::Config);
    lobby.conn.write(FinishedUpdate);
    let Packet::FinishedUpdate(_) = client.expect().await else {
        panic!("expected end of configuration");
    };
    client.conn.write(FinishedUpdate);
    client.conn.set_state(ConnectionState::Play);

    let Packet::FinishedUpdate(_) = lobby.expect().await else {
        panic!("expected end of configuration");
    };
    lobby.conn.set_state(ConnectionState::Play);
    lobby.conn.write(join_game(7));
    let Packet::JoinGame(join) = client.expect().await else {
        panic!("expected join game");
    };
    assert_eq!(join.entity_id, 7);
}

#[tokio::test]
async fn too_many_channels_disconnect_the_client() {
    let harness = Harness::new();
    let (mut client, _lobby) = harness.join_lobby("Steve").await;

    let names: Vec<String> = (0..=MAX_KNOWN_CHANNELS).map(|i| format!("mod:c{i}")).collect();
    client.conn.write(plugin_message::register_channels(
        ProtocolVersion::V1_12_2,
        names.iter().map(String::as_str),
    ));

    let Packet::Disconnect(Disconnect { reason }) = client.expect().await else {
        panic!("expected disconnect");
    };
    assert_eq!(reason.plain_text(), "An internal error occurred in your connection.");
    assert!(client.recv().await.is_none());
}

#[tokio::test]
async fn boss_bars_are_removed_once_when_kicked_to_a_fallback() {
    let harness = Harness::with_try_servers(&["lobby", "survival"]);
    let version = ProtocolVersion::V1_12_2;
    let (mut client, mut lobby) = harness.join_lobby("Steve").await;

    let bar = Uuid::new_v4();
    lobby.conn.write(BossBar {
        uuid: bar,
        action: BossBar::ADD,
        data: Bytes::from_static(&[0, 0]),
    });
    let Packet::BossBar(_) = client.expect().await else {
        panic!("expected boss bar");
    };
    lobby.conn.write(Disconnect {
        reason: Component::text("restarting"),
    });

    let _survival = harness.join_backend("survival", version, 2).await;
    let mut removals = 0;
    loop {
        match client.expect().await {
            Packet::BossBar(removed) => {
                assert_eq!((removed.uuid, removed.action), (bar, BossBar::REMOVE));
                removals += 1;
            }
            Packet::JoinGame(join) => {
                assert_eq!(join.entity_id, 2);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(removals, 1);
}

#[tokio::test]
async fn refused_manual_connect_does_not_block_fallback() {
    let harness = Harness::with_try_servers(&["lobby", "survival"]);
    let version = ProtocolVersion::V1_12_2;
    let (mut client, mut lobby) = harness.join_lobby("Steve").await;
    let player = harness.proxy.players.get_by_name("Steve").unwrap();

    let switch = {
        let player = player.clone();
        tokio::spawn(async move { player.connect("survival").await })
    };
    let (mut survival, _) = harness.accept_backend("survival", version).await;
    survival.conn.write(Disconnect {
        reason: Component::text("whitelist"),
    });
    match switch.await.unwrap() {
        ConnectionResult::ServerDisconnected(reason) => {
            assert_eq!(reason.plain_text(), "whitelist")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(player.current_server().as_deref(), Some("lobby"));

    lobby.conn.write(Disconnect {
        reason: Component::text("restarting"),
    });
    let _survival = harness.join_backend("survival", version, 2).await;
    loop {
        if let Packet::JoinGame(join) = client.expect().await {
            assert_eq!(join.entity_id, 2);
            break;
        }
    }
    assert_eq!(player.current_server().as_deref(), Some("survival"));
}
