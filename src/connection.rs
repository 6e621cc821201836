//! One socket of a session, either the client or a backend.
//!
//! Reading and writing are offloaded to Tokio tasks. The reader task
//! moves raw chunks into the session's event channel, which is bounded
//! and so pushes back on a fast peer. The writer task drains encoded
//! frames. Everything else (framing, compression, encryption, packet
//! ids) happens on the session task that owns the [`Connection`].

use crate::{
    command::CommandError,
    protocol::{
        codec::{CompressionSettings, EncryptionKey, FrameCodec, FrameError},
        component::Component,
        packet::{Disconnect, InboundPacket, Packet, PacketKind, RawPacket},
        registry::registry,
        ConnectionState, DecodeError, Decoder, Direction, ProtocolVersion,
    },
    session::SessionEvent,
};
use bytes::Bytes;
use flate2::Compression;
use std::{fmt, io, net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf},
    select,
};
use tokio_util::sync::CancellationToken;

/// A byte stream a connection can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Identifies a connection within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnKey {
    Client,
    Backend(u64),
}

impl fmt::Display for ConnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnKey::Client => f.write_str("client"),
            ConnKey::Backend(id) => write!(f, "backend #{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// The authentication service could not be reached.
    Transient,
    /// The player could not prove who they are.
    Permanent,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("corrupt frame: {0}")]
    CorruptFrame(#[from] FrameError),
    #[error("unknown packet id {id:#04x} in state {state}")]
    UnknownPacketId { id: i32, state: ConnectionState },
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("authentication failed ({kind:?}): {message}")]
    AuthFailure {
        kind: AuthFailureKind,
        message: String,
    },
    #[error("command callback failed: {0}")]
    CommandCallback(#[from] CommandError),
    #[error("failed to connect to backend: {0:#}")]
    BackendConnectFailure(#[source] anyhow::Error),
    #[error("read timed out")]
    ReadTimeout,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<DecodeError> for ConnectionError {
    fn from(e: DecodeError) -> Self {
        ConnectionError::CorruptFrame(FrameError::Decode(e))
    }
}

impl ConnectionError {
    pub fn violation(message: impl Into<String>) -> Self {
        ConnectionError::ProtocolViolation(message.into())
    }
}

enum WriteCommand {
    Data(Bytes),
    Flush,
    Close,
}

/// Options for spawning the IO tasks of a connection.
pub struct ConnectionOptions {
    pub key: ConnKey,
    pub remote: SocketAddr,
    /// Direction of the packets this side receives.
    pub inbound: Direction,
    pub version: ProtocolVersion,
    pub read_timeout: Duration,
}

pub struct Connection {
    key: ConnKey,
    remote: SocketAddr,
    version: ProtocolVersion,
    state: ConnectionState,
    inbound: Direction,
    codec: FrameCodec,
    writer: flume::Sender<WriteCommand>,
    cancel: CancellationToken,
    closed: bool,
}

impl Connection {
    /// Starts the reader and writer tasks of `stream`. Reads are reported
    /// to `events` until the connection is closed or `parent` is cancelled.
    pub fn spawn(
        stream: BoxedStream,
        options: ConnectionOptions,
        events: flume::Sender<SessionEvent>,
        parent: &CancellationToken,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (write_tx, write_rx) = flume::unbounded();
        let cancel = parent.child_token();

        tokio::spawn(read_loop(
            reader,
            options.key,
            events,
            options.read_timeout,
            cancel.clone(),
        ));
        tokio::spawn(write_loop(writer, write_rx, options.key));

        Self {
            key: options.key,
            remote: options.remote,
            version: options.version,
            state: ConnectionState::Handshake,
            inbound: options.inbound,
            codec: FrameCodec::new(),
            writer: write_tx,
            cancel,
            closed: false,
        }
    }

    pub fn key(&self) -> ConnKey {
        self.key
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!("{} ({}): {} -> {}", self.key, self.remote, self.state, state);
            self.state = state;
        }
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Encodes and sends `packet`, then flushes.
    pub fn write(&mut self, packet: impl Into<Packet>) {
        self.delayed_write(packet);
        self.flush();
    }

    /// Encodes and queues `packet` without flushing.
    ///
    /// A packet that has no id in the current state and version is dropped
    /// with an error log.
    pub fn delayed_write(&mut self, packet: impl Into<Packet>) {
        if self.closed {
            return;
        }
        let packet = packet.into();
        match registry().encode(self.state, self.inbound.opposite(), self.version, &packet) {
            Ok(body) => self.write_body(&body),
            Err(e) => tracing::error!("{} ({}): dropping packet: {e}", self.key, self.remote),
        }
    }

    /// Relays a frame received on another connection, then flushes.
    pub fn write_raw(&mut self, raw: &RawPacket) {
        self.delayed_write_raw(raw);
        self.flush();
    }

    pub fn delayed_write_raw(&mut self, raw: &RawPacket) {
        if !self.closed {
            self.write_body(&raw.frame);
        }
    }

    fn write_body(&mut self, body: &[u8]) {
        match self.codec.encode_frame(body) {
            Ok(frame) => {
                self.writer.send(WriteCommand::Data(frame)).ok();
            }
            Err(e) => {
                tracing::error!("{} ({}): failed to frame packet: {e}", self.key, self.remote)
            }
        }
    }

    pub fn flush(&mut self) {
        if !self.closed {
            self.writer.send(WriteCommand::Flush).ok();
        }
    }

    /// Closes the connection, sending `reason` first when the state has a
    /// disconnect packet. Returns `false` if it was already closed.
    pub fn close(&mut self, reason: Option<Component>) -> bool {
        if self.closed {
            return false;
        }
        if let Some(reason) = reason {
            let has_disconnect = matches!(
                self.state,
                ConnectionState::Login | ConnectionState::Config | ConnectionState::Play
            );
            if has_disconnect && self.inbound == Direction::Serverbound {
                self.delayed_write(Disconnect { reason });
            }
        }
        self.closed = true;
        self.writer.send(WriteCommand::Close).ok();
        self.cancel.cancel();
        tracing::debug!("{} ({}): closed", self.key, self.remote);
        true
    }

    /// Enables encryption. Enabling it twice is a protocol violation.
    pub fn enable_encryption(&mut self, secret: [u8; 16]) -> Result<(), ConnectionError> {
        self.codec
            .enable_encryption(EncryptionKey::new(secret))
            .map_err(|_| ConnectionError::violation("encryption enabled twice"))
    }

    /// Sets the compression threshold. Negative disables compression.
    pub fn set_compression(&mut self, threshold: i32, level: Compression) {
        let compression = usize::try_from(threshold)
            .ok()
            .map(|threshold| CompressionSettings { threshold, level });
        self.codec.set_compression(compression);
    }

    pub fn give_data(&mut self, data: &[u8]) {
        self.codec.give_data(data);
    }

    /// Takes the next complete packet out of the read buffer, decoded in
    /// the current state.
    pub fn next_packet(&mut self) -> Result<Option<InboundPacket>, ConnectionError> {
        let Some(frame) = self.codec.next_frame()? else {
            return Ok(None);
        };
        let registry = registry();
        match registry.decode(self.state, self.inbound, self.version, frame.clone()) {
            Ok(packet) => Ok(Some(packet)),
            Err(e) => {
                let id = Decoder::from_bytes(&frame, self.version, self.state).read_var_int()?;
                let kind = registry.decodable_kind(self.state, self.inbound, self.version, id);
                // Modded servers send argument types the proxy cannot read.
                if kind == Some(PacketKind::AvailableCommands) {
                    tracing::warn!("{}: relaying undecodable command tree: {e}", self.key);
                    Ok(Some(InboundPacket {
                        raw: RawPacket { id, frame },
                        packet: None,
                    }))
                } else {
                    Err(e.into())
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(
    mut reader: ReadHalf<BoxedStream>,
    key: ConnKey,
    events: flume::Sender<SessionEvent>,
    read_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; 8192];
    loop {
        let read = select! {
            _ = cancel.cancelled() => return,
            read = tokio::time::timeout(read_timeout, reader.read(&mut buffer)) => read,
        };
        let event = match read {
            Ok(Ok(0)) => SessionEvent::Closed { key, error: None },
            Ok(Ok(n)) => {
                let data = Bytes::copy_from_slice(&buffer[..n]);
                if events.send_async(SessionEvent::Data { key, data }).await.is_err() {
                    return;
                }
                continue;
            }
            Ok(Err(e)) => SessionEvent::Closed {
                key,
                error: Some(e.into()),
            },
            Err(_) => SessionEvent::Closed {
                key,
                error: Some(ConnectionError::ReadTimeout),
            },
        };
        events.send_async(event).await.ok();
        return;
    }
}

async fn write_loop(
    writer: WriteHalf<BoxedStream>,
    commands: flume::Receiver<WriteCommand>,
    key: ConnKey,
) {
    let mut writer = BufWriter::new(writer);
    while let Ok(command) = commands.recv_async().await {
        let result = match command {
            WriteCommand::Data(frame) => writer.write_all(&frame).await,
            WriteCommand::Flush => writer.flush().await,
            WriteCommand::Close => {
                writer.flush().await.ok();
                writer.shutdown().await.ok();
                return;
            }
        };
        if let Err(e) = result {
            tracing::debug!("{key}: write failed: {e}");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::{KeepAlive, StatusPing};
    use tokio::io::duplex;

    fn options(inbound: Direction) -> ConnectionOptions {
        ConnectionOptions {
            key: ConnKey::Client,
            remote: "127.0.0.1:25565".parse().unwrap(),
            inbound,
            version: ProtocolVersion::V1_20_2,
            read_timeout: Duration::from_secs(5),
        }
    }

    async fn next_event(events: &flume::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv_async())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn packets_cross_a_pair_of_connections() {
        let (a, b) = duplex(1024);
        let cancel = CancellationToken::new();
        let (events_a, _rx_a) = flume::bounded(16);
        let (events_b, rx_b) = flume::bounded(16);
        let mut client =
            Connection::spawn(Box::new(a), options(Direction::Serverbound), events_a, &cancel);
        let mut backend =
            Connection::spawn(Box::new(b), options(Direction::Clientbound), events_b, &cancel);
        client.set_state(ConnectionState::Play);
        backend.set_state(ConnectionState::Play);

        client.set_compression(0, Compression::fast());
        backend.set_compression(0, Compression::fast());
        client.write(KeepAlive { id: 99 });

        let SessionEvent::Data { data, .. } = next_event(&rx_b).await else {
            panic!("expected data");
        };
        backend.give_data(&data);
        let inbound = backend.next_packet().unwrap().unwrap();
        match inbound.packet {
            Some(Packet::KeepAlive(keep_alive)) => assert_eq!(keep_alive.id, 99),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn encryption_can_only_be_enabled_once() {
        let (a, _b) = duplex(64);
        let (events, _rx) = flume::bounded(1);
        let cancel = CancellationToken::new();
        let mut connection =
            Connection::spawn(Box::new(a), options(Direction::Serverbound), events, &cancel);
        connection.enable_encryption([7; 16]).unwrap();
        assert!(matches!(
            connection.enable_encryption([7; 16]),
            Err(ConnectionError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn unmapped_packets_are_dropped_and_close_is_idempotent() {
        let (a, b) = duplex(1024);
        let (events, _rx) = flume::bounded(4);
        let (events_b, rx_b) = flume::bounded(4);
        let cancel = CancellationToken::new();
        let mut connection =
            Connection::spawn(Box::new(a), options(Direction::Serverbound), events, &cancel);
        let _peer =
            Connection::spawn(Box::new(b), options(Direction::Clientbound), events_b, &cancel);

        // No status ping in the handshake state.
        connection.write(StatusPing { payload: 1 });
        assert!(connection.close(Some(Component::text("bye"))));
        assert!(!connection.close(None));

        match next_event(&rx_b).await {
            SessionEvent::Closed { error: None, .. } => {}
            _ => panic!("expected a clean close"),
        }
    }
}
