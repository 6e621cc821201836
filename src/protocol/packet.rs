//! Every packet the proxy decodes, as one tagged union.
//!
//! Packets are only modelled as far as the proxy needs them. Frames the
//! proxy does not look at stay opaque and are relayed byte for byte.

use crate::protocol::{Decode, Encode, Encoder};
use bytes::Bytes;
use minecraft_switch_proxy_macros::FromVariants;

pub mod commands;
pub mod common;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

pub use commands::AvailableCommands;
pub use common::{ClientSettings, Disconnect, FinishedUpdate, KeepAlive, PluginMessage};
pub use handshake::{Handshake, NextState};
pub use login::{
    EncryptionRequest, EncryptionResponse, EncryptionVerification, GameProfileProperty,
    LoginAcknowledged, LoginPluginMessage, LoginPluginResponse, ServerLogin, ServerLoginSuccess,
    SetCompression,
};
pub use play::{
    BossBar, JoinGame, LegacyChat, Offer, PlayerChat, PlayerCommand, Respawn, StartUpdate,
    SystemChat, TabCompleteRequest, TabCompleteResponse,
};
pub use status::{StatusPing, StatusRequest, StatusResponse};

#[derive(Debug, Clone, FromVariants, strum::EnumDiscriminants)]
#[strum_discriminants(name(PacketKind), derive(Hash, strum::Display, strum::IntoStaticStr))]
pub enum Packet {
    Handshake(Handshake),
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
    StatusPing(StatusPing),
    ServerLogin(ServerLogin),
    EncryptionRequest(EncryptionRequest),
    EncryptionResponse(EncryptionResponse),
    ServerLoginSuccess(ServerLoginSuccess),
    SetCompression(SetCompression),
    LoginPluginMessage(LoginPluginMessage),
    LoginPluginResponse(LoginPluginResponse),
    LoginAcknowledged(LoginAcknowledged),
    Disconnect(Disconnect),
    KeepAlive(KeepAlive),
    PluginMessage(PluginMessage),
    ClientSettings(ClientSettings),
    FinishedUpdate(FinishedUpdate),
    StartUpdate(StartUpdate),
    JoinGame(JoinGame),
    Respawn(Respawn),
    BossBar(BossBar),
    LegacyChat(LegacyChat),
    PlayerChat(PlayerChat),
    PlayerCommand(PlayerCommand),
    SystemChat(SystemChat),
    TabCompleteRequest(TabCompleteRequest),
    TabCompleteResponse(TabCompleteResponse),
    AvailableCommands(AvailableCommands),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        PacketKind::from(self)
    }
}

impl Encode for Packet {
    fn encode(&self, encoder: &mut Encoder) {
        match self {
            Packet::Handshake(p) => p.encode(encoder),
            Packet::StatusRequest(p) => p.encode(encoder),
            Packet::StatusResponse(p) => p.encode(encoder),
            Packet::StatusPing(p) => p.encode(encoder),
            Packet::ServerLogin(p) => p.encode(encoder),
            Packet::EncryptionRequest(p) => p.encode(encoder),
            Packet::EncryptionResponse(p) => p.encode(encoder),
            Packet::ServerLoginSuccess(p) => p.encode(encoder),
            Packet::SetCompression(p) => p.encode(encoder),
            Packet::LoginPluginMessage(p) => p.encode(encoder),
            Packet::LoginPluginResponse(p) => p.encode(encoder),
            Packet::LoginAcknowledged(p) => p.encode(encoder),
            Packet::Disconnect(p) => p.encode(encoder),
            Packet::KeepAlive(p) => p.encode(encoder),
            Packet::PluginMessage(p) => p.encode(encoder),
            Packet::ClientSettings(p) => p.encode(encoder),
            Packet::FinishedUpdate(p) => p.encode(encoder),
            Packet::StartUpdate(p) => p.encode(encoder),
            Packet::JoinGame(p) => p.encode(encoder),
            Packet::Respawn(p) => p.encode(encoder),
            Packet::BossBar(p) => p.encode(encoder),
            Packet::LegacyChat(p) => p.encode(encoder),
            Packet::PlayerChat(p) => p.encode(encoder),
            Packet::PlayerCommand(p) => p.encode(encoder),
            Packet::SystemChat(p) => p.encode(encoder),
            Packet::TabCompleteRequest(p) => p.encode(encoder),
            Packet::TabCompleteResponse(p) => p.encode(encoder),
            Packet::AvailableCommands(p) => p.encode(encoder),
        }
    }
}

/// Decodes a frame body as `T`. Used as the decoder entry of the registry.
pub(crate) fn decode_as<T>(
    decoder: &mut crate::protocol::Decoder,
) -> crate::protocol::decoder::Result<Packet>
where
    T: Decode + Into<Packet>,
{
    T::decode(decoder).map(Into::into)
}

/// A frame as it came off the wire: packet id plus payload.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub id: i32,
    /// The whole frame body, id included.
    pub frame: Bytes,
}

/// Result of running a frame through the registry.
#[derive(Debug)]
pub struct InboundPacket {
    pub raw: RawPacket,
    /// `None` when no decoder is registered for the id.
    pub packet: Option<Packet>,
}
