//! The Minecraft Java Edition wire protocol: primitives, framing,
//! packet types and the versioned packet registry.

pub mod codec;
pub mod component;
mod decoder;
mod encoder;
pub mod nbt;
pub mod packet;
pub mod plugin_message;
pub mod registry;
mod version;

pub use decoder::{Decode, DecodeError, Decoder, DEFAULT_MAX_STRING_LENGTH};
pub use encoder::{Encode, Encoder};
pub use version::ProtocolVersion;

/// Phase of a connection. Decides which packets are legal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    Config,
    Play,
}

/// Which way a packet travels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum Direction {
    /// Sent by the client to the server.
    Serverbound,
    /// Sent by the server to the client.
    Clientbound,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Serverbound => Direction::Clientbound,
            Direction::Clientbound => Direction::Serverbound,
        }
    }
}
