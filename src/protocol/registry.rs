//! Maps packet ids to packet kinds for every state, direction and
//! protocol version.
//!
//! Each packet kind is registered with a list of [`Mapping`]s ordered by
//! the version they first apply to. A mapping covers every version up to
//! the next mapping. The last mapping covers everything up to
//! [`ProtocolVersion::MAXIMUM`], or up to its last valid version.

use crate::protocol::{
    decoder,
    packet::{self, decode_as, InboundPacket, Packet, PacketKind, RawPacket},
    ConnectionState, Decoder, Direction, Encode, Encoder, ProtocolVersion,
};
use ahash::AHashMap;
use bytes::Bytes;
use once_cell::sync::Lazy;
use ProtocolVersion::*;

type DecodeFn = fn(&mut Decoder) -> decoder::Result<Packet>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} has no mappings")]
    NoMappings { kind: PacketKind },
    #[error("mappings of {kind} are not in version order")]
    UnorderedMappings { kind: PacketKind },
    #[error("only the last mapping of {kind} may set a last valid version")]
    MisplacedLastValid { kind: PacketKind },
    #[error("id {id:#04x} is used by both {existing} and {kind} in {state} {direction} {version}")]
    DuplicateId {
        id: i32,
        existing: PacketKind,
        kind: PacketKind,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
    },
    #[error("{kind} is registered twice in {state} {direction} {version}")]
    DuplicateKind {
        kind: PacketKind,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{kind} cannot be sent in {state} {direction} on {version}")]
    Unmapped {
        kind: PacketKind,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
    },
}

/// One id assignment of a packet kind.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    pub id: i32,
    pub since: ProtocolVersion,
    pub last_valid: Option<ProtocolVersion>,
    /// Encode-only mappings reserve the id but never decode it.
    pub encode_only: bool,
}

/// A mapping that applies from `since` on.
pub const fn map(id: i32, since: ProtocolVersion) -> Mapping {
    Mapping {
        id,
        since,
        last_valid: None,
        encode_only: false,
    }
}

impl Mapping {
    pub const fn until(mut self, last_valid: ProtocolVersion) -> Self {
        self.last_valid = Some(last_valid);
        self
    }

    pub const fn encode_only(mut self) -> Self {
        self.encode_only = true;
        self
    }
}

#[derive(Default)]
struct VersionTable {
    decoders: AHashMap<i32, (PacketKind, Option<DecodeFn>)>,
    ids: AHashMap<PacketKind, i32>,
}

/// The packet registry.
#[derive(Default)]
pub struct Registry {
    tables: AHashMap<(ConnectionState, Direction, ProtocolVersion), VersionTable>,
}

static VANILLA: Lazy<Registry> =
    Lazy::new(|| Registry::vanilla().expect("built-in packet registry is inconsistent"));

/// The shared registry of every packet the proxy knows.
pub fn registry() -> &'static Registry {
    &VANILLA
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `kind` under `mappings`. `decode` is `None` for packets
    /// the proxy only ever sends.
    pub fn register(
        &mut self,
        state: ConnectionState,
        direction: Direction,
        kind: PacketKind,
        decode: Option<DecodeFn>,
        mappings: &[Mapping],
    ) -> Result<(), RegistryError> {
        if mappings.is_empty() {
            return Err(RegistryError::NoMappings { kind });
        }
        for (index, mapping) in mappings.iter().enumerate() {
            let next = mappings.get(index + 1);
            if let Some(next) = next {
                if next.since <= mapping.since {
                    return Err(RegistryError::UnorderedMappings { kind });
                }
                if mapping.last_valid.is_some() {
                    return Err(RegistryError::MisplacedLastValid { kind });
                }
            }

            let covered = ProtocolVersion::all().filter(|&version| {
                version >= mapping.since
                    && match (next, mapping.last_valid) {
                        (Some(next), _) => version < next.since,
                        (None, Some(last_valid)) => version <= last_valid,
                        (None, None) => true,
                    }
            });
            for version in covered {
                let table = self.tables.entry((state, direction, version)).or_default();
                if let Some(&(existing, _)) = table.decoders.get(&mapping.id) {
                    return Err(RegistryError::DuplicateId {
                        id: mapping.id,
                        existing,
                        kind,
                        state,
                        direction,
                        version,
                    });
                }
                if table.ids.insert(kind, mapping.id).is_some() {
                    return Err(RegistryError::DuplicateKind {
                        kind,
                        state,
                        direction,
                        version,
                    });
                }
                let decode = if mapping.encode_only { None } else { decode };
                table.decoders.insert(mapping.id, (kind, decode));
            }
        }
        Ok(())
    }

    fn table(
        &self,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
    ) -> Option<&VersionTable> {
        self.tables.get(&(state, direction, version))
    }

    /// The id of `kind`, if it exists in that state and version.
    pub fn packet_id(
        &self,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
        kind: PacketKind,
    ) -> Option<i32> {
        self.table(state, direction, version)?.ids.get(&kind).copied()
    }

    /// The kind that would be decoded for `id`. `None` for unknown ids and
    /// for encode-only mappings.
    pub fn decodable_kind(
        &self,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
        id: i32,
    ) -> Option<PacketKind> {
        match self.table(state, direction, version)?.decoders.get(&id)? {
            (kind, Some(_)) => Some(*kind),
            (_, None) => None,
        }
    }

    /// Reads the id of a frame and decodes it if a decoder is registered.
    ///
    /// Frames with unknown ids come back with `packet: None`. A known
    /// packet that fails to decode, or leaves bytes behind, is an error.
    pub fn decode(
        &self,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
        frame: Bytes,
    ) -> decoder::Result<InboundPacket> {
        let mut decoder = Decoder::from_bytes(&frame, version, state);
        let id = decoder.read_var_int()?;
        let entry = self
            .table(state, direction, version)
            .and_then(|table| table.decoders.get(&id));
        let packet = match entry {
            Some((kind, Some(decode))) => {
                let packet = decode(&mut decoder)?;
                decoder.finish((*kind).into())?;
                Some(packet)
            }
            _ => None,
        };
        Ok(InboundPacket {
            raw: RawPacket { id, frame },
            packet,
        })
    }

    /// Writes the id and body of `packet` as they appear in a frame.
    pub fn encode(
        &self,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
        packet: &Packet,
    ) -> Result<Vec<u8>, EncodeError> {
        let kind = packet.kind();
        let id = self
            .packet_id(state, direction, version, kind)
            .ok_or(EncodeError::Unmapped {
                kind,
                state,
                direction,
                version,
            })?;
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf, version, state);
        encoder.write_var_int(id);
        packet.encode(&mut encoder);
        Ok(buf)
    }

    /// Builds the registry of every packet the proxy handles.
    #[rustfmt::skip]
    pub fn vanilla() -> Result<Self, RegistryError> {
        use ConnectionState::*;
        use Direction::*;

        let mut registry = Self::new();
        let r = &mut registry;

        r.register(Handshake, Serverbound, PacketKind::Handshake, Some(decode_as::<packet::Handshake>), &[map(0x00, V1_8)])?;

        r.register(Status, Serverbound, PacketKind::StatusRequest, Some(decode_as::<packet::StatusRequest>), &[map(0x00, V1_8)])?;
        r.register(Status, Serverbound, PacketKind::StatusPing, Some(decode_as::<packet::StatusPing>), &[map(0x01, V1_8)])?;
        r.register(Status, Clientbound, PacketKind::StatusResponse, Some(decode_as::<packet::StatusResponse>), &[map(0x00, V1_8)])?;
        r.register(Status, Clientbound, PacketKind::StatusPing, Some(decode_as::<packet::StatusPing>), &[map(0x01, V1_8)])?;

        r.register(Login, Serverbound, PacketKind::ServerLogin, Some(decode_as::<packet::ServerLogin>), &[map(0x00, V1_8)])?;
        r.register(Login, Serverbound, PacketKind::EncryptionResponse, Some(decode_as::<packet::EncryptionResponse>), &[map(0x01, V1_8)])?;
        r.register(Login, Serverbound, PacketKind::LoginPluginResponse, Some(decode_as::<packet::LoginPluginResponse>), &[map(0x02, V1_13)])?;
        r.register(Login, Serverbound, PacketKind::LoginAcknowledged, Some(decode_as::<packet::LoginAcknowledged>), &[map(0x03, V1_20_2)])?;
        r.register(Login, Clientbound, PacketKind::Disconnect, Some(decode_as::<packet::Disconnect>), &[map(0x00, V1_8)])?;
        r.register(Login, Clientbound, PacketKind::EncryptionRequest, Some(decode_as::<packet::EncryptionRequest>), &[map(0x01, V1_8)])?;
        r.register(Login, Clientbound, PacketKind::ServerLoginSuccess, Some(decode_as::<packet::ServerLoginSuccess>), &[map(0x02, V1_8)])?;
        r.register(Login, Clientbound, PacketKind::SetCompression, Some(decode_as::<packet::SetCompression>), &[map(0x03, V1_8)])?;
        r.register(Login, Clientbound, PacketKind::LoginPluginMessage, Some(decode_as::<packet::LoginPluginMessage>), &[map(0x04, V1_13)])?;

        r.register(Config, Clientbound, PacketKind::PluginMessage, Some(decode_as::<packet::PluginMessage>), &[map(0x00, V1_20_2)])?;
        r.register(Config, Clientbound, PacketKind::Disconnect, Some(decode_as::<packet::Disconnect>), &[map(0x01, V1_20_2)])?;
        r.register(Config, Clientbound, PacketKind::FinishedUpdate, Some(decode_as::<packet::FinishedUpdate>), &[map(0x02, V1_20_2)])?;
        r.register(Config, Clientbound, PacketKind::KeepAlive, Some(decode_as::<packet::KeepAlive>), &[map(0x03, V1_20_2)])?;
        r.register(Config, Serverbound, PacketKind::ClientSettings, Some(decode_as::<packet::ClientSettings>), &[map(0x00, V1_20_2)])?;
        r.register(Config, Serverbound, PacketKind::PluginMessage, Some(decode_as::<packet::PluginMessage>), &[map(0x01, V1_20_2)])?;
        r.register(Config, Serverbound, PacketKind::FinishedUpdate, Some(decode_as::<packet::FinishedUpdate>), &[map(0x02, V1_20_2)])?;
        r.register(Config, Serverbound, PacketKind::KeepAlive, Some(decode_as::<packet::KeepAlive>), &[map(0x03, V1_20_2)])?;

        r.register(Play, Serverbound, PacketKind::TabCompleteRequest, Some(decode_as::<packet::TabCompleteRequest>), &[
            map(0x14, V1_8), map(0x01, V1_9), map(0x02, V1_12), map(0x01, V1_12_1),
            map(0x05, V1_13), map(0x06, V1_14), map(0x08, V1_19), map(0x09, V1_19_1),
            map(0x08, V1_19_3), map(0x09, V1_19_4), map(0x0A, V1_20_2),
        ])?;
        r.register(Play, Serverbound, PacketKind::LegacyChat, Some(decode_as::<packet::LegacyChat>), &[
            map(0x01, V1_8), map(0x02, V1_9), map(0x03, V1_12), map(0x02, V1_12_1),
            map(0x03, V1_14).until(V1_18_2),
        ])?;
        r.register(Play, Serverbound, PacketKind::PlayerCommand, Some(decode_as::<packet::PlayerCommand>), &[
            map(0x03, V1_19), map(0x04, V1_19_1),
        ])?;
        r.register(Play, Serverbound, PacketKind::PlayerChat, Some(decode_as::<packet::PlayerChat>), &[
            map(0x04, V1_19), map(0x05, V1_19_1),
        ])?;
        r.register(Play, Serverbound, PacketKind::ClientSettings, Some(decode_as::<packet::ClientSettings>), &[
            map(0x15, V1_8), map(0x04, V1_9), map(0x05, V1_12), map(0x04, V1_12_1),
            map(0x05, V1_14), map(0x07, V1_19), map(0x08, V1_19_1), map(0x07, V1_19_3),
            map(0x08, V1_19_4), map(0x09, V1_20_2),
        ])?;
        r.register(Play, Serverbound, PacketKind::PluginMessage, Some(decode_as::<packet::PluginMessage>), &[
            map(0x17, V1_8), map(0x09, V1_9), map(0x0A, V1_12), map(0x09, V1_12_1),
            map(0x0A, V1_13), map(0x0B, V1_14), map(0x0A, V1_17), map(0x0C, V1_19),
            map(0x0D, V1_19_1), map(0x0C, V1_19_3), map(0x0D, V1_19_4), map(0x0F, V1_20_2),
            map(0x10, V1_20_3),
        ])?;
        r.register(Play, Serverbound, PacketKind::KeepAlive, Some(decode_as::<packet::KeepAlive>), &[
            map(0x00, V1_8), map(0x0B, V1_9), map(0x0C, V1_12), map(0x0B, V1_12_1),
            map(0x0E, V1_13), map(0x0F, V1_14), map(0x10, V1_16), map(0x0F, V1_17),
            map(0x11, V1_19), map(0x12, V1_19_1), map(0x11, V1_19_3), map(0x12, V1_19_4),
            map(0x14, V1_20_2), map(0x15, V1_20_3),
        ])?;
        r.register(Play, Serverbound, PacketKind::FinishedUpdate, Some(decode_as::<packet::FinishedUpdate>), &[
            map(0x0B, V1_20_2),
        ])?;

        r.register(Play, Clientbound, PacketKind::BossBar, Some(decode_as::<packet::BossBar>), &[
            map(0x0C, V1_9), map(0x0D, V1_15), map(0x0C, V1_16), map(0x0D, V1_17),
            map(0x0A, V1_19), map(0x0B, V1_19_4), map(0x0A, V1_20_2),
        ])?;
        r.register(Play, Clientbound, PacketKind::SystemChat, None, &[
            map(0x02, V1_8).encode_only(), map(0x0F, V1_9).encode_only(),
            map(0x0E, V1_13).encode_only(), map(0x0F, V1_15).encode_only(),
            map(0x0E, V1_16).encode_only(), map(0x0F, V1_17).encode_only(),
            map(0x5F, V1_19).encode_only(), map(0x62, V1_19_1).encode_only(),
            map(0x60, V1_19_3).encode_only(), map(0x64, V1_19_4).encode_only(),
            map(0x67, V1_20_2).encode_only(), map(0x69, V1_20_3).encode_only(),
        ])?;
        r.register(Play, Clientbound, PacketKind::TabCompleteResponse, Some(decode_as::<packet::TabCompleteResponse>), &[
            map(0x3A, V1_8), map(0x0E, V1_9), map(0x10, V1_13), map(0x11, V1_15),
            map(0x10, V1_16), map(0x0F, V1_16_2), map(0x11, V1_17), map(0x0E, V1_19),
            map(0x0D, V1_19_3), map(0x0F, V1_19_4), map(0x10, V1_20_2),
        ])?;
        r.register(Play, Clientbound, PacketKind::AvailableCommands, Some(decode_as::<packet::AvailableCommands>), &[
            map(0x11, V1_13), map(0x12, V1_15), map(0x11, V1_16), map(0x10, V1_16_2),
            map(0x12, V1_17), map(0x0F, V1_19), map(0x0E, V1_19_3), map(0x10, V1_19_4),
            map(0x11, V1_20_2),
        ])?;
        r.register(Play, Clientbound, PacketKind::PluginMessage, Some(decode_as::<packet::PluginMessage>), &[
            map(0x3F, V1_8), map(0x18, V1_9), map(0x19, V1_13), map(0x18, V1_14),
            map(0x19, V1_15), map(0x18, V1_16), map(0x17, V1_16_2), map(0x18, V1_17),
            map(0x15, V1_19), map(0x16, V1_19_1), map(0x15, V1_19_3), map(0x17, V1_19_4),
            map(0x18, V1_20_2),
        ])?;
        r.register(Play, Clientbound, PacketKind::Disconnect, Some(decode_as::<packet::Disconnect>), &[
            map(0x40, V1_8), map(0x1A, V1_9), map(0x1B, V1_13), map(0x1A, V1_14),
            map(0x1B, V1_15), map(0x1A, V1_16), map(0x19, V1_16_2), map(0x1A, V1_17),
            map(0x17, V1_19), map(0x19, V1_19_1), map(0x17, V1_19_3), map(0x1A, V1_19_4),
            map(0x1B, V1_20_2),
        ])?;
        r.register(Play, Clientbound, PacketKind::KeepAlive, Some(decode_as::<packet::KeepAlive>), &[
            map(0x00, V1_8), map(0x1F, V1_9), map(0x21, V1_13), map(0x20, V1_14),
            map(0x21, V1_15), map(0x20, V1_16), map(0x1F, V1_16_2), map(0x21, V1_17),
            map(0x1E, V1_19), map(0x20, V1_19_1), map(0x1F, V1_19_3), map(0x23, V1_19_4),
            map(0x24, V1_20_2),
        ])?;
        r.register(Play, Clientbound, PacketKind::JoinGame, Some(decode_as::<packet::JoinGame>), &[
            map(0x01, V1_8), map(0x23, V1_9), map(0x25, V1_13), map(0x26, V1_15),
            map(0x25, V1_16), map(0x24, V1_16_2), map(0x26, V1_17), map(0x23, V1_19),
            map(0x25, V1_19_1), map(0x24, V1_19_3), map(0x28, V1_19_4), map(0x29, V1_20_2),
        ])?;
        r.register(Play, Clientbound, PacketKind::Respawn, None, &[
            map(0x07, V1_8).encode_only(), map(0x33, V1_9).encode_only(),
            map(0x34, V1_12).encode_only(), map(0x35, V1_12_1).encode_only(),
            map(0x38, V1_13).encode_only(), map(0x3A, V1_14).encode_only(),
            map(0x3B, V1_15).encode_only(), map(0x3A, V1_16).encode_only(),
            map(0x39, V1_16_2).encode_only(), map(0x3D, V1_17).encode_only(),
            map(0x3B, V1_19).encode_only(), map(0x3E, V1_19_1).encode_only(),
            map(0x3D, V1_19_3).encode_only(), map(0x41, V1_19_4).encode_only(),
            map(0x43, V1_20_2).encode_only(), map(0x45, V1_20_3).encode_only(),
        ])?;
        r.register(Play, Clientbound, PacketKind::StartUpdate, Some(decode_as::<packet::StartUpdate>), &[
            map(0x65, V1_20_2), map(0x67, V1_20_3),
        ])?;

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;
    use Direction::*;

    #[test]
    fn vanilla_registry_is_consistent() {
        assert!(Registry::vanilla().is_ok());
    }

    #[test]
    fn resolution_picks_highest_mapping_at_or_below_version() {
        let r = registry();
        let id = |version| r.packet_id(Play, Clientbound, version, PacketKind::JoinGame);
        assert_eq!(id(V1_8), Some(0x01));
        assert_eq!(id(V1_12_2), Some(0x23));
        assert_eq!(id(V1_16_1), Some(0x25));
        assert_eq!(id(V1_16_4), Some(0x24));
        assert_eq!(id(V1_20_3), Some(0x29));
    }

    #[test]
    fn last_valid_version_ends_a_mapping() {
        let r = registry();
        assert_eq!(
            r.packet_id(Play, Serverbound, V1_18_2, PacketKind::LegacyChat),
            Some(0x03)
        );
        assert_eq!(
            r.packet_id(Play, Serverbound, V1_19, PacketKind::LegacyChat),
            None
        );
        assert_eq!(
            r.decodable_kind(Play, Serverbound, V1_19, 0x03),
            Some(PacketKind::PlayerCommand)
        );
    }

    #[test]
    fn encode_only_ids_stay_opaque() {
        let r = registry();
        assert_eq!(
            r.packet_id(Play, Clientbound, V1_20_2, PacketKind::Respawn),
            Some(0x43)
        );
        assert_eq!(r.decodable_kind(Play, Clientbound, V1_20_2, 0x43), None);

        let inbound = r
            .decode(Play, Clientbound, V1_20_2, Bytes::from_static(&[0x43, 1, 2, 3]))
            .unwrap();
        assert!(inbound.packet.is_none());
        assert_eq!(inbound.raw.id, 0x43);
        assert_eq!(&inbound.raw.frame[..], &[0x43, 1, 2, 3]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut r = Registry::new();
        r.register(Play, Serverbound, PacketKind::KeepAlive, None, &[map(0x00, V1_8)])
            .unwrap();
        let err = r
            .register(Play, Serverbound, PacketKind::LegacyChat, None, &[map(0x00, V1_12)])
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId { id: 0, version: V1_12, .. }));
    }

    #[test]
    fn last_valid_only_on_final_mapping() {
        let mut r = Registry::new();
        let err = r
            .register(
                Play,
                Serverbound,
                PacketKind::KeepAlive,
                None,
                &[map(0x00, V1_8).until(V1_9), map(0x01, V1_12)],
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::MisplacedLastValid { kind: PacketKind::KeepAlive });
    }

    #[test]
    fn trailing_bytes_fail_decoding() {
        let r = registry();
        let ping = Packet::StatusPing(packet::StatusPing { payload: 9 });
        let mut frame = r.encode(Status, Clientbound, V1_8, &ping).unwrap();
        frame.push(0);
        assert!(r.decode(Status, Clientbound, V1_8, Bytes::from(frame)).is_err());
    }

    #[test]
    fn unmapped_packets_cannot_be_encoded() {
        let r = registry();
        let packet = Packet::BossBar(packet::BossBar::remove(uuid::Uuid::nil()));
        assert!(r.encode(Play, Clientbound, V1_8, &packet).is_err());
    }
}
