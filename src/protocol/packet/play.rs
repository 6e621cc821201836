use crate::protocol::{
    component::Component, decoder, nbt, Decode, Decoder, Encode, Encoder, ProtocolVersion,
};
use bytes::Bytes;
use minecraft_switch_proxy_macros::{Decode, Encode};
use uuid::Uuid;

/// Dimension identity of a 1.16+ JoinGame or Respawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionInfo {
    pub registry_identifier: String,
    pub level_name: Option<String>,
    pub is_flat: bool,
    pub is_debug: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinGame {
    pub entity_id: i32,
    pub gamemode: i8,
    pub dimension: i32,
    pub partial_hashed_seed: i64,
    pub difficulty: u8,
    pub is_hardcore: bool,
    pub max_players: i32,
    pub level_type: Option<String>,
    pub view_distance: i32,
    pub reduced_debug_info: bool,
    pub show_respawn_screen: bool,
    pub do_limited_crafting: bool,
    pub level_names: Vec<String>,
    /// Registry codec, kept as the raw tag.
    pub registry: Option<Bytes>,
    pub dimension_info: Option<DimensionInfo>,
    /// Current dimension type (1.16.2 to 1.18.2), kept as the raw tag.
    pub current_dimension_data: Option<Bytes>,
    pub previous_gamemode: i8,
    pub simulation_distance: i32,
    pub last_death_position: Option<(String, i64)>,
    pub portal_cooldown: i32,
}

fn read_string_array(decoder: &mut Decoder) -> decoder::Result<Vec<String>> {
    let length = decoder.read_length()?;
    let mut strings = Vec::with_capacity(length.min(decoder.buffer().len()));
    for _ in 0..length {
        strings.push(decoder.read_string()?.to_owned());
    }
    Ok(strings)
}

fn write_string_array(encoder: &mut Encoder, strings: &[String]) {
    encoder.write_length(strings.len());
    for string in strings {
        encoder.write_string(string);
    }
}

fn read_death_position(decoder: &mut Decoder) -> decoder::Result<Option<(String, i64)>> {
    if decoder.read_bool()? {
        Ok(Some((decoder.read_string()?.to_owned(), decoder.read_i64()?)))
    } else {
        Ok(None)
    }
}

fn write_death_position(encoder: &mut Encoder, position: &Option<(String, i64)>) {
    encoder.write_bool(position.is_some());
    if let Some((dimension, location)) = position {
        encoder.write_string(dimension);
        encoder.write_i64(*location);
    }
}

impl JoinGame {
    pub(crate) fn empty(entity_id: i32) -> Self {
        Self {
            entity_id,
            gamemode: 0,
            dimension: 0,
            partial_hashed_seed: 0,
            difficulty: 0,
            is_hardcore: false,
            max_players: 0,
            level_type: None,
            view_distance: 0,
            reduced_debug_info: false,
            show_respawn_screen: true,
            do_limited_crafting: false,
            level_names: Vec::new(),
            registry: None,
            dimension_info: None,
            current_dimension_data: None,
            previous_gamemode: -1,
            simulation_distance: 0,
            last_death_position: None,
            portal_cooldown: 0,
        }
    }

    fn decode_legacy(decoder: &mut Decoder) -> decoder::Result<Self> {
        let version = decoder.version();
        let mut join = Self::empty(decoder.read_i32()?);
        let gamemode = decoder.read_i8()?;
        join.is_hardcore = gamemode & 0x08 != 0;
        join.gamemode = gamemode & !0x08;
        join.dimension = if version >= ProtocolVersion::V1_9_1 {
            decoder.read_i32()?
        } else {
            decoder.read_i8()?.into()
        };
        if version <= ProtocolVersion::V1_13_2 {
            join.difficulty = decoder.read_u8()?;
        }
        if version >= ProtocolVersion::V1_15 {
            join.partial_hashed_seed = decoder.read_i64()?;
        }
        join.max_players = decoder.read_u8()?.into();
        join.level_type = Some(decoder.read_string_bounded(16)?.to_owned());
        if version >= ProtocolVersion::V1_14 {
            join.view_distance = decoder.read_var_int()?;
        }
        join.reduced_debug_info = decoder.read_bool()?;
        if version >= ProtocolVersion::V1_15 {
            join.show_respawn_screen = decoder.read_bool()?;
        }
        Ok(join)
    }

    fn decode_1_16(decoder: &mut Decoder) -> decoder::Result<Self> {
        let version = decoder.version();
        let mut join = Self::empty(decoder.read_i32()?);
        if version >= ProtocolVersion::V1_16_2 {
            join.is_hardcore = decoder.read_bool()?;
            join.gamemode = decoder.read_i8()?;
        } else {
            let gamemode = decoder.read_i8()?;
            join.is_hardcore = gamemode & 0x08 != 0;
            join.gamemode = gamemode & !0x08;
        }
        join.previous_gamemode = decoder.read_i8()?;
        join.level_names = read_string_array(decoder)?;
        join.registry = Some(nbt::read_raw(decoder)?);

        let registry_identifier;
        let mut level_name = None;
        if version >= ProtocolVersion::V1_16_2 && version < ProtocolVersion::V1_19 {
            join.current_dimension_data = Some(nbt::read_raw(decoder)?);
            registry_identifier = decoder.read_string()?.to_owned();
        } else {
            registry_identifier = decoder.read_string()?.to_owned();
            level_name = Some(decoder.read_string()?.to_owned());
        }

        join.partial_hashed_seed = decoder.read_i64()?;
        join.max_players = if version >= ProtocolVersion::V1_16_2 {
            decoder.read_var_int()?
        } else {
            decoder.read_u8()?.into()
        };
        join.view_distance = decoder.read_var_int()?;
        if version >= ProtocolVersion::V1_18 {
            join.simulation_distance = decoder.read_var_int()?;
        }
        join.reduced_debug_info = decoder.read_bool()?;
        join.show_respawn_screen = decoder.read_bool()?;
        let is_debug = decoder.read_bool()?;
        let is_flat = decoder.read_bool()?;
        join.dimension_info = Some(DimensionInfo {
            registry_identifier,
            level_name,
            is_flat,
            is_debug,
        });
        if version >= ProtocolVersion::V1_19 {
            join.last_death_position = read_death_position(decoder)?;
        }
        if version >= ProtocolVersion::V1_20 {
            join.portal_cooldown = decoder.read_var_int()?;
        }
        Ok(join)
    }

    fn decode_1_20_2(decoder: &mut Decoder) -> decoder::Result<Self> {
        let mut join = Self::empty(decoder.read_i32()?);
        join.is_hardcore = decoder.read_bool()?;
        join.level_names = read_string_array(decoder)?;
        join.max_players = decoder.read_var_int()?;
        join.view_distance = decoder.read_var_int()?;
        join.simulation_distance = decoder.read_var_int()?;
        join.reduced_debug_info = decoder.read_bool()?;
        join.show_respawn_screen = decoder.read_bool()?;
        join.do_limited_crafting = decoder.read_bool()?;
        let registry_identifier = decoder.read_string()?.to_owned();
        let level_name = decoder.read_string()?.to_owned();
        join.partial_hashed_seed = decoder.read_i64()?;
        join.gamemode = decoder.read_i8()?;
        join.previous_gamemode = decoder.read_i8()?;
        let is_debug = decoder.read_bool()?;
        let is_flat = decoder.read_bool()?;
        join.dimension_info = Some(DimensionInfo {
            registry_identifier,
            level_name: Some(level_name),
            is_flat,
            is_debug,
        });
        join.last_death_position = read_death_position(decoder)?;
        join.portal_cooldown = decoder.read_var_int()?;
        Ok(join)
    }

    fn packed_gamemode(&self) -> i8 {
        if self.is_hardcore {
            self.gamemode | 0x08
        } else {
            self.gamemode
        }
    }

    fn encode_legacy(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        encoder.write_i32(self.entity_id);
        encoder.write_i8(self.packed_gamemode());
        if version >= ProtocolVersion::V1_9_1 {
            encoder.write_i32(self.dimension);
        } else {
            encoder.write_i8(self.dimension as i8);
        }
        if version <= ProtocolVersion::V1_13_2 {
            encoder.write_u8(self.difficulty);
        }
        if version >= ProtocolVersion::V1_15 {
            encoder.write_i64(self.partial_hashed_seed);
        }
        encoder.write_u8(self.max_players.clamp(0, 255) as u8);
        encoder.write_string(self.level_type.as_deref().unwrap_or("default"));
        if version >= ProtocolVersion::V1_14 {
            encoder.write_var_int(self.view_distance);
        }
        encoder.write_bool(self.reduced_debug_info);
        if version >= ProtocolVersion::V1_15 {
            encoder.write_bool(self.show_respawn_screen);
        }
    }

    fn encode_1_16(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        let dimension = self.dimension_info.clone().unwrap_or_else(default_dimension);
        encoder.write_i32(self.entity_id);
        if version >= ProtocolVersion::V1_16_2 {
            encoder.write_bool(self.is_hardcore);
            encoder.write_i8(self.gamemode);
        } else {
            encoder.write_i8(self.packed_gamemode());
        }
        encoder.write_i8(self.previous_gamemode);
        write_string_array(encoder, &self.level_names);
        write_raw_tag(encoder, &self.registry);
        if version >= ProtocolVersion::V1_16_2 && version < ProtocolVersion::V1_19 {
            write_raw_tag(encoder, &self.current_dimension_data);
            encoder.write_string(&dimension.registry_identifier);
        } else {
            encoder.write_string(&dimension.registry_identifier);
            encoder.write_string(dimension.level_name.as_deref().unwrap_or_default());
        }
        encoder.write_i64(self.partial_hashed_seed);
        if version >= ProtocolVersion::V1_16_2 {
            encoder.write_var_int(self.max_players);
        } else {
            encoder.write_u8(self.max_players.clamp(0, 255) as u8);
        }
        encoder.write_var_int(self.view_distance);
        if version >= ProtocolVersion::V1_18 {
            encoder.write_var_int(self.simulation_distance);
        }
        encoder.write_bool(self.reduced_debug_info);
        encoder.write_bool(self.show_respawn_screen);
        encoder.write_bool(dimension.is_debug);
        encoder.write_bool(dimension.is_flat);
        if version >= ProtocolVersion::V1_19 {
            write_death_position(encoder, &self.last_death_position);
        }
        if version >= ProtocolVersion::V1_20 {
            encoder.write_var_int(self.portal_cooldown);
        }
    }

    fn encode_1_20_2(&self, encoder: &mut Encoder) {
        let dimension = self.dimension_info.clone().unwrap_or_else(default_dimension);
        encoder.write_i32(self.entity_id);
        encoder.write_bool(self.is_hardcore);
        write_string_array(encoder, &self.level_names);
        encoder.write_var_int(self.max_players);
        encoder.write_var_int(self.view_distance);
        encoder.write_var_int(self.simulation_distance);
        encoder.write_bool(self.reduced_debug_info);
        encoder.write_bool(self.show_respawn_screen);
        encoder.write_bool(self.do_limited_crafting);
        encoder.write_string(&dimension.registry_identifier);
        encoder.write_string(dimension.level_name.as_deref().unwrap_or_default());
        encoder.write_i64(self.partial_hashed_seed);
        encoder.write_i8(self.gamemode);
        encoder.write_i8(self.previous_gamemode);
        encoder.write_bool(dimension.is_debug);
        encoder.write_bool(dimension.is_flat);
        write_death_position(encoder, &self.last_death_position);
        encoder.write_var_int(self.portal_cooldown);
    }
}

fn default_dimension() -> DimensionInfo {
    DimensionInfo {
        registry_identifier: "minecraft:overworld".to_owned(),
        level_name: Some("minecraft:overworld".to_owned()),
        is_flat: false,
        is_debug: false,
    }
}

/// Writes a captured tag back, or an empty compound when absent.
fn write_raw_tag(encoder: &mut Encoder, tag: &Option<Bytes>) {
    match tag {
        Some(tag) => encoder.write_slice(tag),
        None => nbt::write_json(encoder, &serde_json::Value::Null),
    }
}

impl Decode for JoinGame {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let version = decoder.version();
        if version >= ProtocolVersion::V1_20_2 {
            Self::decode_1_20_2(decoder)
        } else if version >= ProtocolVersion::V1_16 {
            Self::decode_1_16(decoder)
        } else {
            Self::decode_legacy(decoder)
        }
    }
}

impl Encode for JoinGame {
    fn encode(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        if version >= ProtocolVersion::V1_20_2 {
            self.encode_1_20_2(encoder)
        } else if version >= ProtocolVersion::V1_16 {
            self.encode_1_16(encoder)
        } else {
            self.encode_legacy(encoder)
        }
    }
}

/// Sent only by the proxy, to move the client through a dimension
/// change while switching servers.
#[derive(Debug, Clone, PartialEq)]
pub struct Respawn {
    pub dimension: i32,
    pub partial_hashed_seed: i64,
    pub difficulty: u8,
    pub gamemode: i8,
    pub level_type: String,
    pub data_to_keep: u8,
    pub dimension_info: Option<DimensionInfo>,
    pub previous_gamemode: i8,
    pub current_dimension_data: Option<Bytes>,
    pub last_death_position: Option<(String, i64)>,
    pub portal_cooldown: i32,
}

impl Respawn {
    pub fn from_join_game(join: &JoinGame) -> Self {
        Self {
            dimension: join.dimension,
            partial_hashed_seed: join.partial_hashed_seed,
            difficulty: join.difficulty,
            gamemode: join.gamemode,
            level_type: join.level_type.clone().unwrap_or_else(|| "default".to_owned()),
            data_to_keep: 0,
            dimension_info: join.dimension_info.clone(),
            previous_gamemode: join.previous_gamemode,
            current_dimension_data: join.current_dimension_data.clone(),
            last_death_position: join.last_death_position.clone(),
            portal_cooldown: join.portal_cooldown,
        }
    }
}

impl Encode for Respawn {
    fn encode(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        if version >= ProtocolVersion::V1_16 {
            let dimension = self.dimension_info.clone().unwrap_or_else(default_dimension);
            if version >= ProtocolVersion::V1_16_2 && version < ProtocolVersion::V1_19 {
                write_raw_tag(encoder, &self.current_dimension_data);
                encoder.write_string(&dimension.registry_identifier);
            } else {
                encoder.write_string(&dimension.registry_identifier);
                encoder.write_string(dimension.level_name.as_deref().unwrap_or_default());
            }
        } else {
            encoder.write_i32(self.dimension);
        }
        if version <= ProtocolVersion::V1_13_2 {
            encoder.write_u8(self.difficulty);
        }
        if version >= ProtocolVersion::V1_15 {
            encoder.write_i64(self.partial_hashed_seed);
        }
        encoder.write_i8(self.gamemode);
        if version >= ProtocolVersion::V1_16 {
            let dimension = self.dimension_info.clone().unwrap_or_else(default_dimension);
            encoder.write_i8(self.previous_gamemode);
            encoder.write_bool(dimension.is_debug);
            encoder.write_bool(dimension.is_flat);
            if version < ProtocolVersion::V1_19_3 {
                encoder.write_bool(self.data_to_keep != 0);
            } else if version < ProtocolVersion::V1_20_2 {
                encoder.write_u8(self.data_to_keep);
            }
        } else {
            encoder.write_string(&self.level_type);
        }
        if version >= ProtocolVersion::V1_19 {
            write_death_position(encoder, &self.last_death_position);
        }
        if version >= ProtocolVersion::V1_20 {
            encoder.write_var_int(self.portal_cooldown);
        }
        if version >= ProtocolVersion::V1_20_2 {
            encoder.write_u8(self.data_to_keep);
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct BossBar {
    pub uuid: Uuid,
    #[encoding(varint)]
    pub action: i32,
    pub data: Bytes,
}

impl BossBar {
    pub const ADD: i32 = 0;
    pub const REMOVE: i32 = 1;

    pub fn remove(uuid: Uuid) -> Self {
        Self {
            uuid,
            action: Self::REMOVE,
            data: Bytes::new(),
        }
    }
}

/// Serverbound chat before signed chat existed, also used for commands.
#[derive(Debug, Clone, Encode, Decode)]
pub struct LegacyChat {
    #[encoding(max_length = 256)]
    pub message: String,
}

/// Serverbound command from 1.19 on. Signing data is kept opaque.
#[derive(Debug, Clone, Encode, Decode)]
pub struct PlayerCommand {
    #[encoding(max_length = 256)]
    pub command: String,
    pub signing_data: Bytes,
}

/// Serverbound chat from 1.19 on. Everything after the message
/// (timestamp, salt, signature, acknowledgements) is kept opaque.
#[derive(Debug, Clone, Encode, Decode)]
pub struct PlayerChat {
    #[encoding(max_length = 256)]
    pub message: String,
    pub signing_data: Bytes,
}

/// A system message shown to the player.
#[derive(Debug, Clone)]
pub struct SystemChat {
    pub message: Component,
    pub overlay: bool,
}

impl SystemChat {
    pub fn new(message: Component) -> Self {
        Self {
            message,
            overlay: false,
        }
    }
}

impl Encode for SystemChat {
    fn encode(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        self.message.encode(encoder);
        if version >= ProtocolVersion::V1_19_1 {
            encoder.write_bool(self.overlay);
        } else if version >= ProtocolVersion::V1_19 {
            encoder.write_var_int(if self.overlay { 2 } else { 1 });
        } else {
            encoder.write_u8(if self.overlay { 2 } else { 1 });
            if version >= ProtocolVersion::V1_16 {
                encoder.write_uuid(Uuid::nil());
            }
        }
    }
}

const MAX_TAB_COMPLETE_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabCompleteRequest {
    pub transaction_id: i32,
    pub command: String,
    pub assume_command: bool,
    pub position: Option<i64>,
}

impl Decode for TabCompleteRequest {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let version = decoder.version();
        if version >= ProtocolVersion::V1_13 {
            return Ok(Self {
                transaction_id: decoder.read_var_int()?,
                command: decoder
                    .read_string_bounded(MAX_TAB_COMPLETE_LENGTH)?
                    .to_owned(),
                assume_command: false,
                position: None,
            });
        }
        let command = decoder
            .read_string_bounded(MAX_TAB_COMPLETE_LENGTH)?
            .to_owned();
        let assume_command = version >= ProtocolVersion::V1_9 && decoder.read_bool()?;
        let position = if decoder.read_bool()? {
            Some(decoder.read_i64()?)
        } else {
            None
        };
        Ok(Self {
            transaction_id: 0,
            command,
            assume_command,
            position,
        })
    }
}

impl Encode for TabCompleteRequest {
    fn encode(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        if version >= ProtocolVersion::V1_13 {
            encoder.write_var_int(self.transaction_id);
            encoder.write_string(&self.command);
            return;
        }
        encoder.write_string(&self.command);
        if version >= ProtocolVersion::V1_9 {
            encoder.write_bool(self.assume_command);
        }
        encoder.write_bool(self.position.is_some());
        if let Some(position) = self.position {
            encoder.write_i64(position);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub text: String,
    pub tooltip: Option<Component>,
}

impl Offer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tooltip: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabCompleteResponse {
    pub transaction_id: i32,
    pub start: i32,
    pub length: i32,
    pub offers: Vec<Offer>,
}

impl Decode for TabCompleteResponse {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let modern = decoder.version() >= ProtocolVersion::V1_13;
        let (transaction_id, start, length) = if modern {
            (
                decoder.read_var_int()?,
                decoder.read_var_int()?,
                decoder.read_var_int()?,
            )
        } else {
            (0, 0, 0)
        };
        let count = decoder.read_length()?;
        let mut offers = Vec::with_capacity(count.min(decoder.buffer().len()));
        for _ in 0..count {
            let text = decoder.read_string()?.to_owned();
            let tooltip = if modern && decoder.read_bool()? {
                Some(Component::decode(decoder)?)
            } else {
                None
            };
            offers.push(Offer { text, tooltip });
        }
        Ok(Self {
            transaction_id,
            start,
            length,
            offers,
        })
    }
}

impl Encode for TabCompleteResponse {
    fn encode(&self, encoder: &mut Encoder) {
        let modern = encoder.version() >= ProtocolVersion::V1_13;
        if modern {
            encoder.write_var_int(self.transaction_id);
            encoder.write_var_int(self.start);
            encoder.write_var_int(self.length);
        }
        encoder.write_length(self.offers.len());
        for offer in &self.offers {
            encoder.write_string(&offer.text);
            if modern {
                encoder.write_bool(offer.tooltip.is_some());
                if let Some(tooltip) = &offer.tooltip {
                    tooltip.encode(encoder);
                }
            }
        }
    }
}

/// Asks a 1.20.2+ client in play to go back into configuration.
#[derive(Debug, Clone, Encode, Decode)]
pub struct StartUpdate;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionState;

    fn legacy_join(dimension: i32) -> JoinGame {
        let mut join = JoinGame::empty(7);
        join.gamemode = 1;
        join.dimension = dimension;
        join.max_players = 20;
        join.level_type = Some("default".to_owned());
        join.view_distance = 8;
        join
    }

    fn encode<T: Encode>(packet: &T, version: ProtocolVersion) -> Vec<u8> {
        let mut buf = Vec::new();
        packet.encode(&mut Encoder::new(&mut buf, version, ConnectionState::Play));
        buf
    }

    #[test]
    fn legacy_join_game_round_trips_hardcore_flag() {
        let mut join = legacy_join(-1);
        join.is_hardcore = true;
        for version in [ProtocolVersion::V1_8, ProtocolVersion::V1_12_2, ProtocolVersion::V1_15_2] {
            let buf = encode(&join, version);
            let mut decoder = Decoder::new(&buf, version, ConnectionState::Play);
            let decoded = JoinGame::decode(&mut decoder).unwrap();
            assert!(decoder.is_finished());
            assert_eq!(decoded.dimension, -1);
            assert!(decoded.is_hardcore);
            assert_eq!(decoded.gamemode, 1);
        }
    }

    #[test]
    fn respawn_carries_join_game_dimension() {
        let join = legacy_join(-1);
        let respawn = Respawn::from_join_game(&join);
        let buf = encode(&respawn, ProtocolVersion::V1_12_2);
        assert_eq!(&buf[..4], &(-1i32).to_be_bytes());
    }

    #[test]
    fn modern_join_game_keeps_registry_bytes() {
        let mut join = JoinGame::empty(3);
        join.level_names = vec!["minecraft:overworld".to_owned()];
        join.registry = Some(Bytes::from_static(&[10, 0, 0, 1, 0, 1, b'a', 5, 0]));
        join.current_dimension_data = Some(Bytes::from_static(&[10, 0, 0, 0]));
        join.dimension_info = Some(DimensionInfo {
            level_name: None,
            ..default_dimension()
        });
        join.max_players = 100;
        let buf = encode(&join, ProtocolVersion::V1_17_1);
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_17_1, ConnectionState::Play);
        assert_eq!(JoinGame::decode(&mut decoder).unwrap(), join);
        assert!(decoder.is_finished());
    }

    #[test]
    fn tab_complete_request_before_and_after_1_13() {
        let request = TabCompleteRequest {
            transaction_id: 0,
            command: "/serv".to_owned(),
            assume_command: false,
            position: Some(99),
        };
        let buf = encode(&request, ProtocolVersion::V1_12_2);
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_12_2, ConnectionState::Play);
        assert_eq!(TabCompleteRequest::decode(&mut decoder).unwrap(), request);

        let buf = encode(&request, ProtocolVersion::V1_13);
        assert_eq!(buf[0], 0);
        assert_eq!(buf.len(), 1 + 1 + 5);
    }
}
