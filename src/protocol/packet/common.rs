//! Packets that appear in more than one connection state.

use crate::protocol::{
    component::Component, decoder, Decode, Decoder, Encode, Encoder, ProtocolVersion,
};
use bytes::Bytes;
use minecraft_switch_proxy_macros::{Decode, Encode};

#[derive(Debug, Clone, Encode, Decode)]
pub struct Disconnect {
    pub reason: Component,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl Decode for KeepAlive {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let id = if decoder.version() >= ProtocolVersion::V1_12_2 {
            decoder.read_i64()?
        } else {
            decoder.read_var_int()?.into()
        };
        Ok(Self { id })
    }
}

impl Encode for KeepAlive {
    fn encode(&self, encoder: &mut Encoder) {
        if encoder.version() >= ProtocolVersion::V1_12_2 {
            encoder.write_i64(self.id);
        } else {
            encoder.write_var_int(self.id as i32);
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct PluginMessage {
    pub channel: String,
    pub data: Bytes,
}

impl PluginMessage {
    pub fn new(channel: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ClientSettings {
    #[encoding(max_length = 16)]
    pub locale: String,
    pub view_distance: i8,
    #[encoding(varint)]
    pub chat_visibility: i32,
    pub chat_colors: bool,
    pub skin_parts: u8,
    #[encoding(varint, since = "V1_9")]
    pub main_hand: i32,
    #[encoding(since = "V1_17")]
    pub text_filtering: bool,
    #[encoding(since = "V1_18")]
    pub client_listing: bool,
}

/// Ends a configuration phase: sent by the backend when it is done
/// configuring and by the client to acknowledge it. The serverbound
/// play-state "configuration acknowledged" packet shares this shape.
#[derive(Debug, Clone, Encode, Decode)]
pub struct FinishedUpdate;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionState;

    #[test]
    fn keep_alive_id_width_changes_in_1_12_2() {
        for (version, width) in [(ProtocolVersion::V1_12_1, 1), (ProtocolVersion::V1_12_2, 8)] {
            let mut buf = Vec::new();
            KeepAlive { id: 5 }.encode(&mut Encoder::new(&mut buf, version, ConnectionState::Play));
            assert_eq!(buf.len(), width);
        }
    }

    #[test]
    fn client_settings_fields_are_version_gated() {
        let settings = ClientSettings {
            locale: "en_us".to_owned(),
            view_distance: 10,
            chat_visibility: 0,
            chat_colors: true,
            skin_parts: 0x7f,
            main_hand: 1,
            text_filtering: true,
            client_listing: true,
        };
        let mut buf = Vec::new();
        settings.encode(&mut Encoder::new(&mut buf, ProtocolVersion::V1_8, ConnectionState::Play));
        assert_eq!(buf.len(), 6 + 1 + 1 + 1 + 1);

        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_8, ConnectionState::Play);
        let decoded = ClientSettings::decode(&mut decoder).unwrap();
        assert_eq!(decoded.main_hand, 0);
        assert!(!decoded.client_listing);

        let mut buf = Vec::new();
        settings.encode(&mut Encoder::new(&mut buf, ProtocolVersion::V1_18, ConnectionState::Play));
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_18, ConnectionState::Play);
        assert_eq!(ClientSettings::decode(&mut decoder).unwrap(), settings);
    }
}
