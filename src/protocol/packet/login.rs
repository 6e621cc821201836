use crate::protocol::{decoder, Decode, DecodeError, Decoder, Encode, Encoder, ProtocolVersion};
use bytes::Bytes;
use minecraft_switch_proxy_macros::{Decode, Encode};
use uuid::Uuid;

/// A chat signing key sent by 1.19 to 1.19.2 clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerKey {
    pub expiry: i64,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Decode for PlayerKey {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        Ok(Self {
            expiry: decoder.read_i64()?,
            public_key: decoder.read_byte_array_bounded(512)?.to_vec(),
            signature: decoder.read_byte_array_bounded(4096)?.to_vec(),
        })
    }
}

impl Encode for PlayerKey {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i64(self.expiry);
        encoder.write_byte_array(&self.public_key);
        encoder.write_byte_array(&self.signature);
    }
}

#[derive(Debug, Clone)]
pub struct ServerLogin {
    pub username: String,
    pub player_key: Option<PlayerKey>,
    pub holder_uuid: Option<Uuid>,
}

fn has_player_key(version: ProtocolVersion) -> bool {
    version >= ProtocolVersion::V1_19 && version < ProtocolVersion::V1_19_3
}

impl Decode for ServerLogin {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let version = decoder.version();
        let username = decoder.read_string_bounded(16)?.to_owned();
        if username.is_empty() {
            return Err(DecodeError::Other(anyhow::anyhow!("empty username")));
        }

        let player_key = if has_player_key(version) && decoder.read_bool()? {
            Some(PlayerKey::decode(decoder)?)
        } else {
            None
        };

        let holder_uuid = if version >= ProtocolVersion::V1_20_2 {
            Some(decoder.read_uuid()?)
        } else if version >= ProtocolVersion::V1_19_1 && decoder.read_bool()? {
            Some(decoder.read_uuid()?)
        } else {
            None
        };

        Ok(Self {
            username,
            player_key,
            holder_uuid,
        })
    }
}

impl Encode for ServerLogin {
    fn encode(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        encoder.write_string(&self.username);
        if has_player_key(version) {
            encoder.write_bool(self.player_key.is_some());
            if let Some(key) = &self.player_key {
                key.encode(encoder);
            }
        }
        if version >= ProtocolVersion::V1_20_2 {
            encoder.write_uuid(self.holder_uuid.unwrap_or_default());
        } else if version >= ProtocolVersion::V1_19_1 {
            encoder.write_bool(self.holder_uuid.is_some());
            if let Some(uuid) = self.holder_uuid {
                encoder.write_uuid(uuid);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncryptionRequest {
    pub server_id: String,
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Decode for EncryptionRequest {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        Ok(Self {
            server_id: decoder.read_string_bounded(20)?.to_owned(),
            public_key: decoder.read_byte_array_bounded(256)?.to_vec(),
            verify_token: decoder.read_byte_array_bounded(16)?.to_vec(),
        })
    }
}

impl Encode for EncryptionRequest {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_string(&self.server_id);
        encoder.write_byte_array(&self.public_key);
        encoder.write_byte_array(&self.verify_token);
    }
}

/// Proof of possession sent instead of the encrypted verify token
/// by clients holding a chat signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltSignature {
    pub salt: i64,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EncryptionResponse {
    pub shared_secret: Vec<u8>,
    pub verify: EncryptionVerification,
}

#[derive(Debug, Clone)]
pub enum EncryptionVerification {
    /// The verify token, encrypted with the proxy's public key.
    Token(Vec<u8>),
    /// A salted signature of the verify token made with the player key.
    Signature(SaltSignature),
}

fn has_signature_option(version: ProtocolVersion) -> bool {
    version >= ProtocolVersion::V1_19 && version < ProtocolVersion::V1_19_3
}

impl Decode for EncryptionResponse {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let shared_secret = decoder.read_byte_array_bounded(128)?.to_vec();
        let verify = if has_signature_option(decoder.version()) && !decoder.read_bool()? {
            EncryptionVerification::Signature(SaltSignature {
                salt: decoder.read_i64()?,
                signature: decoder.read_byte_array_bounded(256)?.to_vec(),
            })
        } else {
            EncryptionVerification::Token(decoder.read_byte_array_bounded(128)?.to_vec())
        };
        Ok(Self {
            shared_secret,
            verify,
        })
    }
}

impl Encode for EncryptionResponse {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_byte_array(&self.shared_secret);
        let signature_option = has_signature_option(encoder.version());
        match &self.verify {
            EncryptionVerification::Token(token) => {
                if signature_option {
                    encoder.write_bool(true);
                }
                encoder.write_byte_array(token);
            }
            EncryptionVerification::Signature(SaltSignature { salt, signature }) => {
                if signature_option {
                    encoder.write_bool(false);
                    encoder.write_i64(*salt);
                }
                encoder.write_byte_array(signature);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GameProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Decode for GameProfileProperty {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        Ok(Self {
            name: decoder.read_string()?.to_owned(),
            value: decoder.read_string()?.to_owned(),
            signature: if decoder.read_bool()? {
                Some(decoder.read_string()?.to_owned())
            } else {
                None
            },
        })
    }
}

impl Encode for GameProfileProperty {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_string(&self.name);
        encoder.write_string(&self.value);
        encoder.write_bool(self.signature.is_some());
        if let Some(signature) = &self.signature {
            encoder.write_string(signature);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerLoginSuccess {
    pub uuid: Uuid,
    pub username: String,
    pub properties: Vec<GameProfileProperty>,
}

impl Decode for ServerLoginSuccess {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let version = decoder.version();
        let uuid = if version >= ProtocolVersion::V1_16 {
            decoder.read_uuid()?
        } else {
            decoder.read_uuid_string()?
        };
        let username = decoder.read_string_bounded(16)?.to_owned();
        let mut properties = Vec::new();
        if version >= ProtocolVersion::V1_19 {
            let count = decoder.read_length()?;
            for _ in 0..count {
                properties.push(GameProfileProperty::decode(decoder)?);
            }
        }
        Ok(Self {
            uuid,
            username,
            properties,
        })
    }
}

impl Encode for ServerLoginSuccess {
    fn encode(&self, encoder: &mut Encoder) {
        let version = encoder.version();
        if version >= ProtocolVersion::V1_16 {
            encoder.write_uuid(self.uuid);
        } else {
            encoder.write_uuid_string(self.uuid);
        }
        encoder.write_string(&self.username);
        if version >= ProtocolVersion::V1_19 {
            encoder.write_length(self.properties.len());
            for property in &self.properties {
                property.encode(encoder);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct SetCompression {
    #[encoding(varint)]
    pub threshold: i32,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct LoginPluginMessage {
    #[encoding(varint)]
    pub id: i32,
    pub channel: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct LoginPluginResponse {
    #[encoding(varint)]
    pub id: i32,
    pub success: bool,
    pub data: Bytes,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct LoginAcknowledged;
