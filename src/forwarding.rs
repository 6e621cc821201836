//! Passing the player's real address and profile on to backends.

use crate::{
    auth::GameProfile,
    protocol::{ConnectionState, Encode, Encoder, ProtocolVersion},
};
use bytes::{BufMut, Bytes, BytesMut};
use hmac::{digest::InvalidLength, Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::net::IpAddr;

/// Login plugin channel backends use to ask for modern forwarding data.
pub const PLAYER_INFO_CHANNEL: &str = "velocity:player_info";

/// The modern forwarding payload version the proxy writes.
pub const MODERN_FORWARDING_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingMode {
    /// Backends see the proxy's address and offline UUIDs.
    #[default]
    None,
    /// Forwarding data packed into the handshake address.
    Legacy,
    /// Signed forwarding data sent during login, on request of the backend.
    Modern,
}

/// The handshake address used by legacy forwarding.
pub fn legacy_address(host: &str, client_ip: IpAddr, profile: &GameProfile) -> String {
    let properties =
        serde_json::to_string(&profile.properties).unwrap_or_else(|_| "[]".to_owned());
    format!(
        "{host}\0{client_ip}\0{}\0{properties}",
        profile.id.simple()
    )
}

/// The answer to a backend's `velocity:player_info` request: an
/// HMAC-SHA256 signature followed by the signed data.
pub fn modern_payload(
    secret: &[u8],
    client_ip: IpAddr,
    profile: &GameProfile,
) -> Result<Bytes, InvalidLength> {
    let mut data = Vec::new();
    let mut encoder = Encoder::new(&mut data, ProtocolVersion::MAXIMUM, ConnectionState::Login);
    encoder.write_var_int(MODERN_FORWARDING_VERSION);
    encoder.write_string(&client_ip.to_string());
    encoder.write_uuid(profile.id);
    encoder.write_string(&profile.name);
    encoder.write_length(profile.properties.len());
    for property in &profile.properties {
        property.encode(&mut encoder);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)?;
    mac.update(&data);
    let signature = mac.finalize().into_bytes();

    let mut payload = BytesMut::with_capacity(signature.len() + data.len());
    payload.put_slice(&signature);
    payload.put_slice(&data);
    Ok(payload.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{packet::GameProfileProperty, Decoder};
    use uuid::Uuid;

    fn profile() -> GameProfile {
        GameProfile {
            id: Uuid::from_u128(0x069a79f444e94726a5befca90e38aaf5),
            name: "Notch".to_owned(),
            properties: vec![GameProfileProperty {
                name: "textures".to_owned(),
                value: "e30=".to_owned(),
                signature: Some("sig".to_owned()),
            }],
        }
    }

    #[test]
    fn legacy_address_layout() {
        let address = legacy_address("lobby.local", "10.0.0.7".parse().unwrap(), &profile());
        let parts: Vec<&str> = address.split('\0').collect();
        assert_eq!(parts[..3], ["lobby.local", "10.0.0.7", "069a79f444e94726a5befca90e38aaf5"]);
        assert_eq!(
            parts[3],
            r#"[{"name":"textures","value":"e30=","signature":"sig"}]"#
        );
    }

    #[test]
    fn modern_payload_is_signed() {
        let payload = modern_payload(b"secret", "10.0.0.7".parse().unwrap(), &profile()).unwrap();
        let (signature, data) = payload.split_at(32);

        let mut mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        mac.update(data);
        mac.verify_slice(signature).unwrap();

        let mut decoder = Decoder::new(data, ProtocolVersion::MAXIMUM, ConnectionState::Login);
        assert_eq!(decoder.read_var_int().unwrap(), MODERN_FORWARDING_VERSION);
        assert_eq!(decoder.read_string().unwrap(), "10.0.0.7");
        assert_eq!(decoder.read_uuid().unwrap(), profile().id);
        assert_eq!(decoder.read_string().unwrap(), "Notch");
        assert_eq!(decoder.read_length().unwrap(), 1);
    }
}
