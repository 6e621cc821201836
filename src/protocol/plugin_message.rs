//! Helpers for the plugin message channels the proxy interprets.

use crate::protocol::{packet::PluginMessage, ConnectionState, Decoder, Encoder, ProtocolVersion};
use bytes::Bytes;

const BRAND_CHANNEL_LEGACY: &str = "MC|Brand";
const BRAND_CHANNEL: &str = "minecraft:brand";
const REGISTER_CHANNEL_LEGACY: &str = "REGISTER";
const REGISTER_CHANNEL: &str = "minecraft:register";
const UNREGISTER_CHANNEL_LEGACY: &str = "UNREGISTER";
const UNREGISTER_CHANNEL: &str = "minecraft:unregister";

pub fn is_brand(message: &PluginMessage) -> bool {
    message.channel == BRAND_CHANNEL || message.channel == BRAND_CHANNEL_LEGACY
}

pub fn is_register(message: &PluginMessage) -> bool {
    message.channel == REGISTER_CHANNEL || message.channel == REGISTER_CHANNEL_LEGACY
}

pub fn is_unregister(message: &PluginMessage) -> bool {
    message.channel == UNREGISTER_CHANNEL || message.channel == UNREGISTER_CHANNEL_LEGACY
}

/// Channel names carried by a REGISTER or UNREGISTER message.
pub fn channels(message: &PluginMessage) -> Vec<String> {
    if message.data.is_empty() {
        return Vec::new();
    }
    String::from_utf8_lossy(&message.data)
        .split('\0')
        .filter(|channel| !channel.is_empty())
        .map(str::to_owned)
        .collect()
}

/// A REGISTER message announcing `channels`, named for `version`.
pub fn register_channels<'a>(
    version: ProtocolVersion,
    channels: impl IntoIterator<Item = &'a str>,
) -> PluginMessage {
    let channel = if version >= ProtocolVersion::V1_13 {
        REGISTER_CHANNEL
    } else {
        REGISTER_CHANNEL_LEGACY
    };
    let joined = channels.into_iter().collect::<Vec<_>>().join("\0");
    PluginMessage::new(channel, Bytes::from(joined))
}

/// Reads the brand string, which is usually length prefixed but raw
/// from some clients.
pub fn read_brand(data: &[u8]) -> String {
    let mut decoder = Decoder::new(data, ProtocolVersion::MINIMUM, ConnectionState::Play);
    match decoder.read_string() {
        Ok(brand) if decoder.is_finished() => brand.to_owned(),
        _ => String::from_utf8_lossy(data).into_owned(),
    }
}

/// Appends `suffix` to the brand a backend reports.
pub fn rewrite_brand(message: &PluginMessage, suffix: &str) -> PluginMessage {
    let brand = format!("{} ({suffix})", read_brand(&message.data));
    let mut data = Vec::with_capacity(brand.len() + 2);
    Encoder::new(&mut data, ProtocolVersion::MINIMUM, ConnectionState::Play).write_string(&brand);
    PluginMessage::new(message.channel.clone(), data)
}

/// Converts a pre-1.13 channel name to a namespaced identifier.
pub fn modern_channel_name(name: &str) -> String {
    if name.contains(':') {
        return name.to_owned();
    }
    match name {
        REGISTER_CHANNEL_LEGACY => REGISTER_CHANNEL.to_owned(),
        UNREGISTER_CHANNEL_LEGACY => UNREGISTER_CHANNEL.to_owned(),
        BRAND_CHANNEL_LEGACY => BRAND_CHANNEL.to_owned(),
        "BungeeCord" => "bungeecord:main".to_owned(),
        _ => {
            let cleaned: String = name
                .to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
                .collect();
            format!("legacy:{cleaned}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_register_has_no_channels() {
        let message = PluginMessage::new("minecraft:register", Bytes::new());
        assert!(channels(&message).is_empty());
    }

    #[test]
    fn register_channel_name_depends_on_version() {
        let legacy = register_channels(ProtocolVersion::V1_12_2, ["a", "b"]);
        assert_eq!(legacy.channel, "REGISTER");
        assert_eq!(channels(&legacy), ["a", "b"]);
        let modern = register_channels(ProtocolVersion::V1_13, ["velocity:main"]);
        assert_eq!(modern.channel, "minecraft:register");
        assert!(is_register(&modern));
    }

    #[test]
    fn brand_is_rewritten() {
        let mut data = Vec::new();
        Encoder::new(&mut data, ProtocolVersion::MAXIMUM, ConnectionState::Play)
            .write_string("vanilla");
        let message = PluginMessage::new("minecraft:brand", data);
        let rewritten = rewrite_brand(&message, "switch-proxy");
        assert_eq!(read_brand(&rewritten.data), "vanilla (switch-proxy)");
        assert_eq!(read_brand(b"raw"), "raw");
    }

    #[test]
    fn legacy_names_become_identifiers() {
        assert_eq!(modern_channel_name("MC|Brand"), "minecraft:brand");
        assert_eq!(modern_channel_name("BungeeCord"), "bungeecord:main");
        assert_eq!(modern_channel_name("WECUI"), "legacy:wecui");
        assert_eq!(modern_channel_name("FML|HS"), "legacy:fmlhs");
        assert_eq!(modern_channel_name("a:b"), "a:b");
    }
}
