//! Chat components, carried as JSON text or as NBT from 1.20.3.

use crate::protocol::{
    decoder, nbt, ConnectionState, Decode, Decoder, Encode, Encoder, ProtocolVersion,
};
use serde_json::{json, Value};
use std::fmt;

/// Upper bound on JSON text components read from the wire.
const MAX_JSON_LENGTH: usize = 262144;

/// A chat component.
#[derive(Debug, Clone, PartialEq)]
pub struct Component(Value);

impl Component {
    pub fn text(text: impl Into<String>) -> Self {
        Self(json!({ "text": text.into() }))
    }

    pub fn translatable(key: &str, args: impl IntoIterator<Item = Component>) -> Self {
        let with: Vec<Value> = args.into_iter().map(|arg| arg.0).collect();
        if with.is_empty() {
            Self(json!({ "translate": key }))
        } else {
            Self(json!({ "translate": key, "with": with }))
        }
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => Self::text(text),
            other => Self(other),
        }
    }

    /// Sets the color of this component.
    pub fn color(mut self, color: &str) -> Self {
        if let Value::Object(map) = &mut self.0 {
            map.insert("color".to_owned(), Value::String(color.to_owned()));
        }
        self
    }

    /// Appends a child component.
    pub fn append(mut self, child: Component) -> Self {
        if let Value::Object(map) = &mut self.0 {
            match map.get_mut("extra") {
                Some(Value::Array(extra)) => extra.push(child.0),
                _ => {
                    map.insert("extra".to_owned(), Value::Array(vec![child.0]));
                }
            }
        }
        self
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    /// Concatenates the literal text of this component and its children.
    /// Translation keys are shown as-is.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.0, &mut out);
        out
    }

    /// Reads a component as JSON text regardless of version.
    pub fn read_json(decoder: &mut Decoder) -> decoder::Result<Self> {
        let text = decoder.read_string_bounded(MAX_JSON_LENGTH)?;
        Ok(Self::from_json(serde_json::from_str(text)?))
    }

    pub fn write_json(&self, encoder: &mut Encoder) {
        encoder.write_string(&self.to_json_string());
    }

    /// Whether components in `state` are sent as NBT for `version`.
    fn uses_nbt(version: ProtocolVersion, state: ConnectionState) -> bool {
        version >= ProtocolVersion::V1_20_3 && state != ConnectionState::Login
    }
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(text),
        Value::Array(values) => values.iter().for_each(|value| collect_text(value, out)),
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            } else if let Some(Value::String(key)) = map.get("translate") {
                out.push_str(key);
            }
            if let Some(extra) = map.get("extra") {
                collect_text(extra, out);
            }
        }
        _ => {}
    }
}

impl Decode for Component {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        if Self::uses_nbt(decoder.version(), decoder.state()) {
            nbt::read_json(decoder).map(Self::from_json)
        } else {
            Self::read_json(decoder)
        }
    }
}

impl Encode for Component {
    fn encode(&self, encoder: &mut Encoder) {
        if Self::uses_nbt(encoder.version(), encoder.state()) {
            nbt::write_json(encoder, &self.0);
        } else {
            self.write_json(encoder);
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_flattens_children() {
        let component = Component::text("Unable to connect to ")
            .append(Component::text("lobby"))
            .append(Component::text(": timed out"))
            .color("red");
        assert_eq!(component.plain_text(), "Unable to connect to lobby: timed out");
        assert_eq!(component.as_json()["color"], "red");
    }

    #[test]
    fn login_components_stay_json_on_new_versions() {
        let component = Component::text("bye");
        let mut buf = Vec::new();
        component.encode(&mut Encoder::new(
            &mut buf,
            ProtocolVersion::V1_20_3,
            ConnectionState::Login,
        ));
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_20_3, ConnectionState::Login);
        assert_eq!(decoder.read_string().unwrap(), r#"{"text":"bye"}"#);
    }

    #[test]
    fn play_components_use_nbt_from_1_20_3() {
        let component = Component::translatable("multiplayer.disconnect.kicked", []);
        for (version, nbt) in [
            (ProtocolVersion::V1_20_2, false),
            (ProtocolVersion::V1_20_3, true),
        ] {
            let mut buf = Vec::new();
            component.encode(&mut Encoder::new(&mut buf, version, ConnectionState::Play));
            assert_eq!(buf[0] == 10, nbt);
            let mut decoder = Decoder::new(&buf, version, ConnectionState::Play);
            assert_eq!(Component::decode(&mut decoder).unwrap(), component);
        }
    }

    #[test]
    fn bare_json_strings_become_text_components() {
        let buf = {
            let mut buf = Vec::new();
            Encoder::new(&mut buf, ProtocolVersion::V1_8, ConnectionState::Play)
                .write_string("\"hello\"");
            buf
        };
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_8, ConnectionState::Play);
        assert_eq!(
            Component::decode(&mut decoder).unwrap(),
            Component::text("hello")
        );
    }
}
