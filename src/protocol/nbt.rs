//! Just enough NBT to carry opaque tags through packets and to
//! translate chat components, which are sent as NBT from 1.20.3.
//!
//! Network NBT roots carry a (usually empty) name before 1.20.2 and
//! are nameless from 1.20.2 on.

use crate::protocol::{decoder, DecodeError, Decoder, Encoder, ProtocolVersion};
use bytes::Bytes;
use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

fn invalid(message: impl Into<String>) -> DecodeError {
    DecodeError::Nbt(message.into())
}

/// Whether root tags carry a name in `version`.
pub fn named_root(version: ProtocolVersion) -> bool {
    version < ProtocolVersion::V1_20_2
}

/// Reads one root tag and returns its encoded bytes unchanged.
pub fn read_raw(decoder: &mut Decoder) -> decoder::Result<Bytes> {
    let named = named_root(decoder.version());
    decoder.capture(|decoder| {
        let id = decoder.read_u8()?;
        if id == TAG_END {
            return Ok(());
        }
        if named {
            skip_string(decoder)?;
        }
        skip_payload(decoder, id, 0)
    })
}

fn skip_string(decoder: &mut Decoder) -> decoder::Result<()> {
    let length = decoder.read_u16()?;
    decoder.consume_slice(length.into())?;
    Ok(())
}

fn read_array_length(decoder: &mut Decoder) -> decoder::Result<usize> {
    let length = decoder.read_i32()?;
    usize::try_from(length).map_err(|_| DecodeError::NegativeLength(length))
}

fn skip_payload(decoder: &mut Decoder, id: u8, depth: usize) -> decoder::Result<()> {
    if depth > MAX_DEPTH {
        return Err(invalid("tag nested too deeply"));
    }
    match id {
        TAG_BYTE => {
            decoder.consume_slice(1)?;
        }
        TAG_SHORT => {
            decoder.consume_slice(2)?;
        }
        TAG_INT | TAG_FLOAT => {
            decoder.consume_slice(4)?;
        }
        TAG_LONG | TAG_DOUBLE => {
            decoder.consume_slice(8)?;
        }
        TAG_BYTE_ARRAY => {
            let length = read_array_length(decoder)?;
            decoder.consume_slice(length)?;
        }
        TAG_INT_ARRAY => {
            let length = read_array_length(decoder)?;
            decoder.consume_slice(length.saturating_mul(4))?;
        }
        TAG_LONG_ARRAY => {
            let length = read_array_length(decoder)?;
            decoder.consume_slice(length.saturating_mul(8))?;
        }
        TAG_STRING => skip_string(decoder)?,
        TAG_LIST => {
            let element = decoder.read_u8()?;
            let length = read_array_length(decoder)?;
            if element == TAG_END && length > 0 {
                return Err(invalid("non-empty list of end tags"));
            }
            for _ in 0..length {
                skip_payload(decoder, element, depth + 1)?;
            }
        }
        TAG_COMPOUND => loop {
            let child = decoder.read_u8()?;
            if child == TAG_END {
                break;
            }
            skip_string(decoder)?;
            skip_payload(decoder, child, depth + 1)?;
        },
        other => return Err(invalid(format!("unknown tag type {other}"))),
    }
    Ok(())
}

/// Reads one root tag and converts it to JSON.
pub fn read_json(decoder: &mut Decoder) -> decoder::Result<Value> {
    let id = decoder.read_u8()?;
    if id == TAG_END {
        return Ok(Value::Null);
    }
    if named_root(decoder.version()) {
        skip_string(decoder)?;
    }
    read_payload_json(decoder, id, 0)
}

fn read_mutf8(decoder: &mut Decoder) -> decoder::Result<String> {
    let length = decoder.read_u16()?;
    decode_mutf8(decoder.consume_slice(length.into())?)
}

fn read_payload_json(decoder: &mut Decoder, id: u8, depth: usize) -> decoder::Result<Value> {
    if depth > MAX_DEPTH {
        return Err(invalid("tag nested too deeply"));
    }
    Ok(match id {
        TAG_BYTE => Value::from(decoder.read_i8()?),
        TAG_SHORT => Value::from(decoder.read_i16()?),
        TAG_INT => Value::from(decoder.read_i32()?),
        TAG_LONG => Value::from(decoder.read_i64()?),
        TAG_FLOAT => Value::from(decoder.read_f32()?),
        TAG_DOUBLE => Value::from(decoder.read_f64()?),
        TAG_STRING => Value::String(read_mutf8(decoder)?),
        TAG_BYTE_ARRAY | TAG_INT_ARRAY | TAG_LONG_ARRAY => {
            let length = read_array_length(decoder)?;
            let mut values = Vec::with_capacity(length.min(decoder.buffer().len()));
            for _ in 0..length {
                values.push(match id {
                    TAG_BYTE_ARRAY => Value::from(decoder.read_i8()?),
                    TAG_INT_ARRAY => Value::from(decoder.read_i32()?),
                    _ => Value::from(decoder.read_i64()?),
                });
            }
            Value::Array(values)
        }
        TAG_LIST => {
            let element = decoder.read_u8()?;
            let length = read_array_length(decoder)?;
            let mut values = Vec::with_capacity(length.min(decoder.buffer().len()));
            for _ in 0..length {
                values.push(unwrap_list_entry(read_payload_json(
                    decoder,
                    element,
                    depth + 1,
                )?));
            }
            Value::Array(values)
        }
        TAG_COMPOUND => {
            let mut map = Map::new();
            loop {
                let child = decoder.read_u8()?;
                if child == TAG_END {
                    break;
                }
                let name = read_mutf8(decoder)?;
                map.insert(name, read_payload_json(decoder, child, depth + 1)?);
            }
            Value::Object(map)
        }
        other => return Err(invalid(format!("unknown tag type {other}"))),
    })
}

/// Mixed lists are written as compounds holding the element under an
/// empty key.
fn unwrap_list_entry(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("") => {
            map.remove("").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Writes `value` as a root tag.
pub fn write_json(encoder: &mut Encoder, value: &Value) {
    let id = tag_type(value);
    encoder.write_u8(id);
    if named_root(encoder.version()) {
        encoder.write_u16(0);
    }
    write_payload_json(encoder, value);
}

fn tag_type(value: &Value) -> u8 {
    match value {
        Value::Null | Value::Object(_) => TAG_COMPOUND,
        Value::Bool(_) => TAG_BYTE,
        Value::Number(number) => {
            if number.is_f64() {
                TAG_DOUBLE
            } else if number
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok())
            {
                TAG_INT
            } else {
                TAG_LONG
            }
        }
        Value::String(_) => TAG_STRING,
        Value::Array(_) => TAG_LIST,
    }
}

fn write_mutf8(encoder: &mut Encoder, string: &str) {
    let bytes = encode_mutf8(string);
    let length = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    encoder.write_u16(length);
    encoder.write_slice(&bytes[..usize::from(length)]);
}

fn write_payload_json(encoder: &mut Encoder, value: &Value) {
    match value {
        Value::Null => encoder.write_u8(TAG_END),
        Value::Bool(b) => encoder.write_u8(u8::from(*b)),
        Value::Number(number) => write_number(encoder, number),
        Value::String(string) => write_mutf8(encoder, string),
        Value::Array(values) => {
            let element = values.first().map(tag_type).unwrap_or(TAG_END);
            let homogeneous = values.iter().all(|value| tag_type(value) == element);
            if homogeneous {
                encoder.write_u8(element);
                encoder.write_i32(values.len().try_into().unwrap_or(i32::MAX));
                for value in values {
                    write_payload_json(encoder, value);
                }
            } else {
                encoder.write_u8(TAG_COMPOUND);
                encoder.write_i32(values.len().try_into().unwrap_or(i32::MAX));
                for value in values {
                    match value {
                        Value::Object(_) => write_payload_json(encoder, value),
                        Value::String(text) => {
                            write_payload_json(encoder, &serde_json::json!({ "text": text }))
                        }
                        other => {
                            let mut map = Map::new();
                            map.insert(String::new(), other.clone());
                            write_payload_json(encoder, &Value::Object(map));
                        }
                    }
                }
            }
        }
        Value::Object(map) => {
            for (name, value) in map {
                encoder.write_u8(tag_type(value));
                write_mutf8(encoder, name);
                write_payload_json(encoder, value);
            }
            encoder.write_u8(TAG_END);
        }
    }
}

fn write_number(encoder: &mut Encoder, number: &Number) {
    match tag_type(&Value::Number(number.clone())) {
        TAG_INT => encoder.write_i32(
            number
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .unwrap_or_default(),
        ),
        TAG_LONG => encoder.write_i64(
            number
                .as_i64()
                .or_else(|| number.as_u64().map(|n| n as i64))
                .unwrap_or_default(),
        ),
        _ => encoder.write_f64(number.as_f64().unwrap_or_default()),
    }
}

/// Java's modified UTF-8: NUL takes two bytes and supplementary
/// characters are written as surrogate pairs.
fn encode_mutf8(string: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(string.len());
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007F => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                bytes.push(0xC0 | (unit >> 6) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                bytes.push(0xE0 | (unit >> 12) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    bytes
}

fn decode_mutf8(bytes: &[u8]) -> decoder::Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    let continuation = |byte: Option<u8>| match byte {
        Some(byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
        _ => Err(invalid("malformed modified utf-8")),
    };
    while let Some(first) = iter.next() {
        let unit = if first & 0x80 == 0 {
            u16::from(first)
        } else if first & 0xE0 == 0xC0 {
            (u16::from(first & 0x1F) << 6) | continuation(iter.next())?
        } else if first & 0xF0 == 0xE0 {
            let second = continuation(iter.next())?;
            let third = continuation(iter.next())?;
            (u16::from(first & 0x0F) << 12) | (second << 6) | third
        } else {
            return Err(invalid("malformed modified utf-8"));
        };
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| invalid("unpaired surrogate in string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionState;
    use serde_json::json;

    fn encode(value: &Value, version: ProtocolVersion) -> Vec<u8> {
        let mut buf = Vec::new();
        write_json(
            &mut Encoder::new(&mut buf, version, ConnectionState::Play),
            value,
        );
        buf
    }

    #[test]
    fn component_survives_nbt() {
        let component = json!({
            "text": "Kicked",
            "color": "red",
            "extra": [{ "text": " for " }, { "translate": "reason.idle" }],
        });
        let buf = encode(&component, ProtocolVersion::V1_20_3);
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_20_3, ConnectionState::Play);
        assert_eq!(read_json(&mut decoder).unwrap(), component);
        assert!(decoder.is_finished());
    }

    #[test]
    fn mixed_lists_are_wrapped() {
        let buf = encode(
            &json!({ "extra": ["plain", { "text": "styled", "bold": true }] }),
            ProtocolVersion::V1_20_3,
        );
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_20_3, ConnectionState::Play);
        let value = read_json(&mut decoder).unwrap();
        assert_eq!(value["extra"][0], json!({ "text": "plain" }));
        assert_eq!(value["extra"][1]["bold"], json!(1));
    }

    #[test]
    fn raw_capture_respects_root_naming() {
        let value = json!({ "dimension": "minecraft:overworld", "ids": [1, 2, 3] });
        for version in [ProtocolVersion::V1_16, ProtocolVersion::V1_20_2] {
            let mut buf = encode(&value, version);
            let tag_length = buf.len();
            buf.extend_from_slice(&[0xAB, 0xCD]);
            let mut decoder = Decoder::new(&buf, version, ConnectionState::Play);
            let raw = read_raw(&mut decoder).unwrap();
            assert_eq!(raw.len(), tag_length);
            assert_eq!(decoder.buffer(), &[0xAB, 0xCD]);
        }
    }

    #[test]
    fn modified_utf8_handles_nul_and_supplementary_characters() {
        let text = "a\0b\u{1F600}";
        let bytes = encode_mutf8(text);
        assert_eq!(&bytes[1..3], &[0xC0, 0x80]);
        assert_eq!(bytes.len(), 1 + 2 + 1 + 6);
        assert_eq!(decode_mutf8(&bytes).unwrap(), text);
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut buf = vec![TAG_LIST];
        for _ in 0..=MAX_DEPTH + 1 {
            buf.extend_from_slice(&[TAG_LIST, 0, 0, 0, 1]);
        }
        let mut decoder = Decoder::new(&buf, ProtocolVersion::V1_20_3, ConnectionState::Play);
        assert!(matches!(read_raw(&mut decoder), Err(DecodeError::Nbt(_))));
    }
}
