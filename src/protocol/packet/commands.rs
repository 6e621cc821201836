//! The clientbound command tree.
//!
//! From 1.19 on, argument parsers are sent as numeric ids whose meaning
//! changes between releases; older clients receive identifier strings.

use crate::{
    command::graph::{
        ArgumentProperties, ArgumentType, CommandGraph, Node, NodeId, NodeKind, NumericBound,
        StringKind,
    },
    protocol::{decoder, Decode, DecodeError, Decoder, Encode, Encoder, ProtocolVersion},
};

const FLAG_NODE_TYPE: u8 = 0x03;
const FLAG_EXECUTABLE: u8 = 0x04;
const FLAG_IS_REDIRECT: u8 = 0x08;
const FLAG_HAS_SUGGESTIONS: u8 = 0x10;

const TYPE_ROOT: u8 = 0;
const TYPE_LITERAL: u8 = 1;
const TYPE_ARGUMENT: u8 = 2;

const NUMERIC_HAS_MIN: u8 = 0x01;
const NUMERIC_HAS_MAX: u8 = 0x02;

#[rustfmt::skip]
const PARSERS_1_19: &[&str] = &[
    "brigadier:bool", "brigadier:float", "brigadier:double", "brigadier:integer",
    "brigadier:long", "brigadier:string", "minecraft:entity", "minecraft:game_profile",
    "minecraft:block_pos", "minecraft:column_pos", "minecraft:vec3", "minecraft:vec2",
    "minecraft:block_state", "minecraft:block_predicate", "minecraft:item_stack",
    "minecraft:item_predicate", "minecraft:color", "minecraft:component", "minecraft:message",
    "minecraft:nbt_compound_tag", "minecraft:nbt_tag", "minecraft:nbt_path",
    "minecraft:objective", "minecraft:objective_criteria", "minecraft:operation",
    "minecraft:particle", "minecraft:angle", "minecraft:rotation", "minecraft:scoreboard_slot",
    "minecraft:score_holder", "minecraft:swizzle", "minecraft:team", "minecraft:item_slot",
    "minecraft:resource_location", "minecraft:mob_effect", "minecraft:function",
    "minecraft:entity_anchor", "minecraft:int_range", "minecraft:float_range",
    "minecraft:item_enchantment", "minecraft:entity_summon", "minecraft:dimension",
    "minecraft:time", "minecraft:resource_or_tag", "minecraft:resource",
    "minecraft:template_mirror", "minecraft:template_rotation", "minecraft:uuid",
];

#[rustfmt::skip]
const PARSERS_1_19_3: &[&str] = &[
    "brigadier:bool", "brigadier:float", "brigadier:double", "brigadier:integer",
    "brigadier:long", "brigadier:string", "minecraft:entity", "minecraft:game_profile",
    "minecraft:block_pos", "minecraft:column_pos", "minecraft:vec3", "minecraft:vec2",
    "minecraft:block_state", "minecraft:block_predicate", "minecraft:item_stack",
    "minecraft:item_predicate", "minecraft:color", "minecraft:component", "minecraft:message",
    "minecraft:nbt_compound_tag", "minecraft:nbt_tag", "minecraft:nbt_path",
    "minecraft:objective", "minecraft:objective_criteria", "minecraft:operation",
    "minecraft:particle", "minecraft:angle", "minecraft:rotation", "minecraft:scoreboard_slot",
    "minecraft:score_holder", "minecraft:swizzle", "minecraft:team", "minecraft:item_slot",
    "minecraft:resource_location", "minecraft:function", "minecraft:entity_anchor",
    "minecraft:int_range", "minecraft:float_range", "minecraft:dimension", "minecraft:gamemode",
    "minecraft:time", "minecraft:resource_or_tag", "minecraft:resource_or_tag_key",
    "minecraft:resource", "minecraft:resource_key", "minecraft:template_mirror",
    "minecraft:template_rotation", "minecraft:uuid",
];

#[rustfmt::skip]
const PARSERS_1_19_4: &[&str] = &[
    "brigadier:bool", "brigadier:float", "brigadier:double", "brigadier:integer",
    "brigadier:long", "brigadier:string", "minecraft:entity", "minecraft:game_profile",
    "minecraft:block_pos", "minecraft:column_pos", "minecraft:vec3", "minecraft:vec2",
    "minecraft:block_state", "minecraft:block_predicate", "minecraft:item_stack",
    "minecraft:item_predicate", "minecraft:color", "minecraft:component", "minecraft:message",
    "minecraft:nbt_compound_tag", "minecraft:nbt_tag", "minecraft:nbt_path",
    "minecraft:objective", "minecraft:objective_criteria", "minecraft:operation",
    "minecraft:particle", "minecraft:angle", "minecraft:rotation", "minecraft:scoreboard_slot",
    "minecraft:score_holder", "minecraft:swizzle", "minecraft:team", "minecraft:item_slot",
    "minecraft:resource_location", "minecraft:function", "minecraft:entity_anchor",
    "minecraft:int_range", "minecraft:float_range", "minecraft:dimension", "minecraft:gamemode",
    "minecraft:time", "minecraft:resource_or_tag", "minecraft:resource_or_tag_key",
    "minecraft:resource", "minecraft:resource_key", "minecraft:template_mirror",
    "minecraft:template_rotation", "minecraft:heightmap", "minecraft:uuid",
];

#[rustfmt::skip]
const PARSERS_1_20_3: &[&str] = &[
    "brigadier:bool", "brigadier:float", "brigadier:double", "brigadier:integer",
    "brigadier:long", "brigadier:string", "minecraft:entity", "minecraft:game_profile",
    "minecraft:block_pos", "minecraft:column_pos", "minecraft:vec3", "minecraft:vec2",
    "minecraft:block_state", "minecraft:block_predicate", "minecraft:item_stack",
    "minecraft:item_predicate", "minecraft:color", "minecraft:component", "minecraft:style",
    "minecraft:message", "minecraft:nbt_compound_tag", "minecraft:nbt_tag",
    "minecraft:nbt_path", "minecraft:objective", "minecraft:objective_criteria",
    "minecraft:operation", "minecraft:particle", "minecraft:angle", "minecraft:rotation",
    "minecraft:scoreboard_slot", "minecraft:score_holder", "minecraft:swizzle",
    "minecraft:team", "minecraft:item_slot", "minecraft:resource_location",
    "minecraft:function", "minecraft:entity_anchor", "minecraft:int_range",
    "minecraft:float_range", "minecraft:dimension", "minecraft:gamemode", "minecraft:time",
    "minecraft:resource_or_tag", "minecraft:resource_or_tag_key", "minecraft:resource",
    "minecraft:resource_key", "minecraft:template_mirror", "minecraft:template_rotation",
    "minecraft:heightmap", "minecraft:uuid",
];

/// Parsers known to clients that still send identifier strings.
#[rustfmt::skip]
const LEGACY_PARSERS: &[&str] = &[
    "brigadier:bool", "brigadier:float", "brigadier:double", "brigadier:integer",
    "brigadier:long", "brigadier:string", "minecraft:entity", "minecraft:game_profile",
    "minecraft:block_pos", "minecraft:column_pos", "minecraft:vec3", "minecraft:vec2",
    "minecraft:block_state", "minecraft:block_predicate", "minecraft:item_stack",
    "minecraft:item_predicate", "minecraft:color", "minecraft:component", "minecraft:message",
    "minecraft:nbt", "minecraft:nbt_compound_tag", "minecraft:nbt_tag", "minecraft:nbt_path",
    "minecraft:objective", "minecraft:objective_criteria", "minecraft:operation",
    "minecraft:particle", "minecraft:angle", "minecraft:rotation", "minecraft:scoreboard_slot",
    "minecraft:score_holder", "minecraft:swizzle", "minecraft:team", "minecraft:item_slot",
    "minecraft:resource_location", "minecraft:mob_effect", "minecraft:function",
    "minecraft:entity_anchor", "minecraft:int_range", "minecraft:float_range",
    "minecraft:item_enchantment", "minecraft:entity_summon", "minecraft:dimension",
    "minecraft:time", "minecraft:uuid",
];

/// The numeric parser table used by `version`, or `None` before 1.19.
fn parser_table(version: ProtocolVersion) -> Option<&'static [&'static str]> {
    if version >= ProtocolVersion::V1_20_3 {
        Some(PARSERS_1_20_3)
    } else if version >= ProtocolVersion::V1_19_4 {
        Some(PARSERS_1_19_4)
    } else if version >= ProtocolVersion::V1_19_3 {
        Some(PARSERS_1_19_3)
    } else if version >= ProtocolVersion::V1_19 {
        Some(PARSERS_1_19)
    } else {
        None
    }
}

/// Whether clients on `version` understand `parser`.
pub fn supports_parser(version: ProtocolVersion, parser: &str) -> bool {
    parser_table(version)
        .unwrap_or(LEGACY_PARSERS)
        .contains(&parser)
}

fn read_parser(decoder: &mut Decoder) -> decoder::Result<String> {
    match parser_table(decoder.version()) {
        Some(table) => {
            let id = decoder.read_var_int()?;
            usize::try_from(id)
                .ok()
                .and_then(|id| table.get(id))
                .map(|&parser| parser.to_owned())
                .ok_or_else(|| DecodeError::UnknownArgumentParser(id.to_string()))
        }
        None => {
            let parser = decoder.read_string()?;
            if LEGACY_PARSERS.contains(&parser) {
                Ok(parser.to_owned())
            } else {
                Err(DecodeError::UnknownArgumentParser(parser.to_owned()))
            }
        }
    }
}

fn read_bound(decoder: &mut Decoder, parser: &str) -> decoder::Result<NumericBound> {
    Ok(match parser {
        "brigadier:float" => NumericBound::Float(decoder.read_f32()?),
        "brigadier:double" => NumericBound::Double(decoder.read_f64()?),
        "brigadier:integer" => NumericBound::Integer(decoder.read_i32()?),
        _ => NumericBound::Long(decoder.read_i64()?),
    })
}

fn write_bound(encoder: &mut Encoder, bound: NumericBound) {
    match bound {
        NumericBound::Float(x) => encoder.write_f32(x),
        NumericBound::Double(x) => encoder.write_f64(x),
        NumericBound::Integer(x) => encoder.write_i32(x),
        NumericBound::Long(x) => encoder.write_i64(x),
    }
}

fn read_properties(decoder: &mut Decoder, parser: &str) -> decoder::Result<ArgumentProperties> {
    Ok(match parser {
        "brigadier:float" | "brigadier:double" | "brigadier:integer" | "brigadier:long" => {
            let flags = decoder.read_u8()?;
            let min = if flags & NUMERIC_HAS_MIN != 0 {
                Some(read_bound(decoder, parser)?)
            } else {
                None
            };
            let max = if flags & NUMERIC_HAS_MAX != 0 {
                Some(read_bound(decoder, parser)?)
            } else {
                None
            };
            ArgumentProperties::Numeric { min, max }
        }
        "brigadier:string" => ArgumentProperties::StringKind(match decoder.read_var_int()? {
            0 => StringKind::SingleWord,
            1 => StringKind::Quotable,
            2 => StringKind::Greedy,
            other => return Err(DecodeError::InvalidDiscriminant(other.into())),
        }),
        "minecraft:entity" | "minecraft:score_holder" => {
            ArgumentProperties::Flags(decoder.read_u8()?)
        }
        "minecraft:time" if decoder.version() >= ProtocolVersion::V1_19_4 => {
            ArgumentProperties::Time(decoder.read_i32()?)
        }
        "minecraft:resource"
        | "minecraft:resource_or_tag"
        | "minecraft:resource_key"
        | "minecraft:resource_or_tag_key" => {
            ArgumentProperties::Registry(decoder.read_string()?.to_owned())
        }
        _ => ArgumentProperties::None,
    })
}

fn write_properties(encoder: &mut Encoder, properties: &ArgumentProperties) {
    match properties {
        ArgumentProperties::None => {}
        ArgumentProperties::Numeric { min, max } => {
            let mut flags = 0;
            if min.is_some() {
                flags |= NUMERIC_HAS_MIN;
            }
            if max.is_some() {
                flags |= NUMERIC_HAS_MAX;
            }
            encoder.write_u8(flags);
            for bound in min.iter().chain(max.iter()) {
                write_bound(encoder, *bound);
            }
        }
        ArgumentProperties::StringKind(kind) => {
            encoder.write_var_int(match kind {
                StringKind::SingleWord => 0,
                StringKind::Quotable => 1,
                StringKind::Greedy => 2,
            });
        }
        ArgumentProperties::Flags(flags) => encoder.write_u8(*flags),
        ArgumentProperties::Time(min) => {
            if encoder.version() >= ProtocolVersion::V1_19_4 {
                encoder.write_i32(*min);
            }
        }
        ArgumentProperties::Registry(registry) => encoder.write_string(registry),
    }
}

fn write_argument_type(encoder: &mut Encoder, argument_type: &ArgumentType) {
    match parser_table(encoder.version()) {
        Some(table) => match table.iter().position(|&p| p == argument_type.parser) {
            Some(id) => {
                encoder.write_var_int(id as i32);
                write_properties(encoder, &argument_type.properties);
            }
            None => {
                // Unrepresentable parsers degrade to a greedy string.
                let fallback = ArgumentType::greedy_string();
                write_argument_type(encoder, &fallback);
            }
        },
        None => {
            encoder.write_string(&argument_type.parser);
            write_properties(encoder, &argument_type.properties);
        }
    }
}

/// The command tree a backend declares, or the proxy sends.
///
/// Decoding fails on parsers the proxy does not know; the caller then
/// relays the backend's packet untouched.
#[derive(Debug, Clone)]
pub struct AvailableCommands {
    pub graph: CommandGraph,
}

impl Decode for AvailableCommands {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let count = decoder.read_length()?;
        let mut nodes = Vec::with_capacity(count.min(decoder.buffer().len()));
        for _ in 0..count {
            let flags = decoder.read_u8()?;
            let child_count = decoder.read_length()?;
            let mut children = Vec::with_capacity(child_count.min(decoder.buffer().len()));
            for _ in 0..child_count {
                children.push(NodeId::from_index(decoder.read_length()?));
            }
            let redirect = if flags & FLAG_IS_REDIRECT != 0 {
                Some(NodeId::from_index(decoder.read_length()?))
            } else {
                None
            };
            let kind = match flags & FLAG_NODE_TYPE {
                TYPE_ROOT => NodeKind::Root,
                TYPE_LITERAL => NodeKind::Literal(decoder.read_string()?.to_owned()),
                TYPE_ARGUMENT => {
                    let name = decoder.read_string()?.to_owned();
                    let parser = read_parser(decoder)?;
                    let properties = read_properties(decoder, &parser)?;
                    let suggestions = if flags & FLAG_HAS_SUGGESTIONS != 0 {
                        Some(decoder.read_string()?.to_owned())
                    } else {
                        None
                    };
                    NodeKind::Argument {
                        name,
                        argument_type: ArgumentType { parser, properties },
                        suggestions,
                    }
                }
                other => return Err(DecodeError::InvalidDiscriminant(other.into())),
            };
            let mut node = Node::new(kind);
            node.children = children;
            node.redirect = redirect;
            node.executable = flags & FLAG_EXECUTABLE != 0;
            nodes.push(node);
        }
        let root = decoder.read_length()?;
        let graph = CommandGraph::from_nodes(nodes, root).map_err(anyhow::Error::from)?;
        Ok(Self { graph })
    }
}

impl Encode for AvailableCommands {
    fn encode(&self, encoder: &mut Encoder) {
        let graph = &self.graph;
        let order = graph.reachable();
        let mut wire_index = vec![0usize; graph.len()];
        for (index, id) in order.iter().enumerate() {
            wire_index[id.index()] = index;
        }

        encoder.write_length(order.len());
        for &id in &order {
            let node = graph.node(id);
            let mut flags = match node.kind {
                NodeKind::Root => TYPE_ROOT,
                NodeKind::Literal(_) => TYPE_LITERAL,
                NodeKind::Argument { .. } => TYPE_ARGUMENT,
            };
            if node.executable {
                flags |= FLAG_EXECUTABLE;
            }
            if node.redirect.is_some() {
                flags |= FLAG_IS_REDIRECT;
            }
            if let NodeKind::Argument {
                suggestions: Some(_),
                ..
            } = &node.kind
            {
                flags |= FLAG_HAS_SUGGESTIONS;
            }
            encoder.write_u8(flags);

            encoder.write_length(node.children.len());
            for child in &node.children {
                encoder.write_length(wire_index[child.index()]);
            }
            if let Some(redirect) = node.redirect {
                encoder.write_length(wire_index[redirect.index()]);
            }
            match &node.kind {
                NodeKind::Root => {}
                NodeKind::Literal(name) => encoder.write_string(name),
                NodeKind::Argument {
                    name,
                    argument_type,
                    suggestions,
                } => {
                    encoder.write_string(name);
                    write_argument_type(encoder, argument_type);
                    if let Some(suggestions) = suggestions {
                        encoder.write_string(suggestions);
                    }
                }
            }
        }
        encoder.write_length(wire_index[graph.root().index()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionState;

    fn encode(packet: &AvailableCommands, version: ProtocolVersion) -> Vec<u8> {
        let mut buf = Vec::new();
        packet.encode(&mut Encoder::new(&mut buf, version, ConnectionState::Play));
        buf
    }

    fn decode(bytes: &[u8], version: ProtocolVersion) -> decoder::Result<AvailableCommands> {
        AvailableCommands::decode(&mut Decoder::new(bytes, version, ConnectionState::Play))
    }

    fn sample() -> CommandGraph {
        let mut graph = CommandGraph::new();
        let root = graph.root();
        let tp = graph.push_child(root, Node::literal("tp"));
        graph.push_child(
            tp,
            Node::argument(
                "targets",
                ArgumentType {
                    parser: "minecraft:entity".to_owned(),
                    properties: ArgumentProperties::Flags(0),
                },
                None,
            )
            .executable(),
        );
        let time = graph.push_child(root, Node::literal("wait"));
        graph.push_child(
            time,
            Node::argument(
                "ticks",
                ArgumentType {
                    parser: "brigadier:integer".to_owned(),
                    properties: ArgumentProperties::Numeric {
                        min: Some(NumericBound::Integer(0)),
                        max: None,
                    },
                },
                Some("minecraft:ask_server"),
            )
            .executable(),
        );
        let alias = graph.push_child(root, Node::literal("teleport"));
        graph.node_mut(alias).redirect = Some(tp);
        graph
    }

    #[test]
    fn tree_survives_numeric_and_legacy_parsers() {
        for version in [
            ProtocolVersion::V1_13,
            ProtocolVersion::V1_19,
            ProtocolVersion::V1_20_3,
        ] {
            let bytes = encode(&AvailableCommands { graph: sample() }, version);
            let decoded = decode(&bytes, version).unwrap();
            assert_eq!(decoded.graph.len(), 6);
            assert_eq!(encode(&decoded, version), bytes);

            let root = decoded.graph.root();
            let tp = decoded.graph.find_child(root, "tp").unwrap();
            let teleport = decoded.graph.find_child(root, "teleport").unwrap();
            assert_eq!(decoded.graph.node(teleport).redirect, Some(tp));
        }
    }

    #[test]
    fn parser_ids_shift_between_versions() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf, ProtocolVersion::V1_20_3, ConnectionState::Play);
        write_argument_type(
            &mut encoder,
            &ArgumentType {
                parser: "minecraft:uuid".to_owned(),
                properties: ArgumentProperties::None,
            },
        );
        assert_eq!(buf, [49]);
        assert!(supports_parser(ProtocolVersion::V1_19, "minecraft:mob_effect"));
        assert!(!supports_parser(ProtocolVersion::V1_19_3, "minecraft:mob_effect"));
    }

    #[test]
    fn unknown_parser_fails_decoding() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf, ProtocolVersion::V1_16, ConnectionState::Play);
        encoder.write_var_int(2);
        encoder.write_u8(TYPE_ROOT);
        encoder.write_var_int(1);
        encoder.write_var_int(1);
        encoder.write_u8(TYPE_ARGUMENT);
        encoder.write_var_int(0);
        encoder.write_string("value");
        encoder.write_string("somemod:custom");
        encoder.write_var_int(0);
        assert!(matches!(
            decode(&buf, ProtocolVersion::V1_16),
            Err(DecodeError::UnknownArgumentParser(_))
        ));
    }

    #[test]
    fn dangling_child_fails_decoding() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf, ProtocolVersion::V1_16, ConnectionState::Play);
        encoder.write_var_int(1);
        encoder.write_u8(TYPE_ROOT);
        encoder.write_var_int(1);
        encoder.write_var_int(5);
        encoder.write_var_int(0);
        assert!(decode(&buf, ProtocolVersion::V1_16).is_err());
    }
}
