//! Copies the part of the proxy command tree a source may see into a
//! tree received from a backend.

use crate::command::{
    graph::{CommandGraph, Node, NodeId},
    CommandSource,
};
use ahash::AHashMap;

struct Injection<'a> {
    canonical: &'a CommandGraph,
    dest: &'a mut CommandGraph,
    source: &'a CommandSource,
    /// Copy of each visited canonical node, `None` when filtered out.
    copies: AHashMap<NodeId, Option<NodeId>>,
}

impl Injection<'_> {
    fn copy(&mut self, id: NodeId, alias: &str) -> Option<NodeId> {
        if let Some(&copy) = self.copies.get(&id) {
            return copy;
        }
        let node = self.canonical.node(id);
        if !node.can_use_with(self.source, alias, "") {
            self.copies.insert(id, None);
            return None;
        }

        let copy = self.dest.add(Node {
            requirement: None,
            context_requirement: None,
            ..node.detached()
        });
        // Registered before descending so cycles through redirects end here.
        self.copies.insert(id, Some(copy));

        for &child in &node.children {
            if let Some(child) = self.copy(child, alias) {
                self.dest.add_child(copy, child);
            }
        }
        if let Some(redirect) = node.redirect {
            let target = self.copy(redirect, alias);
            self.dest.node_mut(copy).redirect = target;
        }
        Some(copy)
    }
}

/// Adds every alias of `canonical` that `source` may use to the root of
/// `dest`, replacing backend nodes of the same name. `canonical` is only
/// read.
pub(crate) fn inject(canonical: &CommandGraph, source: &CommandSource, dest: &mut CommandGraph) {
    let dest_root = dest.root();
    let mut injection = Injection {
        canonical,
        dest,
        source,
        copies: AHashMap::from_iter([(canonical.root(), Some(dest_root))]),
    };

    for &alias_node in canonical.children(canonical.root()) {
        let alias = canonical.node(alias_node).kind.name().to_owned();
        if let Some(copy) = injection.copy(alias_node, &alias) {
            injection.dest.replace_child(dest_root, copy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::graph::ArgumentType,
        protocol::{packet::AvailableCommands, ConnectionState, Encode, Encoder, ProtocolVersion},
    };
    use std::sync::Arc;

    fn wire(graph: &CommandGraph) -> Vec<u8> {
        let mut buf = Vec::new();
        AvailableCommands {
            graph: graph.clone(),
        }
        .encode(&mut Encoder::new(
            &mut buf,
            ProtocolVersion::MAXIMUM,
            ConnectionState::Play,
        ));
        buf
    }

    fn canonical() -> CommandGraph {
        let mut graph = CommandGraph::new();
        let root = graph.root();
        let open = graph.push_child(root, Node::literal("open").executable());
        graph.push_child(
            open,
            Node::argument("arguments", ArgumentType::greedy_string(), Some("minecraft:ask_server"))
                .requires_context(Arc::new(|_: &CommandSource, _: &str, remaining: &str| {
                    remaining.is_empty()
                })),
        );
        let admin = graph.push_child(
            root,
            Node::literal("admin").requires(Arc::new(|source: &CommandSource| {
                matches!(source, CommandSource::Console)
            })),
        );
        graph.push_child(admin, Node::literal("reload").executable());
        let alias = graph.push_child(root, Node::literal("o"));
        graph.node_mut(alias).redirect = Some(open);
        let hidden = graph.push_child(root, Node::literal("hidden"));
        graph.node_mut(hidden).redirect = Some(admin);
        let secret = graph.push_child(
            root,
            Node::literal("secret").requires(Arc::new(|_: &CommandSource| false)),
        );
        let shortcut = graph.push_child(root, Node::literal("s"));
        graph.node_mut(shortcut).redirect = Some(secret);
        graph
    }

    fn backend() -> CommandGraph {
        let mut graph = CommandGraph::new();
        let root = graph.root();
        let open = graph.push_child(root, Node::literal("open"));
        graph.push_child(open, Node::literal("backend-only"));
        graph.push_child(root, Node::literal("gamemode").executable());
        graph
    }

    #[test]
    fn filtering_does_not_touch_canonical_graph() {
        let canonical = canonical();
        let before = wire(&canonical);
        let mut dest = backend();
        inject(&canonical, &CommandSource::Console, &mut dest);
        assert_eq!(wire(&canonical), before);
    }

    #[test]
    fn injection_is_idempotent() {
        let canonical = canonical();
        let mut once = backend();
        inject(&canonical, &CommandSource::Console, &mut once);
        let mut twice = backend();
        inject(&canonical, &CommandSource::Console, &mut twice);
        inject(&canonical, &CommandSource::Console, &mut twice);
        assert_eq!(wire(&once), wire(&twice));
    }

    #[test]
    fn proxy_alias_replaces_backend_node() {
        let canonical = canonical();
        let mut dest = backend();
        inject(&canonical, &CommandSource::Console, &mut dest);
        let root = dest.root();
        let open = dest.find_child(root, "open").unwrap();
        assert!(dest.find_child(open, "backend-only").is_none());
        assert!(dest.find_child(open, "arguments").is_some());
        assert!(dest.find_child(root, "gamemode").is_some());
        assert!(dest.find_child(root, "admin").is_some());
    }

    #[test]
    fn redirect_to_filtered_node_is_dropped() {
        let canonical = canonical();
        let mut dest = CommandGraph::new();
        inject(&canonical, &CommandSource::Console, &mut dest);
        let root = dest.root();
        assert!(dest.find_child(root, "secret").is_none());
        let shortcut = dest.find_child(root, "s").unwrap();
        assert_eq!(dest.node(shortcut).redirect, None);
    }

    #[test]
    fn shared_targets_are_copied_once() {
        let canonical = canonical();
        let mut dest = CommandGraph::new();
        inject(&canonical, &CommandSource::Console, &mut dest);
        let root = dest.root();
        let open = dest.find_child(root, "open").unwrap();
        let alias = dest.find_child(root, "o").unwrap();
        assert_eq!(dest.node(alias).redirect, Some(open));
        assert_eq!(dest.validate(), Ok(()));
    }
}
