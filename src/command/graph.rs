//! An arena-backed command tree in the shape the client understands.
//!
//! Nodes are addressed by [`NodeId`]; "the same node" always means the
//! same index, which is what filtered copies memoize on.

use crate::command::CommandSource;
use std::{fmt, sync::Arc};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Decides whether a source may see and use a node.
pub type Requirement = Arc<dyn Fn(&CommandSource) -> bool + Send + Sync>;

/// Like [`Requirement`] but also given the alias and the remaining
/// input typed after it.
pub type ContextRequirement = Arc<dyn Fn(&CommandSource, &str, &str) -> bool + Send + Sync>;

/// Suggestion provider that makes the client ask the server.
pub const ASK_SERVER: &str = "minecraft:ask_server";

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Literal(String),
    Argument {
        name: String,
        argument_type: ArgumentType,
        suggestions: Option<String>,
    },
}

impl NodeKind {
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Root => "",
            NodeKind::Literal(name) | NodeKind::Argument { name, .. } => name,
        }
    }
}

/// A parser and its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentType {
    pub parser: String,
    pub properties: ArgumentProperties,
}

impl ArgumentType {
    /// A string argument consuming the rest of the input.
    pub fn greedy_string() -> Self {
        Self {
            parser: "brigadier:string".to_owned(),
            properties: ArgumentProperties::StringKind(StringKind::Greedy),
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.properties == ArgumentProperties::StringKind(StringKind::Greedy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericBound {
    Float(f32),
    Double(f64),
    Integer(i32),
    Long(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    SingleWord,
    Quotable,
    Greedy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentProperties {
    None,
    Numeric {
        min: Option<NumericBound>,
        max: Option<NumericBound>,
    },
    StringKind(StringKind),
    /// Flag byte of entity and score holder arguments.
    Flags(u8),
    /// Minimum tick count of time arguments.
    Time(i32),
    /// Registry identifier of resource arguments.
    Registry(String),
}

#[derive(Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    pub redirect: Option<NodeId>,
    pub executable: bool,
    pub requirement: Option<Requirement>,
    pub context_requirement: Option<ContextRequirement>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("redirect", &self.redirect)
            .field("executable", &self.executable)
            .field("requirement", &self.requirement.is_some())
            .finish()
    }
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            redirect: None,
            executable: false,
            requirement: None,
            context_requirement: None,
        }
    }

    pub fn literal(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Literal(name.into()))
    }

    pub fn argument(
        name: impl Into<String>,
        argument_type: ArgumentType,
        suggestions: Option<&str>,
    ) -> Self {
        Self::new(NodeKind::Argument {
            name: name.into(),
            argument_type,
            suggestions: suggestions.map(str::to_owned),
        })
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn requires_context(mut self, requirement: ContextRequirement) -> Self {
        self.context_requirement = Some(requirement);
        self
    }

    pub fn can_use(&self, source: &CommandSource) -> bool {
        self.requirement
            .as_ref()
            .map_or(true, |requirement| requirement(source))
    }

    pub fn can_use_with(&self, source: &CommandSource, alias: &str, remaining: &str) -> bool {
        self.can_use(source)
            && self
                .context_requirement
                .as_ref()
                .map_or(true, |requirement| requirement(source, alias, remaining))
    }

    /// The same node without its edges.
    pub fn detached(&self) -> Self {
        Self {
            children: Vec::new(),
            redirect: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} refers to missing node {1}")]
    DanglingReference(usize, usize),
    #[error("node {0} is a root node but not the graph root")]
    NestedRoot(usize),
    #[error("graph root is not a root node")]
    RootNotRoot,
    #[error("redirects starting at node {0} form a cycle")]
    RedirectCycle(usize),
}

/// A command tree. Index 0 is not special; the root is tracked explicitly.
#[derive(Debug, Clone)]
pub struct CommandGraph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for CommandGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root)],
            root: NodeId(0),
        }
    }

    /// Builds a graph from nodes whose ids are their positions.
    pub fn from_nodes(nodes: Vec<Node>, root: usize) -> Result<Self, GraphError> {
        let root = u32::try_from(root)
            .ok()
            .filter(|&root| (root as usize) < nodes.len())
            .map(NodeId)
            .ok_or(GraphError::RootNotRoot)?;
        let graph = Self { nodes, root };
        graph.validate()?;
        Ok(graph)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Adds a detached node to the arena.
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let children = &mut self.nodes[parent.index()].children;
        if !children.contains(&child) {
            children.push(child);
        }
    }

    /// Adds `node` as a new child of `parent`.
    pub fn push_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.add(node);
        self.add_child(parent, id);
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.node(child).kind.name() == name)
    }

    /// Links `child` under `parent` in place of the first child with the
    /// same name, unlinking any other namesakes. Appends if none exists.
    pub fn replace_child(&mut self, parent: NodeId, child: NodeId) {
        let name = self.node(child).kind.name().to_owned();
        let nodes = &self.nodes;
        let mut replaced = false;
        let children: Vec<_> = nodes[parent.index()]
            .children
            .iter()
            .filter_map(|&existing| {
                if nodes[existing.index()].kind.name() != name {
                    Some(existing)
                } else if !replaced {
                    replaced = true;
                    Some(child)
                } else {
                    None
                }
            })
            .collect();
        self.nodes[parent.index()].children = children;
        if !replaced {
            self.nodes[parent.index()].children.push(child);
        }
    }

    /// Copies the subtree of `other` rooted at `node` into this graph,
    /// returning the id of the copy. Shared nodes are copied once.
    pub fn graft(&mut self, other: &CommandGraph, node: NodeId) -> NodeId {
        let mut copies = ahash::AHashMap::new();
        self.graft_inner(other, node, &mut copies)
    }

    fn graft_inner(
        &mut self,
        other: &CommandGraph,
        node: NodeId,
        copies: &mut ahash::AHashMap<NodeId, NodeId>,
    ) -> NodeId {
        if node == other.root {
            return self.root;
        }
        if let Some(&copy) = copies.get(&node) {
            return copy;
        }
        let source = other.node(node);
        let copy = self.add(source.detached());
        copies.insert(node, copy);
        for &child in &source.children {
            let child = self.graft_inner(other, child, copies);
            self.add_child(copy, child);
        }
        if let Some(redirect) = source.redirect {
            let target = self.graft_inner(other, redirect, copies);
            self.node_mut(copy).redirect = Some(target);
        }
        copy
    }

    /// Checks references, root placement and redirect chains.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.node(self.root).kind != NodeKind::Root {
            return Err(GraphError::RootNotRoot);
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.kind == NodeKind::Root && index != self.root.index() {
                return Err(GraphError::NestedRoot(index));
            }
            for target in node.children.iter().chain(node.redirect.iter()) {
                if target.index() >= self.nodes.len() {
                    return Err(GraphError::DanglingReference(index, target.index()));
                }
            }
        }
        for start in self.ids() {
            let mut seen = vec![start];
            let mut current = start;
            while let Some(next) = self.node(current).redirect {
                if seen.contains(&next) {
                    return Err(GraphError::RedirectCycle(start.index()));
                }
                seen.push(next);
                current = next;
            }
        }
        Ok(())
    }

    /// Ids reachable from the root in breadth-first order, following
    /// children and redirects.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut order = vec![self.root];
        let mut visited = vec![false; self.nodes.len()];
        visited[self.root.index()] = true;
        let mut cursor = 0;
        while cursor < order.len() {
            let node = self.node(order[cursor]);
            cursor += 1;
            for &next in node.children.iter().chain(node.redirect.iter()) {
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    order.push(next);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_cycles_are_rejected() {
        let mut graph = CommandGraph::new();
        let root = graph.root();
        let a = graph.push_child(root, Node::literal("a"));
        let b = graph.push_child(root, Node::literal("b"));
        graph.node_mut(a).redirect = Some(b);
        graph.node_mut(b).redirect = Some(a);
        assert!(matches!(
            graph.validate(),
            Err(GraphError::RedirectCycle(_))
        ));
    }

    #[test]
    fn redirect_to_root_is_allowed() {
        let mut graph = CommandGraph::new();
        let root = graph.root();
        let execute = graph.push_child(root, Node::literal("execute"));
        let run = graph.push_child(execute, Node::literal("run"));
        graph.node_mut(run).redirect = Some(root);
        assert_eq!(graph.validate(), Ok(()));
        assert_eq!(graph.reachable().len(), 3);
    }

    #[test]
    fn graft_copies_shared_nodes_once() {
        let mut fragment = CommandGraph::new();
        let root = fragment.root();
        let shared = fragment.add(Node::literal("shared"));
        let left = fragment.push_child(root, Node::literal("left"));
        let right = fragment.push_child(left, Node::literal("right"));
        fragment.add_child(left, shared);
        fragment.add_child(right, shared);

        let mut graph = CommandGraph::new();
        let copy = graph.graft(&fragment, left);
        let copied_right = graph.find_child(copy, "right").unwrap();
        assert_eq!(
            graph.find_child(copy, "shared"),
            graph.find_child(copied_right, "shared")
        );
        assert_eq!(graph.len(), 4);
    }
}
