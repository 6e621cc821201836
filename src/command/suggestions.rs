//! Suggestions drawn from the command tree itself.

use crate::command::{
    graph::{CommandGraph, NodeId, NodeKind},
    CommandSource,
};

/// Literal names offered by the tree below `alias_node` for the last of
/// `arguments`. Earlier arguments must match a literal or any argument
/// node; a greedy string swallows the rest and offers nothing.
pub(crate) fn tree_suggestions(
    graph: &CommandGraph,
    alias_node: NodeId,
    source: &CommandSource,
    arguments: &[String],
) -> Vec<String> {
    let Some((partial, complete)) = arguments.split_last() else {
        return Vec::new();
    };

    let mut current = alias_node;
    for token in complete {
        let node = follow_redirects(graph, current);
        let next = graph.children(node).iter().copied().find(|&child| {
            let child = graph.node(child);
            child.can_use(source)
                && match &child.kind {
                    NodeKind::Literal(name) => name.eq_ignore_ascii_case(token),
                    NodeKind::Argument { argument_type, .. } => !argument_type.is_greedy(),
                    NodeKind::Root => false,
                }
        });
        match next {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }

    let node = follow_redirects(graph, current);
    let partial = partial.to_lowercase();
    graph
        .children(node)
        .iter()
        .map(|&child| graph.node(child))
        .filter(|child| child.can_use(source))
        .filter_map(|child| match &child.kind {
            NodeKind::Literal(name) if name.to_lowercase().starts_with(&partial) => {
                Some(name.clone())
            }
            _ => None,
        })
        .collect()
}

fn follow_redirects(graph: &CommandGraph, mut id: NodeId) -> NodeId {
    // Validated graphs have no redirect cycles.
    while let Some(target) = graph.node(id).redirect {
        id = target;
    }
    id
}

/// Appends `more` to `suggestions`, skipping duplicates.
pub(crate) fn merge(suggestions: &mut Vec<String>, more: impl IntoIterator<Item = String>) {
    for suggestion in more {
        if !suggestions.contains(&suggestion) {
            suggestions.push(suggestion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::graph::{ArgumentProperties, ArgumentType, Node};

    fn graph() -> (CommandGraph, NodeId) {
        let mut graph = CommandGraph::new();
        let root = graph.root();
        let alias = graph.push_child(root, Node::literal("perm"));
        let user = graph.push_child(alias, Node::literal("user"));
        graph.push_child(alias, Node::literal("group"));
        let name = graph.push_child(
            user,
            Node::argument(
                "name",
                ArgumentType {
                    parser: "brigadier:string".to_owned(),
                    properties: ArgumentProperties::StringKind(
                        crate::command::graph::StringKind::SingleWord,
                    ),
                },
                None,
            ),
        );
        graph.push_child(name, Node::literal("info"));
        graph.push_child(name, Node::literal("inherit"));
        (graph, alias)
    }

    fn args(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn literals_matching_the_partial_token_are_offered() {
        let (graph, alias) = graph();
        let source = CommandSource::Console;
        assert_eq!(
            tree_suggestions(&graph, alias, &source, &args(&[""])),
            ["user", "group"]
        );
        assert_eq!(
            tree_suggestions(&graph, alias, &source, &args(&["G"])),
            ["group"]
        );
        assert_eq!(
            tree_suggestions(&graph, alias, &source, &args(&["user", "steve", "in"])),
            ["info", "inherit"]
        );
        assert!(tree_suggestions(&graph, alias, &source, &args(&["nope", ""])).is_empty());
    }

    #[test]
    fn merge_skips_duplicates() {
        let mut suggestions = args(&["a", "b"]);
        merge(&mut suggestions, args(&["b", "c"]));
        assert_eq!(suggestions, ["a", "b", "c"]);
    }
}
