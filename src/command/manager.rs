//! The command registry shared by every session.

use crate::command::{
    graph::{ArgumentType, CommandGraph, Node, NodeId, ASK_SERVER},
    injector, split_arguments, suggestions, CommandBuilder, CommandError, CommandMeta,
    CommandSource, Invocation, SimpleCommand,
};
use ahash::AHashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

enum CommandKind {
    Simple(Arc<dyn SimpleCommand>),
    Tree(Arc<CommandBuilder>),
}

struct Registered {
    kind: CommandKind,
    meta: CommandMeta,
}

#[derive(Default)]
struct Registry {
    commands: AHashMap<String, Arc<Registered>>,
    /// Rebuilt after every change.
    graph: Arc<CommandGraph>,
}

/// Registered proxy commands and the tree derived from them.
#[derive(Default)]
pub struct CommandManager {
    registry: RwLock<Registry>,
}

impl CommandManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_simple(
        &self,
        meta: CommandMeta,
        command: impl SimpleCommand + 'static,
    ) -> Result<(), CommandError> {
        self.register_kind(meta, CommandKind::Simple(Arc::new(command)))
    }

    /// Registers a nested command. The builder's own name is ignored in
    /// favour of the aliases in `meta`.
    pub fn register(&self, meta: CommandMeta, command: CommandBuilder) -> Result<(), CommandError> {
        self.register_kind(meta, CommandKind::Tree(Arc::new(command)))
    }

    fn register_kind(&self, meta: CommandMeta, kind: CommandKind) -> Result<(), CommandError> {
        if meta.aliases.is_empty() {
            return Err(CommandError::NoAliases);
        }
        if let Some(alias) = meta
            .aliases
            .iter()
            .find(|alias| alias.is_empty() || alias.contains(char::is_whitespace))
        {
            return Err(CommandError::InvalidAlias(alias.clone()));
        }
        meta.hints.validate()?;

        let registered = Arc::new(Registered { kind, meta });
        let mut registry = self.registry.write();
        let mut commands = registry.commands.clone();
        for alias in &registered.meta.aliases {
            commands.insert(alias.clone(), Arc::clone(&registered));
        }
        let graph = build_graph(&commands)?;
        registry.commands = commands;
        registry.graph = Arc::new(graph);
        tracing::debug!("Registered command {:?}", registered.meta.aliases);
        Ok(())
    }

    /// Removes one alias. Other aliases of the same command stay.
    pub fn unregister(&self, alias: &str) {
        let mut registry = self.registry.write();
        let mut commands = registry.commands.clone();
        if commands.remove(&alias.to_lowercase()).is_none() {
            return;
        }
        match build_graph(&commands) {
            Ok(graph) => {
                registry.commands = commands;
                registry.graph = Arc::new(graph);
            }
            Err(e) => tracing::error!("Failed to rebuild command tree after removing {alias}: {e}"),
        }
    }

    pub fn has_command(&self, alias: &str) -> bool {
        self.registry
            .read()
            .commands
            .contains_key(&alias.to_lowercase())
    }

    /// Whether `alias` exists and `source` may use it.
    pub fn has_command_for(&self, alias: &str, source: &CommandSource) -> bool {
        let graph = self.graph();
        graph
            .find_child(graph.root(), &alias.to_lowercase())
            .is_some_and(|node| graph.node(node).can_use(source))
    }

    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<_> = self.registry.read().commands.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// The tree of every registered command, unfiltered.
    pub fn graph(&self) -> Arc<CommandGraph> {
        Arc::clone(&self.registry.read().graph)
    }

    fn lookup(&self, alias: &str) -> Option<Arc<Registered>> {
        self.registry.read().commands.get(alias).cloned()
    }

    /// Runs `input` (without the leading slash).
    ///
    /// Returns `Ok(false)` if no command matches or the source may not use
    /// it, so the caller can pass the input on to the backend.
    pub async fn execute(&self, source: CommandSource, input: &str) -> Result<bool, CommandError> {
        let mut tokens = input.split_whitespace();
        let Some(alias) = tokens.next() else {
            return Ok(false);
        };
        let alias = alias.to_lowercase();
        let Some(command) = self.lookup(&alias) else {
            return Ok(false);
        };
        let arguments: Vec<String> = tokens.map(str::to_owned).collect();
        let name = source.name().to_owned();

        let result = match &command.kind {
            CommandKind::Simple(simple) => {
                let invocation = Invocation {
                    source,
                    alias,
                    arguments,
                };
                if !simple.has_permission(&invocation) {
                    return Ok(false);
                }
                isolate(simple.execute(invocation)).await
            }
            CommandKind::Tree(root) => {
                if !root.can_use(&source) {
                    return Ok(false);
                }
                let (node, consumed) = descend(root, &source, &arguments);
                match node.executor.clone() {
                    Some(executor) => {
                        isolate(executor.execute(source, arguments[consumed..].to_vec())).await
                    }
                    None => Err(CommandError::Incomplete),
                }
            }
        };

        if let Err(e) = &result {
            tracing::warn!("Command '{input}' run by {name} failed: {e:?}");
        }
        result.map(|()| true)
    }

    /// Suggestions for `input` (without the leading slash).
    ///
    /// Without a space, these are the aliases the source may use. After
    /// it, the command's provider and its tree are asked for candidates
    /// for the last argument. Provider failures yield nothing.
    pub async fn suggest(&self, source: CommandSource, input: &str) -> Vec<String> {
        let Some((alias, rest)) = input.split_once(' ') else {
            return self.suggest_aliases(&source, input);
        };

        let alias = alias.to_lowercase();
        let graph = self.graph();
        let Some(command) = self.lookup(&alias) else {
            return Vec::new();
        };
        let Some(alias_node) = graph.find_child(graph.root(), &alias) else {
            return Vec::new();
        };
        if !graph.node(alias_node).can_use(&source) {
            return Vec::new();
        }

        let arguments = split_arguments(rest);
        let provided = match &command.kind {
            CommandKind::Simple(simple) => {
                let invocation = Invocation {
                    source: source.clone(),
                    alias: alias.clone(),
                    arguments: arguments.clone(),
                };
                if !simple.has_permission(&invocation) {
                    return Vec::new();
                }
                isolate(simple.suggest(invocation)).await
            }
            CommandKind::Tree(root) => {
                let complete = &arguments[..arguments.len().saturating_sub(1)];
                let (node, consumed) = descend(root, &source, complete);
                match node.executor.clone() {
                    Some(executor) => {
                        isolate(executor.suggest(source.clone(), arguments[consumed..].to_vec()))
                            .await
                    }
                    None => Ok(Vec::new()),
                }
            }
        };

        let mut result = provided.unwrap_or_else(|e| {
            tracing::warn!(
                "Suggestion provider of '{alias}' failed for {}: {e:?}",
                source.name()
            );
            Vec::new()
        });
        suggestions::merge(
            &mut result,
            suggestions::tree_suggestions(&graph, alias_node, &source, &arguments),
        );
        result
    }

    /// Aliases starting with `prefix` that `source` may use, sorted.
    pub fn suggest_aliases(&self, source: &CommandSource, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        let graph = self.graph();
        let mut aliases: Vec<String> = graph
            .children(graph.root())
            .iter()
            .map(|&child| graph.node(child))
            .filter(|node| node.kind.name().starts_with(&prefix) && node.can_use(source))
            .map(|node| node.kind.name().to_owned())
            .collect();
        aliases.sort();
        aliases
    }

    /// Adds the commands `source` may use to a tree received from a backend.
    pub fn inject(&self, source: &CommandSource, dest: &mut CommandGraph) {
        injector::inject(&self.graph(), source, dest);
    }
}

/// Follows literal children matching leading `arguments`, returning the
/// node reached and how many arguments it consumed.
fn descend<'a>(
    root: &'a CommandBuilder,
    source: &CommandSource,
    arguments: &[String],
) -> (&'a CommandBuilder, usize) {
    let mut node = root;
    let mut consumed = 0;
    for argument in arguments {
        match node.child(argument) {
            Some(child) if child.can_use(source) => {
                node = child;
                consumed += 1;
            }
            _ => break,
        }
    }
    (node, consumed)
}

/// Awaits a callback, turning errors and panics into [`CommandError`]s.
async fn isolate<T>(future: impl Future<Output = anyhow::Result<T>>) -> Result<T, CommandError> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CommandError::Callback(e)),
        Err(_) => Err(CommandError::Panicked),
    }
}

fn arguments_node() -> Node {
    Node::argument("arguments", ArgumentType::greedy_string(), Some(ASK_SERVER)).executable()
}

fn simple_literal(
    graph: &mut CommandGraph,
    alias: &str,
    command: &Arc<dyn SimpleCommand>,
) -> NodeId {
    let literal_command = Arc::clone(command);
    let literal_alias = alias.to_owned();
    let literal = graph.add(Node::literal(alias).executable().requires(Arc::new(
        move |source: &CommandSource| {
            literal_command.has_permission(&Invocation {
                source: source.clone(),
                alias: literal_alias.clone(),
                arguments: Vec::new(),
            })
        },
    )));

    let arguments_command = Arc::clone(command);
    graph.push_child(
        literal,
        arguments_node().requires_context(Arc::new(
            move |source: &CommandSource, alias: &str, remaining: &str| {
                arguments_command.has_permission(&Invocation {
                    source: source.clone(),
                    alias: alias.to_owned(),
                    arguments: split_arguments(remaining),
                })
            },
        )),
    );
    literal
}

fn tree_literal(graph: &mut CommandGraph, name: &str, builder: &CommandBuilder) -> NodeId {
    let mut node = Node::literal(name);
    if let Some(requirement) = &builder.requirement {
        node = node.requires(Arc::clone(requirement));
    }
    if builder.executor.is_some() {
        node = node.executable();
    }
    let id = graph.add(node);
    for child in &builder.children {
        let child = tree_literal(graph, &child.name, child);
        graph.add_child(id, child);
    }
    if builder.executor.is_some() {
        graph.push_child(id, arguments_node());
    }
    id
}

fn build_graph(commands: &AHashMap<String, Arc<Registered>>) -> Result<CommandGraph, CommandError> {
    let mut graph = CommandGraph::new();
    let root = graph.root();

    let mut aliases: Vec<_> = commands.iter().collect();
    aliases.sort_by(|a, b| a.0.cmp(b.0));
    for (alias, command) in aliases {
        let literal = match &command.kind {
            CommandKind::Simple(simple) => simple_literal(&mut graph, alias, simple),
            CommandKind::Tree(builder) => tree_literal(&mut graph, alias, builder),
        };
        let hints = &command.meta.hints;
        for &hint in hints.children(hints.root()) {
            let copy = graph.graft(hints, hint);
            graph.replace_child(literal, copy);
        }
        graph.add_child(root, literal);
    }

    graph.validate()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        graph::{GraphError, NodeKind},
        CommandExecutor,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        invocations: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl SimpleCommand for Arc<Recorder> {
        async fn execute(&self, invocation: Invocation) -> anyhow::Result<()> {
            self.invocations
                .lock()
                .push((invocation.alias, invocation.arguments));
            Ok(())
        }

        async fn suggest(&self, invocation: Invocation) -> anyhow::Result<Vec<String>> {
            let partial = invocation.arguments.last().cloned().unwrap_or_default();
            Ok(["alpha", "beta", "alps"]
                .into_iter()
                .filter(|s| s.starts_with(&partial))
                .map(str::to_owned)
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl SimpleCommand for Failing {
        async fn execute(&self, _invocation: Invocation) -> anyhow::Result<()> {
            anyhow::bail!("no database")
        }

        async fn suggest(&self, _invocation: Invocation) -> anyhow::Result<Vec<String>> {
            panic!("suggestion provider exploded")
        }
    }

    struct Hidden;

    #[async_trait]
    impl SimpleCommand for Hidden {
        async fn execute(&self, _invocation: Invocation) -> anyhow::Result<()> {
            Ok(())
        }

        fn has_permission(&self, _invocation: &Invocation) -> bool {
            false
        }
    }

    /// Counts how often its suggestions are asked for.
    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl SimpleCommand for Counting {
        async fn execute(&self, _invocation: Invocation) -> anyhow::Result<()> {
            Ok(())
        }

        async fn suggest(&self, _invocation: Invocation) -> anyhow::Result<Vec<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["lobby".to_owned()])
        }
    }

    struct Echo(Arc<Mutex<Vec<Vec<String>>>>);

    #[async_trait]
    impl CommandExecutor for Echo {
        async fn execute(
            &self,
            _source: CommandSource,
            arguments: Vec<String>,
        ) -> anyhow::Result<()> {
            self.0.lock().push(arguments);
            Ok(())
        }
    }

    fn manager() -> (CommandManager, Arc<Recorder>) {
        let manager = CommandManager::new();
        let recorder = Arc::new(Recorder::default());
        manager
            .register_simple(CommandMeta::new("Alpha").alias("a"), Arc::clone(&recorder))
            .unwrap();
        manager
            .register_simple(CommandMeta::new("broken"), Failing)
            .unwrap();
        manager.register_simple(CommandMeta::new("hidden"), Hidden).unwrap();
        (manager, recorder)
    }

    #[tokio::test]
    async fn simple_commands_receive_their_arguments() {
        let (manager, recorder) = manager();
        assert!(manager
            .execute(CommandSource::Console, "ALPHA one  two")
            .await
            .unwrap());
        assert_eq!(
            recorder.invocations.lock()[0],
            ("alpha".to_owned(), vec!["one".to_owned(), "two".to_owned()])
        );
        assert!(!manager.execute(CommandSource::Console, "missing").await.unwrap());
        assert!(!manager.execute(CommandSource::Console, "hidden").await.unwrap());
    }

    #[tokio::test]
    async fn callback_failures_are_caught() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.execute(CommandSource::Console, "broken").await,
            Err(CommandError::Callback(_))
        ));
        assert!(manager
            .suggest(CommandSource::Console, "broken ")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn aliases_are_suggested_by_prefix() {
        let (manager, _) = manager();
        assert_eq!(
            manager.suggest(CommandSource::Console, "A").await,
            ["a", "alpha"]
        );
        assert_eq!(manager.suggest(CommandSource::Console, "h").await, Vec::<String>::new());
        assert_eq!(
            manager.suggest(CommandSource::Console, "alpha al").await,
            ["alpha", "alps"]
        );
        assert_eq!(manager.suggest(CommandSource::Console, "alpha ").await.len(), 3);
    }

    #[tokio::test]
    async fn nested_commands_descend_by_literal() {
        let manager = CommandManager::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        manager
            .register(
                CommandMeta::new("team"),
                CommandBuilder::new("team")
                    .then(CommandBuilder::new("add").executes(Echo(Arc::clone(&calls))))
                    .then(CommandBuilder::new("list")),
            )
            .unwrap();

        assert!(manager
            .execute(CommandSource::Console, "team add red blue")
            .await
            .unwrap());
        assert_eq!(calls.lock()[0], ["red", "blue"]);
        assert!(matches!(
            manager.execute(CommandSource::Console, "team list").await,
            Err(CommandError::Incomplete)
        ));
        assert_eq!(
            manager.suggest(CommandSource::Console, "team ").await,
            ["add", "list"]
        );
    }

    #[test]
    fn graph_exposes_aliases_with_argument_nodes() {
        let (manager, _) = manager();
        let graph = manager.graph();
        let alpha = graph.find_child(graph.root(), "alpha").unwrap();
        let arguments = graph.find_child(alpha, "arguments").unwrap();
        match &graph.node(arguments).kind {
            NodeKind::Argument {
                argument_type,
                suggestions,
                ..
            } => {
                assert!(argument_type.is_greedy());
                assert_eq!(suggestions.as_deref(), Some(ASK_SERVER));
            }
            other => panic!("unexpected node {other:?}"),
        }
        assert!(!manager.has_command_for("hidden", &CommandSource::Console));
        assert!(manager.has_command_for("A", &CommandSource::Console));

        manager.unregister("a");
        assert!(!manager.has_command("a"));
        assert!(manager.has_command("alpha"));
        assert!(manager.graph().find_child(manager.graph().root(), "a").is_none());
    }

    #[test]
    fn aliases_must_be_single_words() {
        let manager = CommandManager::new();
        assert!(matches!(
            manager.register_simple(CommandMeta::new("two words"), Hidden),
            Err(CommandError::InvalidAlias(_))
        ));
    }

    #[tokio::test]
    async fn suggestions_come_from_the_exact_alias_only() {
        let manager = CommandManager::new();
        let server = Arc::new(AtomicUsize::new(0));
        let servermsg = Arc::new(AtomicUsize::new(0));
        manager
            .register_simple(CommandMeta::new("server"), Counting(Arc::clone(&server)))
            .unwrap();
        manager
            .register_simple(CommandMeta::new("servermsg"), Counting(Arc::clone(&servermsg)))
            .unwrap();

        assert_eq!(
            manager.suggest(CommandSource::Console, "server ").await,
            ["lobby"]
        );
        assert_eq!(server.load(Ordering::SeqCst), 1);
        assert_eq!(servermsg.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hints_with_redirect_cycles_are_refused() {
        let mut hints = CommandGraph::new();
        let root = hints.root();
        let first = hints.push_child(root, Node::literal("first"));
        let second = hints.push_child(root, Node::literal("second"));
        hints.node_mut(first).redirect = Some(second);
        hints.node_mut(second).redirect = Some(first);

        let manager = CommandManager::new();
        assert!(matches!(
            manager.register_simple(CommandMeta::new("loop").hints(hints), Hidden),
            Err(CommandError::InvalidHints(GraphError::RedirectCycle(_)))
        ));
        assert!(!manager.has_command("loop"));
    }
}
