//! Proxy commands: registration, execution, tab completion and the
//! command tree sent to clients.
//!
//! Two command models exist side by side. A [`SimpleCommand`] receives
//! every argument after its alias. A tree built with [`CommandBuilder`]
//! is descended by literal tokens until the remaining tokens are handed
//! to a [`CommandExecutor`].

use crate::{player::PlayerHandle, protocol::component::Component};
use async_trait::async_trait;
use std::sync::Arc;

pub mod builtin;
pub mod graph;
mod injector;
pub mod manager;
mod suggestions;

pub use graph::{CommandGraph, GraphError, Requirement};
pub use manager::CommandManager;

/// Who runs a command.
#[derive(Clone, Debug)]
pub enum CommandSource {
    Console,
    Player(PlayerHandle),
}

impl CommandSource {
    pub fn name(&self) -> &str {
        match self {
            CommandSource::Console => "CONSOLE",
            CommandSource::Player(player) => player.username(),
        }
    }

    /// `Some(true)` if granted, `Some(false)` if denied, `None` if unset.
    /// The console holds every permission.
    pub fn permission_value(&self, permission: &str) -> Option<bool> {
        match self {
            CommandSource::Console => Some(true),
            CommandSource::Player(player) => player.permission_value(permission),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permission_value(permission) == Some(true)
    }

    pub fn send_message(&self, message: Component) {
        match self {
            CommandSource::Console => tracing::info!("{}", message.plain_text()),
            CommandSource::Player(player) => player.send_message(message),
        }
    }

    pub fn as_player(&self) -> Option<&PlayerHandle> {
        match self {
            CommandSource::Player(player) => Some(player),
            CommandSource::Console => None,
        }
    }
}

/// One run of a [`SimpleCommand`].
#[derive(Clone, Debug)]
pub struct Invocation {
    pub source: CommandSource,
    /// The alias typed, lowercase.
    pub alias: String,
    pub arguments: Vec<String>,
}

/// A command that receives everything typed after its alias.
#[async_trait]
pub trait SimpleCommand: Send + Sync {
    async fn execute(&self, invocation: Invocation) -> anyhow::Result<()>;

    /// Suggestions for the last argument.
    async fn suggest(&self, _invocation: Invocation) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Decides visibility and use. Arguments are empty when only the alias
    /// is being checked.
    fn has_permission(&self, _invocation: &Invocation) -> bool {
        true
    }
}

/// Runs a node of a command tree with the tokens left after it.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, source: CommandSource, arguments: Vec<String>) -> anyhow::Result<()>;

    async fn suggest(
        &self,
        _source: CommandSource,
        _arguments: Vec<String>,
    ) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// A node of a nested command. The root's name is replaced by each alias
/// it is registered under.
#[derive(Clone)]
pub struct CommandBuilder {
    pub(crate) name: String,
    pub(crate) executor: Option<Arc<dyn CommandExecutor>>,
    pub(crate) requirement: Option<Requirement>,
    pub(crate) children: Vec<CommandBuilder>,
}

impl CommandBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            executor: None,
            requirement: None,
            children: Vec::new(),
        }
    }

    pub fn executes(mut self, executor: impl CommandExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn requires(
        mut self,
        requirement: impl Fn(&CommandSource) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.requirement = Some(Arc::new(requirement));
        self
    }

    pub fn then(mut self, child: CommandBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub(crate) fn can_use(&self, source: &CommandSource) -> bool {
        self.requirement
            .as_ref()
            .map_or(true, |requirement| requirement(source))
    }

    pub(crate) fn child(&self, name: &str) -> Option<&CommandBuilder> {
        self.children
            .iter()
            .find(|child| child.name.eq_ignore_ascii_case(name))
    }
}

/// Aliases of a command and the argument hints shown to clients.
#[derive(Clone, Debug)]
pub struct CommandMeta {
    pub(crate) aliases: Vec<String>,
    pub(crate) hints: CommandGraph,
}

impl CommandMeta {
    pub fn new(alias: &str) -> Self {
        Self {
            aliases: vec![alias.to_lowercase()],
            hints: CommandGraph::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        let alias = alias.to_lowercase();
        if !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
        self
    }

    /// Nodes grafted under each alias. Their root's children become
    /// children of the alias literal. They only affect what clients
    /// display, never execution.
    pub fn hints(mut self, hints: CommandGraph) -> Self {
        self.hints = hints;
        self
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command has no aliases")]
    NoAliases,
    #[error("invalid alias {0:?}")]
    InvalidAlias(String),
    #[error("invalid hint nodes: {0}")]
    InvalidHints(#[from] GraphError),
    #[error("unknown or incomplete command")]
    Incomplete,
    #[error("command failed: {0}")]
    Callback(#[source] anyhow::Error),
    #[error("command panicked")]
    Panicked,
}

impl CommandError {
    /// What the source is told.
    pub fn message(&self) -> Component {
        match self {
            CommandError::Incomplete => crate::messages::translate("command.unknown.command", []),
            _ => crate::messages::translate("velocity.command.generic-error", []),
        }
    }
}

/// Splits what follows an alias into arguments. A trailing space yields a
/// trailing empty argument, which is what suggestion providers complete.
pub(crate) fn split_arguments(rest: &str) -> Vec<String> {
    if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(' ').map(str::to_owned).collect()
    }
}
