//! Commands the proxy registers itself: `/server`, `/glist` and the
//! console-only `/shutdown`.

use crate::{
    command::{CommandError, CommandMeta, Invocation, SimpleCommand},
    messages::translate,
    protocol::component::Component,
    proxy::ProxyServer,
    switch::ConnectionResult,
};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// Servers listed by a bare `/server` before it asks for tab completion.
const MAX_LISTED_SERVERS: usize = 50;

pub(crate) fn register(proxy: &Arc<ProxyServer>) -> Result<(), CommandError> {
    let weak = Arc::downgrade(proxy);
    proxy.commands.register_simple(
        CommandMeta::new("server"),
        ServerCommand {
            proxy: weak.clone(),
        },
    )?;
    proxy.commands.register_simple(
        CommandMeta::new("glist"),
        GlistCommand {
            proxy: weak.clone(),
        },
    )?;
    proxy.commands.register_simple(
        CommandMeta::new("shutdown").alias("end"),
        ShutdownCommand { proxy: weak },
    )?;
    Ok(())
}

fn upgrade(proxy: &Weak<ProxyServer>) -> anyhow::Result<Arc<ProxyServer>> {
    proxy
        .upgrade()
        .ok_or_else(|| anyhow::anyhow!("the proxy has shut down"))
}

/// `/server [name]`: shows or changes the player's server.
struct ServerCommand {
    proxy: Weak<ProxyServer>,
}

#[async_trait]
impl SimpleCommand for ServerCommand {
    async fn execute(&self, invocation: Invocation) -> anyhow::Result<()> {
        let proxy = upgrade(&self.proxy)?;
        let Some(player) = invocation.source.as_player() else {
            invocation
                .source
                .send_message(translate("velocity.command.players-only", []));
            return Ok(());
        };

        let Some(name) = invocation.arguments.first() else {
            if let Some(current) = player.current_server() {
                player.send_message(translate(
                    "velocity.command.server-current-server",
                    [Component::text(current)],
                ));
            }
            let servers: Vec<String> = proxy.config.servers.keys().cloned().collect();
            if servers.len() > MAX_LISTED_SERVERS {
                player.send_message(translate("velocity.command.server-too-many", []));
            } else {
                player.send_message(
                    translate("velocity.command.server-available", [])
                        .append(Component::text(servers.join(", "))),
                );
            }
            return Ok(());
        };

        if proxy.server(name).is_none() {
            player.send_message(translate(
                "velocity.command.server-does-not-exist",
                [Component::text(name)],
            ));
            return Ok(());
        }
        match player.connect(name).await {
            ConnectionResult::AlreadyConnected => {
                player.send_message(translate("velocity.error.already-connected", []))
            }
            ConnectionResult::ConnectionInProgress => {
                player.send_message(translate("velocity.error.already-connecting", []))
            }
            ConnectionResult::ConnectionCancelled => player.send_message(translate(
                "velocity.error.connection-cancelled",
                [Component::text(name)],
            )),
            // Failures were already reported by the session.
            _ => {}
        }
        Ok(())
    }

    async fn suggest(&self, invocation: Invocation) -> anyhow::Result<Vec<String>> {
        let proxy = upgrade(&self.proxy)?;
        if invocation.arguments.len() > 1 {
            return Ok(Vec::new());
        }
        let prefix = invocation
            .arguments
            .first()
            .map(|argument| argument.to_lowercase())
            .unwrap_or_default();
        Ok(proxy
            .config
            .servers
            .keys()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn has_permission(&self, invocation: &Invocation) -> bool {
        invocation.source.permission_value("velocity.command.server") != Some(false)
    }
}

/// `/glist [all|server]`: counts players.
struct GlistCommand {
    proxy: Weak<ProxyServer>,
}

impl GlistCommand {
    fn server_line(proxy: &ProxyServer, server: &str) -> Component {
        let mut names: Vec<String> = proxy
            .players
            .on_server(server)
            .iter()
            .map(|player| player.username().to_owned())
            .collect();
        names.sort();
        translate(
            "velocity.command.glist-server",
            [
                Component::text(server),
                Component::text(names.len().to_string()),
                Component::text(names.join(", ")),
            ],
        )
    }
}

#[async_trait]
impl SimpleCommand for GlistCommand {
    async fn execute(&self, invocation: Invocation) -> anyhow::Result<()> {
        let proxy = upgrade(&self.proxy)?;
        let source = &invocation.source;
        match invocation.arguments.first().map(String::as_str) {
            None => {
                let count = proxy.players.count();
                let key = if count == 1 {
                    "velocity.command.glist-player-singular"
                } else {
                    "velocity.command.glist-player-plural"
                };
                source.send_message(translate(key, [Component::text(count.to_string())]));
                source.send_message(translate("velocity.command.glist-view-all", []));
            }
            Some("all") => {
                for server in proxy.config.servers.keys() {
                    source.send_message(Self::server_line(&proxy, server));
                }
            }
            Some(server) => match proxy.server(server) {
                Some(server) => source.send_message(Self::server_line(&proxy, &server.name)),
                None => source.send_message(translate(
                    "velocity.command.server-does-not-exist",
                    [Component::text(server)],
                )),
            },
        }
        Ok(())
    }

    async fn suggest(&self, invocation: Invocation) -> anyhow::Result<Vec<String>> {
        let proxy = upgrade(&self.proxy)?;
        let prefix = invocation.arguments.first().cloned().unwrap_or_default();
        Ok(std::iter::once("all".to_owned())
            .chain(proxy.config.servers.keys().cloned())
            .filter(|candidate| candidate.starts_with(&prefix))
            .collect())
    }

    fn has_permission(&self, invocation: &Invocation) -> bool {
        invocation.source.has_permission("velocity.command.glist")
    }
}

/// `/shutdown`: stops the proxy. Console only.
struct ShutdownCommand {
    proxy: Weak<ProxyServer>,
}

#[async_trait]
impl SimpleCommand for ShutdownCommand {
    async fn execute(&self, invocation: Invocation) -> anyhow::Result<()> {
        let proxy = upgrade(&self.proxy)?;
        invocation
            .source
            .send_message(translate("velocity.command.shutdown", []));
        proxy.shutdown();
        Ok(())
    }

    fn has_permission(&self, invocation: &Invocation) -> bool {
        invocation.source.as_player().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::CommandSource, config::Config};

    fn proxy() -> Arc<ProxyServer> {
        let mut config = Config::default();
        config.servers.insert("lobby".to_owned(), "127.0.0.1:25565".to_owned());
        config.servers.insert("survival".to_owned(), "127.0.0.1:25566".to_owned());
        ProxyServer::builder(config).build().unwrap()
    }

    #[tokio::test]
    async fn builtins_are_registered() {
        let proxy = proxy();
        assert_eq!(proxy.commands.aliases(), ["end", "glist", "server", "shutdown"]);
    }

    #[tokio::test]
    async fn server_suggests_server_names() {
        let proxy = proxy();
        let suggestions = proxy.commands.suggest(CommandSource::Console, "server su").await;
        assert_eq!(suggestions, ["survival"]);
    }

    #[tokio::test]
    async fn console_can_shut_down() {
        let proxy = proxy();
        assert!(proxy
            .commands
            .execute(CommandSource::Console, "shutdown")
            .await
            .unwrap());
        assert!(proxy.is_shutting_down());
    }

    #[tokio::test]
    async fn players_cannot_shut_down() {
        let proxy = proxy();
        let (player, _tasks) = crate::player::tests::handle("Steve");
        assert!(!proxy
            .commands
            .execute(CommandSource::Player(player), "shutdown")
            .await
            .unwrap());
        assert!(!proxy.is_shutting_down());
    }
}
