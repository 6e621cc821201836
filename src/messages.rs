//! Player-facing messages.
//!
//! Keys owned by the proxy are rendered here from an English table. Any
//! other key is left for the client to translate.

use crate::protocol::component::Component;
use ahash::AHashMap;
use once_cell::sync::Lazy;

#[rustfmt::skip]
static ENGLISH: Lazy<AHashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("velocity.error.already-connected", "You are already connected to this server!"),
        ("velocity.error.already-connected-proxy", "You are already connected to this proxy!"),
        ("velocity.error.already-connecting", "You are already trying to connect to a server!"),
        ("velocity.error.cant-connect", "Unable to connect to {0}: {1}"),
        ("velocity.error.connecting-server-error", "Unable to connect you to {0}. Please try again later."),
        ("velocity.error.connected-server-error", "Your connection to {0} encountered a problem."),
        ("velocity.error.internal-server-connection-error", "An internal server connection error occurred."),
        ("velocity.error.logging-in-too-fast", "You are logging in too fast, try again later."),
        ("velocity.error.online-mode-only", "You are not logged into your Minecraft account. If you are logged into your Minecraft account, try restarting your Minecraft client."),
        ("velocity.error.player-connection-error", "An internal error occurred in your connection."),
        ("velocity.error.modern-forwarding-needs-new-client", "This server is only compatible with Minecraft 1.13 and above."),
        ("velocity.error.modern-forwarding-failed", "Your server did not send a forwarding request to the proxy. Make sure the server is configured for Velocity forwarding."),
        ("velocity.error.moved-to-new-server", "You were kicked from {0}: {1}"),
        ("velocity.error.no-available-servers", "There are no available servers to connect you to. Try again later or contact an admin."),
        ("velocity.error.connection-cancelled", "Your connection to {0} was cancelled."),
        ("velocity.error.chat-denied", "Your message was not sent."),
        ("velocity.kick.shutdown", "Proxy shutting down."),
        ("velocity.command.generic-error", "An error occurred while running this command."),
        ("velocity.command.players-only", "Only players can run this command."),
        ("velocity.command.server-does-not-exist", "The specified server {0} does not exist."),
        ("velocity.command.server-current-server", "You are currently connected to {0}."),
        ("velocity.command.server-too-many", "There are too many servers set up. Use tab completion to view all servers available."),
        ("velocity.command.server-available", "Available servers: "),
        ("velocity.command.glist-player-singular", "{0} player is currently connected to the proxy."),
        ("velocity.command.glist-player-plural", "{0} players are currently connected to the proxy."),
        ("velocity.command.glist-server", "[{0}] ({1}): {2}"),
        ("velocity.command.glist-view-all", "To view all players on servers, use /glist all."),
        ("velocity.command.shutdown", "Shutting down the proxy."),
    ]
    .into_iter()
    .collect()
});

/// Builds the message for `key`, substituting `{n}` with the n-th argument.
pub fn translate(key: &str, args: impl IntoIterator<Item = Component>) -> Component {
    let args: Vec<Component> = args.into_iter().collect();
    match ENGLISH.get(key) {
        Some(template) => render(template, &args),
        None => Component::translatable(key, args),
    }
}

fn render(template: &str, args: &[Component]) -> Component {
    let mut message = Component::text("");
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let placeholder = rest[open + 1..]
            .find('}')
            .and_then(|close| {
                let index = rest[open + 1..open + 1 + close].parse::<usize>().ok()?;
                Some((close, index))
            });
        match placeholder {
            Some((close, index)) => {
                if open > 0 {
                    message = message.append(Component::text(&rest[..open]));
                }
                if let Some(arg) = args.get(index) {
                    message = message.append(arg.clone());
                }
                rest = &rest[open + close + 2..];
            }
            None => {
                message = message.append(Component::text(&rest[..=open]));
                rest = &rest[open + 1..];
            }
        }
    }
    if !rest.is_empty() {
        message = message.append(Component::text(rest));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_keys_are_rendered() {
        let message = translate(
            "velocity.error.cant-connect",
            [Component::text("lobby"), Component::text("Timed out")],
        );
        assert_eq!(message.plain_text(), "Unable to connect to lobby: Timed out");
    }

    #[test]
    fn unknown_keys_are_left_to_the_client() {
        let message = translate(
            "multiplayer.disconnect.outdated_client",
            [Component::text("1.20.4")],
        );
        assert_eq!(
            message.as_json()["translate"],
            "multiplayer.disconnect.outdated_client"
        );
    }

    #[test]
    fn braces_without_an_index_are_kept() {
        assert_eq!(render("a {b} {0}", &[Component::text("c")]).plain_text(), "a {b} c");
    }
}
