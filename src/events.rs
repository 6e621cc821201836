//! Hooks that let an embedder observe and steer the proxy.
//!
//! Every method has a default that lets the action go ahead unchanged.

use crate::{
    auth::GameProfile, config::ServerInfo, player::PlayerHandle, protocol::component::Component,
};
use async_trait::async_trait;
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatResult {
    Allow,
    Deny,
    /// Send this text instead. Signed chat cannot be altered and is
    /// forwarded as typed.
    Replace(String),
}

#[async_trait]
pub trait EventHooks: Send + Sync {
    /// Before authentication. `Err` disconnects with the given reason.
    async fn pre_login(&self, _username: &str, _remote: SocketAddr) -> Result<(), Component> {
        Ok(())
    }

    /// After authentication, before the player is registered.
    async fn login(&self, _profile: &GameProfile) -> Result<(), Component> {
        Ok(())
    }

    /// Before connecting to a backend. Returns the server to connect to,
    /// or `None` to cancel.
    async fn pre_connect(&self, _player: &PlayerHandle, server: &ServerInfo) -> Option<ServerInfo> {
        Some(server.clone())
    }

    async fn chat(&self, _player: &PlayerHandle, _message: &str) -> ChatResult {
        ChatResult::Allow
    }

    async fn disconnect(&self, _player: &PlayerHandle) {}

    /// `Some(true)` grants, `Some(false)` denies, `None` leaves it unset.
    fn permission(&self, _profile: &GameProfile, _permission: &str) -> Option<bool> {
        None
    }
}

/// Hooks that change nothing.
pub struct NoHooks;

impl EventHooks for NoHooks {}
