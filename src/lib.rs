//! A Minecraft Java Edition proxy that sits between players and a set of
//! backend servers and moves players between them without reconnecting.
//!
//! Each client connection is served by one [`session`]. The session owns
//! the client connection and the connections to backends, and routes
//! packets between them through a chain of handlers that follows the
//! login, configuration and play phases. Server switches happen in
//! [`switch`]; proxy commands live in [`command`].

pub mod auth;
pub mod command;
pub mod config;
pub mod connection;
pub mod events;
pub mod forwarding;
pub mod messages;
pub mod player;
pub mod protocol;
pub mod proxy;
pub mod session;
pub mod switch;
