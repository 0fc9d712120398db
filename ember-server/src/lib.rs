//! # ember-server
//!
//! Unofficial back-end for the asynchronous multiplayer of a family of
//! action-RPG titles. Patched clients, redirected to this host and public
//! key, speak the game's own stack:
//!
//! 1. One RSA-framed exchange on the **Login** TCP port to learn the Auth
//!    endpoint
//! 2. A four-step handshake on the **Auth** TCP port that negotiates the
//!    session key and issues an auth token plus the game UDP endpoint
//! 3. Reliable-UDP traffic on the **Game** port: packets → fragments →
//!    messages → title handlers
//!
//! This crate is the tokio face of the stack (listeners, session tasks,
//! dispatch, the shared area pool) over the sans-IO state machines in
//! `ember-session`.

#![deny(unsafe_code)]

pub mod area_pool;
pub mod auth;
pub mod channel;
pub mod config;
pub mod game;
pub mod login;
pub mod store;
pub mod title;

pub use area_pool::AreaPool;
pub use channel::{ChannelError, MessageChannel};
pub use config::ServerConfig;
pub use store::{NullStore, PlayerStore};
