#![forbid(unsafe_code)]

//! Mirrors Discord guilds into Matrix spaces: guild metadata, the guild's
//! custom emoji as an image pack, and the space's lifecycle.

pub mod bridge;
pub mod config;
pub mod db;
pub mod discord;
pub mod matrix;
pub mod media;
pub mod metrics;
pub mod utils;

pub use bridge::{GuildError, GuildPortal, PortalSettings};
pub use config::Config;
