pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{Emoticon, GuildBridgingMode, GuildEmoji, GuildRecord};
pub use self::stores::{EmoticonStore, GuildEmojiStore, GuildStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod schema;
pub mod stores;

mod rows;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;
