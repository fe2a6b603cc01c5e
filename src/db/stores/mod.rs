use async_trait::async_trait;

use super::DatabaseError;
use super::models::{Emoticon, GuildEmoji, GuildRecord};

#[async_trait]
pub trait GuildStore: Send + Sync {
    async fn get_by_id(&self, guild_id: &str) -> Result<Option<GuildRecord>, DatabaseError>;
    async fn get_by_mxid(&self, room_id: &str) -> Result<Option<GuildRecord>, DatabaseError>;
    async fn get_all(&self) -> Result<Vec<GuildRecord>, DatabaseError>;
    async fn insert(&self, guild: &GuildRecord) -> Result<(), DatabaseError>;
    async fn update(&self, guild: &GuildRecord) -> Result<(), DatabaseError>;
    async fn delete(&self, guild_id: &str) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait GuildEmojiStore: Send + Sync {
    async fn get_all_by_guild_id(&self, guild_id: &str) -> Result<Vec<GuildEmoji>, DatabaseError>;
    async fn get(
        &self,
        guild_id: &str,
        emoji_name: &str,
    ) -> Result<Option<GuildEmoji>, DatabaseError>;
    /// `mxc` is the bare `server/media_id` form stored in the table.
    async fn get_by_mxc(&self, mxc: &str) -> Result<Option<GuildEmoji>, DatabaseError>;
    /// Looks up an emoji by its Discord display name.
    async fn get_by_alt(&self, alt: &str) -> Result<Option<GuildEmoji>, DatabaseError>;
    async fn insert(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError>;
    async fn update_mxc(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError>;
    async fn delete(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait EmoticonStore: Send + Sync {
    async fn get_by_mxid_and_mxc(
        &self,
        mxid: &str,
        mxc: &str,
    ) -> Result<Option<Emoticon>, DatabaseError>;
    async fn get_by_mxc(&self, mxc: &str) -> Result<Option<Emoticon>, DatabaseError>;
    async fn get_by_alt(&self, alt: &str) -> Result<Option<Emoticon>, DatabaseError>;
    async fn insert(&self, emoticon: &Emoticon) -> Result<(), DatabaseError>;
    async fn delete(&self, emoticon: &Emoticon) -> Result<(), DatabaseError>;
}
