use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::{DatabaseError, DatabaseManager, GuildBridgingMode, GuildEmojiStore, GuildStore};
use crate::discord::GuildSnapshot;
use crate::matrix::RoomClient;
use crate::media::AttachmentReuploader;

pub mod bridge_info;
pub mod emoji;
pub mod emoji_resolver;
pub mod guild;
pub mod lifecycle;
pub mod registry;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use self::emoji_resolver::{EmojiResolver, ResolvedEmoji};
pub use self::guild::{Guild, GuildState};
pub use self::registry::GuildRegistry;

#[derive(Debug, Error)]
pub enum GuildError {
    #[error("guild storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("failed to create guild room: {0}")]
    RoomCreation(String),
    #[error("unknown guild: {0}")]
    UnknownGuild(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSettings {
    /// `:name` is replaced with the Discord guild name.
    pub name_pattern: String,
    /// Re-attempt emoji uploads that failed on an earlier reconciliation.
    pub retry_failed_emoji_uploads: bool,
    pub federate_rooms: bool,
    /// Bridge bot avatar advertised in bridge info, empty for none.
    pub bot_avatar: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            name_pattern: ":name".to_string(),
            retry_failed_emoji_uploads: false,
            federate_rooms: true,
            bot_avatar: String::new(),
        }
    }
}

impl PortalSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name_pattern: config.guild.name_pattern.clone(),
            retry_failed_emoji_uploads: config.guild.retry_failed_emoji_uploads,
            federate_rooms: config.bridge.federate_rooms,
            bot_avatar: config.bridge.bot_avatar.clone().unwrap_or_default(),
        }
    }

    pub fn format_guild_name(&self, name: &str) -> String {
        self.name_pattern.replace(":name", name)
    }
}

/// Keeps Matrix spaces in step with the Discord guilds they mirror.
pub struct GuildPortal {
    registry: GuildRegistry,
    guild_store: Arc<dyn GuildStore>,
    emoji_store: Arc<dyn GuildEmojiStore>,
    room_client: Arc<dyn RoomClient>,
    reuploader: Arc<dyn AttachmentReuploader>,
    settings: PortalSettings,
}

impl GuildPortal {
    pub fn new(
        guild_store: Arc<dyn GuildStore>,
        emoji_store: Arc<dyn GuildEmojiStore>,
        room_client: Arc<dyn RoomClient>,
        reuploader: Arc<dyn AttachmentReuploader>,
        settings: PortalSettings,
    ) -> Self {
        Self {
            registry: GuildRegistry::new(guild_store.clone(), emoji_store.clone()),
            guild_store,
            emoji_store,
            room_client,
            reuploader,
            settings,
        }
    }

    pub fn from_database(
        db: &DatabaseManager,
        room_client: Arc<dyn RoomClient>,
        reuploader: Arc<dyn AttachmentReuploader>,
        settings: PortalSettings,
    ) -> Self {
        Self::new(
            db.guild_store(),
            db.guild_emoji_store(),
            room_client,
            reuploader,
            settings,
        )
    }

    pub fn registry(&self) -> &GuildRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    pub async fn guild_by_id(&self, guild_id: &str) -> Result<Option<Arc<Guild>>, GuildError> {
        Ok(self.registry.resolve_or_create(guild_id, false).await?)
    }

    pub async fn guild_by_room_id(&self, room_id: &str) -> Result<Option<Arc<Guild>>, GuildError> {
        Ok(self.registry.resolve_by_room_id(room_id).await?)
    }

    pub async fn all_guilds(&self) -> Result<Vec<Arc<Guild>>, GuildError> {
        Ok(self.registry.list_all().await?)
    }

    /// Discord guild create/update events. Guilds the bridge has never seen
    /// are ignored.
    pub async fn handle_guild_update(&self, snapshot: &GuildSnapshot) -> Result<(), GuildError> {
        let Some(guild) = self.registry.resolve_or_create(&snapshot.id, false).await? else {
            debug!("ignoring update for unknown guild guild_id={}", snapshot.id);
            return Ok(());
        };
        self.sync_guild(&guild, snapshot).await
    }

    /// Starts mirroring a guild on behalf of `initiator`, creating its space
    /// if needed.
    pub async fn bridge_guild(
        &self,
        initiator: &str,
        snapshot: &GuildSnapshot,
    ) -> Result<Arc<Guild>, GuildError> {
        let guild = self
            .registry
            .resolve_or_create(&snapshot.id, true)
            .await?
            .ok_or_else(|| GuildError::UnknownGuild(snapshot.id.clone()))?;

        {
            let mut state = guild.lock_state().await;
            if state.record.bridging_mode != GuildBridgingMode::Everything {
                let mut record = state.record.clone();
                record.bridging_mode = GuildBridgingMode::Everything;
                self.guild_store.update(&record).await?;
                state.record = record;
                info!(
                    "guild bridging mode set guild_id={} mode={}",
                    guild.id(),
                    GuildBridgingMode::Everything.description()
                );
            }
        }

        self.create_mirror_room(&guild, initiator, snapshot).await?;
        Ok(guild)
    }

    /// Discord guild delete events. An `unavailable` delete is an outage, not
    /// a removal, and is ignored.
    pub async fn handle_guild_delete(&self, guild_id: &str, unavailable: bool) -> Result<(), GuildError> {
        if unavailable {
            debug!("guild became unavailable guild_id={}", guild_id);
            return Ok(());
        }
        let Some(guild) = self.registry.resolve_or_create(guild_id, false).await? else {
            return Ok(());
        };

        info!("guild removed on discord, tearing down guild_id={}", guild_id);
        self.cleanup(&guild).await;
        self.unmirror(&guild).await?;
        self.delete(&guild).await
    }
}
