use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use super::guild::Guild;
use crate::db::{DatabaseError, GuildEmojiStore, GuildRecord, GuildStore};

type GuildSlot = Arc<OnceCell<Arc<Guild>>>;

#[derive(Default)]
struct RegistryMaps {
    by_id: HashMap<String, GuildSlot>,
    by_mxid: HashMap<String, Arc<Guild>>,
}

enum LoadError {
    Missing,
    Storage(DatabaseError),
}

impl From<DatabaseError> for LoadError {
    fn from(err: DatabaseError) -> Self {
        LoadError::Storage(err)
    }
}

/// Process-wide cache of mirrored guilds, indexed by Discord guild id and by
/// Matrix room id.
///
/// The map lock is only held for lookups and inserts, never across storage
/// calls. Concurrent first references to a guild share one `OnceCell`, so the
/// store sees a single load or insert and every caller receives the same
/// `Arc<Guild>`.
pub struct GuildRegistry {
    maps: Mutex<RegistryMaps>,
    guild_store: Arc<dyn GuildStore>,
    emoji_store: Arc<dyn GuildEmojiStore>,
}

impl GuildRegistry {
    pub fn new(guild_store: Arc<dyn GuildStore>, emoji_store: Arc<dyn GuildEmojiStore>) -> Self {
        Self {
            maps: Mutex::new(RegistryMaps::default()),
            guild_store,
            emoji_store,
        }
    }

    pub async fn resolve_or_create(
        &self,
        guild_id: &str,
        allow_create: bool,
    ) -> Result<Option<Arc<Guild>>, DatabaseError> {
        if guild_id.is_empty() {
            return Ok(None);
        }

        let slot = self.slot(guild_id);
        match slot
            .get_or_try_init(|| self.load(guild_id, allow_create))
            .await
        {
            Ok(guild) => Ok(Some(guild.clone())),
            Err(err) => {
                self.release_slot(guild_id, &slot);
                match err {
                    LoadError::Missing => Ok(None),
                    LoadError::Storage(err) => Err(err),
                }
            }
        }
    }

    pub async fn resolve_by_room_id(&self, room_id: &str) -> Result<Option<Arc<Guild>>, DatabaseError> {
        if room_id.is_empty() {
            return Ok(None);
        }
        if let Some(guild) = self.maps.lock().by_mxid.get(room_id).cloned() {
            return Ok(Some(guild));
        }

        match self.guild_store.get_by_mxid(room_id).await? {
            Some(record) => self.adopt(record).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Arc<Guild>>, DatabaseError> {
        let records = self.guild_store.get_all().await?;
        let mut guilds = Vec::with_capacity(records.len());
        for record in records {
            guilds.push(self.adopt(record).await?);
        }
        Ok(guilds)
    }

    /// The cached instance, without touching storage.
    pub fn get_cached(&self, guild_id: &str) -> Option<Arc<Guild>> {
        self.maps
            .lock()
            .by_id
            .get(guild_id)
            .and_then(|slot| slot.get().cloned())
    }

    pub(crate) fn index_room(&self, room_id: &str, guild: &Arc<Guild>) {
        self.maps
            .lock()
            .by_mxid
            .insert(room_id.to_string(), guild.clone());
    }

    pub(crate) fn unindex_room(&self, room_id: &str) {
        self.maps.lock().by_mxid.remove(room_id);
    }

    /// Unlinks the guild from both indices in one critical section.
    pub(crate) fn remove(&self, guild_id: &str, room_id: Option<&str>) {
        let mut maps = self.maps.lock();
        maps.by_id.remove(guild_id);
        if let Some(room_id) = room_id {
            maps.by_mxid.remove(room_id);
        }
    }

    fn slot(&self, guild_id: &str) -> GuildSlot {
        self.maps
            .lock()
            .by_id
            .entry(guild_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops a slot whose initialisation failed, unless another caller is
    /// still waiting on it.
    fn release_slot(&self, guild_id: &str, slot: &GuildSlot) {
        let mut maps = self.maps.lock();
        let idle = maps.by_id.get(guild_id).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !slot.initialized() && Arc::strong_count(slot) == 2
        });
        if idle {
            maps.by_id.remove(guild_id);
        }
    }

    async fn load(&self, guild_id: &str, allow_create: bool) -> Result<Arc<Guild>, LoadError> {
        let record = match self.guild_store.get_by_id(guild_id).await? {
            Some(record) => record,
            None if allow_create => {
                let record = GuildRecord::new(guild_id);
                self.guild_store.insert(&record).await?;
                debug!("created guild record guild_id={}", guild_id);
                record
            }
            None => return Err(LoadError::Missing),
        };
        Ok(self.build(record).await?)
    }

    /// Installs a record read from storage, keeping an already cached
    /// instance if there is one.
    async fn adopt(&self, record: GuildRecord) -> Result<Arc<Guild>, DatabaseError> {
        let slot = self.slot(&record.id);
        let guild_id = record.id.clone();
        match slot.get_or_try_init(|| self.build(record)).await {
            Ok(guild) => Ok(guild.clone()),
            Err(err) => {
                self.release_slot(&guild_id, &slot);
                Err(err)
            }
        }
    }

    async fn build(&self, record: GuildRecord) -> Result<Arc<Guild>, DatabaseError> {
        let emojis = self.emoji_store.get_all_by_guild_id(&record.id).await?;
        let room_id = record.room_id().map(ToOwned::to_owned);
        let guild = Arc::new(Guild::new(record, emojis));
        if let Some(room_id) = room_id {
            self.index_room(&room_id, &guild);
        }
        Ok(guild)
    }
}
