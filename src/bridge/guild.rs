use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};

use crate::db::{GuildEmoji, GuildRecord};

/// Mutable state of a mirrored guild. Guarded by the guild's state lock for
/// the whole of a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildState {
    pub record: GuildRecord,
    /// Keyed by `"{name}:{id}"`; mirrors the guild's `guild_emoji` rows.
    pub emojis: HashMap<String, GuildEmoji>,
    pub allow_external_emojis: bool,
    /// The last image pack publication failed or has not happened yet.
    pub pack_pending: bool,
}

pub struct Guild {
    id: String,
    room_create_lock: Mutex<()>,
    state: Mutex<GuildState>,
}

impl Guild {
    pub(crate) fn new(record: GuildRecord, emojis: Vec<GuildEmoji>) -> Self {
        let emojis = emojis
            .into_iter()
            .map(|emoji| (emoji.emoji_name.clone(), emoji))
            .collect();
        Self {
            id: record.id.clone(),
            room_create_lock: Mutex::new(()),
            state: Mutex::new(GuildState {
                record,
                emojis,
                allow_external_emojis: false,
                pack_pending: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A copy of the current state, taken under the state lock.
    pub async fn snapshot(&self) -> GuildState {
        self.state.lock().await.clone()
    }

    pub async fn room_id(&self) -> Option<String> {
        self.state.lock().await.record.room_id().map(ToOwned::to_owned)
    }

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, GuildState> {
        self.state.lock().await
    }

    /// Always taken before the state lock.
    pub(crate) async fn lock_room_creation(&self) -> MutexGuard<'_, ()> {
        self.room_create_lock.lock().await
    }
}

impl std::fmt::Debug for Guild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guild").field("id", &self.id).finish_non_exhaustive()
    }
}
