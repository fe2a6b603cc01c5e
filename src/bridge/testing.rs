//! In-memory collaborators for engine tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{GuildPortal, PortalSettings};
use crate::db::{DatabaseError, Emoticon, EmoticonStore, GuildEmoji, GuildEmojiStore, GuildRecord, GuildStore};
use crate::matrix::{CreateRoomRequest, MatrixApiError, RoomClient};
use crate::media::{AttachmentMeta, AttachmentReuploader};

#[derive(Default)]
pub struct MemoryGuildStore {
    rows: Mutex<HashMap<String, GuildRecord>>,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_updates: AtomicBool,
}

impl MemoryGuildStore {
    pub fn with_rows(rows: Vec<GuildRecord>) -> Self {
        let store = Self::default();
        store
            .rows
            .lock()
            .extend(rows.into_iter().map(|row| (row.id.clone(), row)));
        store
    }

    pub fn row(&self, guild_id: &str) -> Option<GuildRecord> {
        self.rows.lock().get(guild_id).cloned()
    }

    pub fn writes(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GuildStore for MemoryGuildStore {
    async fn get_by_id(&self, guild_id: &str) -> Result<Option<GuildRecord>, DatabaseError> {
        tokio::task::yield_now().await;
        Ok(self.rows.lock().get(guild_id).cloned())
    }

    async fn get_by_mxid(&self, room_id: &str) -> Result<Option<GuildRecord>, DatabaseError> {
        Ok(self
            .rows
            .lock()
            .values()
            .find(|row| row.mxid.as_deref() == Some(room_id))
            .cloned())
    }

    async fn get_all(&self) -> Result<Vec<GuildRecord>, DatabaseError> {
        Ok(self.rows.lock().values().cloned().collect())
    }

    async fn insert(&self, guild: &GuildRecord) -> Result<(), DatabaseError> {
        tokio::task::yield_now().await;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock();
        if rows.contains_key(&guild.id) {
            return Err(DatabaseError::Query(format!("duplicate guild {}", guild.id)));
        }
        rows.insert(guild.id.clone(), guild.clone());
        Ok(())
    }

    async fn update(&self, guild: &GuildRecord) -> Result<(), DatabaseError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("update rejected".to_string()));
        }
        self.rows.lock().insert(guild.id.clone(), guild.clone());
        Ok(())
    }

    async fn delete(&self, guild_id: &str) -> Result<(), DatabaseError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().remove(guild_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGuildEmojiStore {
    rows: Mutex<BTreeMap<(String, String), GuildEmoji>>,
    pub calls: AtomicUsize,
    /// Emoji names whose insert fails.
    pub failing_inserts: Mutex<HashSet<String>>,
}

impl MemoryGuildEmojiStore {
    pub fn with_rows(rows: Vec<GuildEmoji>) -> Self {
        let store = Self::default();
        store.rows.lock().extend(
            rows.into_iter()
                .map(|row| ((row.guild_id.clone(), row.emoji_name.clone()), row)),
        );
        store
    }

    pub fn rows_for(&self, guild_id: &str) -> Vec<GuildEmoji> {
        self.rows
            .lock()
            .values()
            .filter(|row| row.guild_id == guild_id)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GuildEmojiStore for MemoryGuildEmojiStore {
    async fn get_all_by_guild_id(&self, guild_id: &str) -> Result<Vec<GuildEmoji>, DatabaseError> {
        Ok(self.rows_for(guild_id))
    }

    async fn get(&self, guild_id: &str, emoji_name: &str) -> Result<Option<GuildEmoji>, DatabaseError> {
        self.record_call();
        Ok(self
            .rows
            .lock()
            .get(&(guild_id.to_string(), emoji_name.to_string()))
            .cloned())
    }

    async fn get_by_mxc(&self, mxc: &str) -> Result<Option<GuildEmoji>, DatabaseError> {
        self.record_call();
        Ok(self.rows.lock().values().find(|row| row.mxc == mxc).cloned())
    }

    async fn get_by_alt(&self, alt: &str) -> Result<Option<GuildEmoji>, DatabaseError> {
        self.record_call();
        Ok(self
            .rows
            .lock()
            .values()
            .find(|row| row.display_name() == alt)
            .cloned())
    }

    async fn insert(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError> {
        self.record_call();
        if self.failing_inserts.lock().contains(&emoji.emoji_name) {
            return Err(DatabaseError::Query(format!(
                "insert of {} rejected",
                emoji.emoji_name
            )));
        }
        self.rows.lock().insert(
            (emoji.guild_id.clone(), emoji.emoji_name.clone()),
            emoji.clone(),
        );
        Ok(())
    }

    async fn update_mxc(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError> {
        self.record_call();
        if let Some(row) = self
            .rows
            .lock()
            .get_mut(&(emoji.guild_id.clone(), emoji.emoji_name.clone()))
        {
            row.mxc = emoji.mxc.clone();
        }
        Ok(())
    }

    async fn delete(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError> {
        self.record_call();
        self.rows
            .lock()
            .remove(&(emoji.guild_id.clone(), emoji.emoji_name.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEmoticonStore {
    rows: Mutex<BTreeMap<(String, String), Emoticon>>,
}

impl MemoryEmoticonStore {
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }
}

#[async_trait]
impl EmoticonStore for MemoryEmoticonStore {
    async fn get_by_mxid_and_mxc(&self, mxid: &str, mxc: &str) -> Result<Option<Emoticon>, DatabaseError> {
        Ok(self
            .rows
            .lock()
            .get(&(mxid.to_string(), mxc.to_string()))
            .cloned())
    }

    async fn get_by_mxc(&self, mxc: &str) -> Result<Option<Emoticon>, DatabaseError> {
        Ok(self.rows.lock().values().find(|row| row.mxc == mxc).cloned())
    }

    async fn get_by_alt(&self, alt: &str) -> Result<Option<Emoticon>, DatabaseError> {
        Ok(self.rows.lock().values().find(|row| row.mxalt == alt).cloned())
    }

    async fn insert(&self, emoticon: &Emoticon) -> Result<(), DatabaseError> {
        self.rows.lock().insert(
            (emoticon.mxid.clone(), emoticon.mxc.clone()),
            emoticon.clone(),
        );
        Ok(())
    }

    async fn delete(&self, emoticon: &Emoticon) -> Result<(), DatabaseError> {
        self.rows
            .lock()
            .remove(&(emoticon.mxid.clone(), emoticon.mxc.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomCall {
    CreateRoom(CreateRoomRequest),
    SetName { room_id: String, name: String },
    SetAvatar { room_id: String, avatar_url: String },
    StateEvent {
        room_id: String,
        event_type: String,
        state_key: String,
        content: Value,
    },
    Invite { room_id: String, user_id: String },
    DeleteRoom(String),
    CleanupRoom(String),
}

#[derive(Default)]
pub struct FakeRoomClient {
    calls: Mutex<Vec<RoomCall>>,
    rooms_created: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_set_name: AtomicBool,
    pub fail_set_avatar: AtomicBool,
    pub fail_state_events: AtomicBool,
    pub deletion_supported: AtomicBool,
    /// Status returned by `delete_room`, if it should fail.
    pub delete_status: Mutex<Option<u16>>,
    pub create_delay: Mutex<Option<Duration>>,
}

impl FakeRoomClient {
    pub fn calls(&self) -> Vec<RoomCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RoomCall::CreateRoom(_)))
            .count()
    }

    pub fn state_events(&self, event_type: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RoomCall::StateEvent {
                    event_type: ty,
                    content,
                    ..
                } if ty == event_type => Some(content),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: RoomCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RoomClient for FakeRoomClient {
    fn bot_user_id(&self) -> String {
        "@_discord_:example.org".to_string()
    }

    async fn create_room(&self, request: &CreateRoomRequest) -> Result<String> {
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.push(RoomCall::CreateRoom(request.clone()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("room creation refused"));
        }
        let n = self.rooms_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("!space{n}:example.org"))
    }

    async fn set_room_name(&self, room_id: &str, name: &str) -> Result<()> {
        self.push(RoomCall::SetName {
            room_id: room_id.to_string(),
            name: name.to_string(),
        });
        if self.fail_set_name.load(Ordering::SeqCst) {
            return Err(anyhow!("rename refused"));
        }
        Ok(())
    }

    async fn set_room_avatar(&self, room_id: &str, avatar_url: &str) -> Result<()> {
        self.push(RoomCall::SetAvatar {
            room_id: room_id.to_string(),
            avatar_url: avatar_url.to_string(),
        });
        if self.fail_set_avatar.load(Ordering::SeqCst) {
            return Err(anyhow!("avatar refused"));
        }
        Ok(())
    }

    async fn send_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: &Value,
    ) -> Result<String> {
        self.push(RoomCall::StateEvent {
            room_id: room_id.to_string(),
            event_type: event_type.to_string(),
            state_key: state_key.to_string(),
            content: content.clone(),
        });
        if self.fail_state_events.load(Ordering::SeqCst) {
            return Err(anyhow!("state event refused"));
        }
        Ok("$event:example.org".to_string())
    }

    async fn invite_user(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.push(RoomCall::Invite {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    fn supports_room_deletion(&self) -> bool {
        self.deletion_supported.load(Ordering::SeqCst)
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.push(RoomCall::DeleteRoom(room_id.to_string()));
        let status = *self.delete_status.lock();
        match status {
            Some(status) => Err(MatrixApiError {
                status,
                errcode: if status == 404 { "M_NOT_FOUND" } else { "M_UNKNOWN" }.to_string(),
                message: String::new(),
            }
            .into()),
            None => Ok(()),
        }
    }

    async fn cleanup_room(&self, room_id: &str) -> Result<()> {
        self.push(RoomCall::CleanupRoom(room_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeReuploader {
    uploads: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeReuploader {
    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    pub fn recover(&self, url: &str) {
        self.failing.lock().remove(url);
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl AttachmentReuploader for FakeReuploader {
    async fn reupload(&self, url: &str, _is_avatar: bool, _meta: &AttachmentMeta) -> Result<String> {
        self.uploads.lock().push(url.to_string());
        if self.failing.lock().contains(url) {
            return Err(anyhow!("download of {url} failed"));
        }
        let file = url.rsplit('/').next().unwrap_or(url);
        let media_id = file.strip_suffix(".png").unwrap_or(file);
        Ok(format!("mxc://example.org/{media_id}"))
    }
}

/// A portal wired to in-memory collaborators.
pub struct Harness {
    pub portal: GuildPortal,
    pub guilds: Arc<MemoryGuildStore>,
    pub emojis: Arc<MemoryGuildEmojiStore>,
    pub rooms: Arc<FakeRoomClient>,
    pub reuploader: Arc<FakeReuploader>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stores(MemoryGuildStore::default(), MemoryGuildEmojiStore::default())
    }

    pub fn with_settings(settings: PortalSettings) -> Self {
        Self::with_parts(
            MemoryGuildStore::default(),
            MemoryGuildEmojiStore::default(),
            settings,
        )
    }

    pub fn with_stores(guilds: MemoryGuildStore, emojis: MemoryGuildEmojiStore) -> Self {
        Self::with_parts(guilds, emojis, PortalSettings::default())
    }

    pub fn with_parts(
        guilds: MemoryGuildStore,
        emojis: MemoryGuildEmojiStore,
        settings: PortalSettings,
    ) -> Self {
        let guilds = Arc::new(guilds);
        let emojis = Arc::new(emojis);
        let rooms = Arc::new(FakeRoomClient::default());
        let reuploader = Arc::new(FakeReuploader::default());
        let portal = GuildPortal::new(
            guilds.clone(),
            emojis.clone(),
            rooms.clone(),
            reuploader.clone(),
            settings,
        );
        Self {
            portal,
            guilds,
            emojis,
            rooms,
            reuploader,
        }
    }
}
