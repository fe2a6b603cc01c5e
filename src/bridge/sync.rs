use tracing::{debug, warn};

use super::guild::{Guild, GuildState};
use super::{GuildError, GuildPortal};
use crate::db::GuildRecord;
use crate::discord::{GuildSnapshot, guild_icon_url};
use crate::media::AttachmentMeta;

impl GuildPortal {
    /// Brings the guild's space in line with `meta`. Calling it again with the
    /// same metadata makes no external calls and writes nothing.
    ///
    /// The guild's state lock is held throughout, so syncs of one guild run
    /// one at a time.
    pub async fn sync_guild(&self, guild: &Guild, meta: &GuildSnapshot) -> Result<(), GuildError> {
        let mut state = guild.lock_state().await;
        self.sync_locked(&mut state, meta).await
    }

    pub(crate) async fn sync_locked(
        &self,
        state: &mut GuildState,
        meta: &GuildSnapshot,
    ) -> Result<(), GuildError> {
        if meta.unavailable {
            debug!("skipping sync of unavailable guild guild_id={}", state.record.id);
            return Ok(());
        }

        let mut record = state.record.clone();
        let mut changed = self.update_name(&mut record, &meta.name).await;
        changed |= self.update_avatar(&mut record, meta.icon_hash()).await;
        if changed {
            self.update_bridge_info(&record).await;
            self.guild_store.update(&record).await?;
            state.record = record;
        }

        self.reconcile_emojis(state, &meta.emojis).await?;
        state.allow_external_emojis = meta.allows_external_emojis();
        Ok(())
    }

    pub(crate) async fn update_name(&self, record: &mut GuildRecord, name: &str) -> bool {
        let formatted = self.settings.format_guild_name(name);
        if record.plain_name == name
            && record.name == formatted
            && (record.name_set || record.room_id().is_none())
        {
            return false;
        }

        record.plain_name = name.to_string();
        record.name = formatted;
        record.name_set = false;

        if let Some(room_id) = record.room_id().map(ToOwned::to_owned) {
            match self.room_client.set_room_name(&room_id, &record.name).await {
                Ok(()) => record.name_set = true,
                Err(err) => warn!(
                    "failed to update room name guild_id={} room_id={}: {:#}",
                    record.id, room_id, err
                ),
            }
        }
        true
    }

    pub(crate) async fn update_avatar(&self, record: &mut GuildRecord, icon: &str) -> bool {
        if record.avatar == icon
            && icon.is_empty() == record.avatar_url.is_empty()
            && (record.avatar_set || record.room_id().is_none())
        {
            return false;
        }

        record.avatar = icon.to_string();
        record.avatar_url.clear();
        record.avatar_set = false;

        if !icon.is_empty() {
            let url = guild_icon_url(&record.id, icon);
            let meta = AttachmentMeta::guild_avatar(&record.id, icon);
            match self.reuploader.reupload(&url, true, &meta).await {
                Ok(content_uri) => record.avatar_url = content_uri,
                Err(err) => {
                    warn!(
                        "failed to reupload guild avatar guild_id={} icon={}: {:#}",
                        record.id, icon, err
                    );
                    return true;
                }
            }
        }

        if let Some(room_id) = record.room_id().map(ToOwned::to_owned) {
            match self
                .room_client
                .set_room_avatar(&room_id, &record.avatar_url)
                .await
            {
                Ok(()) => record.avatar_set = true,
                Err(err) => warn!(
                    "failed to update room avatar guild_id={} room_id={}: {:#}",
                    record.id, room_id, err
                ),
            }
        }
        true
    }
}
