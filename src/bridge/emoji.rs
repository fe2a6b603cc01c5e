use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::guild::GuildState;
use super::{GuildError, GuildPortal};
use crate::db::{GuildEmoji, GuildRecord};
use crate::discord::{RemoteEmoji, emoji_url};
use crate::matrix::STATE_IMAGE_PACK;
use crate::metrics::Metrics;
use crate::media::AttachmentMeta;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackInfo {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
    pub usage: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackImage {
    pub url: String,
}

/// `im.ponies.room_emotes` content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePack {
    pub pack: PackInfo,
    pub images: BTreeMap<String, PackImage>,
}

/// Builds the image pack for a guild from its uploaded emoji.
///
/// Emoji are visited in key order. When two share a display name, the later
/// one is published as `{name}_{id}`.
pub fn build_image_pack(record: &GuildRecord, emojis: &HashMap<String, GuildEmoji>) -> ImagePack {
    let ordered: BTreeMap<_, _> = emojis.iter().collect();
    let mut images = BTreeMap::new();
    for emoji in ordered.into_values() {
        let Some(url) = emoji.content_uri() else {
            continue;
        };
        let mut shortcode = emoji.display_name().to_string();
        if images.contains_key(&shortcode) {
            shortcode = format!("{}_{}", emoji.display_name(), emoji.emoji_id());
        }
        images.insert(shortcode, PackImage { url });
    }

    ImagePack {
        pack: PackInfo {
            display_name: record.plain_name.clone(),
            avatar_url: record.avatar_url.clone(),
            usage: vec!["emoticon".to_string(), "sticker".to_string()],
        },
        images,
    }
}

impl GuildPortal {
    /// Diffs `remote` against the cached emoji set. Uploads new emoji,
    /// deletes vanished ones, then inserts, and republishes the image pack
    /// when anything changed or the previous publication failed. Each cache
    /// entry changes only after its store write succeeds.
    pub(crate) async fn reconcile_emojis(
        &self,
        state: &mut GuildState,
        remote: &[RemoteEmoji],
    ) -> Result<(), GuildError> {
        let guild_id = state.record.id.clone();
        let retry_failed = self.settings.retry_failed_emoji_uploads;

        let mut candidates: BTreeMap<String, GuildEmoji> = remote
            .iter()
            .filter(|emoji| !emoji.animated)
            .map(|emoji| {
                let emoji = GuildEmoji::from_discord(&guild_id, emoji);
                (emoji.emoji_name.clone(), emoji)
            })
            .collect();

        let mut changed = candidates.len() != state.emojis.len();
        let mut refreshed = Vec::new();
        for (key, candidate) in candidates.iter_mut() {
            match state.emojis.get(key) {
                Some(cached) if !cached.mxc.is_empty() || !retry_failed => {
                    candidate.mxc = cached.mxc.clone();
                }
                Some(_) => {
                    if let Some(mxc) = self.upload_emoji(candidate).await {
                        candidate.mxc = mxc;
                        refreshed.push(key.clone());
                        changed = true;
                    }
                }
                None => {
                    changed = true;
                    if let Some(mxc) = self.upload_emoji(candidate).await {
                        candidate.mxc = mxc;
                    }
                }
            }
        }

        if !changed {
            if state.pack_pending {
                self.publish_image_pack(state).await;
            }
            return Ok(());
        }

        let stale: Vec<String> = state
            .emojis
            .keys()
            .filter(|key| !candidates.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(emoji) = state.emojis.get(&key).cloned() {
                self.emoji_store.delete(&emoji).await?;
                state.emojis.remove(&key);
                debug!("removed guild emoji guild_id={} emoji={}", guild_id, key);
            }
        }

        for (key, candidate) in &candidates {
            if state.emojis.contains_key(key) {
                continue;
            }
            self.emoji_store.insert(candidate).await?;
            state.emojis.insert(key.clone(), candidate.clone());
            debug!("added guild emoji guild_id={} emoji={}", guild_id, key);
        }

        for key in refreshed {
            if let Some(candidate) = candidates.get(&key) {
                self.emoji_store.update_mxc(candidate).await?;
                state.emojis.insert(key, candidate.clone());
            }
        }

        self.publish_image_pack(state).await;
        Ok(())
    }

    /// Sends the guild's image pack to its space. A failure leaves the pack
    /// pending so the next reconciliation sends it again.
    pub(crate) async fn publish_image_pack(&self, state: &mut GuildState) {
        let Some(room_id) = state.record.room_id().map(ToOwned::to_owned) else {
            return;
        };
        let guild_id = state.record.id.clone();
        let pack = build_image_pack(&state.record, &state.emojis);
        let content = match serde_json::to_value(&pack) {
            Ok(content) => content,
            Err(err) => {
                warn!("failed to encode image pack guild_id={}: {}", guild_id, err);
                state.pack_pending = true;
                return;
            }
        };

        match self
            .room_client
            .send_state_event(&room_id, STATE_IMAGE_PACK, &guild_id, &content)
            .await
        {
            Ok(_) => {
                state.pack_pending = false;
                Metrics::image_pack_published();
                debug!(
                    "published image pack guild_id={} images={}",
                    guild_id,
                    pack.images.len()
                );
            }
            Err(err) => {
                state.pack_pending = true;
                warn!(
                    "failed to publish image pack guild_id={} room_id={}: {:#}",
                    guild_id, room_id, err
                );
            }
        }
    }

    /// Returns the bare content locator, or `None` if the upload failed.
    async fn upload_emoji(&self, emoji: &GuildEmoji) -> Option<String> {
        let url = emoji_url(emoji.emoji_id());
        let meta = AttachmentMeta::guild_emoji(&emoji.guild_id, &emoji.emoji_name);
        match self.reuploader.reupload(&url, false, &meta).await {
            Ok(content_uri) => {
                Metrics::emoji_uploaded();
                Some(
                    content_uri
                        .strip_prefix("mxc://")
                        .unwrap_or(&content_uri)
                        .to_string(),
                )
            }
            Err(err) => {
                Metrics::emoji_upload_failed();
                warn!(
                    "failed to reupload guild emoji guild_id={} emoji={}: {:#}",
                    emoji.guild_id, emoji.emoji_name, err
                );
                None
            }
        }
    }
}
