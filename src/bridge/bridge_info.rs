use serde::Serialize;
use tracing::warn;

use super::GuildPortal;
use crate::db::GuildRecord;
use crate::matrix::{InitialStateEvent, STATE_BRIDGE, STATE_HALF_SHOT_BRIDGE};

const PROTOCOL_ID: &str = "discordgo";
const PROTOCOL_NAME: &str = "Discord";
const PROTOCOL_URL: &str = "https://discord.com/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeInfoSection {
    pub id: String,
    pub displayname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub external_url: String,
}

/// `m.bridge` content describing a mirrored guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeInfo {
    pub bridgebot: String,
    pub creator: String,
    pub protocol: BridgeInfoSection,
    pub channel: BridgeInfoSection,
}

pub fn bridge_info_state_key(guild_id: &str) -> String {
    format!("fi.mau.discord://discord/{guild_id}")
}

impl GuildPortal {
    pub(crate) fn bridge_info(&self, record: &GuildRecord) -> BridgeInfo {
        let bot = self.room_client.bot_user_id();
        BridgeInfo {
            bridgebot: bot.clone(),
            creator: bot,
            protocol: BridgeInfoSection {
                id: PROTOCOL_ID.to_string(),
                displayname: PROTOCOL_NAME.to_string(),
                avatar_url: self.settings.bot_avatar.clone(),
                external_url: PROTOCOL_URL.to_string(),
            },
            channel: BridgeInfoSection {
                id: record.id.clone(),
                displayname: record.name.clone(),
                avatar_url: record.avatar_url.clone(),
                external_url: String::new(),
            },
        }
    }

    /// Both bridge-info events, for inclusion in a new room's initial state.
    pub(crate) fn bridge_info_state(&self, record: &GuildRecord) -> Vec<InitialStateEvent> {
        let content = match serde_json::to_value(self.bridge_info(record)) {
            Ok(content) => content,
            Err(err) => {
                warn!("failed to encode bridge info guild_id={}: {}", record.id, err);
                return Vec::new();
            }
        };
        let state_key = bridge_info_state_key(&record.id);
        [STATE_HALF_SHOT_BRIDGE, STATE_BRIDGE]
            .into_iter()
            .map(|event_type| InitialStateEvent {
                event_type: event_type.to_string(),
                state_key: state_key.clone(),
                content: content.clone(),
            })
            .collect()
    }

    /// Best-effort push of the bridge info to an existing room.
    pub(crate) async fn update_bridge_info(&self, record: &GuildRecord) {
        let Some(room_id) = record.room_id() else {
            return;
        };
        let content = match serde_json::to_value(self.bridge_info(record)) {
            Ok(content) => content,
            Err(err) => {
                warn!("failed to encode bridge info guild_id={}: {}", record.id, err);
                return;
            }
        };
        let state_key = bridge_info_state_key(&record.id);
        for event_type in [STATE_HALF_SHOT_BRIDGE, STATE_BRIDGE] {
            if let Err(err) = self
                .room_client
                .send_state_event(room_id, event_type, &state_key, &content)
                .await
            {
                warn!(
                    "failed to update bridge info guild_id={} room_id={} event_type={}: {:#}",
                    record.id, room_id, event_type, err
                );
            }
        }
    }
}
