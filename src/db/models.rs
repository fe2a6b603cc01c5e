use serde::{Deserialize, Serialize};

use super::DatabaseError;
use crate::discord::RemoteEmoji;

/// How much of a guild the bridge mirrors into Matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuildBridgingMode {
    /// The guild is known but nothing is bridged.
    #[default]
    Nothing,
    /// Only channels that already have a portal are bridged.
    IfPortalExists,
    /// Portals are created when a message arrives.
    CreateOnMessage,
    /// The guild space and every channel are bridged eagerly.
    Everything,
}

impl GuildBridgingMode {
    pub fn as_i32(self) -> i32 {
        match self {
            GuildBridgingMode::Nothing => 0,
            GuildBridgingMode::IfPortalExists => 1,
            GuildBridgingMode::CreateOnMessage => 2,
            GuildBridgingMode::Everything => 3,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GuildBridgingMode::Nothing => "never create Matrix rooms for channels",
            GuildBridgingMode::IfPortalExists => "only bridge channels that already have Matrix rooms",
            GuildBridgingMode::CreateOnMessage => "create Matrix rooms when a message is received",
            GuildBridgingMode::Everything => "bridge every channel in the guild",
        }
    }
}

impl TryFrom<i32> for GuildBridgingMode {
    type Error = DatabaseError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GuildBridgingMode::Nothing),
            1 => Ok(GuildBridgingMode::IfPortalExists),
            2 => Ok(GuildBridgingMode::CreateOnMessage),
            3 => Ok(GuildBridgingMode::Everything),
            other => Err(DatabaseError::Query(format!(
                "invalid guild bridging mode: {other}"
            ))),
        }
    }
}

/// Persisted state of a mirrored guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: String,
    /// Matrix room id of the guild space, once created.
    pub mxid: Option<String>,
    pub plain_name: String,
    pub name: String,
    pub name_set: bool,
    /// Discord icon hash.
    pub avatar: String,
    /// Full `mxc://` URI of the reuploaded icon, empty when there is none.
    pub avatar_url: String,
    pub avatar_set: bool,
    pub bridging_mode: GuildBridgingMode,
}

impl GuildRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mxid: None,
            plain_name: String::new(),
            name: String::new(),
            name_set: false,
            avatar: String::new(),
            avatar_url: String::new(),
            avatar_set: false,
            bridging_mode: GuildBridgingMode::Nothing,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.mxid.as_deref().filter(|mxid| !mxid.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildEmoji {
    pub guild_id: String,
    /// `"{name}:{id}"`; Discord emoji names are not unique within a guild.
    pub emoji_name: String,
    /// Content URI without the `mxc://` prefix, empty until uploaded.
    pub mxc: String,
}

impl GuildEmoji {
    pub fn from_discord(guild_id: &str, emoji: &RemoteEmoji) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            emoji_name: format!("{}:{}", emoji.name, emoji.id),
            mxc: String::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.emoji_name
            .rsplit_once(':')
            .map_or(self.emoji_name.as_str(), |(name, _)| name)
    }

    pub fn emoji_id(&self) -> &str {
        self.emoji_name
            .rsplit_once(':')
            .map_or(self.emoji_name.as_str(), |(_, id)| id)
    }

    pub fn content_uri(&self) -> Option<String> {
        (!self.mxc.is_empty()).then(|| format!("mxc://{}", self.mxc))
    }
}

/// A custom emoji a Matrix user has sent, remembered so reactions can be
/// mapped back to the Discord emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoticon {
    pub mxid: String,
    pub mxc: String,
    pub mxalt: String,
    pub dcid: String,
    pub dcname: String,
}
