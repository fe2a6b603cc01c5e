use serde::{Deserialize, Serialize};
use serenity::all::{Emoji, GuildId, ImageHash, PartialGuild, Permissions};

const DISCORD_CDN: &str = "https://cdn.discordapp.com";

/// A custom emoji as reported by Discord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEmoji {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub animated: bool,
}

/// Guild metadata as received from a Discord event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSnapshot {
    pub id: String,
    pub name: String,
    /// Icon hash; `None` when the guild has no icon.
    pub icon: Option<String>,
    pub emojis: Vec<RemoteEmoji>,
    pub permissions: Permissions,
    /// Set when Discord sent a stub for an outage-affected guild. Such
    /// snapshots carry no usable metadata.
    pub unavailable: bool,
}

impl GuildSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            emojis: Vec::new(),
            permissions: Permissions::empty(),
            unavailable: false,
        }
    }

    pub fn unavailable(id: impl Into<String>) -> Self {
        Self {
            unavailable: true,
            ..Self::new(id, "")
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_emojis(mut self, emojis: Vec<RemoteEmoji>) -> Self {
        self.emojis = emojis;
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn icon_hash(&self) -> &str {
        self.icon.as_deref().unwrap_or_default()
    }

    pub fn allows_external_emojis(&self) -> bool {
        self.permissions.contains(Permissions::USE_EXTERNAL_EMOJIS)
    }
}

impl GuildSnapshot {
    /// `PartialGuild` does not carry the bot's permissions in the guild, so
    /// the caller supplies them (from `GuildInfo::permissions` or
    /// `Guild::member_permissions`).
    pub fn from_partial(guild: &PartialGuild, permissions: Permissions) -> Self {
        Self::from_discord(
            guild.id,
            &guild.name,
            guild.icon.as_ref(),
            guild.emojis.values(),
            permissions,
        )
    }

    pub fn from_discord<'a>(
        id: GuildId,
        name: &str,
        icon: Option<&ImageHash>,
        emojis: impl IntoIterator<Item = &'a Emoji>,
        permissions: Permissions,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            icon: icon.map(ToString::to_string),
            emojis: emojis.into_iter().map(RemoteEmoji::from).collect(),
            permissions,
            unavailable: false,
        }
    }
}

impl From<&Emoji> for RemoteEmoji {
    fn from(emoji: &Emoji) -> Self {
        Self {
            id: emoji.id.to_string(),
            name: emoji.name.clone(),
            animated: emoji.animated,
        }
    }
}

pub fn guild_icon_url(guild_id: &str, icon_hash: &str) -> String {
    format!("{DISCORD_CDN}/icons/{guild_id}/{icon_hash}.png")
}

pub fn emoji_url(emoji_id: &str) -> String {
    format!("{DISCORD_CDN}/emojis/{emoji_id}.png")
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use serenity::all::{Emoji, GuildId, ImageHash, Permissions};

    use super::{GuildSnapshot, RemoteEmoji, emoji_url, guild_icon_url};

    fn discord_emoji(id: &str, name: &str, animated: bool) -> Emoji {
        serde_json::from_value(json!({
            "id": id,
            "name": name,
            "animated": animated,
            "available": true,
            "managed": false,
            "require_colons": true,
            "roles": [],
            "user": null
        }))
        .expect("emoji")
    }

    #[test]
    fn cdn_urls_follow_discord_layout() {
        assert_eq!(
            guild_icon_url("123", "abc"),
            "https://cdn.discordapp.com/icons/123/abc.png"
        );
        assert_eq!(emoji_url("42"), "https://cdn.discordapp.com/emojis/42.png");
    }

    #[test]
    fn external_emoji_permission_is_detected() {
        let snapshot = GuildSnapshot::new("1", "Ops");
        assert!(!snapshot.allows_external_emojis());

        let snapshot = snapshot
            .with_permissions(Permissions::USE_EXTERNAL_EMOJIS | Permissions::SEND_MESSAGES);
        assert!(snapshot.allows_external_emojis());
    }

    #[test]
    fn unavailable_snapshot_has_no_metadata() {
        let snapshot = GuildSnapshot::unavailable("1");
        assert!(snapshot.unavailable);
        assert!(snapshot.name.is_empty());
        assert_eq!(snapshot.icon_hash(), "");
    }

    #[test]
    fn snapshot_is_built_from_discord_guild() {
        let icon: ImageHash = "0123456789abcdef0123456789abcdef".parse().expect("hash");
        let emojis = [discord_emoji("42", "party", false), discord_emoji("43", "dance", true)];

        let snapshot = GuildSnapshot::from_discord(
            GuildId::new(1),
            "Ops",
            Some(&icon),
            &emojis,
            Permissions::USE_EXTERNAL_EMOJIS,
        );

        assert_eq!(snapshot.id, "1");
        assert_eq!(snapshot.name, "Ops");
        assert_eq!(snapshot.icon_hash(), "0123456789abcdef0123456789abcdef");
        assert!(snapshot.allows_external_emojis());
        assert!(!snapshot.unavailable);
        assert_eq!(
            snapshot.emojis,
            vec![
                RemoteEmoji {
                    id: "42".to_string(),
                    name: "party".to_string(),
                    animated: false,
                },
                RemoteEmoji {
                    id: "43".to_string(),
                    name: "dance".to_string(),
                    animated: true,
                },
            ]
        );
    }

    #[test]
    fn snapshot_without_permissions_disallows_external_emojis() {
        let snapshot = GuildSnapshot::from_discord(GuildId::new(7), "Ops", None, &[], Permissions::empty());

        assert_eq!(snapshot.id, "7");
        assert_eq!(snapshot.icon_hash(), "");
        assert!(snapshot.emojis.is_empty());
        assert!(!snapshot.allows_external_emojis());
    }
}
