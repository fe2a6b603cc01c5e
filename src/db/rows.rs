use diesel::prelude::*;

use super::DatabaseError;
use super::models::{Emoticon, GuildBridgingMode, GuildEmoji, GuildRecord};
use super::schema::{emoticon, guild, guild_emoji};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = guild)]
#[diesel(primary_key(dcid))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct GuildRow {
    pub(crate) dcid: String,
    pub(crate) mxid: Option<String>,
    pub(crate) plain_name: String,
    pub(crate) name: String,
    pub(crate) name_set: bool,
    pub(crate) avatar: String,
    pub(crate) avatar_url: String,
    pub(crate) avatar_set: bool,
    pub(crate) bridging_mode: i32,
}

impl TryFrom<GuildRow> for GuildRecord {
    type Error = DatabaseError;

    fn try_from(row: GuildRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.dcid,
            mxid: row.mxid.filter(|mxid| !mxid.is_empty()),
            plain_name: row.plain_name,
            name: row.name,
            name_set: row.name_set,
            avatar: row.avatar,
            avatar_url: row.avatar_url,
            avatar_set: row.avatar_set,
            bridging_mode: GuildBridgingMode::try_from(row.bridging_mode)?,
        })
    }
}

impl From<&GuildRecord> for GuildRow {
    fn from(record: &GuildRecord) -> Self {
        Self {
            dcid: record.id.clone(),
            mxid: record.room_id().map(ToOwned::to_owned),
            plain_name: record.plain_name.clone(),
            name: record.name.clone(),
            name_set: record.name_set,
            avatar: record.avatar.clone(),
            avatar_url: record.avatar_url.clone(),
            avatar_set: record.avatar_set,
            bridging_mode: record.bridging_mode.as_i32(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = guild_emoji)]
pub(crate) struct GuildEmojiRow {
    pub(crate) dc_guild_id: String,
    pub(crate) dc_emoji_name: String,
    pub(crate) mxc: String,
}

impl From<GuildEmojiRow> for GuildEmoji {
    fn from(row: GuildEmojiRow) -> Self {
        Self {
            guild_id: row.dc_guild_id,
            emoji_name: row.dc_emoji_name,
            mxc: row.mxc,
        }
    }
}

impl From<&GuildEmoji> for GuildEmojiRow {
    fn from(emoji: &GuildEmoji) -> Self {
        Self {
            dc_guild_id: emoji.guild_id.clone(),
            dc_emoji_name: emoji.emoji_name.clone(),
            mxc: emoji.mxc.clone(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = emoticon)]
pub(crate) struct EmoticonRow {
    pub(crate) mxid: String,
    pub(crate) mxc: String,
    pub(crate) mxalt: String,
    pub(crate) dcid: String,
    pub(crate) dcname: String,
}

impl From<EmoticonRow> for Emoticon {
    fn from(row: EmoticonRow) -> Self {
        Self {
            mxid: row.mxid,
            mxc: row.mxc,
            mxalt: row.mxalt,
            dcid: row.dcid,
            dcname: row.dcname,
        }
    }
}

impl From<&Emoticon> for EmoticonRow {
    fn from(emoticon: &Emoticon) -> Self {
        Self {
            mxid: emoticon.mxid.clone(),
            mxc: emoticon.mxc.clone(),
            mxalt: emoticon.mxalt.clone(),
            dcid: emoticon.dcid.clone(),
            dcname: emoticon.dcname.clone(),
        }
    }
}

/// Pattern matching every `"{alt}:{id}"` emoji name.
pub(crate) fn alt_name_pattern(alt: &str) -> String {
    let escaped = alt
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}:%")
}
