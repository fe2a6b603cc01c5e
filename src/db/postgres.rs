use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::db::manager::Pool;
use crate::db::rows::{EmoticonRow, GuildEmojiRow, GuildRow, alt_name_pattern};
use crate::db::schema::{emoticon, guild, guild_emoji};

use super::{
    DatabaseError,
    models::{Emoticon, GuildEmoji, GuildRecord},
};

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresGuildStore {
    pool: Pool,
}

impl PostgresGuildStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::GuildStore for PostgresGuildStore {
    async fn get_by_id(&self, guild_id: &str) -> Result<Option<GuildRecord>, DatabaseError> {
        let guild_id = guild_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            guild::table
                .filter(guild::dcid.eq(guild_id))
                .select(GuildRow::as_select())
                .first::<GuildRow>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(GuildRecord::try_from)
                .transpose()
        })
        .await
    }

    async fn get_by_mxid(&self, room_id: &str) -> Result<Option<GuildRecord>, DatabaseError> {
        let room_id = room_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            guild::table
                .filter(guild::mxid.eq(room_id))
                .select(GuildRow::as_select())
                .first::<GuildRow>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(GuildRecord::try_from)
                .transpose()
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<GuildRecord>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            guild::table
                .order(guild::dcid.asc())
                .select(GuildRow::as_select())
                .load::<GuildRow>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(GuildRecord::try_from)
                .collect()
        })
        .await
    }

    async fn insert(&self, record: &GuildRecord) -> Result<(), DatabaseError> {
        let row = GuildRow::from(record);
        with_connection(self.pool.clone(), move |conn| {
            diesel::insert_into(guild::table)
                .values(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn update(&self, record: &GuildRecord) -> Result<(), DatabaseError> {
        let row = GuildRow::from(record);
        with_connection(self.pool.clone(), move |conn| {
            diesel::update(guild::table.filter(guild::dcid.eq(&row.dcid)))
                .set(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete(&self, guild_id: &str) -> Result<(), DatabaseError> {
        let guild_id = guild_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            diesel::delete(guild::table.filter(guild::dcid.eq(guild_id)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresGuildEmojiStore {
    pool: Pool,
}

impl PostgresGuildEmojiStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::GuildEmojiStore for PostgresGuildEmojiStore {
    async fn get_all_by_guild_id(&self, guild_id: &str) -> Result<Vec<GuildEmoji>, DatabaseError> {
        let guild_id = guild_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            guild_emoji::table
                .filter(guild_emoji::dc_guild_id.eq(guild_id))
                .select(GuildEmojiRow::as_select())
                .load::<GuildEmojiRow>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get(
        &self,
        guild_id: &str,
        emoji_name: &str,
    ) -> Result<Option<GuildEmoji>, DatabaseError> {
        let guild_id = guild_id.to_string();
        let emoji_name = emoji_name.to_string();
        with_connection(self.pool.clone(), move |conn| {
            guild_emoji::table
                .filter(guild_emoji::dc_guild_id.eq(guild_id))
                .filter(guild_emoji::dc_emoji_name.eq(emoji_name))
                .select(GuildEmojiRow::as_select())
                .first::<GuildEmojiRow>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_by_mxc(&self, mxc: &str) -> Result<Option<GuildEmoji>, DatabaseError> {
        let mxc = mxc.to_string();
        with_connection(self.pool.clone(), move |conn| {
            guild_emoji::table
                .filter(guild_emoji::mxc.eq(mxc))
                .select(GuildEmojiRow::as_select())
                .first::<GuildEmojiRow>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_by_alt(&self, alt: &str) -> Result<Option<GuildEmoji>, DatabaseError> {
        let pattern = alt_name_pattern(alt);
        with_connection(self.pool.clone(), move |conn| {
            guild_emoji::table
                .filter(guild_emoji::dc_emoji_name.like(pattern).escape('\\'))
                .select(GuildEmojiRow::as_select())
                .first::<GuildEmojiRow>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn insert(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError> {
        let row = GuildEmojiRow::from(emoji);
        with_connection(self.pool.clone(), move |conn| {
            diesel::insert_into(guild_emoji::table)
                .values(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn update_mxc(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError> {
        let row = GuildEmojiRow::from(emoji);
        with_connection(self.pool.clone(), move |conn| {
            diesel::update(
                guild_emoji::table
                    .filter(guild_emoji::dc_guild_id.eq(&row.dc_guild_id))
                    .filter(guild_emoji::dc_emoji_name.eq(&row.dc_emoji_name)),
            )
            .set(guild_emoji::mxc.eq(&row.mxc))
            .execute(conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete(&self, emoji: &GuildEmoji) -> Result<(), DatabaseError> {
        let row = GuildEmojiRow::from(emoji);
        with_connection(self.pool.clone(), move |conn| {
            diesel::delete(
                guild_emoji::table
                    .filter(guild_emoji::dc_guild_id.eq(&row.dc_guild_id))
                    .filter(guild_emoji::dc_emoji_name.eq(&row.dc_emoji_name)),
            )
            .execute(conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresEmoticonStore {
    pool: Pool,
}

impl PostgresEmoticonStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::EmoticonStore for PostgresEmoticonStore {
    async fn get_by_mxid_and_mxc(
        &self,
        mxid: &str,
        mxc: &str,
    ) -> Result<Option<Emoticon>, DatabaseError> {
        let mxid = mxid.to_string();
        let mxc = mxc.to_string();
        with_connection(self.pool.clone(), move |conn| {
            emoticon::table
                .filter(emoticon::mxid.eq(mxid))
                .filter(emoticon::mxc.eq(mxc))
                .select(EmoticonRow::as_select())
                .first::<EmoticonRow>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_by_mxc(&self, mxc: &str) -> Result<Option<Emoticon>, DatabaseError> {
        let mxc = mxc.to_string();
        with_connection(self.pool.clone(), move |conn| {
            emoticon::table
                .filter(emoticon::mxc.eq(mxc))
                .select(EmoticonRow::as_select())
                .first::<EmoticonRow>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_by_alt(&self, alt: &str) -> Result<Option<Emoticon>, DatabaseError> {
        let alt = alt.to_string();
        with_connection(self.pool.clone(), move |conn| {
            emoticon::table
                .filter(emoticon::mxalt.eq(alt))
                .select(EmoticonRow::as_select())
                .first::<EmoticonRow>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn insert(&self, value: &Emoticon) -> Result<(), DatabaseError> {
        let row = EmoticonRow::from(value);
        with_connection(self.pool.clone(), move |conn| {
            diesel::insert_into(emoticon::table)
                .values(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete(&self, value: &Emoticon) -> Result<(), DatabaseError> {
        let row = EmoticonRow::from(value);
        with_connection(self.pool.clone(), move |conn| {
            diesel::delete(
                emoticon::table
                    .filter(emoticon::mxid.eq(&row.mxid))
                    .filter(emoticon::mxc.eq(&row.mxc)),
            )
            .execute(conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
