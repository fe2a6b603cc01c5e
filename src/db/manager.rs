use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{DatabaseError, EmoticonStore, GuildEmojiStore, GuildStore};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{PostgresEmoticonStore, PostgresGuildEmojiStore, PostgresGuildStore};
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::RunQueryDsl;

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteEmoticonStore, SqliteGuildEmojiStore, SqliteGuildStore};
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;
#[cfg(feature = "sqlite")]
use diesel::Connection;

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    guild_store: Arc<dyn GuildStore>,
    guild_emoji_store: Arc<dyn GuildEmojiStore>,
    emoticon_store: Arc<dyn EmoticonStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let connection_string = config.connection_string();
                let max_connections = config.max_connections();
                let min_connections = config.min_connections();

                let manager = ConnectionManager::<PgConnection>::new(connection_string);

                let builder = r2d2::Pool::builder()
                    .max_size(max_connections.unwrap_or(10))
                    .min_idle(Some(min_connections.unwrap_or(1)));

                let pool = builder
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                Ok(Self {
                    guild_store: Arc::new(PostgresGuildStore::new(pool.clone())),
                    guild_emoji_store: Arc::new(PostgresGuildEmojiStore::new(pool.clone())),
                    emoticon_store: Arc::new(PostgresEmoticonStore::new(pool.clone())),
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite database path is not configured".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    guild_store: Arc::new(SqliteGuildStore::new(path_arc.clone())),
                    guild_emoji_store: Arc::new(SqliteGuildEmojiStore::new(path_arc.clone())),
                    emoticon_store: Arc::new(SqliteEmoticonStore::new(path_arc)),
                    sqlite_path: Some(path),
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("PostgreSQL pool is not initialized".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite database path is not configured".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS guild (
                    dcid TEXT PRIMARY KEY,
                    mxid TEXT UNIQUE,
                    plain_name TEXT NOT NULL DEFAULT '',
                    name TEXT NOT NULL DEFAULT '',
                    name_set BOOLEAN NOT NULL DEFAULT false,
                    avatar TEXT NOT NULL DEFAULT '',
                    avatar_url TEXT NOT NULL DEFAULT '',
                    avatar_set BOOLEAN NOT NULL DEFAULT false,
                    bridging_mode INTEGER NOT NULL DEFAULT 0
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS guild_emoji (
                    dc_guild_id TEXT NOT NULL,
                    dc_emoji_name TEXT NOT NULL,
                    mxc TEXT NOT NULL DEFAULT '',
                    PRIMARY KEY (dc_guild_id, dc_emoji_name)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS emoticon (
                    mxid TEXT NOT NULL,
                    mxc TEXT NOT NULL,
                    mxalt TEXT NOT NULL DEFAULT '',
                    dcid TEXT NOT NULL,
                    dcname TEXT NOT NULL,
                    PRIMARY KEY (mxid, mxc)
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_guild_emoji_mxc ON guild_emoji(mxc)",
                "CREATE INDEX IF NOT EXISTS idx_emoticon_mxc ON emoticon(mxc)",
                "CREATE INDEX IF NOT EXISTS idx_emoticon_mxalt ON emoticon(mxalt)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS guild (
                    dcid TEXT PRIMARY KEY,
                    mxid TEXT UNIQUE,
                    plain_name TEXT NOT NULL DEFAULT '',
                    name TEXT NOT NULL DEFAULT '',
                    name_set BOOLEAN NOT NULL DEFAULT 0,
                    avatar TEXT NOT NULL DEFAULT '',
                    avatar_url TEXT NOT NULL DEFAULT '',
                    avatar_set BOOLEAN NOT NULL DEFAULT 0,
                    bridging_mode INTEGER NOT NULL DEFAULT 0
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS guild_emoji (
                    dc_guild_id TEXT NOT NULL,
                    dc_emoji_name TEXT NOT NULL,
                    mxc TEXT NOT NULL DEFAULT '',
                    PRIMARY KEY (dc_guild_id, dc_emoji_name)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS emoticon (
                    mxid TEXT NOT NULL,
                    mxc TEXT NOT NULL,
                    mxalt TEXT NOT NULL DEFAULT '',
                    dcid TEXT NOT NULL,
                    dcname TEXT NOT NULL,
                    PRIMARY KEY (mxid, mxc)
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_guild_emoji_mxc ON guild_emoji(mxc)",
                "CREATE INDEX IF NOT EXISTS idx_emoticon_mxc ON emoticon(mxc)",
                "CREATE INDEX IF NOT EXISTS idx_emoticon_mxalt ON emoticon(mxalt)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn guild_store(&self) -> Arc<dyn GuildStore> {
        self.guild_store.clone()
    }

    pub fn guild_emoji_store(&self) -> Arc<dyn GuildEmojiStore> {
        self.guild_emoji_store.clone()
    }

    pub fn emoticon_store(&self) -> Arc<dyn EmoticonStore> {
        self.emoticon_store.clone()
    }

    #[cfg(feature = "postgres")]
    pub fn pool(&self) -> Option<&Pool> {
        self.postgres_pool.as_ref()
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::DatabaseConfig;
    use crate::db::{Emoticon, GuildBridgingMode, GuildEmoji, GuildRecord};

    fn sqlite_config(file: &NamedTempFile) -> DatabaseConfig {
        DatabaseConfig {
            url: None,
            conn_string: None,
            filename: Some(file.path().to_string_lossy().to_string()),
            max_connections: Some(1),
            min_connections: Some(1),
        }
    }

    async fn open(config: &DatabaseConfig) -> DatabaseManager {
        let manager = DatabaseManager::new(config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        manager
    }

    #[tokio::test]
    async fn sqlite_guild_roundtrip() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let config = sqlite_config(&file);
        let manager = open(&config).await;
        let store = manager.guild_store();

        assert!(store.get_by_id("guild-1").await.expect("query").is_none());

        let mut record = GuildRecord::new("guild-1");
        store.insert(&record).await.expect("insert guild");

        record.plain_name = "Ops".to_string();
        record.name = "Ops".to_string();
        record.mxid = Some("!space:example.org".to_string());
        record.name_set = true;
        record.avatar = "iconhash".to_string();
        record.avatar_url = "mxc://example.org/icon".to_string();
        record.avatar_set = true;
        record.bridging_mode = GuildBridgingMode::Everything;
        store.update(&record).await.expect("update guild");

        let reopened = open(&config).await;
        let by_room = reopened
            .guild_store()
            .get_by_mxid("!space:example.org")
            .await
            .expect("query by room")
            .expect("guild exists");
        assert_eq!(by_room, record);

        record.mxid = None;
        record.bridging_mode = GuildBridgingMode::Nothing;
        reopened.guild_store().update(&record).await.expect("clear room");
        let cleared = reopened
            .guild_store()
            .get_by_id("guild-1")
            .await
            .expect("query by id")
            .expect("guild exists");
        assert_eq!(cleared.mxid, None);
        assert!(
            reopened
                .guild_store()
                .get_by_mxid("!space:example.org")
                .await
                .expect("query by room")
                .is_none()
        );

        assert_eq!(reopened.guild_store().get_all().await.expect("all").len(), 1);
        reopened.guild_store().delete("guild-1").await.expect("delete");
        assert!(reopened.guild_store().get_all().await.expect("all").is_empty());
    }

    #[tokio::test]
    async fn sqlite_guild_emoji_roundtrip() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = open(&sqlite_config(&file)).await;
        let store = manager.guild_emoji_store();

        let mut smile = GuildEmoji {
            guild_id: "guild-1".to_string(),
            emoji_name: "smile:1".to_string(),
            mxc: "example.org/smile".to_string(),
        };
        let wave = GuildEmoji {
            guild_id: "guild-1".to_string(),
            emoji_name: "wave:2".to_string(),
            mxc: String::new(),
        };
        store.insert(&smile).await.expect("insert smile");
        store.insert(&wave).await.expect("insert wave");
        assert!(store.insert(&wave).await.is_err());

        let mut all = store.get_all_by_guild_id("guild-1").await.expect("all");
        all.sort_by(|a, b| a.emoji_name.cmp(&b.emoji_name));
        assert_eq!(all, vec![smile.clone(), wave.clone()]);

        let found = store
            .get_by_mxc("example.org/smile")
            .await
            .expect("by mxc")
            .expect("smile exists");
        assert_eq!(found.emoji_name, "smile:1");

        let by_alt = store.get_by_alt("wave").await.expect("by alt").expect("wave exists");
        assert_eq!(by_alt.emoji_name, "wave:2");
        assert!(store.get_by_alt("wav").await.expect("by alt").is_none());

        smile.mxc = "example.org/smile2".to_string();
        store.update_mxc(&smile).await.expect("update mxc");
        let updated = store
            .get("guild-1", "smile:1")
            .await
            .expect("by key")
            .expect("smile exists");
        assert_eq!(updated.mxc, "example.org/smile2");

        store.delete(&wave).await.expect("delete wave");
        assert!(store.get("guild-1", "wave:2").await.expect("by key").is_none());
    }

    #[tokio::test]
    async fn sqlite_emoticon_roundtrip() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = open(&sqlite_config(&file)).await;
        let store = manager.emoticon_store();

        let emoticon = Emoticon {
            mxid: "@alice:example.org".to_string(),
            mxc: "mxc://example.org/party".to_string(),
            mxalt: "party".to_string(),
            dcid: "99".to_string(),
            dcname: "party".to_string(),
        };
        store.insert(&emoticon).await.expect("insert emoticon");

        let found = store
            .get_by_mxid_and_mxc("@alice:example.org", "mxc://example.org/party")
            .await
            .expect("by key")
            .expect("emoticon exists");
        assert_eq!(found, emoticon);
        assert_eq!(
            store.get_by_alt("party").await.expect("by alt"),
            Some(emoticon.clone())
        );
        assert!(
            store
                .get_by_mxid_and_mxc("@bob:example.org", "mxc://example.org/party")
                .await
                .expect("by key")
                .is_none()
        );

        store.delete(&emoticon).await.expect("delete");
        assert!(store.get_by_mxc("mxc://example.org/party").await.expect("by mxc").is_none());
    }
}
