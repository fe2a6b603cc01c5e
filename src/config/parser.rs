use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub guild: GuildConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    pub domain: String,
    #[serde(default)]
    pub homeserver_url: String,
    #[serde(alias = "as_token")]
    pub appservice_token: String,
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    #[serde(default)]
    pub bot_avatar: Option<String>,
    #[serde(default = "default_federate_rooms")]
    pub federate_rooms: bool,
}

impl BridgeConfig {
    pub fn bot_user_id(&self) -> String {
        format!("@{}:{}", self.bot_username, self.domain)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildConfig {
    /// `:name` is replaced with the Discord guild name.
    #[serde(default = "default_guild_name_pattern")]
    pub name_pattern: String,
    #[serde(default)]
    pub retry_failed_emoji_uploads: bool,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            name_pattern: default_guild_name_pattern(),
            retry_failed_emoji_uploads: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub conn_string: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("sqlite://") {
            DbType::Sqlite
        } else {
            DbType::Postgres
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref conn) = self.conn_string {
            conn.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.domain.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bridge.domain cannot be empty".to_string(),
            ));
        }

        if self.bridge.appservice_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bridge.appservice_token cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if !self.guild.name_pattern.contains(":name") {
            return Err(ConfigError::InvalidConfig(
                "guild.name_pattern must contain :name".to_string(),
            ));
        }

        if let Some(avatar) = &self.bridge.bot_avatar
            && !avatar.is_empty()
            && !avatar.starts_with("mxc://")
        {
            return Err(ConfigError::InvalidConfig(
                "bridge.bot_avatar must be an mxc:// URI".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("APPSERVICE_DISCORD_AS_TOKEN") {
            self.bridge.appservice_token = value;
        }
        if let Ok(value) = std::env::var("APPSERVICE_DISCORD_HOMESERVER_URL") {
            self.bridge.homeserver_url = value;
        }
    }
}

fn default_bot_username() -> String {
    "_discord_".to_string()
}

fn default_federate_rooms() -> bool {
    true
}

fn default_guild_name_pattern() -> String {
    ":name".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
