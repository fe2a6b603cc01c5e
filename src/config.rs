pub use self::parser::{
    BridgeConfig, Config, DatabaseConfig, DbType, GuildConfig, LoggingConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
