use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";
pub const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";
pub const DEFAULT_TIMEZONE: &str = "local";
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Database backend a configuration targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Mysql,
    Sqlite,
}

/// Fully resolved connection and migration settings.
///
/// Built once by [`ConfigLoader`](crate::ConfigLoader) and handed to the
/// migrator by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub driver: Driver,
    pub host: String,
    pub user: String,
    pub password: String,
    /// Schema name for MySQL, file path (or `:memory:`) for SQLite.
    pub database: String,
    pub port: u16,
    pub migrations_table: String,
    pub migrations_dir: PathBuf,
    pub timezone: String,
    pub charset: String,
    /// Wrap each migration and its tracking row in one transaction.
    pub transactional: bool,
}

impl DatabaseConfig {
    /// SQLite configuration with every other setting at its default.
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self {
            driver: Driver::Sqlite,
            host: String::new(),
            user: String::new(),
            password: String::new(),
            database: database.into(),
            port: DEFAULT_PORT,
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            timezone: DEFAULT_TIMEZONE.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            transactional: false,
        }
    }

    /// Placeholder values written by `schemashift init`.
    pub fn template() -> ConfigLayer {
        ConfigLayer {
            driver: Some(Driver::Mysql),
            host: Some(DEFAULT_HOST.to_string()),
            user: Some("your_username".to_string()),
            password: Some("your_password".to_string()),
            database: Some("your_database".to_string()),
            port: Some(DEFAULT_PORT),
            migrations_table: Some(DEFAULT_MIGRATIONS_TABLE.to_string()),
            migrations_dir: Some(PathBuf::from(DEFAULT_MIGRATIONS_DIR)),
            ..Default::default()
        }
    }
}

/// One partial source of settings (environment, URL or file). Later layers
/// override earlier ones field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<Driver>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrations_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrations_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactional: Option<bool>,
}

impl ConfigLayer {
    /// Overlay `other` on top of `self`.
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            driver: other.driver.or(self.driver),
            host: other.host.or(self.host),
            user: other.user.or(self.user),
            password: other.password.or(self.password),
            database: other.database.or(self.database),
            port: other.port.or(self.port),
            migrations_table: other.migrations_table.or(self.migrations_table),
            migrations_dir: other.migrations_dir.or(self.migrations_dir),
            timezone: other.timezone.or(self.timezone),
            charset: other.charset.or(self.charset),
            transactional: other.transactional.or(self.transactional),
        }
    }
}
