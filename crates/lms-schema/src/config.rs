//! Connection configuration, read once from the environment.
//!
//! Recognized variables: `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`,
//! `DB_NAME`. Character set and connection ceiling are fixed.

use sqlx::mysql::MySqlConnectOptions;
use thiserror::Error;

/// Errors that can occur when reading configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("DB_PORT must be a port number, got {value:?}")]
    InvalidPort { value: String },
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    /// Shared pool ceiling; a reconciliation run only ever holds one connection.
    pub connection_limit: u32,
}

impl Config {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 3306;
    pub const DEFAULT_USER: &'static str = "root";
    pub const DEFAULT_DATABASE: &'static str = "steamlms";
    pub const CHARSET: &'static str = "utf8mb4";
    pub const CONNECTION_LIMIT: u32 = 10;

    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unset or blank variables fall back to their defaults. An empty
    /// `DB_PASSWORD` is a valid (empty) password.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let setting = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let port = match setting("DB_PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { value })?,
            None => Self::DEFAULT_PORT,
        };

        Ok(Self {
            host: setting("DB_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string()),
            port,
            user: setting("DB_USER").unwrap_or_else(|| Self::DEFAULT_USER.to_string()),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            database: setting("DB_NAME").unwrap_or_else(|| Self::DEFAULT_DATABASE.to_string()),
            charset: Self::CHARSET.to_string(),
            connection_limit: Self::CONNECTION_LIMIT,
        })
    }

    /// Options for a connection bound to the configured database.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        self.server_options().database(&self.database)
    }

    /// Options for a connection to the server with no default database.
    pub fn server_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .charset(&self.charset)
    }

    /// Connection target for display, with the password masked.
    pub fn redacted_url(&self) -> String {
        let credentials = if self.password.is_empty() {
            self.user.clone()
        } else {
            format!("{}:***", self.user)
        };
        format!(
            "mysql://{}@{}:{}/{}",
            credentials, self.host, self.port, self.database
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
            user: Self::DEFAULT_USER.to_string(),
            password: String::new(),
            database: Self::DEFAULT_DATABASE.to_string(),
            charset: Self::CHARSET.to_string(),
            connection_limit: Self::CONNECTION_LIMIT,
        }
    }
}
