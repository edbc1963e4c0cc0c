//! Database settings for the `PostgreSQL` task store.
//!
//! Settings come from the environment (see the `*_VAR` constants) or from
//! any serde source the embedding application already uses.

use crate::task::adapters::postgres::TaskPgPool;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the database URL.
pub const DATABASE_URL_VAR: &str = "TASKFLOW_DATABASE_URL";
/// Environment variable holding the maximum pool size.
pub const MAX_CONNECTIONS_VAR: &str = "TASKFLOW_DB_MAX_CONNECTIONS";
/// Environment variable holding the connection timeout in seconds.
pub const CONNECT_TIMEOUT_VAR: &str = "TASKFLOW_DB_CONNECT_TIMEOUT_SECS";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading settings or building the pool.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A variable is set to an unusable value.
    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// Rejected raw value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The connection pool could not be created.
    #[error("failed to build connection pool: {0}")]
    Pool(#[from] PoolError),
}

/// Connection settings for the task database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseSettings {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl DatabaseSettings {
    /// Creates settings for `url` with default pool limits.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is missing or a numeric setting
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is missing or a numeric setting
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let url = read(DATABASE_URL_VAR).ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;
        let mut settings = Self::new(url.trim());

        if let Some(raw) = read(MAX_CONNECTIONS_VAR) {
            settings.max_connections = parse_setting(MAX_CONNECTIONS_VAR, &raw)?;
        }
        if let Some(raw) = read(CONNECT_TIMEOUT_VAR) {
            settings.connect_timeout_secs = parse_setting(CONNECT_TIMEOUT_VAR, &raw)?;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Returns the pool checkout timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Checks that pool limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the pool size or timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: MAX_CONNECTIONS_VAR,
                value: self.max_connections.to_string(),
                reason: "pool needs at least one connection".to_owned(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: CONNECT_TIMEOUT_VAR,
                value: self.connect_timeout_secs.to_string(),
                reason: "timeout must be positive".to_owned(),
            });
        }
        Ok(())
    }

    /// Builds the r2d2 pool used by
    /// [`PostgresTaskRepository`](crate::task::adapters::postgres::PostgresTaskRepository).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the settings are invalid or the initial
    /// connections cannot be established.
    pub fn build_pool(&self) -> Result<TaskPgPool, ConfigError> {
        self.validate()?;
        let manager = ConnectionManager::<PgConnection>::new(self.url.as_str());
        let pool = Pool::builder()
            .max_size(self.max_connections)
            .connection_timeout(self.connect_timeout())
            .build(manager)?;
        tracing::info!(
            max_connections = self.max_connections,
            "task database pool ready"
        );
        Ok(pool)
    }
}

fn parse_setting<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_owned(),
        reason: err.to_string(),
    })
}
