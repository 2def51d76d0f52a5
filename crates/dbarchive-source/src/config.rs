//! Source configuration
//!
//! [`SourceConfig`] is the deserialized form of the `source` section of an
//! archiving job. Loading it (files, environment) is the caller's business;
//! this module only types and validates it.
//!
//! ```rust,ignore
//! let config: SourceConfig = serde_json::from_value(json!({
//!     "host": "db.internal",
//!     "user": "archiver",
//!     "password": "secret",
//!     "db_tables": ["^sales@orders$"],
//!     "where_condition": "created_at < '2024-01-01'",
//!     "split_key": "id",
//! }))?;
//! config.validate_all()?;
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::catalog::{TableIdentifier, TableSelector};
use crate::connection::ConnectionConfig;
use crate::dialect::Predicate;
use crate::error::{Error, Result};

/// A string that never shows up in logs or serialized config
///
/// `Debug` and `Display` print `[REDACTED]`; serialization writes
/// `"***REDACTED***"`. Use [`SensitiveString::expose_secret`] to read it.
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Default for SensitiveString {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Source side of an archiving job
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SourceConfig {
    /// MySQL host
    #[validate(length(min = 1))]
    pub host: String,

    /// MySQL port (default: 3306)
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Username
    #[validate(length(min = 1))]
    pub user: String,

    /// Password (redacted in logs)
    #[serde(default)]
    pub password: SensitiveString,

    /// Database of an explicitly named table
    #[serde(default)]
    pub database: Option<String>,

    /// Explicitly named table, added without pattern matching
    #[serde(default)]
    pub table: Option<String>,

    /// Table selectors, `<database-regex>@<table-regex>`
    #[serde(default)]
    pub db_tables: Vec<String>,

    /// Row filter applied to every statement (empty = all rows)
    #[serde(default)]
    pub where_condition: String,

    /// Numeric column used to split a table into key ranges
    #[serde(default)]
    pub split_key: Option<String>,

    /// Temporal column used to split a table into time ranges
    #[serde(default)]
    pub split_time_key: Option<String>,

    /// Base batch size
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: u64,

    /// Delete archived rows from the source once the copy succeeded
    #[serde(default)]
    pub delete_after_sync: bool,

    /// Pause between delete statements, in seconds
    #[serde(default = "default_delete_interval")]
    pub delete_interval_secs: u64,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,

    /// Statement timeout in milliseconds (0 = none)
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
}

fn default_port() -> u16 {
    3306
}

fn default_batch_size() -> u64 {
    1000
}

fn default_delete_interval() -> u64 {
    1
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_query_timeout() -> u64 {
    30_000
}

impl SourceConfig {
    /// Minimal configuration for `host` and `user`, everything else defaulted
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            password: SensitiveString::default(),
            database: None,
            table: None,
            db_tables: Vec::new(),
            where_condition: String::new(),
            split_key: None,
            split_time_key: None,
            batch_size: default_batch_size(),
            delete_after_sync: false,
            delete_interval_secs: default_delete_interval(),
            connect_timeout_ms: default_connect_timeout(),
            query_timeout_ms: default_query_timeout(),
        }
    }

    /// Field validation plus selector, predicate and cross-field checks
    pub fn validate_all(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid source configuration: {e}")))?;

        match (&self.database, &self.table) {
            (Some(db), Some(table)) if db.is_empty() || table.is_empty() => {
                return Err(Error::config("database and table must not be empty"));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::config(
                    "database and table must be configured together",
                ));
            }
            _ => {}
        }

        if self.db_tables.is_empty() && self.table.is_none() {
            return Err(Error::config(
                "no source tables configured: set db_tables or database and table",
            ));
        }

        for (name, key) in [("split_key", &self.split_key), ("split_time_key", &self.split_time_key)] {
            if key.as_deref().is_some_and(|k| k.trim().is_empty()) {
                return Err(Error::config(format!("{name} must not be empty")));
            }
        }

        self.selectors()?;
        self.predicate()?;
        Ok(())
    }

    /// Parsed table selectors
    pub fn selectors(&self) -> Result<Vec<TableSelector>> {
        TableSelector::parse_all(&self.db_tables)
    }

    /// Parsed row filter
    pub fn predicate(&self) -> Result<Predicate> {
        Predicate::parse(&self.where_condition)
    }

    /// The explicitly named table, if both halves are configured
    pub fn explicit_table(&self) -> Option<TableIdentifier> {
        match (&self.database, &self.table) {
            (Some(db), Some(table)) => Some(TableIdentifier::new(db.as_str(), table.as_str())),
            _ => None,
        }
    }

    /// Pause between delete statements
    pub fn delete_interval(&self) -> Duration {
        Duration::from_secs(self.delete_interval_secs)
    }

    /// Connection settings for the `mysql` system database
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let mut url = url::Url::parse("mysql://localhost/mysql")
            .map_err(|e| Error::internal(format!("base URL: {e}")))?;
        url.set_host(Some(&self.host))
            .map_err(|e| Error::config(format!("invalid host '{}': {e}", self.host)))?;
        url.set_port(Some(self.port))
            .map_err(|_| Error::config(format!("invalid port {}", self.port)))?;
        url.set_username(&self.user)
            .map_err(|_| Error::config("user cannot be set on the connection URL"))?;

        let password = self.password.expose_secret();
        if !password.is_empty() {
            url.set_password(Some(password))
                .map_err(|_| Error::config("password cannot be set on the connection URL"))?;
        }

        Ok(ConnectionConfig::new(url.to_string())
            .with_connect_timeout(self.connect_timeout_ms)
            .with_query_timeout(self.query_timeout_ms))
    }
}
