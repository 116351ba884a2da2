use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use crate::network::{ConnectionManager, ConnectionOptions, SentinelClient};
use crate::parser::{parse_columns, parse_connection_spec};
use crate::storage::TableStore;
use crate::types::{ConnectionSpec, DatabaseError, KeySpace, DEFAULT_REDIS_PORT, DEFAULT_SENTINEL_PORT};

const CONFIG_PATHS: [&str; 2] = ["/etc/redtable/redtable.toml", "./redtable.toml"];
const ENV_PREFIX: &str = "REDTABLE";

/// Table handle configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RedtableConfig {
    #[serde(default = "default_connection")]
    pub connection: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub table: Option<String>,
    /// Column definitions, e.g. `"n INTEGER"`
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_sentinel_timeout_ms")]
    pub sentinel_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default = "default_sentinel_port")]
    pub sentinel_port: u16,
}

fn default_connection() -> String { format!("127.0.0.1:{DEFAULT_REDIS_PORT}") }
fn default_prefix() -> String { "redtable".to_string() }
fn default_database() -> String { "main".to_string() }
fn default_sentinel_timeout_ms() -> u64 { 250 }
fn default_max_retries() -> u32 { 3 }
fn default_redis_port() -> u16 { DEFAULT_REDIS_PORT }
fn default_sentinel_port() -> u16 { DEFAULT_SENTINEL_PORT }

impl Default for RedtableConfig {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            prefix: default_prefix(),
            database: default_database(),
            table: None,
            columns: Vec::new(),
            sentinel_timeout_ms: default_sentinel_timeout_ms(),
            max_retries: default_max_retries(),
            redis_port: default_redis_port(),
            sentinel_port: default_sentinel_port(),
        }
    }
}

impl RedtableConfig {
    /// Load configuration with priority: ENV > config file > defaults.
    ///
    /// An explicit `path` must exist; otherwise the first of the standard
    /// locations that exists is used, if any.
    pub fn load(path: Option<&Path>) -> Result<Self, DatabaseError> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("columns")
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, DatabaseError> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
                debug!(path = %path.display(), "loading config");
            }
            None => {
                if let Some(found) = CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
                    builder = builder.add_source(File::with_name(found));
                    debug!(path = found, "loading config");
                }
            }
        }

        let config = builder.add_source(env).build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn connection_spec(&self) -> Result<ConnectionSpec, DatabaseError> {
        parse_connection_spec(&self.connection, self.redis_port, self.sentinel_port)
    }

    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            max_retries: self.max_retries,
            sentinel: SentinelClient {
                probe_timeout: Duration::from_millis(self.sentinel_timeout_ms),
                redis_port: self.redis_port,
                sentinel_port: self.sentinel_port,
                ..SentinelClient::default()
            },
            ..ConnectionOptions::default()
        }
    }

    pub fn key_space(&self) -> Result<KeySpace, DatabaseError> {
        let table = self
            .table
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DatabaseError::BadFormat("no table configured".to_string()))?;
        Ok(KeySpace::new(&self.prefix, &self.database, table))
    }

    /// Parses everything, connects and opens the configured table.
    pub fn open_table(&self) -> Result<TableStore, DatabaseError> {
        let keys = self.key_space()?;
        let columns = parse_columns(&self.columns)?;
        let conn = ConnectionManager::new(self.connection_spec()?, self.connection_options());
        TableStore::open(keys, columns, conn)
    }
}
