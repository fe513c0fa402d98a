//! Store configuration.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

fn default_collection_prefix() -> String {
    "quartz".to_string()
}

fn default_db_name() -> String {
    "quartz".to_string()
}

fn default_misfire_threshold_ms() -> u64 {
    5_000
}

fn default_lock_timeout_ms() -> u64 {
    10 * 60 * 1_000
}

/// Client tuning passed through to the backend connector. The store
/// itself never reads these; they exist so one configuration document
/// can describe the whole deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub max_connections_per_host: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub socket_timeout_ms: Option<u64>,
    pub socket_keep_alive: Option<bool>,
    pub threads_allowed_to_block_multiplier: Option<u32>,
}

impl ConnectionOptions {
    pub fn is_empty(&self) -> bool {
        *self == ConnectionOptions::default()
    }
}

/// Configuration for one scheduler node's view of the shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix for every collection name, joined with an underscore.
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Database to authenticate against when it differs from
    /// `db_name`.
    pub auth_db_name: Option<String>,

    /// Connection URI; mutually exclusive with `addresses`.
    pub uri: Option<String>,

    /// Server addresses; used with `username` / `password`.
    pub addresses: Vec<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// This scheduler node's identity. Imprinted on every lock the
    /// node takes; required for cluster safety.
    pub instance_id: String,

    /// Age beyond which an unfired trigger counts as misfired.
    #[serde(default = "default_misfire_threshold_ms")]
    pub misfire_threshold_ms: u64,

    /// Age beyond which a trigger lock may be reclaimed by a peer.
    #[serde(default = "default_lock_timeout_ms")]
    pub trigger_timeout_ms: u64,

    /// Age beyond which a job-concurrency lock may be reclaimed.
    #[serde(default = "default_lock_timeout_ms")]
    pub job_timeout_ms: u64,

    #[serde(default)]
    pub connection: ConnectionOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection_prefix: default_collection_prefix(),
            db_name: default_db_name(),
            auth_db_name: None,
            uri: None,
            addresses: Vec::new(),
            username: None,
            password: None,
            instance_id: String::new(),
            misfire_threshold_ms: default_misfire_threshold_ms(),
            trigger_timeout_ms: default_lock_timeout_ms(),
            job_timeout_ms: default_lock_timeout_ms(),
            connection: ConnectionOptions::default(),
        }
    }
}

impl StoreConfig {
    /// Minimal configuration for an injected backend.
    pub fn for_instance(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    pub fn collection_name(&self, base: &str) -> String {
        format!("{}_{}", self.collection_prefix, base)
    }

    /// True when any connection parameter is set. An injected backend
    /// must not be combined with these.
    pub fn has_connection_parameters(&self) -> bool {
        self.uri.is_some()
            || !self.addresses.is_empty()
            || self.username.is_some()
            || self.password.is_some()
            || self.auth_db_name.is_some()
            || !self.connection.is_empty()
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.instance_id.is_empty() {
            return Err(StoreError::Config(
                "an instance id is required for cluster-safe locking".to_string(),
            ));
        }
        if self.db_name.is_empty() {
            return Err(StoreError::Config("a database name is required".to_string()));
        }
        if self.collection_prefix.is_empty() {
            return Err(StoreError::Config(
                "a collection prefix is required".to_string(),
            ));
        }
        if self.uri.is_some() && !self.addresses.is_empty() {
            return Err(StoreError::Config(
                "configure either a connection URI or server addresses, not both".to_string(),
            ));
        }
        Ok(())
    }
}
