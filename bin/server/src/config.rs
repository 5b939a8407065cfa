//! Centralized server configuration.
//!
//! Configuration is loaded via the `config` crate from an optional file
//! named by `GUILDHALL_CONFIG`, then from `GUILDHALL__*` environment
//! variables (nested keys separated by `__`, e.g.
//! `GUILDHALL__SESSION__TTL_SECONDS`).
//!
//! See [`CredentialConfig`] and [`DiscordConfig`] for the authentication
//! sections.

use guildhall_access::{CredentialConfig, DiscordConfig};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_VAR: &str = "GUILDHALL_CONFIG";

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path of the login page anonymous browsers are redirected to.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Key-value store backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Static and password credentials.
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Discord login. Disabled when absent.
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

/// Key-value store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store. Sessions do not survive a restart.
    #[default]
    Memory,
    /// Redis, via a connection pool.
    Redis,
}

/// Store-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL. Required for the Redis backend.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Maximum pooled Redis connections.
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,

    /// Interval between purges of expired in-memory entries, in seconds.
    #[serde(default = "default_purge_interval_seconds")]
    pub purge_interval_seconds: u64,
}

fn default_pool_max() -> usize {
    16
}

fn default_purge_interval_seconds() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            pool_max: default_pool_max(),
            purge_interval_seconds: default_purge_interval_seconds(),
        }
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Lifetime of a pending OAuth state, in seconds.
    #[serde(default = "default_oauth_state_ttl_seconds")]
    pub oauth_state_ttl_seconds: u64,

    /// Deadline for each store call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Cookie domain. Defaults to the parent domain of the request host.
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_ttl_seconds() -> u64 {
    7 * 24 * 60 * 60
}

fn default_oauth_state_ttl_seconds() -> u64 {
    300
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            oauth_state_ttl_seconds: default_oauth_state_ttl_seconds(),
            store_timeout_ms: default_store_timeout_ms(),
            cookie_domain: None,
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub fn oauth_state_ttl(&self) -> Duration {
        Duration::from_secs(self.oauth_state_ttl_seconds)
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            login_path: default_login_path(),
            store: StoreConfig::default(),
            session: SessionConfig::default(),
            credentials: CredentialConfig::default(),
            discord: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or configuration is
    /// invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("GUILDHALL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
