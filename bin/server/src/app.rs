//! Application assembly: store backend and route table.

use axum::{
    Router,
    routing::{get, post},
};
use guildhall_access::{GroupRoleMap, Role};
use guildhall_kv::{KvStore, MemoryKv, RedisKv};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{AppState, DiscordClient, Mux, routes};
use crate::config::{ServerConfig, StoreBackend, StoreConfig};
use crate::error::StartupError;

/// Builds the route table.
///
/// Every route goes through [`Mux`] and therefore names its required role.
pub fn router(state: Arc<AppState>) -> Router {
    let login_path = state.login_path.clone();
    Mux::new(state)
        .page("/", Role::Anonymous, get(routes::home))
        .page(
            &login_path,
            Role::Anonymous,
            get(routes::login_page).post(routes::login_submit),
        )
        .page(
            "/auth/discord",
            Role::Anonymous,
            get(routes::discord).post(routes::discord_form),
        )
        .page(
            "/logout",
            Role::Anonymous,
            get(routes::logout).post(routes::logout),
        )
        .api("/api/token", Role::Member, post(routes::api_token))
        .api("/api/whoami", Role::Anonymous, get(routes::whoami))
        .into_router()
        .layer(TraceLayer::new_for_http())
}

/// Connects the configured key-value store.
///
/// The in-memory backend gets a background task purging expired entries.
///
/// # Errors
///
/// Returns an error if the Redis backend is selected without a URL or its
/// pool cannot be created.
pub fn connect_store(config: &StoreConfig) -> Result<Arc<dyn KvStore>, StartupError> {
    match config.backend {
        StoreBackend::Memory => {
            let kv = Arc::new(MemoryKv::new());
            spawn_purge(kv.clone(), Duration::from_secs(config.purge_interval_seconds.max(1)));
            info!("using in-memory store; sessions will not survive a restart");
            Ok(kv)
        }
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| StartupError::Config {
                    details: "store.redis_url is required for the redis backend".to_string(),
                })?;
            let kv = RedisKv::connect(url, config.pool_max).map_err(|e| StartupError::Store {
                details: e.to_string(),
            })?;
            info!(pool_max = config.pool_max, "using redis store");
            Ok(Arc::new(kv))
        }
    }
}

fn spawn_purge(kv: Arc<MemoryKv>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = kv.purge_expired();
            if purged > 0 {
                debug!(purged, "purged expired entries");
            }
        }
    });
}

/// Builds the application state, including the provider when configured.
///
/// # Errors
///
/// Returns an error if the provider client cannot be built.
pub fn build_state(config: &ServerConfig, kv: Arc<dyn KvStore>) -> Result<AppState, StartupError> {
    let state = AppState::new(config, kv);
    let Some(discord) = &config.discord else {
        return Ok(state);
    };

    if discord.role_map().is_empty() {
        return Err(StartupError::Config {
            details: "discord.role_map is empty; no Discord login could ever succeed".to_string(),
        });
    }
    let roles = GroupRoleMap::new(discord.role_map().clone());
    let client = DiscordClient::new(discord.clone())?;
    info!(guild = discord.guild_id(), "discord login enabled");
    Ok(state.with_provider(Arc::new(client), roles))
}
