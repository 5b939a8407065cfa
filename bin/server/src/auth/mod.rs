//! Authentication and authorization for the guildhall server.
//!
//! This module provides:
//! - Role-gated routing (`Mux`) and the `Authenticated` extractor
//! - Credential extraction from headers and cookies
//! - Password and Discord login routes, logout and API token minting
//! - The Discord implementation of `IdentityProvider`
//!
//! # Authorization Model
//!
//! Every route names one required role. The gate resolves the caller
//! (Basic, then bearer, then session, then anonymous), narrows the role set
//! when the request carries `role` parameters, and checks the required role
//! before the handler runs. Resolution failures caused by the store fail
//! closed with a 500; they are never mistaken for "no session".

pub mod cookies;
pub mod credentials;
pub mod discord;
pub mod mux;
pub mod routes;

pub use cookies::CookiePolicy;
pub use discord::DiscordClient;
pub use mux::{Authenticated, Mux, Surface};

use guildhall_access::{
    GroupRoleMap, IdentityProvider, IdentityResolver, OAuthStateStore, PasswordVerifier,
    ProviderLogin, SessionStore, StaticCredentials,
};
use guildhall_kv::KvStore;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ServerConfig, SessionConfig};

/// Shared application state.
///
/// Built once at startup around a single store handle and passed to every
/// route through axum state.
pub struct AppState {
    /// Resolves request credentials.
    pub resolver: IdentityResolver,
    /// Session persistence.
    pub sessions: SessionStore,
    /// Password login verifier.
    pub passwords: PasswordVerifier,
    /// Provider login flow, when a provider is configured.
    pub provider_login: Option<ProviderLogin>,
    /// Cookie attributes.
    pub cookies: CookiePolicy,
    /// Lifetime of new sessions.
    pub session_ttl: Duration,
    /// Login page anonymous browsers are redirected to.
    pub login_path: String,
    kv: Arc<dyn KvStore>,
    session_config: SessionConfig,
}

impl AppState {
    /// Creates the application state over `kv`.
    pub fn new(config: &ServerConfig, kv: Arc<dyn KvStore>) -> Self {
        let sessions =
            SessionStore::new(kv.clone()).with_timeout(config.session.store_timeout());
        let statics = StaticCredentials::from_config(&config.credentials);
        Self {
            resolver: IdentityResolver::new(statics, sessions.clone()),
            sessions,
            passwords: PasswordVerifier::from_config(&config.credentials),
            provider_login: None,
            cookies: CookiePolicy::from_config(&config.session),
            session_ttl: config.session.ttl(),
            login_path: config.login_path.clone(),
            kv,
            session_config: config.session.clone(),
        }
    }

    /// Enables provider logins through `provider`.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>, roles: GroupRoleMap) -> Self {
        let states = OAuthStateStore::new(self.kv.clone())
            .with_ttl(self.session_config.oauth_state_ttl())
            .with_timeout(self.session_config.store_timeout());
        self.provider_login = Some(ProviderLogin::new(
            provider,
            states,
            self.sessions.clone(),
            roles,
            self.session_ttl,
        ));
        self
    }
}
