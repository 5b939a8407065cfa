//! Discord OAuth configuration.
//!
//! Discord is the external identity provider for community logins. A login
//! is granted only to guild members holding at least one guild role that
//! maps to an internal [`Role`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::role::Role;

/// Configuration for Discord OAuth and guild membership lookup.
///
/// Endpoint fields default to Discord's public API and only need
/// overriding for tests or proxies.
#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// OAuth2 application client ID.
    client_id: String,
    /// OAuth2 application client secret.
    client_secret: String,
    /// Redirect URI registered with Discord (e.g., "https://example.com/auth/discord").
    redirect_uri: String,
    /// Guild whose role memberships grant access.
    guild_id: String,
    /// Bot token used to read guild memberships.
    bot_token: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "identify"
    #[serde(default = "default_scopes")]
    scopes: String,
    #[serde(default = "default_authorize_url")]
    authorize_url: String,
    #[serde(default = "default_token_url")]
    token_url: String,
    #[serde(default = "default_api_base")]
    api_base: String,
    /// Guild role ID to internal role.
    #[serde(default)]
    role_map: HashMap<String, Role>,
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("guild_id", &self.guild_id)
            .field("bot_token", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_base", &self.api_base)
            .field("role_map", &self.role_map)
            .finish()
    }
}

fn default_scopes() -> String {
    "identify".to_string()
}

fn default_authorize_url() -> String {
    "https://discord.com/oauth2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://discord.com/api/oauth2/token".to_string()
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

impl DiscordConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        guild_id: String,
        bot_token: String,
    ) -> DiscordConfigBuilder {
        DiscordConfigBuilder::new(client_id, client_secret, redirect_uri, guild_id, bot_token)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    #[must_use]
    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    #[must_use]
    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[must_use]
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Returns the REST API base URL without a trailing slash.
    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    /// Returns the guild role to internal role table.
    #[must_use]
    pub fn role_map(&self) -> &HashMap<String, Role> {
        &self.role_map
    }
}

/// Builder for `DiscordConfig`.
#[derive(Debug)]
pub struct DiscordConfigBuilder {
    config: DiscordConfig,
}

impl DiscordConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        guild_id: String,
        bot_token: String,
    ) -> Self {
        Self {
            config: DiscordConfig {
                client_id,
                client_secret,
                redirect_uri,
                guild_id,
                bot_token,
                scopes: default_scopes(),
                authorize_url: default_authorize_url(),
                token_url: default_token_url(),
                api_base: default_api_base(),
                role_map: HashMap::new(),
            },
        }
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: &str) -> Self {
        if !self.config.scopes().contains(&scope) {
            self.config.scopes = format!("{},{scope}", self.config.scopes);
        }
        self
    }

    /// Overrides the provider endpoints, for tests and proxies.
    #[must_use]
    pub fn endpoints(mut self, authorize_url: String, token_url: String, api_base: String) -> Self {
        self.config.authorize_url = authorize_url;
        self.config.token_url = token_url;
        self.config.api_base = api_base;
        self
    }

    /// Maps a guild role ID to an internal role.
    #[must_use]
    pub fn role(mut self, guild_role_id: &str, role: Role) -> Self {
        self.config.role_map.insert(guild_role_id.to_string(), role);
        self
    }

    /// Builds the `DiscordConfig`.
    #[must_use]
    pub fn build(self) -> DiscordConfig {
        self.config
    }
}
