//! Discord implementation of [`IdentityProvider`].
//!
//! - Authorization and code exchange use the `oauth2` client
//! - The user id comes from `GET /users/@me` with the user's token
//! - Guild roles come from `GET /guilds/{guild}/members/{user}` with the
//!   bot token; a user outside the guild has no roles

use async_trait::async_trait;
use guildhall_access::{
    DiscordConfig, IdentityKind, IdentityProvider, ProviderError, ProviderStep, ProviderToken,
};
use guildhall_core::OAuthStateToken;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::StartupError;

/// Deadline for each Discord API call.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    roles: Vec<String>,
}

/// Discord OAuth and guild membership client.
#[derive(Clone)]
pub struct DiscordClient {
    config: DiscordConfig,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http: reqwest::Client,
}

impl DiscordClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: DiscordConfig) -> Result<Self, StartupError> {
        let auth_url = AuthUrl::new(config.authorize_url().to_string()).map_err(|e| {
            StartupError::Provider {
                details: format!("invalid authorize URL: {e}"),
            }
        })?;
        let token_url = TokenUrl::new(config.token_url().to_string()).map_err(|e| {
            StartupError::Provider {
                details: format!("invalid token URL: {e}"),
            }
        })?;
        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string()).map_err(|e| {
            StartupError::Provider {
                details: format!("invalid redirect URI: {e}"),
            }
        })?;

        // Following redirects during token exchange would leak the code.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| StartupError::Provider {
                details: format!("HTTP client error: {e}"),
            })?;

        Ok(Self {
            config,
            auth_url,
            token_url,
            redirect_url,
            http,
        })
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }
}

#[async_trait]
impl IdentityProvider for DiscordClient {
    fn kind(&self) -> IdentityKind {
        IdentityKind::Discord
    }

    fn authorization_url(&self, state: &OAuthStateToken) -> String {
        let client = BasicClient::new(ClientId::new(self.config.client_id().to_string()))
            .set_client_secret(ClientSecret::new(self.config.client_secret().to_string()))
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let state = state.as_str().to_string();
        let mut request = client.authorize_url(move || CsrfToken::new(state));
        for scope in self.config.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let (url, _) = request.url();
        url.to_string()
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, ProviderError> {
        let client = BasicClient::new(ClientId::new(self.config.client_id().to_string()))
            .set_client_secret(ClientSecret::new(self.config.client_secret().to_string()))
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::new(ProviderStep::CodeExchange, e.to_string()))?;

        Ok(ProviderToken::new(token.access_token().secret().clone()))
    }

    #[instrument(skip_all)]
    async fn fetch_user_id(&self, token: &ProviderToken) -> Result<String, ProviderError> {
        let step = ProviderStep::UserLookup;
        let user: DiscordUser = self
            .http
            .get(format!("{}/users/@me", self.config.api_base()))
            .bearer_auth(token.secret())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProviderError::new(step, e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::new(step, e.to_string()))?;

        if user.id.is_empty() {
            return Err(ProviderError::new(step, "empty user id"));
        }
        Ok(user.id)
    }

    #[instrument(skip(self))]
    async fn fetch_groups(&self, user_id: &str) -> Result<Vec<String>, ProviderError> {
        let step = ProviderStep::MembershipLookup;
        let response = self
            .http
            .get(format!(
                "{}/guilds/{}/members/{}",
                self.config.api_base(),
                self.config.guild_id(),
                user_id
            ))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.config.bot_token()),
            )
            .send()
            .await
            .map_err(|e| ProviderError::new(step, e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("user is not a guild member");
            return Ok(Vec::new());
        }

        let member: GuildMember = response
            .error_for_status()
            .map_err(|e| ProviderError::new(step, e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::new(step, e.to_string()))?;
        Ok(member.roles)
    }
}
