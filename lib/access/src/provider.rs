//! External identity provider login flow.
//!
//! A provider-backed login runs strictly in sequence:
//! 1. Begin: issue an OAuth state pair and send the caller to the provider.
//! 2. Validate the returned state against the caller's secret.
//! 3. Exchange the authorization code for a provider access token.
//! 4. Look up the provider user id.
//! 5. Look up the user's group memberships.
//! 6. Map groups to internal roles; unknown groups are ignored.
//! 7. Refuse the login if no group mapped to a role.
//! 8. Persist a session and hand its token back.
//!
//! Nothing is persisted before step 8, so a failure at any earlier step
//! needs no rollback.

use async_trait::async_trait;
use guildhall_core::{OAuthSecret, OAuthStateToken, SessionToken};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{AccessError, ProviderStep};
use crate::identity::{Identity, IdentityKind};
use crate::oauth_state::OAuthStateStore;
use crate::role::{Role, RoleSet};
use crate::session::SessionStore;

/// Access token issued by an identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderToken(String);

impl ProviderToken {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderToken(..)")
    }
}

/// Error from a single provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub step: ProviderStep,
    pub details: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(step: ProviderStep, details: impl Into<String>) -> Self {
        Self {
            step,
            details: details.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.details)
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for AccessError {
    fn from(err: ProviderError) -> Self {
        AccessError::ProviderFailure {
            step: err.step,
            details: err.details,
        }
    }
}

/// An OAuth identity provider with group memberships.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provenance recorded on identities from this provider.
    fn kind(&self) -> IdentityKind;

    /// Returns the URL that starts a login carrying `state`.
    fn authorization_url(&self, state: &OAuthStateToken) -> String;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, ProviderError>;

    /// Returns the provider's id for the token's user.
    async fn fetch_user_id(&self, token: &ProviderToken) -> Result<String, ProviderError>;

    /// Returns the provider group identifiers the user belongs to.
    async fn fetch_groups(&self, user_id: &str) -> Result<Vec<String>, ProviderError>;
}

/// Fixed lookup table from provider group identifiers to internal roles.
#[derive(Debug, Clone, Default)]
pub struct GroupRoleMap {
    groups: HashMap<String, Role>,
}

impl GroupRoleMap {
    #[must_use]
    pub fn new(groups: HashMap<String, Role>) -> Self {
        Self { groups }
    }

    /// Maps each group to at most one role, ignoring unknown groups.
    #[must_use]
    pub fn map<S: AsRef<str>>(&self, groups: &[S]) -> RoleSet {
        groups
            .iter()
            .filter_map(|group| self.groups.get(group.as_ref()).copied())
            .collect()
    }
}

/// A login redirect ready to be sent to the caller.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    /// Provider URL to redirect to.
    pub url: String,
    /// Secret the caller must present on the callback.
    pub secret: OAuthSecret,
}

/// Parameters received on the provider callback.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub state: String,
    pub code: String,
    /// Secret from the caller's cookie.
    pub secret: String,
}

/// A completed provider login.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub token: SessionToken,
    pub identity: Identity,
    pub ttl: Duration,
}

/// Drives provider logins from redirect to session.
#[derive(Clone)]
pub struct ProviderLogin {
    provider: Arc<dyn IdentityProvider>,
    states: OAuthStateStore,
    sessions: SessionStore,
    roles: GroupRoleMap,
    session_ttl: Duration,
}

impl ProviderLogin {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        states: OAuthStateStore,
        sessions: SessionStore,
        roles: GroupRoleMap,
        session_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            states,
            sessions,
            roles,
            session_ttl,
        }
    }

    /// Returns how long the caller must keep the OAuth secret.
    #[must_use]
    pub fn state_ttl(&self) -> Duration {
        self.states.ttl()
    }

    /// Starts a login: issues a state pair and builds the provider URL.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` or `RandomSourceFailure` if the state pair
    /// cannot be issued.
    pub async fn begin(&self) -> Result<LoginRedirect, AccessError> {
        let begin = self.states.begin_oauth().await?;
        Ok(LoginRedirect {
            url: self.provider.authorization_url(&begin.state),
            secret: begin.secret,
        })
    }

    /// Completes a login from the provider callback.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the state pair does not validate,
    /// `ProviderFailure` if any provider call fails, `NotAMember` if no
    /// group maps to a role, and `StoreFailure` if the session cannot be
    /// persisted.
    #[instrument(skip_all, fields(kind = ?self.provider.kind()))]
    pub async fn complete(&self, params: &CallbackParams) -> Result<EstablishedSession, AccessError> {
        if !self
            .states
            .validate_state(&params.state, &params.secret)
            .await?
        {
            return Err(AccessError::InvalidState);
        }

        if params.code.is_empty() {
            return Err(ProviderError::new(ProviderStep::CodeExchange, "missing code").into());
        }

        let token = self.provider.exchange_code(&params.code).await?;
        let user_id = self.provider.fetch_user_id(&token).await?;
        let groups = self.provider.fetch_groups(&user_id).await?;

        let roles = self.roles.map(&groups);
        if roles.is_empty() {
            warn!(user_id = %user_id, groups = groups.len(), "provider login without mapped role");
            return Err(AccessError::NotAMember);
        }

        let identity = Identity::new(self.provider.kind(), roles).with_external_id(user_id);
        let session = self
            .sessions
            .create_session(&identity, self.session_ttl)
            .await?;

        info!(
            user_id = identity.external_id(),
            roles = %identity.roles(),
            "provider login succeeded"
        );
        Ok(EstablishedSession {
            token: session,
            identity,
            ttl: self.session_ttl,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use guildhall_kv::MemoryKv;
    use std::sync::Mutex;

    /// Scripted provider for exercising the login flow.
    #[derive(Default)]
    pub(crate) struct FakeProvider {
        pub fail_at: Option<ProviderStep>,
        pub user_id: String,
        pub groups: Vec<String>,
        pub calls: Mutex<Vec<ProviderStep>>,
    }

    impl FakeProvider {
        pub(crate) fn member_of(user_id: &str, groups: &[&str]) -> Self {
            Self {
                user_id: user_id.to_string(),
                groups: groups.iter().map(|g| (*g).to_string()).collect(),
                ..Self::default()
            }
        }

        fn record(&self, step: ProviderStep) -> Result<(), ProviderError> {
            self.calls.lock().expect("calls lock").push(step);
            if self.fail_at == Some(step) {
                return Err(ProviderError::new(step, "scripted failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn kind(&self) -> IdentityKind {
            IdentityKind::Discord
        }

        fn authorization_url(&self, state: &OAuthStateToken) -> String {
            format!("https://provider.test/authorize?state={}", state.as_str())
        }

        async fn exchange_code(&self, code: &str) -> Result<ProviderToken, ProviderError> {
            self.record(ProviderStep::CodeExchange)?;
            Ok(ProviderToken::new(format!("token-for-{code}")))
        }

        async fn fetch_user_id(&self, _token: &ProviderToken) -> Result<String, ProviderError> {
            self.record(ProviderStep::UserLookup)?;
            Ok(self.user_id.clone())
        }

        async fn fetch_groups(&self, _user_id: &str) -> Result<Vec<String>, ProviderError> {
            self.record(ProviderStep::MembershipLookup)?;
            Ok(self.groups.clone())
        }
    }

    pub(crate) fn role_map() -> GroupRoleMap {
        GroupRoleMap::new(HashMap::from([
            ("g-member".to_string(), Role::Member),
            ("g-prod".to_string(), Role::ProductionTeam),
        ]))
    }

    fn flow(provider: FakeProvider, kv: Arc<MemoryKv>) -> (ProviderLogin, Arc<FakeProvider>) {
        let provider = Arc::new(provider);
        let login = ProviderLogin::new(
            provider.clone(),
            OAuthStateStore::new(kv.clone()),
            SessionStore::new(kv),
            role_map(),
            Duration::from_secs(3600),
        );
        (login, provider)
    }

    fn secret_from(redirect: &LoginRedirect) -> (String, String) {
        let state = redirect
            .url
            .split("state=")
            .nth(1)
            .expect("state in url")
            .to_string();
        (state, redirect.secret.as_str().to_string())
    }

    #[test]
    fn group_map_ignores_unknown_groups() {
        let roles = role_map().map(&["g-member", "g-unknown", "g-prod", "g-member"]);
        assert_eq!(
            roles,
            RoleSet::from_iter([Role::Member, Role::ProductionTeam])
        );
        assert!(role_map().map::<&str>(&[]).is_empty());
    }

    #[tokio::test]
    async fn successful_login_creates_session() {
        let kv = Arc::new(MemoryKv::new());
        let (login, _) = flow(
            FakeProvider::member_of("80351110224678912", &["g-member", "g-other"]),
            kv.clone(),
        );

        let redirect = login.begin().await.expect("begin");
        let (state, secret) = secret_from(&redirect);
        let established = login
            .complete(&CallbackParams {
                state,
                code: "code-1".to_string(),
                secret,
            })
            .await
            .expect("complete");

        assert_eq!(established.identity.kind(), IdentityKind::Discord);
        assert_eq!(
            established.identity.external_id(),
            Some("80351110224678912")
        );

        let sessions = SessionStore::new(kv.clone());
        let stored = sessions
            .get_session(&established.token)
            .await
            .expect("persisted");
        assert_eq!(stored.roles(), &RoleSet::from_iter([Role::Member]));
        // The OAuth state was spent; only the session remains.
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn no_mapped_role_is_not_a_member_and_persists_nothing() {
        let kv = Arc::new(MemoryKv::new());
        let (login, _) = flow(
            FakeProvider::member_of("42", &["g-unknown"]),
            kv.clone(),
        );

        let redirect = login.begin().await.expect("begin");
        let (state, secret) = secret_from(&redirect);
        let result = login
            .complete(&CallbackParams {
                state,
                code: "code-1".to_string(),
                secret,
            })
            .await;

        assert!(matches!(result, Err(AccessError::NotAMember)));
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn invalid_state_stops_before_provider_calls() {
        let kv = Arc::new(MemoryKv::new());
        let (login, provider) = flow(FakeProvider::member_of("42", &["g-member"]), kv.clone());

        let redirect = login.begin().await.expect("begin");
        let (state, _) = secret_from(&redirect);
        let result = login
            .complete(&CallbackParams {
                state,
                code: "code-1".to_string(),
                secret: "forged".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AccessError::InvalidState)));
        assert!(provider.calls.lock().expect("calls lock").is_empty());
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn provider_failures_abort_login() {
        for step in [
            ProviderStep::CodeExchange,
            ProviderStep::UserLookup,
            ProviderStep::MembershipLookup,
        ] {
            let kv = Arc::new(MemoryKv::new());
            let provider = FakeProvider {
                fail_at: Some(step),
                ..FakeProvider::member_of("42", &["g-member"])
            };
            let (login, _) = flow(provider, kv.clone());

            let redirect = login.begin().await.expect("begin");
            let (state, secret) = secret_from(&redirect);
            let result = login
                .complete(&CallbackParams {
                    state,
                    code: "code-1".to_string(),
                    secret,
                })
                .await;

            match result {
                Err(AccessError::ProviderFailure { step: failed, .. }) => assert_eq!(failed, step),
                other => panic!("expected provider failure at {step}, got {other:?}"),
            }
            assert!(kv.is_empty());
        }
    }

    #[tokio::test]
    async fn missing_code_is_rejected() {
        let kv = Arc::new(MemoryKv::new());
        let (login, provider) = flow(FakeProvider::member_of("42", &["g-member"]), kv);

        let redirect = login.begin().await.expect("begin");
        let (state, secret) = secret_from(&redirect);
        let result = login
            .complete(&CallbackParams {
                state,
                code: String::new(),
                secret,
            })
            .await;

        assert!(matches!(
            result,
            Err(AccessError::ProviderFailure {
                step: ProviderStep::CodeExchange,
                ..
            })
        ));
        assert!(provider.calls.lock().expect("calls lock").is_empty());
    }
}
