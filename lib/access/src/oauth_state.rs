//! Anti-CSRF state exchange for provider logins.
//!
//! Beginning a login produces two independent random values. The `state`
//! travels to the provider and comes back on the callback URL; the `secret`
//! stays with the browser in an HTTP-only cookie and is stored server-side
//! under `oauth_state:<state>`. A callback is accepted only when both halves
//! are presented and match, which a cross-site request forger cannot do
//! because it cannot read the victim's cookie.

use guildhall_core::{OAuthSecret, OAuthStateToken, constant_time_eq};
use guildhall_kv::KvStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::AccessError;
use crate::session::{DEFAULT_STORE_TIMEOUT, bounded};

/// Key namespace for pending OAuth states.
pub const OAUTH_STATE_PREFIX: &str = "oauth_state:";

/// How long a login attempt may take between redirect and callback.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(300);

/// The two halves of a freshly issued state pair.
#[derive(Debug, Clone)]
pub struct OAuthBegin {
    /// Sent to the provider as the `state` parameter.
    pub state: OAuthStateToken,
    /// Retained by the client for proof of possession.
    pub secret: OAuthSecret,
}

/// Short-lived, single-use OAuth state persistence.
#[derive(Clone)]
pub struct OAuthStateStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    timeout: Duration,
}

impl OAuthStateStore {
    /// Creates a state store over `kv` with the default TTL.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            ttl: DEFAULT_STATE_TTL,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Sets how long issued states remain valid.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the deadline applied to each store call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns how long issued states remain valid.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn state_key(state: &str) -> String {
        format!("{OAUTH_STATE_PREFIX}{state}")
    }

    /// Issues a new state/secret pair and persists the secret.
    ///
    /// # Errors
    ///
    /// Returns `RandomSourceFailure` if the random source fails and
    /// `StoreFailure` if the secret cannot be persisted.
    #[instrument(skip(self))]
    pub async fn begin_oauth(&self) -> Result<OAuthBegin, AccessError> {
        let state = OAuthStateToken::generate().map_err(|e| AccessError::RandomSourceFailure {
            details: e.to_string(),
        })?;
        let secret = OAuthSecret::generate().map_err(|e| AccessError::RandomSourceFailure {
            details: e.to_string(),
        })?;

        let key = Self::state_key(state.as_str());
        let value = secret.as_str().as_bytes().to_vec();
        bounded(self.timeout, "begin_oauth", self.kv.set(&key, value, self.ttl)).await?;

        debug!(state = %state.fingerprint(), "OAuth state issued");
        Ok(OAuthBegin { state, secret })
    }

    /// Returns true only if `secret` is the one issued with `state`.
    ///
    /// Empty inputs and unknown states fail without comparison. A state is
    /// spent by the first validation attempt, successful or not.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` if the store cannot be consulted. Callers must
    /// treat that as a failed validation.
    #[instrument(skip_all)]
    pub async fn validate_state(&self, state: &str, secret: &str) -> Result<bool, AccessError> {
        if state.is_empty() || secret.is_empty() {
            warn!("OAuth callback missing state or secret");
            return Ok(false);
        }

        let key = Self::state_key(state);
        let Some(stored) = bounded(self.timeout, "validate_state", self.kv.take(&key)).await?
        else {
            warn!("OAuth callback with unknown or expired state");
            return Ok(false);
        };

        if stored.is_empty() || !constant_time_eq(&stored, secret.as_bytes()) {
            warn!("OAuth callback secret mismatch");
            return Ok(false);
        }

        Ok(true)
    }
}
