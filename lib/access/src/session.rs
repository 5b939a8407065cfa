//! Session persistence in the key-value store.
//!
//! A session is a serialized [`Identity`] stored under `sessions:<token>`
//! with a TTL equal to its grant duration. Sessions are never mutated in
//! place: re-authentication creates a new session with a new token, and
//! logout deletes the key.

use chrono::Utc;
use guildhall_core::SessionToken;
use guildhall_kv::{KvError, KvStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::error::AccessError;
use crate::identity::Identity;

/// Key namespace for persisted sessions.
pub const SESSION_PREFIX: &str = "sessions:";

/// Upper bound on any single store call made by the access layer.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs a store call under a deadline, mapping every failure to
/// [`AccessError::StoreFailure`].
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    op: &'static str,
    call: F,
) -> Result<T, AccessError>
where
    F: Future<Output = guildhall_core::Result<T, KvError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(report)) => {
            error!(op, error = %report, "key-value store call failed");
            Err(AccessError::StoreFailure {
                details: report.to_string(),
            })
        }
        Err(_) => {
            error!(op, ?timeout, "key-value store call timed out");
            Err(AccessError::StoreFailure {
                details: format!("{op} timed out after {timeout:?}"),
            })
        }
    }
}

/// Opaque-token-keyed, TTL-bound session persistence.
///
/// Cheap to clone; clones share the same backing store.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    timeout: Duration,
}

impl SessionStore {
    /// Creates a session store over `kv`.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Sets the deadline applied to each store call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the store key for a session token.
    #[must_use]
    pub fn session_key(token: &SessionToken) -> String {
        format!("{SESSION_PREFIX}{}", token.as_str())
    }

    /// Persists `identity` under a fresh random token that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `RandomSourceFailure` if no token could be generated and
    /// `StoreFailure` if the write fails.
    #[instrument(skip_all, fields(kind = ?identity.kind(), ttl = ?ttl))]
    pub async fn create_session(
        &self,
        identity: &Identity,
        ttl: Duration,
    ) -> Result<SessionToken, AccessError> {
        let token = SessionToken::generate().map_err(|e| AccessError::RandomSourceFailure {
            details: e.to_string(),
        })?;

        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        let stored = identity.clone().with_expires_at(expires_at);
        let payload = serde_json::to_vec(&stored).map_err(|e| AccessError::DecodeFailure {
            details: e.to_string(),
        })?;

        let key = Self::session_key(&token);
        bounded(self.timeout, "create_session", self.kv.set(&key, payload, ttl)).await?;

        debug!(session = %token.fingerprint(), "session created");
        Ok(token)
    }

    /// Loads the identity stored for `token`.
    ///
    /// The returned identity carries `token` as its key.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session is absent or expired,
    /// `StoreFailure` on store errors and `DecodeFailure` if the stored
    /// payload is malformed.
    #[instrument(skip_all, fields(session = %token.fingerprint()))]
    pub async fn get_session(&self, token: &SessionToken) -> Result<Identity, AccessError> {
        if token.is_empty() {
            return Err(AccessError::SessionNotFound);
        }

        let key = Self::session_key(token);
        let payload = bounded(self.timeout, "get_session", self.kv.get(&key))
            .await?
            .ok_or(AccessError::SessionNotFound)?;

        let identity: Identity = serde_json::from_slice(&payload).map_err(|e| {
            error!(error = %e, "stored session payload is malformed");
            AccessError::DecodeFailure {
                details: e.to_string(),
            }
        })?;

        Ok(identity.with_key(token.clone()))
    }

    /// Deletes the session for `token`. Deleting an absent session succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` if the store fails.
    #[instrument(skip_all, fields(session = %token.fingerprint()))]
    pub async fn delete_session(&self, token: &SessionToken) -> Result<(), AccessError> {
        let key = Self::session_key(token);
        bounded(self.timeout, "delete_session", self.kv.delete(&key)).await?;
        debug!("session deleted");
        Ok(())
    }
}
