//! Resolution of request credentials into an [`Identity`].
//!
//! Credentials are tried in a fixed order and the first that yields an
//! identity wins:
//! 1. HTTP Basic against the static table
//! 2. Bearer against the static table
//! 3. Bearer as a session token
//! 4. The session cookie as a session token
//! 5. Anonymous
//!
//! Rejected credentials fall through to the next step. Store and decode
//! failures do not fall through: they are returned so the caller fails
//! closed instead of quietly serving the request as anonymous.

use guildhall_core::SessionToken;
use tracing::{debug, instrument};

use crate::credential::StaticCredentials;
use crate::error::AccessError;
use crate::identity::{Identity, IdentityKind};
use crate::role::RoleSet;
use crate::session::SessionStore;

/// Raw credentials extracted from a request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Decoded HTTP Basic `(user, pass)`.
    pub basic: Option<(String, String)>,
    /// Bearer token from the `Authorization` header.
    pub bearer: Option<String>,
    /// Value of the session cookie.
    pub session_cookie: Option<String>,
}

impl Credentials {
    /// Returns true if no credential was presented.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.basic.is_none() && self.bearer.is_none() && self.session_cookie.is_none()
    }
}

/// Resolves request credentials into identities.
#[derive(Clone)]
pub struct IdentityResolver {
    statics: StaticCredentials,
    sessions: SessionStore,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(statics: StaticCredentials, sessions: SessionStore) -> Self {
        Self { statics, sessions }
    }

    /// Returns the session store backing session lookups.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Resolves `credentials` to an identity, falling back to anonymous.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` or `DecodeFailure` if a session lookup could
    /// not be completed.
    #[instrument(skip_all)]
    pub async fn resolve(&self, credentials: &Credentials) -> Result<Identity, AccessError> {
        if let Some((user, pass)) = &credentials.basic {
            if let Some(roles) = self.statics.check_basic(user, pass) {
                debug!(kind = "basic", "credential accepted");
                return Ok(Identity::new(IdentityKind::Basic, roles).with_external_id(user.clone()));
            }
        }

        if let Some(bearer) = &credentials.bearer {
            if let Some(roles) = self.statics.check_bearer(bearer) {
                debug!(kind = "bearer", "credential accepted");
                return Ok(Identity::new(IdentityKind::Bearer, roles));
            }
            if let Some(identity) = self.lookup_session(bearer).await? {
                return Ok(identity);
            }
        }

        if let Some(cookie) = &credentials.session_cookie {
            if let Some(identity) = self.lookup_session(cookie).await? {
                return Ok(identity);
            }
        }

        Ok(Identity::anonymous())
    }

    /// Resolves `credentials` and narrows the result to `requested` roles.
    ///
    /// `None` leaves the resolved identity unchanged.
    ///
    /// # Errors
    ///
    /// See [`IdentityResolver::resolve`].
    pub async fn resolve_narrowed(
        &self,
        credentials: &Credentials,
        requested: Option<&RoleSet>,
    ) -> Result<Identity, AccessError> {
        Ok(self.resolve(credentials).await?.narrowed(requested))
    }

    async fn lookup_session(&self, token: &str) -> Result<Option<Identity>, AccessError> {
        let token = SessionToken::from(token);
        match self.sessions.get_session(&token).await {
            Ok(identity) => {
                debug!(session = %token.fingerprint(), "session accepted");
                Ok(Some(identity))
            }
            Err(AccessError::SessionNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
