//! Error types for the access crate.
//!
//! Authentication outcomes (`AuthenticationFailed`, `SessionNotFound`,
//! `InvalidState`, `NotAMember`, `ProviderFailure`) are reported to HTTP
//! callers as a bare "unauthorized" so they cannot be used as an oracle.
//! Infrastructure failures (`StoreFailure`, `DecodeFailure`,
//! `RandomSourceFailure`) always fail closed.

use std::fmt;

/// Step of a provider-backed login that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStep {
    /// Exchanging the authorization code for an access token.
    CodeExchange,
    /// Looking up the provider user id.
    UserLookup,
    /// Looking up the user's group memberships.
    MembershipLookup,
}

impl fmt::Display for ProviderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeExchange => f.write_str("code exchange"),
            Self::UserLookup => f.write_str("user lookup"),
            Self::MembershipLookup => f.write_str("membership lookup"),
        }
    }
}

/// Errors from identity, session and login operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Credentials were rejected. Never says which check failed.
    AuthenticationFailed,
    /// The session token is unknown or has expired.
    SessionNotFound,
    /// The OAuth state/secret pair did not validate.
    InvalidState,
    /// The provider login mapped to no internal role.
    NotAMember,
    /// A call to the identity provider failed.
    ProviderFailure { step: ProviderStep, details: String },
    /// The key-value store was unreachable, erroring or too slow.
    StoreFailure { details: String },
    /// A stored payload could not be decoded.
    DecodeFailure { details: String },
    /// The operating system random source failed.
    RandomSourceFailure { details: String },
}

impl AccessError {
    /// Returns true for infrastructure failures that must be treated as
    /// internal errors rather than authentication outcomes.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::StoreFailure { .. } | Self::DecodeFailure { .. } | Self::RandomSourceFailure { .. }
        )
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::SessionNotFound => write!(f, "session not found"),
            Self::InvalidState => write!(f, "invalid OAuth state"),
            Self::NotAMember => write!(f, "no recognized membership"),
            Self::ProviderFailure { step, details } => {
                write!(f, "identity provider {step} failed: {details}")
            }
            Self::StoreFailure { details } => write!(f, "session store failure: {details}"),
            Self::DecodeFailure { details } => {
                write!(f, "stored session could not be decoded: {details}")
            }
            Self::RandomSourceFailure { details } => {
                write!(f, "token generation failed: {details}")
            }
        }
    }
}

impl std::error::Error for AccessError {}
