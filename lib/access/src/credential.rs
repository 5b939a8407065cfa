//! Credential verifiers.
//!
//! Two families of credentials are checked without touching the session
//! store:
//! - Password logins, verified against bcrypt hashes from the configuration
//! - Static HTTP Basic and bearer credentials provisioned by operators
//!
//! Neither family is persisted; both come from [`CredentialConfig`].

use guildhall_core::constant_time_eq;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::error::AccessError;
use crate::role::RoleSet;

/// A static HTTP Basic credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct BasicCredential {
    pub user: String,
    pub pass: String,
    #[serde(default)]
    pub roles: RoleSet,
}

/// A static bearer token.
#[derive(Clone, Serialize, Deserialize)]
pub struct BearerCredential {
    pub token: String,
    #[serde(default)]
    pub roles: RoleSet,
}

impl fmt::Debug for BasicCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredential")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerCredential")
            .field("token", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// A password login backed by a bcrypt hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordCredential {
    pub user: String,
    pub hash: String,
    #[serde(default)]
    pub roles: RoleSet,
}

/// Operator-provisioned credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Static HTTP Basic credentials.
    #[serde(default)]
    pub basic: Vec<BasicCredential>,
    /// Static bearer tokens.
    #[serde(default)]
    pub bearer: Vec<BearerCredential>,
    /// Password logins.
    #[serde(default)]
    pub passwords: Vec<PasswordCredential>,
}

/// Exact-match lookup of static Basic and bearer credentials.
///
/// Every entry is compared on every lookup so the time taken does not
/// depend on where, or whether, a match is found.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    basic: Vec<BasicCredential>,
    bearer: Vec<BearerCredential>,
}

impl StaticCredentials {
    /// Creates the tables from configuration.
    ///
    /// Entries with an empty secret are dropped: an empty password or token
    /// must never match.
    #[must_use]
    pub fn new(basic: Vec<BasicCredential>, bearer: Vec<BearerCredential>) -> Self {
        let basic: Vec<_> = basic
            .into_iter()
            .filter(|entry| !entry.user.is_empty() && !entry.pass.is_empty())
            .collect();
        let bearer: Vec<_> = bearer
            .into_iter()
            .filter(|entry| !entry.token.is_empty())
            .collect();
        debug!(
            basic = basic.len(),
            bearer = bearer.len(),
            "static credential tables loaded"
        );
        Self { basic, bearer }
    }

    /// Creates the tables from the credential configuration.
    #[must_use]
    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(config.basic.clone(), config.bearer.clone())
    }

    /// Returns the roles mapped to `(user, pass)`, if any.
    #[must_use]
    pub fn check_basic(&self, user: &str, pass: &str) -> Option<RoleSet> {
        let mut found = None;
        for entry in &self.basic {
            let user_ok = constant_time_eq(entry.user.as_bytes(), user.as_bytes());
            let pass_ok = constant_time_eq(entry.pass.as_bytes(), pass.as_bytes());
            if user_ok && pass_ok && found.is_none() {
                found = Some(entry.roles.clone());
            }
        }
        found
    }

    /// Returns the roles mapped to `token`, if any.
    #[must_use]
    pub fn check_bearer(&self, token: &str) -> Option<RoleSet> {
        let mut found = None;
        for entry in &self.bearer {
            if constant_time_eq(entry.token.as_bytes(), token.as_bytes()) && found.is_none() {
                found = Some(entry.roles.clone());
            }
        }
        found
    }
}

/// Password compared against the placeholder hash for logins that have no
/// usable hash of their own.
const PLACEHOLDER_PASSWORD: &str = "guildhall-placeholder";

/// Verifies username/password logins against configured bcrypt hashes.
///
/// Logins for unknown users, or users without a usable hash, are checked
/// against a placeholder hash of the configured cost so every failure pays
/// for one bcrypt verification.
#[derive(Debug, Clone)]
pub struct PasswordVerifier {
    entries: HashMap<String, PasswordCredential>,
    placeholder: Option<String>,
    #[cfg(test)]
    verifications: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl PasswordVerifier {
    /// Creates a verifier over the given password entries.
    ///
    /// The placeholder hash takes its cost from the first well-formed entry,
    /// or bcrypt's default cost when there is none. Without any entries
    /// there is no username to guess, and no placeholder is built.
    #[must_use]
    pub fn new(entries: Vec<PasswordCredential>) -> Self {
        let placeholder = if entries.is_empty() {
            None
        } else {
            let cost = entries
                .iter()
                .find_map(|entry| entry.hash.parse::<bcrypt::HashParts>().ok())
                .map_or(bcrypt::DEFAULT_COST, |parts| parts.get_cost());
            bcrypt::hash(PLACEHOLDER_PASSWORD, cost)
                .map_err(|e| warn!(cost, error = %e, "failed to build placeholder password hash"))
                .ok()
        };

        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.user.clone(), entry))
                .collect(),
            placeholder,
            #[cfg(test)]
            verifications: std::sync::Arc::default(),
        }
    }

    /// Creates a verifier from the credential configuration.
    #[must_use]
    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(config.passwords.clone())
    }

    /// Verifies `password` for `user`, returning the user's roles.
    ///
    /// The bcrypt comparison runs on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` for an unknown user, empty input, an
    /// empty or malformed hash, or a mismatched password. The cases are
    /// deliberately indistinguishable.
    pub async fn verify(&self, user: &str, password: &str) -> Result<RoleSet, AccessError> {
        let entry = self.entries.get(user);
        let usable = entry.filter(|entry| !entry.hash.is_empty());
        match (entry, usable) {
            (None, _) => debug!("password login for unknown user"),
            (Some(_), None) => warn!(user, "password login for user with empty hash"),
            _ => {}
        }

        let hash = match (usable, &self.placeholder) {
            (Some(entry), _) => entry.hash.clone(),
            (None, Some(placeholder)) => placeholder.clone(),
            (None, None) => return Err(AccessError::AuthenticationFailed),
        };
        let matched = self.check(password, hash).await.unwrap_or_else(|e| {
            warn!(user, error = %e, "stored password hash is unusable");
            false
        });

        match usable {
            Some(entry) if matched && !user.is_empty() && !password.is_empty() => {
                Ok(entry.roles.clone())
            }
            _ => Err(AccessError::AuthenticationFailed),
        }
    }

    async fn check(&self, password: &str, hash: String) -> Result<bool, String> {
        #[cfg(test)]
        self.verifications
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let password = password.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    fn teams() -> RoleSet {
        RoleSet::from_iter([Role::Teams])
    }

    fn statics() -> StaticCredentials {
        StaticCredentials::new(
            vec![BasicCredential {
                user: "uploader".to_string(),
                pass: "uploader".to_string(),
                roles: teams(),
            }],
            vec![BearerCredential {
                token: "ci-token".to_string(),
                roles: RoleSet::from_iter([Role::ReadConfig]),
            }],
        )
    }

    #[test]
    fn basic_exact_match() {
        assert_eq!(statics().check_basic("uploader", "uploader"), Some(teams()));
    }

    #[test]
    fn basic_mismatch_is_none() {
        let statics = statics();
        assert_eq!(statics.check_basic("uploader", "wrong"), None);
        assert_eq!(statics.check_basic("other", "uploader"), None);
        assert_eq!(statics.check_basic("", ""), None);
    }

    #[test]
    fn bearer_exact_match() {
        let statics = statics();
        assert_eq!(
            statics.check_bearer("ci-token"),
            Some(RoleSet::from_iter([Role::ReadConfig]))
        );
        assert_eq!(statics.check_bearer("ci-token "), None);
        assert_eq!(statics.check_bearer(""), None);
    }

    #[test]
    fn empty_configured_secrets_never_match() {
        let statics = StaticCredentials::new(
            vec![BasicCredential {
                user: "ghost".to_string(),
                pass: String::new(),
                roles: teams(),
            }],
            vec![BearerCredential {
                token: String::new(),
                roles: teams(),
            }],
        );
        assert_eq!(statics.check_basic("ghost", ""), None);
        assert_eq!(statics.check_bearer(""), None);
    }

    #[test]
    fn credential_config_deserializes() {
        let json = r#"{
            "basic": [{"user": "uploader", "pass": "uploader", "roles": ["teams"]}],
            "bearer": [{"token": "abc", "roles": ["read-config", "write-spreadsheet"]}]
        }"#;
        let config: CredentialConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.basic.len(), 1);
        assert_eq!(config.bearer[0].roles.len(), 2);
        assert!(config.passwords.is_empty());
    }

    fn verifier() -> PasswordVerifier {
        let hash = bcrypt::hash("hunter2", 4).expect("hash");
        PasswordVerifier::new(vec![
            PasswordCredential {
                user: "alice".to_string(),
                hash,
                roles: RoleSet::from_iter([Role::Member, Role::Leader]),
            },
            PasswordCredential {
                user: "nohash".to_string(),
                hash: String::new(),
                roles: teams(),
            },
            PasswordCredential {
                user: "garbage".to_string(),
                hash: "not-a-bcrypt-hash".to_string(),
                roles: teams(),
            },
        ])
    }

    #[tokio::test]
    async fn correct_password_returns_roles() {
        let roles = verifier().verify("alice", "hunter2").await.expect("verify");
        assert!(roles.contains(Role::Leader));
    }

    #[tokio::test]
    async fn every_failure_collapses_to_authentication_failed() {
        let verifier = verifier();
        for (user, password) in [
            ("alice", "wrong"),
            ("bob", "hunter2"),
            ("", "hunter2"),
            ("alice", ""),
            ("nohash", "anything"),
            ("garbage", "anything"),
        ] {
            assert_eq!(
                verifier.verify(user, password).await,
                Err(AccessError::AuthenticationFailed),
                "user={user:?}"
            );
        }
    }

    #[tokio::test]
    async fn every_failure_pays_for_a_bcrypt_verification() {
        let verifier = verifier();
        let attempts = [
            ("alice", "wrong"),
            ("mallory", "wrong"),
            ("nohash", "anything"),
            ("garbage", "anything"),
            ("", ""),
        ];
        for (user, password) in attempts {
            let _ = verifier.verify(user, password).await;
        }
        assert_eq!(
            verifier
                .verifications
                .load(std::sync::atomic::Ordering::SeqCst),
            attempts.len()
        );
    }

    #[tokio::test]
    async fn empty_table_rejects_without_placeholder() {
        let verifier = PasswordVerifier::new(Vec::new());
        assert!(verifier.placeholder.is_none());
        assert_eq!(
            verifier.verify("alice", "hunter2").await,
            Err(AccessError::AuthenticationFailed)
        );
    }

    #[test]
    fn placeholder_hash_uses_configured_cost() {
        let verifier = verifier();
        let placeholder = verifier.placeholder.as_deref().expect("placeholder hash");
        let parts: bcrypt::HashParts = placeholder.parse().expect("well-formed hash");
        assert_eq!(parts.get_cost(), 4);
    }

    #[test]
    fn debug_output_redacts_static_secrets() {
        let rendered = format!("{:?}", statics());
        assert!(rendered.contains("uploader"));
        assert!(!rendered.contains("ci-token"));
        assert!(rendered.matches("<redacted>").count() >= 2);

        let basic = BasicCredential {
            user: "uploader".to_string(),
            pass: "s3cret".to_string(),
            roles: teams(),
        };
        assert!(!format!("{basic:?}").contains("s3cret"));
    }
}
