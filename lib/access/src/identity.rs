//! The authenticated principal attached to every request.
//!
//! An [`Identity`] is produced by the resolver for each request, exactly one
//! per request, and passed explicitly to handlers. Session-backed identities
//! are also the payload persisted by the session store.

use chrono::{DateTime, Utc};
use guildhall_core::SessionToken;
use serde::{Deserialize, Serialize};

use crate::role::{Role, RoleSet};

/// How an identity was established.
///
/// Recorded for auditing and display only; authorization never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// No credentials were presented.
    Anonymous,
    /// Username and password checked against a stored hash.
    Password,
    /// HTTP Basic credentials from the static table.
    Basic,
    /// Static bearer token from the configuration.
    Bearer,
    /// Discord OAuth login.
    Discord,
    /// API token minted from another session.
    ApiToken,
}

/// The resolved principal for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Session token this identity was loaded from. Never persisted: the
    /// token is the storage key, not part of the value.
    #[serde(skip)]
    key: Option<SessionToken>,
    kind: IdentityKind,
    roles: RoleSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
}

impl Identity {
    /// Creates an identity with the given provenance and roles.
    #[must_use]
    pub fn new(kind: IdentityKind, roles: RoleSet) -> Self {
        Self {
            key: None,
            kind,
            roles,
            expires_at: None,
            external_id: None,
        }
    }

    /// Creates the identity of an unauthenticated caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(IdentityKind::Anonymous, RoleSet::anonymous())
    }

    /// Sets the identity provider's user id.
    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Sets the absolute expiry.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub(crate) fn with_key(mut self, key: SessionToken) -> Self {
        self.key = Some(key);
        self
    }

    /// Returns the session token backing this identity, if any.
    #[must_use]
    pub fn key(&self) -> Option<&SessionToken> {
        self.key.as_ref()
    }

    /// Returns how this identity was established.
    #[must_use]
    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    /// Returns the granted roles.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Returns when the backing session expires, if known.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns the identity provider's user id, if any.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Returns true if this identity may access a route requiring `role`.
    ///
    /// Anonymous access is universally grantable, so `Role::Anonymous` is
    /// held by every identity regardless of its role set.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        role == Role::Anonymous || self.roles.contains(role)
    }

    /// Returns true if this identity is equivalent to an anonymous caller.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.kind == IdentityKind::Anonymous || self.roles.grants_nothing()
    }

    /// Narrows the role set to the roles in `requested`.
    ///
    /// `None` means no narrowing was asked for and leaves the identity
    /// unchanged. Any request, even one naming no recognised role, yields
    /// exactly the intersection; roles the identity does not hold are
    /// never granted.
    #[must_use]
    pub fn narrowed(mut self, requested: Option<&RoleSet>) -> Self {
        if let Some(requested) = requested {
            self.roles = self.roles.intersection(requested);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_with(roles: &[Role]) -> Identity {
        Identity::new(IdentityKind::Discord, roles.iter().copied().collect())
    }

    #[test]
    fn anonymous_role_is_held_by_every_identity() {
        let identities = [
            Identity::anonymous(),
            identity_with(&[]),
            identity_with(&[Role::Member]),
            identity_with(&[Role::Leader, Role::WriteSpreadsheet]),
        ];
        for identity in identities {
            assert!(identity.has_role(Role::Anonymous));
        }
    }

    #[test]
    fn has_role_requires_explicit_grant() {
        let identity = identity_with(&[Role::Leader]);
        assert!(identity.has_role(Role::Leader));
        // No implicit hierarchy.
        assert!(!identity.has_role(Role::Member));
    }

    #[test]
    fn zero_roles_is_anonymous() {
        assert!(identity_with(&[]).is_anonymous());
        assert!(Identity::anonymous().is_anonymous());
        assert!(!identity_with(&[Role::Member]).is_anonymous());
    }

    #[test]
    fn narrowing_yields_intersection() {
        let identity = identity_with(&[Role::Member, Role::Teams, Role::Leader]);
        let requested = RoleSet::from_iter([Role::Teams, Role::ReadConfig]);
        let narrowed = identity.narrowed(Some(&requested));
        assert_eq!(narrowed.roles(), &RoleSet::from_iter([Role::Teams]));
    }

    #[test]
    fn narrowing_never_escalates() {
        let identity = identity_with(&[Role::Member]);
        let narrowed = identity.narrowed(Some(&RoleSet::from_iter([Role::Leader])));
        assert!(!narrowed.has_role(Role::Leader));
        assert!(!narrowed.has_role(Role::Member));
        assert!(narrowed.is_anonymous());
    }

    #[test]
    fn absent_narrowing_request_is_noop() {
        let identity = identity_with(&[Role::Member, Role::Teams]);
        let narrowed = identity.clone().narrowed(None);
        assert_eq!(narrowed, identity);
    }

    #[test]
    fn narrowing_to_no_roles_drops_everything() {
        let identity = identity_with(&[Role::Member, Role::Teams]);
        let narrowed = identity.narrowed(Some(&RoleSet::none()));
        assert!(narrowed.is_anonymous());
    }

    #[test]
    fn narrowing_preserves_provenance() {
        let identity = identity_with(&[Role::Member]).with_external_id("1234");
        let narrowed = identity.narrowed(Some(&RoleSet::from_iter([Role::Member])));
        assert_eq!(narrowed.kind(), IdentityKind::Discord);
        assert_eq!(narrowed.external_id(), Some("1234"));
    }

    #[test]
    fn key_is_not_serialized() {
        let identity = identity_with(&[Role::Member]).with_key(SessionToken::from("tok"));
        let json = serde_json::to_string(&identity).expect("serialize");
        assert!(!json.contains("tok"));

        let parsed: Identity = serde_json::from_str(&json).expect("deserialize");
        assert!(parsed.key().is_none());
        assert_eq!(parsed.roles(), identity.roles());
    }

    #[test]
    fn serialized_format() {
        let identity = identity_with(&[Role::Member]).with_external_id("42");
        let json = serde_json::to_value(&identity).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "discord",
                "roles": ["member"],
                "external_id": "42",
            })
        );
    }
}
