//! Role types for route-level access control.
//!
//! Roles are capability tiers granted to an identity at authentication time
//! and required by routes at dispatch time. They form no hierarchy: holding
//! `leader` does not imply `member`. Any tiering is expressed by which roles
//! a route requires and which roles a login grants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A capability tier checked by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Granted to everyone, including unauthenticated callers.
    Anonymous,
    /// Community member.
    Member,
    /// Team uploaders.
    Teams,
    /// Production team.
    ProductionTeam,
    /// Community leadership.
    Leader,
    /// May read service configuration.
    ReadConfig,
    /// May write to the backing spreadsheets.
    WriteSpreadsheet,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 7] = [
        Role::Anonymous,
        Role::Member,
        Role::Teams,
        Role::ProductionTeam,
        Role::Leader,
        Role::ReadConfig,
        Role::WriteSpreadsheet,
    ];

    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Member => "member",
            Self::Teams => "teams",
            Self::ProductionTeam => "production-team",
            Self::Leader => "leader",
            Self::ReadConfig => "read-config",
            Self::WriteSpreadsheet => "write-spreadsheet",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// An ordered set of roles. Duplicates are impossible by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: BTreeSet<Role>,
}

impl RoleSet {
    /// Creates an empty role set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates the role set held by unauthenticated callers.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::from_iter([Role::Anonymous])
    }

    /// Adds a role. Returns false if it was already present.
    pub fn insert(&mut self, role: Role) -> bool {
        self.roles.insert(role)
    }

    /// Returns true if `role` was granted explicitly.
    ///
    /// This is a plain membership test; use
    /// [`Identity::has_role`](crate::Identity::has_role) for authorization.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns true if the set grants nothing beyond anonymous access.
    #[must_use]
    pub fn grants_nothing(&self) -> bool {
        self.roles.iter().all(|role| *role == Role::Anonymous)
    }

    /// Returns the roles present in both `self` and `requested`.
    ///
    /// Narrowing can only remove roles, never add them.
    #[must_use]
    pub fn intersection(&self, requested: &RoleSet) -> RoleSet {
        Self {
            roles: self.roles.intersection(&requested.roles).copied().collect(),
        }
    }

    /// Returns the number of roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if there are no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Iterates over the roles in order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.roles.iter().map(Role::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
