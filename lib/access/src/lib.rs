//! Identity, session and role-based access control for guildhall.
//!
//! This crate provides:
//! - Closed role enumeration and role sets (`Role`, `RoleSet`)
//! - The resolved principal of a request (`Identity`)
//! - TTL-bound session persistence (`SessionStore`)
//! - Anti-CSRF OAuth state exchange (`OAuthStateStore`)
//! - Password, Basic and bearer credential verifiers
//! - Provider-backed login (`IdentityProvider`, `ProviderLogin`)
//! - Credential resolution in priority order (`IdentityResolver`)
//!
//! # Access Control Model
//!
//! Every route requires exactly one role. Roles form no hierarchy: a route
//! requiring `leader` is not reachable with `member`, however many other
//! roles the caller holds. `anonymous` is held by everyone.
//!
//! # Example
//!
//! ```
//! use guildhall_access::{Identity, IdentityKind, Role, RoleSet};
//!
//! let identity = Identity::new(
//!     IdentityKind::Password,
//!     RoleSet::from_iter([Role::Member, Role::Leader]),
//! );
//! assert!(identity.has_role(Role::Anonymous));
//!
//! // Narrowing to a role the identity does not hold never grants it.
//! let narrowed = identity.narrowed(Some(&RoleSet::from_iter([Role::Member, Role::Teams])));
//! assert!(narrowed.has_role(Role::Member));
//! assert!(!narrowed.has_role(Role::Leader));
//! assert!(!narrowed.has_role(Role::Teams));
//! ```

pub mod credential;
pub mod discord;
pub mod error;
pub mod identity;
pub mod oauth_state;
pub mod provider;
pub mod resolver;
pub mod role;
pub mod session;

pub use credential::{
    BasicCredential, BearerCredential, CredentialConfig, PasswordCredential, PasswordVerifier,
    StaticCredentials,
};
pub use discord::{DiscordConfig, DiscordConfigBuilder};
pub use error::{AccessError, ProviderStep};
pub use identity::{Identity, IdentityKind};
pub use oauth_state::{OAuthBegin, OAuthStateStore};
pub use provider::{
    CallbackParams, EstablishedSession, GroupRoleMap, IdentityProvider, LoginRedirect,
    ProviderError, ProviderLogin, ProviderToken,
};
pub use resolver::{Credentials, IdentityResolver};
pub use role::{Role, RoleSet, UnknownRole};
pub use session::SessionStore;
