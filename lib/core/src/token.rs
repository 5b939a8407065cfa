//! Opaque random tokens.
//!
//! Session tokens and OAuth state/secret values are the only secrets the
//! access layer hands out. Each is 256 bits drawn from the operating system
//! CSPRNG and encoded as unpadded URL-safe base64, so they are safe to place
//! in cookies, headers and query strings without further escaping.
//!
//! Token types deliberately do not implement `Display`, and their `Debug`
//! output shows only a fingerprint, so a token cannot end up in a log line
//! by accident.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

/// Number of random bytes in every generated token.
pub const TOKEN_BYTES: usize = 32;

/// Error returned when the operating system random source fails.
///
/// There is no fallback source; callers must abort whatever they were
/// about to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomSourceError {
    /// The reason reported by the random source.
    pub reason: String,
}

impl fmt::Display for RandomSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "random source unavailable: {}", self.reason)
    }
}

impl std::error::Error for RandomSourceError {}

fn random_token() -> Result<String, RandomSourceError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| RandomSourceError {
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Compares two byte strings in constant time.
///
/// Length differences are still observable; every value compared through
/// this function is either fixed-length or operator-provisioned.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Macro to generate an opaque token wrapper around a random string.
macro_rules! define_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a new token from the operating system random source.
            ///
            /// # Errors
            ///
            /// Returns an error if the random source is unavailable.
            pub fn generate() -> Result<Self, RandomSourceError> {
                random_token().map(Self)
            }

            /// Wraps a token value received from a client or a store.
            #[must_use]
            pub fn new(value: String) -> Self {
                Self(value)
            }

            /// Returns the token value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the token, returning its value.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Returns true if the token value is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Returns a short, non-reversible identifier suitable for logs.
            #[must_use]
            pub fn fingerprint(&self) -> String {
                let digest = Sha256::digest(self.0.as_bytes());
                digest[..6].iter().map(|b| format!("{b:02x}")).collect()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.fingerprint())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_token!(
    /// Opaque bearer of an authenticated session.
    SessionToken
);

define_token!(
    /// Public half of an OAuth anti-CSRF pair, sent to the provider.
    OAuthStateToken
);

define_token!(
    /// Private half of an OAuth anti-CSRF pair, kept in an HTTP-only cookie.
    OAuthSecret
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_tokens_encode_full_entropy() {
        let token = SessionToken::generate().expect("random source");
        let decoded = URL_SAFE_NO_PAD
            .decode(token.as_str())
            .expect("url-safe base64");
        assert_eq!(decoded.len(), TOKEN_BYTES);
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let tokens: HashSet<_> = (0..64)
            .map(|_| SessionToken::generate().expect("random source"))
            .collect();
        assert_eq!(tokens.len(), 64);
    }

    #[test]
    fn debug_output_hides_token_value() {
        let token = SessionToken::new("super-secret-value".to_string());
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.starts_with("SessionToken("));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = OAuthStateToken::from("abc");
        let b = OAuthStateToken::from("abc".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
        assert_ne!(a.fingerprint(), OAuthStateToken::from("abd").fingerprint());
    }

    #[test]
    fn constant_time_eq_matches_only_identical_input() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn token_serializes_transparently() {
        let secret = OAuthSecret::from("s3cret");
        let json = serde_json::to_string(&secret).expect("serialize");
        assert_eq!(json, "\"s3cret\"");
        let parsed: OAuthSecret = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, secret);
    }
}
