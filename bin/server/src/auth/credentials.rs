//! Extraction of credentials from request headers.

use axum::http::{HeaderMap, header};
use axum_extra::extract::CookieJar;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use guildhall_access::{Credentials, Role, RoleSet};
use guildhall_core::SessionToken;

use super::cookies::SESSION_COOKIE;

/// Query parameter naming a role to narrow to. May be repeated.
pub const ROLE_PARAM: &str = "role";

/// Collects every credential the request presents.
#[must_use]
pub fn extract_credentials(headers: &HeaderMap) -> Credentials {
    let mut credentials = Credentials::default();

    if let Some((scheme, value)) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
    {
        let value = value.trim();
        if scheme.eq_ignore_ascii_case("basic") {
            credentials.basic = decode_basic(value);
        } else if scheme.eq_ignore_ascii_case("bearer") && !value.is_empty() {
            credentials.bearer = Some(value.to_string());
        }
    }

    credentials.session_cookie = CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    credentials
}

fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Returns the session token presented by bearer header or cookie.
#[must_use]
pub fn presented_session(headers: &HeaderMap) -> Option<SessionToken> {
    let credentials = extract_credentials(headers);
    credentials
        .bearer
        .or(credentials.session_cookie)
        .map(SessionToken::from)
}

/// Parses the repeated `role` query parameter.
///
/// Returns `None` when no non-empty `role` value is present. Unknown names
/// are dropped from the returned set, so a request naming only unknown
/// roles narrows to nothing.
#[must_use]
pub fn requested_roles(query: Option<&str>) -> Option<RoleSet> {
    let values: Vec<&str> = query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, value)| *name == ROLE_PARAM && !value.is_empty())
        .map(|(_, value)| value)
        .collect();
    if values.is_empty() {
        return None;
    }

    Some(
        values
            .into_iter()
            .filter_map(|value| {
                let value = value.replace('+', " ");
                urlencoding::decode(&value)
                    .ok()
                    .and_then(|name| name.parse::<Role>().ok())
            })
            .collect(),
    )
}
