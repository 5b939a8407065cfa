//! Cookies issued by the authentication routes.

use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::{Cookie, SameSite};
use guildhall_core::{OAuthSecret, SessionToken};
use std::net::IpAddr;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};

use crate::config::SessionConfig;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// OAuth secret cookie name (proof of possession during provider login).
pub const OAUTH_SECRET_COOKIE: &str = "oauth_secret";

/// Where to send the browser after a provider login.
pub const LOGIN_TARGET_COOKIE: &str = "login_target";

/// Returns the `Host` header value, if present and valid.
#[must_use]
pub fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|value| value.to_str().ok())
}

/// Returns the parent domain of `host` for scoping the session cookie.
///
/// `app.example.com` and `example.com` both yield `example.com`. IP
/// addresses and single-label hosts such as `localhost` yield `None`, which
/// leaves the cookie host-only.
#[must_use]
pub fn parent_domain(host: &str) -> Option<String> {
    if host.starts_with('[') {
        return None;
    }
    let name = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    if name.parse::<IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return None;
    }
    let parent = if labels.len() == 2 {
        labels.join(".")
    } else {
        labels[1..].join(".")
    };
    Some(parent.to_ascii_lowercase())
}

fn max_age(ttl: Duration) -> TimeDuration {
    TimeDuration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// Attributes applied to every cookie the server issues.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    domain: Option<String>,
    secure: bool,
}

impl CookiePolicy {
    #[must_use]
    pub fn new(domain: Option<String>, secure: bool) -> Self {
        Self { domain, secure }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.cookie_domain.clone(), config.secure_cookies)
    }

    fn domain_for(&self, host: Option<&str>) -> Option<String> {
        self.domain
            .clone()
            .or_else(|| host.and_then(parent_domain))
    }

    /// The session cookie: `Path=/`, `HttpOnly`, `SameSite=Strict`, scoped
    /// to the parent domain and expiring with the session.
    #[must_use]
    pub fn session(&self, host: Option<&str>, token: &SessionToken, ttl: Duration) -> Cookie<'static> {
        let mut cookie = Cookie::build((SESSION_COOKIE, token.as_str().to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .expires(OffsetDateTime::now_utc() + max_age(ttl))
            .build();
        if let Some(domain) = self.domain_for(host) {
            cookie.set_domain(domain);
        }
        cookie
    }

    /// Removal counterpart of [`CookiePolicy::session`].
    #[must_use]
    pub fn clear_session(&self, host: Option<&str>) -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE).path("/").build();
        if let Some(domain) = self.domain_for(host) {
            cookie.set_domain(domain);
        }
        cookie
    }

    /// The OAuth secret cookie.
    ///
    /// `SameSite=Lax` so it is sent on the top-level redirect back from the
    /// provider.
    #[must_use]
    pub fn oauth_secret(&self, secret: &OAuthSecret, ttl: Duration) -> Cookie<'static> {
        Cookie::build((OAUTH_SECRET_COOKIE, secret.as_str().to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(max_age(ttl))
            .build()
    }

    #[must_use]
    pub fn clear_oauth_secret(&self) -> Cookie<'static> {
        Cookie::build(OAUTH_SECRET_COOKIE).path("/").build()
    }

    /// Remembers where to send the browser once a provider login completes.
    #[must_use]
    pub fn login_target(&self, target: &str, ttl: Duration) -> Cookie<'static> {
        Cookie::build((LOGIN_TARGET_COOKIE, urlencoding::encode(target).into_owned()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(max_age(ttl))
            .build()
    }

    #[must_use]
    pub fn clear_login_target(&self) -> Cookie<'static> {
        Cookie::build(LOGIN_TARGET_COOKIE).path("/").build()
    }
}
