//! Authentication routes: login, provider callback, logout and API tokens.

use axum::{
    Form,
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use guildhall_access::{CallbackParams, Identity, IdentityKind, ProviderLogin, RoleSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    AppState,
    cookies::{LOGIN_TARGET_COOKIE, OAUTH_SECRET_COOKIE, request_host},
    credentials::presented_session,
    mux::Authenticated,
};
use crate::api::ApiResponse;
use crate::error::{Denial, found};

/// Returns `target` if it is a same-site relative path, otherwise `/`.
#[must_use]
pub fn safe_target(target: Option<&str>) -> String {
    match target {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// Query carrying the post-login destination.
#[derive(Debug, Default, Deserialize)]
pub struct TargetQuery {
    #[serde(default)]
    pub target: Option<String>,
}

/// Password login form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Provider redirect and callback parameters.
#[derive(Debug, Default, Deserialize)]
pub struct DiscordParams {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

/// Landing page.
pub async fn home(Authenticated(identity): Authenticated) -> Html<String> {
    let status = if identity.is_anonymous() {
        r#"<a href="/login">Sign in</a>"#.to_string()
    } else {
        format!(
            r#"Signed in ({}). <a href="/logout">Sign out</a>"#,
            identity.roles()
        )
    };
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>guildhall</title></head><body><p>{status}</p></body></html>"
    ))
}

/// Login page stub.
pub async fn login_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TargetQuery>,
) -> Html<String> {
    let target = safe_target(query.target.as_deref());
    let target = urlencoding::encode(&target);
    let discord = if state.provider_login.is_some() {
        format!(r#"<p><a href="/auth/discord?target={target}">Sign in with Discord</a></p>"#)
    } else {
        String::new()
    };
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
<form method="post" action="{login}?target={target}">
<label>Username <input name="username" autocomplete="username"></label>
<label>Password <input name="password" type="password" autocomplete="current-password"></label>
<button type="submit">Sign in</button>
</form>
{discord}
</body>
</html>"#,
        login = state.login_path
    ))
}

/// Verifies a password login and starts a session.
pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TargetQuery>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let roles = match state.passwords.verify(&form.username, &form.password).await {
        Ok(roles) => roles,
        Err(e) => {
            warn!(error = %e, "password login rejected");
            return Denial::from(&e).into_response();
        }
    };

    let identity = Identity::new(IdentityKind::Password, roles).with_external_id(form.username);
    let token = match state.sessions.create_session(&identity, state.session_ttl).await {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "failed to create session");
            return Denial::from(&e).into_response();
        }
    };

    info!(
        user = identity.external_id(),
        session = %token.fingerprint(),
        "password login succeeded"
    );
    let cookie = state
        .cookies
        .session(request_host(&headers), &token, state.session_ttl);
    (jar.add(cookie), found(&safe_target(query.target.as_deref()))).into_response()
}

/// Provider login over query parameters.
pub async fn discord(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<DiscordParams>,
) -> Response {
    discord_flow(&state, &headers, jar, params).await
}

/// Provider callback delivered as a form post.
pub async fn discord_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(params): Form<DiscordParams>,
) -> Response {
    discord_flow(&state, &headers, jar, params).await
}

async fn discord_flow(
    state: &AppState,
    headers: &HeaderMap,
    jar: CookieJar,
    params: DiscordParams,
) -> Response {
    let Some(login) = &state.provider_login else {
        return Denial::NotFound.into_response();
    };

    match params.state {
        None => begin_provider_login(state, login, jar, params.target.as_deref()).await,
        Some(oauth_state) => {
            let callback = CallbackParams {
                state: oauth_state,
                code: params.code.unwrap_or_default(),
                secret: jar
                    .get(OAUTH_SECRET_COOKIE)
                    .map(|cookie| cookie.value().to_string())
                    .unwrap_or_default(),
            };
            complete_provider_login(state, login, headers, jar, callback).await
        }
    }
}

async fn begin_provider_login(
    state: &AppState,
    login: &ProviderLogin,
    jar: CookieJar,
    target: Option<&str>,
) -> Response {
    let redirect = match login.begin().await {
        Ok(redirect) => redirect,
        Err(e) => {
            error!(error = %e, "failed to begin provider login");
            return Denial::from(&e).into_response();
        }
    };

    let ttl = login.state_ttl();
    let jar = jar
        .add(state.cookies.oauth_secret(&redirect.secret, ttl))
        .add(state.cookies.login_target(&safe_target(target), ttl));
    (jar, found(&redirect.url)).into_response()
}

async fn complete_provider_login(
    state: &AppState,
    login: &ProviderLogin,
    headers: &HeaderMap,
    jar: CookieJar,
    callback: CallbackParams,
) -> Response {
    let target = jar
        .get(LOGIN_TARGET_COOKIE)
        .and_then(|cookie| urlencoding::decode(cookie.value()).ok().map(|t| t.into_owned()));
    let target = safe_target(target.as_deref());
    let jar = jar
        .remove(state.cookies.clear_oauth_secret())
        .remove(state.cookies.clear_login_target());

    match login.complete(&callback).await {
        Ok(established) => {
            let cookie = state.cookies.session(
                request_host(headers),
                &established.token,
                established.ttl,
            );
            (jar.add(cookie), found(&target)).into_response()
        }
        Err(e) => {
            if e.is_internal() {
                error!(error = %e, "provider login failed");
            } else {
                warn!(error = %e, "provider login rejected");
            }
            (jar, Denial::from(&e)).into_response()
        }
    }
}

/// Ends the presented session and clears the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let jar = jar.remove(state.cookies.clear_session(request_host(&headers)));

    if let Some(token) = presented_session(&headers) {
        if let Err(e) = state.sessions.delete_session(&token).await {
            error!(error = %e, "failed to delete session");
            return (jar, Denial::from(&e)).into_response();
        }
        info!(session = %token.fingerprint(), "session ended");
    }

    (jar, found("/")).into_response()
}

/// A freshly minted API token.
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub roles: RoleSet,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Shortest lifetime worth minting a token for.
const MIN_TOKEN_TTL: std::time::Duration = std::time::Duration::from_secs(1);

/// Mints an `api_token` session carrying the caller's (possibly narrowed)
/// roles.
///
/// The token never outlives the session it was minted from.
pub async fn api_token(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
) -> Response {
    let ttl = match caller.expires_at() {
        None => state.session_ttl,
        Some(expires_at) => match (expires_at - Utc::now()).to_std() {
            Ok(remaining) if remaining >= MIN_TOKEN_TTL => remaining.min(state.session_ttl),
            _ => {
                warn!(kind = ?caller.kind(), "API token requested by an expiring session");
                return Denial::Unauthorized.into_response();
            }
        },
    };

    let mut identity = Identity::new(IdentityKind::ApiToken, caller.roles().clone());
    if let Some(external_id) = caller.external_id() {
        identity = identity.with_external_id(external_id);
    }

    match state.sessions.create_session(&identity, ttl).await {
        Ok(token) => {
            info!(
                kind = ?caller.kind(),
                roles = %identity.roles(),
                session = %token.fingerprint(),
                "API token issued"
            );
            let expires_at = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| Utc::now().checked_add_signed(ttl));
            ApiResponse::Ok(IssuedToken {
                token: token.into_inner(),
                roles: identity.roles().clone(),
                expires_at,
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to issue API token");
            Denial::from(&e).into_response()
        }
    }
}

/// Describes the resolved caller.
pub async fn whoami(Authenticated(identity): Authenticated) -> ApiResponse<Identity> {
    ApiResponse::Ok(identity)
}
