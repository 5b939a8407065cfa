//! Role-gated routing.
//!
//! Every route is registered with exactly one required role. The gate
//! resolves the caller's identity, applies `role` narrowing, checks the
//! required role and only then dispatches. Handlers receive the identity
//! explicitly through the [`Authenticated`] extractor.

use axum::{
    Router,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use guildhall_access::{Identity, Role};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::AppState;
use super::credentials::{extract_credentials, requested_roles};
use crate::error::Denial;

/// How a route's clients expect to be denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Browsable page: anonymous callers are redirected to log in.
    Page,
    /// Programmatic API: callers always get a structured 401.
    Api,
}

#[derive(Clone)]
struct Gate {
    state: Arc<AppState>,
    required: Role,
    surface: Surface,
}

/// Router that binds each route to a required role.
pub struct Mux {
    router: Router<Arc<AppState>>,
    state: Arc<AppState>,
}

impl Mux {
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            router: Router::new(),
            state,
        }
    }

    /// Registers a browsable route requiring `required`.
    #[must_use]
    pub fn page(self, path: &str, required: Role, route: MethodRouter<Arc<AppState>>) -> Self {
        self.bind(path, required, Surface::Page, route)
    }

    /// Registers an API route requiring `required`.
    #[must_use]
    pub fn api(self, path: &str, required: Role, route: MethodRouter<Arc<AppState>>) -> Self {
        self.bind(path, required, Surface::Api, route)
    }

    fn bind(
        mut self,
        path: &str,
        required: Role,
        surface: Surface,
        route: MethodRouter<Arc<AppState>>,
    ) -> Self {
        let gate = Gate {
            state: self.state.clone(),
            required,
            surface,
        };
        self.router = self
            .router
            .route(path, route.route_layer(middleware::from_fn_with_state(gate, authorize)));
        self
    }

    /// Finishes registration.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router.with_state(self.state)
    }
}

async fn authorize(State(gate): State<Gate>, mut request: Request, next: Next) -> Response {
    let credentials = extract_credentials(request.headers());
    let requested = requested_roles(request.uri().query());

    let identity = match gate
        .state
        .resolver
        .resolve_narrowed(&credentials, requested.as_ref())
        .await
    {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, path = %request.uri().path(), "identity resolution failed");
            return Denial::Internal.into_response();
        }
    };

    if identity.has_role(gate.required) {
        debug!(
            kind = ?identity.kind(),
            required = %gate.required,
            path = %request.uri().path(),
            "access granted"
        );
        request.extensions_mut().insert(identity);
        return next.run(request).await;
    }

    if gate.surface == Surface::Page && identity.is_anonymous() {
        let target = request
            .uri()
            .path_and_query()
            .map_or_else(|| request.uri().path(), |pq| pq.as_str());
        debug!(required = %gate.required, redirect_target = %target, "anonymous caller sent to login");
        return Denial::login_redirect(&gate.state.login_path, target).into_response();
    }

    if identity.is_anonymous() {
        debug!(required = %gate.required, path = %request.uri().path(), "anonymous caller denied");
    } else {
        warn!(
            kind = ?identity.kind(),
            roles = %identity.roles(),
            required = %gate.required,
            path = %request.uri().path(),
            "insufficient role"
        );
    }
    Denial::Unauthorized.into_response()
}

/// The identity the gate resolved for this request.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Denial;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| {
                error!("handler reached without a resolved identity");
                Denial::Internal
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{self, basic, body_json};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
        routing::get,
    };
    use guildhall_access::{Identity, IdentityKind, RoleSet, SessionStore};
    use guildhall_kv::MemoryKv;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn counting_router(state: Arc<AppState>, hits: Arc<AtomicUsize>) -> Router {
        let members = hits.clone();
        let teams = hits.clone();
        let api_teams = hits;
        Mux::new(state)
            .page(
                "/members",
                Role::Member,
                get(move |Authenticated(identity): Authenticated| async move {
                    members.fetch_add(1, Ordering::SeqCst);
                    format!("{:?}", identity.kind())
                }),
            )
            .page(
                "/uploads",
                Role::Teams,
                get(move || async move {
                    teams.fetch_add(1, Ordering::SeqCst);
                    "uploads"
                }),
            )
            .api(
                "/api/uploads",
                Role::Teams,
                get(move || async move {
                    api_teams.fetch_add(1, Ordering::SeqCst);
                    "uploads"
                }),
            )
            .api(
                "/api/roles",
                Role::Anonymous,
                get(|Authenticated(identity): Authenticated| async move {
                    identity.roles().to_string()
                }),
            )
            .into_router()
    }

    async fn session_cookie(kv: Arc<MemoryKv>, roles: &[Role]) -> String {
        let identity = Identity::new(IdentityKind::Password, roles.iter().copied().collect());
        let token = SessionStore::new(kv)
            .create_session(&identity, Duration::from_secs(60))
            .await
            .expect("create session");
        format!("session={}", token.as_str())
    }

    #[tokio::test]
    async fn anonymous_page_request_redirects_to_login() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = counting_router(testing::state(Arc::new(MemoryKv::new())), hits.clone());

        let response = app
            .oneshot(Request::get("/members").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/login?target=%2Fmembers"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn static_basic_credentials_reach_handler_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = counting_router(testing::state(Arc::new(MemoryKv::new())), hits.clone());

        let response = app
            .oneshot(
                Request::get("/uploads")
                    .header(header::AUTHORIZATION, basic("uploader", "uploader"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn insufficient_session_role_is_unauthorized_without_redirect() {
        let kv = Arc::new(MemoryKv::new());
        let cookie = session_cookie(kv.clone(), &[Role::Member]).await;
        let hits = Arc::new(AtomicUsize::new(0));
        let app = counting_router(testing::state(kv), hits.clone());

        let response = app
            .oneshot(
                Request::get("/uploads")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::LOCATION).is_none());
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], 401);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn anonymous_api_request_gets_structured_401() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = counting_router(testing::state(Arc::new(MemoryKv::new())), hits.clone());

        let response = app
            .oneshot(Request::get("/api/uploads").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "unauthorized");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_identity_reaches_handler() {
        let kv = Arc::new(MemoryKv::new());
        let cookie = session_cookie(kv.clone(), &[Role::Member]).await;
        let app = counting_router(testing::state(kv), Arc::new(AtomicUsize::new(0)));

        let response = app
            .oneshot(
                Request::get("/members")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        assert_eq!(&body[..], b"Password");
    }

    #[tokio::test]
    async fn role_query_narrows_before_check() {
        let kv = Arc::new(MemoryKv::new());
        let cookie = session_cookie(kv.clone(), &[Role::Member, Role::Teams]).await;
        let hits = Arc::new(AtomicUsize::new(0));
        let app = counting_router(testing::state(kv), hits.clone());

        let narrowed = app
            .clone()
            .oneshot(
                Request::get("/api/roles?role=member&role=leader")
                    .header(header::COOKIE, cookie.clone())
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let body = axum::body::to_bytes(narrowed.into_body(), 1024)
            .await
            .expect("body");
        assert_eq!(&body[..], b"[member]");

        let denied = app
            .oneshot(
                Request::get("/api/uploads?role=member")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn anonymous_route_admits_everyone() {
        let app = counting_router(
            testing::state(Arc::new(MemoryKv::new())),
            Arc::new(AtomicUsize::new(0)),
        );

        let response = app
            .oneshot(Request::get("/api/roles").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        assert_eq!(&body[..], b"[anonymous]");
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = counting_router(testing::broken_state(), hits.clone());

        let response = app
            .oneshot(
                Request::get("/members")
                    .header(header::COOKIE, "session=whatever")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_cookie_is_treated_as_anonymous() {
        let app = counting_router(
            testing::state(Arc::new(MemoryKv::new())),
            Arc::new(AtomicUsize::new(0)),
        );

        let response = app
            .oneshot(
                Request::get("/members?tab=1")
                    .header(header::COOKIE, "session=expired-or-forged")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/login?target=%2Fmembers%3Ftab%3D1"
        );
    }

    #[test]
    fn empty_role_query_is_a_noop() {
        let identity = Identity::new(IdentityKind::Basic, RoleSet::from_iter([Role::Leader]));
        let narrowed = identity.clone().narrowed(requested_roles(Some("")).as_ref());
        assert_eq!(narrowed.roles(), identity.roles());
    }
}
