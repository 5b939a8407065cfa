//! Error types for the HTTP surface.
//!
//! Authorization denials are rendered as user-safe responses. Internal
//! detail is logged where the failure is observed, never returned.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use guildhall_access::AccessError;
use std::fmt;

use crate::api::{ApiResponse, Empty};

/// Why a request was not served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Anonymous browser on a page route: send it to the login page.
    LoginRedirect { location: String },
    /// Missing or insufficient credentials.
    Unauthorized,
    /// Requested resource does not exist or is not enabled.
    NotFound,
    /// Infrastructure failure. The request fails closed.
    Internal,
}

impl Denial {
    /// Builds a login redirect to `login_path` carrying `target`.
    #[must_use]
    pub fn login_redirect(login_path: &str, target: &str) -> Self {
        Self::LoginRedirect {
            location: format!("{login_path}?target={}", urlencoding::encode(target)),
        }
    }
}

impl From<&AccessError> for Denial {
    fn from(err: &AccessError) -> Self {
        if err.is_internal() {
            Self::Internal
        } else {
            Self::Unauthorized
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        match self {
            Self::LoginRedirect { location } => found(&location),
            Self::Unauthorized => {
                ApiResponse::<Empty>::error(StatusCode::UNAUTHORIZED, "unauthorized")
                    .into_response()
            }
            Self::NotFound => {
                ApiResponse::<Empty>::error(StatusCode::NOT_FOUND, "not found").into_response()
            }
            Self::Internal => ApiResponse::<Empty>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            )
            .into_response(),
        }
    }
}

/// A `302 Found` redirect to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::error!("redirect location is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}

/// Errors that prevent the server from starting.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded or is inconsistent.
    Config { details: String },
    /// The key-value store could not be set up.
    Store { details: String },
    /// The identity provider client could not be built.
    Provider { details: String },
    /// The listener could not be bound.
    Bind { addr: String, details: String },
    /// The server stopped with an I/O error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Store { details } => write!(f, "store setup failed: {details}"),
            Self::Provider { details } => write!(f, "identity provider setup failed: {details}"),
            Self::Bind { addr, details } => write!(f, "failed to bind to {addr}: {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}
