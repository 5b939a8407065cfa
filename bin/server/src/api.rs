//! Structured responses for API clients.
//!
//! Every API response carries a `status` discriminator. Successful
//! responses flatten their payload next to it; errors carry a numeric
//! `code` mirroring the HTTP status and a human-readable `message`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// An API response body.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Ok(T),
    Error { code: u16, message: String },
}

impl<T> ApiResponse<T> {
    /// Builds an error response for `status`.
    #[must_use]
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Error {
            code: status.as_u16(),
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Ok(_) => StatusCode::OK,
            Self::Error { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Payload-free success.
#[derive(Debug, Serialize)]
pub struct Empty {}
