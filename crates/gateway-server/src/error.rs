//! Client-facing request errors.
//!
//! Every variant renders as the two-field body `{error, message}` with a fixed
//! message; the underlying cause is logged where it happens and never echoed.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Request-level gateway error
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No route matches the request
    #[error("no route for {0}")]
    NotFound(String),

    /// `/api/{service}` names a service that is not registered
    #[error("service {0:?} is not registered")]
    RouteNotFound(String),

    /// The backend could not be reached or did not answer in time
    #[error("backend {service:?} unavailable: {reason}")]
    BackendUnavailable { service: String, reason: String },

    /// Any other fault while handling the request
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new("Not found", "The requested endpoint was not found")
    }

    pub fn service_unavailable() -> Self {
        Self::new(
            "Service unavailable",
            "The requested MCP service is currently unavailable",
        )
    }

    pub fn internal() -> Self {
        Self::new("Internal server error", "An error occurred in the MCP Gateway")
    }

    pub fn too_many_requests() -> Self {
        Self::new(
            "Too many requests",
            "Too many requests, please try again later",
        )
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) | GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            GatewayError::NotFound(_) | GatewayError::RouteNotFound(_) => ErrorBody::not_found(),
            GatewayError::BackendUnavailable { .. } => ErrorBody::service_unavailable(),
            GatewayError::Internal(_) => ErrorBody::internal(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(cause) = &self {
            error!(error = %cause, "Gateway error");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

/// Response for an error body with an explicit status
pub fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}
