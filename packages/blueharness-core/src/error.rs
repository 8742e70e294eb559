//! Centralized error types for the BlueHarness core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::adapter::AdapterError;

/// Application-wide error type for the BlueHarness endpoint.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Platform adapter could not be reached or queried.
    ///
    /// Fatal at startup: the endpoint must not come up with an ambiguous
    /// capability set.
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// A service module failed to construct during composition.
    #[error("Failed to initialize service {service}: {reason}")]
    ServiceInit {
        /// Name of the service whose constructor failed.
        service: &'static str,
        /// Human-readable failure description.
        reason: String,
    },

    /// Failed to bind the RPC listener to its port.
    #[error("Failed to bind RPC listener: {0}")]
    Bind(#[source] std::io::Error),

    /// The listener task failed while serving or draining.
    #[error("Listener error: {0}")]
    Listener(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced entity (connection, stream, channel) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Adapter(_) => "adapter_error",
            Self::ServiceInit { .. } => "service_init_failed",
            Self::Bind(_) => "bind_failed",
            Self::Listener(_) => "listener_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for HarnessError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = HarnessError::NotFound("connection abc".into());
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let err = HarnessError::InvalidRequest("missing field".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn startup_errors_map_to_500() {
        let err = HarnessError::ServiceInit {
            service: "Host",
            reason: "boom".into(),
        };
        assert_eq!(err.code(), "service_init_failed");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
