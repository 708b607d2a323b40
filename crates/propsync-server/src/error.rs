// crates/propsync-server/src/error.rs
// ============================================================================
// Module: PropSync API Errors
// Description: HTTP error mapping for gateway, audit, and validation
//              failures.
// Purpose: Give every failure a stable status code and envelope shape.
// Dependencies: axum, propsync-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`ApiError`] is the single error type crossing handler boundaries. It
//! maps to `404` for missing records and collections, `400` for rejected
//! input, and `500` for storage failures, always with a
//! `{success: false, error}` body.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use propsync_core::AuditError;
use propsync_core::GatewayError;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: API Error
// ============================================================================

/// Handler-facing error with a stable HTTP mapping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The collection or record does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The request was rejected before any storage mutation.
    #[error("{0}")]
    Validation(String),
    /// Storage or serialization failed.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::NotFound(message) => Self::NotFound(message),
            GatewayError::Invalid(message) => Self::Validation(message),
            GatewayError::Io(_) | GatewayError::Unavailable(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(error: AuditError) -> Self {
        Self::Internal(error.to_string())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn maps_gateway_errors_to_statuses() {
        let not_found: ApiError = GatewayError::NotFound("missing".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid: ApiError = GatewayError::Invalid("bad field".to_string()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let io: ApiError = GatewayError::Io("disk gone".to_string()).into();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
