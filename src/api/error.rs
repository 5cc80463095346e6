//! Structured API error responses with error codes
//!
//! Every failure leaves the service as `{"error": {code, numeric_code, message, ...}}` plus an
//! `x-error-code` header.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::infra::GateError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication (1xxx)
    /// No bearer credential provided
    AuthRequired,
    /// Malformed, forged or unknown-kind credential
    InvalidToken,
    TokenExpired,
    /// Role or tenant does not permit the action
    Forbidden,
    /// Operator credential with no linked tenant
    TenantUnresolved,

    // Rate limiting (2xxx)
    RateLimitExceeded,

    // Validation (3xxx)
    InvalidRequestBody,
    InvalidFieldValue,
    /// QR credential malformed, forged or of the wrong type
    InvalidCredential,

    // Resource (4xxx)
    ResourceNotFound,

    // Conflict (5xxx)
    /// Slot already held by another reservation
    SlotConflict,

    // State (7xxx)
    InvalidStateTransition,
    ResourceUnavailable,
    OutOfWindow,

    // Infrastructure (8xxx)
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::AuthRequired => 1001,
            ErrorCode::InvalidToken => 1002,
            ErrorCode::TokenExpired => 1003,
            ErrorCode::Forbidden => 1004,
            ErrorCode::TenantUnresolved => 1005,

            ErrorCode::RateLimitExceeded => 2001,

            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::InvalidFieldValue => 3002,
            ErrorCode::InvalidCredential => 3003,

            ErrorCode::ResourceNotFound => 4001,

            ErrorCode::SlotConflict => 5001,

            ErrorCode::InvalidStateTransition => 7001,
            ErrorCode::ResourceUnavailable => 7002,
            ErrorCode::OutOfWindow => 7003,

            ErrorCode::DatabaseError => 8001,
            ErrorCode::InternalError => 8999,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthRequired | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::Forbidden | ErrorCode::TenantUnresolved => StatusCode::FORBIDDEN,

            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::InvalidRequestBody
            | ErrorCode::InvalidFieldValue
            | ErrorCode::InvalidCredential
            | ErrorCode::InvalidStateTransition
            | ErrorCode::ResourceUnavailable
            | ErrorCode::OutOfWindow => StatusCode::BAD_REQUEST,

            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,

            ErrorCode::SlotConflict => StatusCode::CONFLICT,

            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::TenantUnresolved => "TENANT_UNRESOLVED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::InvalidCredential => "INVALID_CREDENTIAL",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::SlotConflict => "SLOT_CONFLICT",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::ResourceUnavailable => "RESOURCE_UNAVAILABLE",
            ErrorCode::OutOfWindow => "OUT_OF_WINDOW",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Seconds until the rate-limit window resets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                retry_after: None,
                resource_id: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.error.retry_after = Some(seconds);
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error.code.as_str();
        let mut response = (status, Json(self)).into_response();

        response.headers_mut().insert(
            axum::http::header::HeaderName::from_static("x-error-code"),
            axum::http::HeaderValue::from_static(code),
        );

        response
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Unauthenticated(msg) => ApiError::new(ErrorCode::AuthRequired, msg),
            GateError::TenantUnresolved(operator) => ApiError::new(
                ErrorCode::TenantUnresolved,
                format!("no tenant linked to operator {operator}"),
            ),
            GateError::Forbidden(msg) => ApiError::new(ErrorCode::Forbidden, msg),
            GateError::NotFound {
                entity_type,
                entity_id,
            } => ApiError::new(
                ErrorCode::ResourceNotFound,
                format!("{entity_type} not found: {entity_id}"),
            )
            .with_resource_id(entity_id),
            GateError::InvalidInput(msg) => ApiError::new(ErrorCode::InvalidFieldValue, msg),
            GateError::IllegalStateTransition {
                entity_type,
                entity_id,
                from,
                to,
            } => ApiError::new(
                ErrorCode::InvalidStateTransition,
                format!("cannot move {entity_type} {entity_id} from {from} to {to}"),
            )
            .with_details(serde_json::json!({
                "entity_type": entity_type,
                "entity_id": entity_id,
                "from_state": from,
                "to_state": to,
            })),
            GateError::ResourceUnavailable(msg) => {
                ApiError::new(ErrorCode::ResourceUnavailable, msg)
            }
            GateError::OutOfWindow(msg) => ApiError::new(ErrorCode::OutOfWindow, msg),
            GateError::InvalidCredential(msg) => ApiError::new(ErrorCode::InvalidCredential, msg),
            GateError::Conflict(msg) => ApiError::new(ErrorCode::SlotConflict, msg),
            GateError::Database(e) => {
                tracing::error!(error = %e, "database error");
                ApiError::new(ErrorCode::DatabaseError, "database error")
            }
            GateError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ApiError::new(ErrorCode::InternalError, "internal error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth => {
                ApiError::new(ErrorCode::AuthRequired, "missing authentication")
            }
            AuthError::TokenExpired => ApiError::new(ErrorCode::TokenExpired, "token expired"),
            AuthError::RateLimited => {
                ApiError::new(ErrorCode::RateLimitExceeded, "rate limit exceeded")
                    .with_retry_after(60)
            }
            AuthError::TenantUnresolved(id) => ApiError::new(
                ErrorCode::TenantUnresolved,
                format!("no tenant linked to operator {id}"),
            ),
            AuthError::Lookup(msg) => {
                tracing::error!(error = %msg, "tenant lookup failed");
                ApiError::new(ErrorCode::InternalError, "internal error")
            }
            other @ (AuthError::InvalidToken(_)
            | AuthError::UnknownKind(_)
            | AuthError::MissingTenant) => {
                ApiError::new(ErrorCode::InvalidToken, other.to_string())
            }
        }
    }
}

/// Rejected JSON bodies use the envelope too
impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        ApiError::new(ErrorCode::InvalidFieldValue, rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        ApiError::new(ErrorCode::InvalidFieldValue, rejection.body_text())
    }
}

pub fn validation_error(field: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidFieldValue, message.into())
        .with_details(serde_json::json!({ "field": field }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numeric() {
        assert_eq!(ErrorCode::AuthRequired.numeric_code(), 1001);
        assert_eq!(ErrorCode::RateLimitExceeded.numeric_code(), 2001);
        assert_eq!(ErrorCode::InvalidRequestBody.numeric_code(), 3001);
        assert_eq!(ErrorCode::ResourceNotFound.numeric_code(), 4001);
        assert_eq!(ErrorCode::SlotConflict.numeric_code(), 5001);
        assert_eq!(ErrorCode::InvalidStateTransition.numeric_code(), 7001);
        assert_eq!(ErrorCode::InternalError.numeric_code(), 8999);
    }

    #[test]
    fn test_gate_error_status_mapping() {
        let cases = [
            (GateError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (GateError::TenantUnresolved("op".into()), StatusCode::FORBIDDEN),
            (GateError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (GateError::not_found("booking", "b"), StatusCode::NOT_FOUND),
            (GateError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                GateError::illegal_transition("booking", "b", "pending", "checked-in"),
                StatusCode::BAD_REQUEST,
            ),
            (GateError::ResourceUnavailable("x".into()), StatusCode::BAD_REQUEST),
            (GateError::OutOfWindow("x".into()), StatusCode::BAD_REQUEST),
            (GateError::InvalidCredential("x".into()), StatusCode::BAD_REQUEST),
            (GateError::Conflict("x".into()), StatusCode::CONFLICT),
            (GateError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_message_is_not_leaked() {
        let api = ApiError::from(GateError::Internal("pool exploded at 10.0.0.3".into()));
        assert_eq!(api.error.message, "internal error");
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            ApiError::from(AuthError::TokenExpired).error.code,
            ErrorCode::TokenExpired
        );
        let limited = ApiError::from(AuthError::RateLimited);
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.error.retry_after, Some(60));
        assert_eq!(
            ApiError::from(AuthError::MissingTenant).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = ApiError::from(GateError::not_found("guest", "g-1"));
        let json = serde_json::to_string(&error).unwrap();

        assert!(json.contains("RESOURCE_NOT_FOUND"));
        assert!(json.contains("4001"));
        assert!(json.contains("\"resource_id\":\"g-1\""));
    }

    #[test]
    fn test_response_carries_code_header() {
        let response = ApiError::from(GateError::Conflict("slot taken".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()["x-error-code"], "SLOT_CONFLICT");
    }
}
