//! Error types for the gatehouse engine and its stores

use thiserror::Error;

use crate::domain::ParseEnumError;

/// Errors surfaced by lifecycle operations and stores
#[derive(Error, Debug)]
pub enum GateError {
    /// Missing, malformed or expired caller credential
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Operator credential with no tenant on the token or the profile
    #[error("tenant could not be resolved for operator {0}")]
    TenantUnresolved(String),

    /// Tenant or role mismatch
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Entity not found
    #[error("{entity_type} not found: {entity_id}")]
    NotFound {
        entity_type: &'static str,
        entity_id: String,
    },

    /// Malformed request body or identifier
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Current status does not permit the requested transition
    #[error("illegal state transition for {entity_type}/{entity_id}: {from} -> {to}")]
    IllegalStateTransition {
        entity_type: &'static str,
        entity_id: String,
        from: String,
        to: String,
    },

    /// Amenity not operational or capacity exceeded
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Date or time precondition not met
    #[error("out of window: {0}")]
    OutOfWindow(String),

    /// Malformed, forged or wrong-typed QR credential
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Competing reservation already holds the slot
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    pub fn not_found(entity_type: &'static str, entity_id: impl ToString) -> Self {
        GateError::NotFound {
            entity_type,
            entity_id: entity_id.to_string(),
        }
    }

    pub fn illegal_transition(
        entity_type: &'static str,
        entity_id: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        GateError::IllegalStateTransition {
            entity_type,
            entity_id: entity_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Database failures that may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            GateError::Database(err) => super::is_retryable_db_error(err),
            _ => false,
        }
    }
}

impl From<ParseEnumError> for GateError {
    fn from(err: ParseEnumError) -> Self {
        GateError::InvalidInput(err.to_string())
    }
}

/// Result type for gatehouse operations
pub type Result<T> = std::result::Result<T, GateError>;
