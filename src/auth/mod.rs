//! Tenant guard: caller authentication and tenant scoping
//!
//! Every request carries `Authorization: Bearer <jwt>`. The token header's `kid` names the
//! credential kind (`resident`, `operator`, `device`) and each kind has its own signing secret,
//! so the verifier never tries one secret after another.
//!
//! # Roles
//!
//! - `resident`: books amenities, registers guests, reads own records
//! - `operator`: society staff; approves, overrides and reads the tenant's ledger
//! - `device`: a gate scanner; submits scans only
//!
//! # Rate Limiting
//!
//! Optional per-tenant fixed window, configured with `RATE_LIMIT_PER_MINUTE`.

mod jwt;
mod middleware;

pub use jwt::*;
pub use middleware::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{ParseEnumError, TenantId};
use crate::infra::GateError;

/// Caller role, also the credential kind carried in the token `kid`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Resident,
    Operator,
    Device,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Resident, Role::Operator, Role::Device];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Resident => "resident",
            Role::Operator => "operator",
            Role::Device => "device",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resident" => Ok(Role::Resident),
            "operator" => Ok(Role::Operator),
            "device" => Ok(Role::Device),
            other => Err(ParseEnumError::new("credential kind", other)),
        }
    }
}

/// Authenticated caller. Always fully populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub subject_id: Uuid,
    pub tenant_id: TenantId,
    pub role: Role,
}

impl AuthContext {
    pub fn new(subject_id: Uuid, tenant_id: TenantId, role: Role) -> Self {
        Self {
            subject_id,
            tenant_id,
            role,
        }
    }

    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }

    pub fn is_resident(&self) -> bool {
        self.role == Role::Resident
    }

    /// Operators and gate devices may submit scans
    pub fn is_gate_staff(&self) -> bool {
        matches!(self.role, Role::Operator | Role::Device)
    }

    /// Fail closed when an entity belongs to another tenant
    pub fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), GateError> {
        if self.tenant_id == tenant_id {
            Ok(())
        } else {
            Err(GateError::Forbidden(
                "entity belongs to another tenant".to_string(),
            ))
        }
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<(), GateError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(GateError::Forbidden(format!(
                "{} credentials cannot perform this action",
                self.role
            )))
        }
    }
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authentication")]
    MissingAuth,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("unknown credential kind: {0}")]
    UnknownKind(String),

    #[error("credential has no tenant")]
    MissingTenant,

    #[error("no tenant linked to operator {0}")]
    TenantUnresolved(Uuid),

    #[error("tenant lookup failed: {0}")]
    Lookup(String),

    #[error("rate limit exceeded")]
    RateLimited,
}

impl From<AuthError> for GateError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TenantUnresolved(id) => GateError::TenantUnresolved(id.to_string()),
            AuthError::Lookup(msg) => GateError::Internal(msg),
            other => GateError::Unauthenticated(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_tenant() {
        let tenant = TenantId::new();
        let ctx = AuthContext::new(Uuid::new_v4(), tenant, Role::Operator);
        assert!(ctx.ensure_tenant(tenant).is_ok());
        assert!(matches!(
            ctx.ensure_tenant(TenantId::new()),
            Err(GateError::Forbidden(_))
        ));
    }

    #[test]
    fn test_require_role() {
        let ctx = AuthContext::new(Uuid::new_v4(), TenantId::new(), Role::Device);
        assert!(ctx.is_gate_staff());
        assert!(ctx.require_role(&[Role::Operator, Role::Device]).is_ok());
        assert!(matches!(
            ctx.require_role(&[Role::Resident]),
            Err(GateError::Forbidden(_))
        ));
    }

    #[test]
    fn test_auth_error_mapping() {
        let id = Uuid::new_v4();
        assert!(matches!(
            GateError::from(AuthError::TenantUnresolved(id)),
            GateError::TenantUnresolved(_)
        ));
        assert!(matches!(
            GateError::from(AuthError::TokenExpired),
            GateError::Unauthenticated(_)
        ));
    }
}
