//! JWT credentials keyed by credential kind
//!
//! Header `kid` selects the signing context; the claims repeat the kind so a token cannot be
//! re-labelled by editing its header.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthContext, AuthError, Role};
use crate::domain::TenantId;
use crate::infra::DirectoryStore;

/// Caller credential claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (resident, operator or device id)
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    /// Credential kind, must equal the header `kid`
    pub kind: String,
    /// Tenant scope; older operator tokens omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Verifies and issues caller credentials, resolving the caller's tenant.
pub struct TenantGuard {
    keys: HashMap<Role, KindKeys>,
    issuer: String,
    audience: String,
    directory: Option<Arc<dyn DirectoryStore>>,
}

impl TenantGuard {
    pub fn new(issuer: &str, audience: &str) -> Self {
        Self {
            keys: HashMap::new(),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            directory: None,
        }
    }

    /// Register the signing secret for one credential kind
    pub fn with_secret(mut self, role: Role, secret: &[u8]) -> Self {
        self.keys.insert(
            role,
            KindKeys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            },
        );
        self
    }

    /// Directory used for the legacy operator tenant lookup
    pub fn with_directory(mut self, directory: Arc<dyn DirectoryStore>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Issue a credential for `subject_id`
    pub fn issue(
        &self,
        role: Role,
        subject_id: Uuid,
        tenant_id: Option<TenantId>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let keys = self
            .keys
            .get(&role)
            .ok_or_else(|| AuthError::UnknownKind(role.to_string()))?;

        let now = Utc::now();
        let claims = Claims {
            sub: subject_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind: role.to_string(),
            tenant: tenant_id.map(|t| t.to_string()),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(role.to_string());

        encode(&header, &claims, &keys.encoding).map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Verify signature, expiry, issuer and audience with the key for the declared kind.
    pub fn verify(&self, token: &str) -> Result<(Role, Claims), AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid".to_string()))?;
        let role: Role = kid
            .parse()
            .map_err(|_| AuthError::UnknownKind(kid.clone()))?;
        let keys = self
            .keys
            .get(&role)
            .ok_or_else(|| AuthError::UnknownKind(kid.clone()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<Claims>(token, &keys.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        if data.claims.kind != role.as_str() {
            return Err(AuthError::InvalidToken(
                "credential kind does not match key id".to_string(),
            ));
        }

        Ok((role, data.claims))
    }

    /// Full tenant-guard check: verify the token, then resolve the tenant.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let (role, claims) = self.verify(token)?;

        let subject_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::InvalidToken("invalid subject".to_string()))?;

        let tenant_id = match claims.tenant.as_deref() {
            Some(raw) => Uuid::parse_str(raw)
                .map(TenantId::from_uuid)
                .map_err(|_| AuthError::InvalidToken("invalid tenant".to_string()))?,
            None if role == Role::Operator => self.resolve_operator_tenant(subject_id).await?,
            None => return Err(AuthError::MissingTenant),
        };

        Ok(AuthContext::new(subject_id, tenant_id, role))
    }

    async fn resolve_operator_tenant(&self, operator_id: Uuid) -> Result<TenantId, AuthError> {
        let directory = self
            .directory
            .as_ref()
            .ok_or(AuthError::TenantUnresolved(operator_id))?;

        tracing::debug!(%operator_id, "operator token without tenant, consulting profile");
        directory
            .operator_tenant(operator_id)
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?
            .ok_or(AuthError::TenantUnresolved(operator_id))
    }
}
