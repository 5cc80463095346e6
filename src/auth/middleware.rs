//! Authentication middleware for Axum
//!
//! Runs the tenant guard once per request and hands the resulting `AuthContext` to handlers
//! through request extensions.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{AuthContext, AuthError, TenantGuard};
use crate::api::ApiError;
use crate::domain::TenantId;
use crate::metrics::{labelled, metric_names, MetricsRegistry};

/// Auth context extension for request
#[derive(Clone)]
pub struct AuthContextExt(pub AuthContext);

#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub guard: Arc<TenantGuard>,
    /// Optional per-tenant rate limiter.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub metrics: Arc<MetricsRegistry>,
}

fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingAuth)?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingAuth)
}

pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let authenticated = match bearer_token(auth_header) {
        Ok(token) => state.guard.authenticate(token).await,
        Err(e) => Err(e),
    };

    let context = match authenticated {
        Ok(context) => context,
        Err(e) => {
            tracing::debug!(error = %e, "request rejected by tenant guard");
            state
                .metrics
                .inc_counter(&labelled(metric_names::AUTH_FAILURES, auth_failure_label(&e)))
                .await;
            return ApiError::from(e).into_response();
        }
    };

    let mut remaining = None;
    if let Some(limiter) = state.rate_limiter.as_deref() {
        if let Err(e) = limiter.admit(context.tenant_id) {
            tracing::warn!(tenant_id = %context.tenant_id, role = %context.role, "tenant over request budget");
            state
                .metrics
                .inc_counter(&labelled(metric_names::AUTH_FAILURES, auth_failure_label(&e)))
                .await;
            return ApiError::from(e).into_response();
        }
        remaining = Some(limiter.remaining(context.tenant_id));
    }

    request.extensions_mut().insert(AuthContextExt(context));
    let mut response = next.run(request).await;
    if let Some(remaining) = remaining {
        response
            .headers_mut()
            .insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    }
    response
}

/// Requests left in the tenant's current window, set on every admitted response
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

fn auth_failure_label(error: &AuthError) -> &'static str {
    match error {
        AuthError::MissingAuth => "missing",
        AuthError::TokenExpired => "expired",
        AuthError::TenantUnresolved(_) => "tenant_unresolved",
        AuthError::RateLimited => "rate_limited",
        AuthError::Lookup(_) => "lookup",
        AuthError::InvalidToken(_) | AuthError::UnknownKind(_) | AuthError::MissingTenant => {
            "invalid"
        }
    }
}

const WINDOW: Duration = Duration::from_secs(60);

struct Window {
    opened: Instant,
    admitted: u32,
}

/// Fixed one-minute window per tenant, shared by every caller of that tenant
pub struct RateLimiter {
    per_minute: u32,
    windows: Mutex<HashMap<TenantId, Window>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn admit(&self, tenant: TenantId) -> Result<(), AuthError> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = windows.entry(tenant).or_insert(Window {
            opened: now,
            admitted: 0,
        });

        if now.duration_since(window.opened) >= WINDOW {
            window.opened = now;
            window.admitted = 0;
        }
        if window.admitted >= self.per_minute {
            return Err(AuthError::RateLimited);
        }
        window.admitted += 1;
        Ok(())
    }

    /// Requests the tenant may still make in its current window
    pub fn remaining(&self, tenant: TenantId) -> u32 {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows
            .get(&tenant)
            .filter(|w| w.opened.elapsed() < WINDOW)
            .map_or(self.per_minute, |w| self.per_minute.saturating_sub(w.admitted))
    }
}
