//! Health, readiness and metrics handlers
//!
//! `/health` is a pure liveness check. `/ready` pings the store and reports the parked ledger
//! backlog; a backlog degrades readiness but does not fail it.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::ComponentHealth;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Operational, with parked ledger entries awaiting flush
    Degraded,
    Unhealthy,
}

impl From<&ComponentHealth> for HealthStatus {
    fn from(health: &ComponentHealth) -> Self {
        match health {
            ComponentHealth::Healthy => HealthStatus::Healthy,
            ComponentHealth::Degraded { .. } => HealthStatus::Degraded,
            ComponentHealth::Unhealthy { .. } => HealthStatus::Unhealthy,
        }
    }
}

fn reason(health: &ComponentHealth) -> Option<&str> {
    match health {
        ComponentHealth::Healthy => None,
        ComponentHealth::Degraded { reason } | ComponentHealth::Unhealthy { reason } => {
            Some(reason.as_str())
        }
    }
}

/// Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        service: "gatehouse",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Readiness check
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let start = std::time::Instant::now();
    let database = match state.store.ping().await {
        Ok(()) => ComponentHealth::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "readiness ping failed");
            ComponentHealth::Unhealthy {
                reason: "store unreachable".to_string(),
            }
        }
    };
    let response_time_ms = start.elapsed().as_millis() as u64;

    let parked = state.engine.recorder().pending().await;
    let ledger = if parked == 0 {
        ComponentHealth::Healthy
    } else {
        ComponentHealth::Degraded {
            reason: format!("{parked} ledger entries awaiting retry"),
        }
    };

    let overall = if database.is_unhealthy() {
        HealthStatus::Unhealthy
    } else if !ledger.is_healthy() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    let status = if overall == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(serde_json::json!({
            "status": overall,
            "database": {
                "status": HealthStatus::from(&database),
                "reason": reason(&database),
                "response_time_ms": response_time_ms,
            },
            "ledger": {
                "status": HealthStatus::from(&ledger),
                "reason": reason(&ledger),
                "parked": parked,
            },
        })),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub format: Option<String>,
}

/// Process metrics, JSON unless `?format=prometheus`
pub async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let metrics = state.engine.metrics();
    match query.format.as_deref() {
        Some("prometheus") => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.to_prometheus().await,
        )
            .into_response(),
        _ => Json(metrics.to_json().await).into_response(),
    }
}
