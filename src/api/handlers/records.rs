//! Read-only views: attendance ledger, vehicle log and pending deliveries

use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{AttendanceQueryParams, ListResponse, VehicleListQuery};
use crate::auth::AuthContextExt;
use crate::domain::{AttendanceEvent, VehicleEntryRecord};
use crate::engine::AttendanceFilter;
use crate::server::AppState;

/// GET /api/v1/attendance
pub async fn list_attendance(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    query: Result<Query<AttendanceQueryParams>, QueryRejection>,
) -> Result<Json<ListResponse<AttendanceEvent>>, ApiError> {
    let Query(params) = query?;
    let filter = AttendanceFilter::try_from(params)?;
    let events = state.engine.list_attendance(&auth, filter).await?;
    Ok(Json(events.into()))
}

/// GET /api/v1/vehicles
pub async fn list_vehicles(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    query: Result<Query<VehicleListQuery>, QueryRejection>,
) -> Result<Json<ListResponse<VehicleEntryRecord>>, ApiError> {
    let Query(params) = query?;
    let records = state
        .engine
        .list_vehicle_entries(&auth, params.open, params.limit)
        .await?;
    Ok(Json(records.into()))
}

/// GET /api/v1/deliveries/pending
pub async fn pending_deliveries(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
) -> Result<Json<ListResponse<AttendanceEvent>>, ApiError> {
    let events = state.engine.pending_deliveries(&auth).await?;
    Ok(Json(events.into()))
}
