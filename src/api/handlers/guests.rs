//! Guest pre-authorization endpoints

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{
    parse_field, parse_opt_field, CreateGuestRequest, GuestStatusUpdate, ListResponse,
    StatusListQuery,
};
use crate::auth::AuthContextExt;
use crate::domain::{Guest, GuestStatus};
use crate::engine::NewGuest;
use crate::server::AppState;

/// POST /api/v1/guests
pub async fn create_guest(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    payload: Result<Json<CreateGuestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Guest>), ApiError> {
    let Json(request) = payload?;
    let guest = state
        .engine
        .create_guest(&auth, NewGuest::try_from(request)?)
        .await?;
    Ok((StatusCode::CREATED, Json(guest)))
}

/// GET /api/v1/guests
pub async fn list_guests(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    query: Result<Query<StatusListQuery>, QueryRejection>,
) -> Result<Json<ListResponse<Guest>>, ApiError> {
    let Query(params) = query?;
    let status = parse_opt_field::<GuestStatus>("status", params.status.as_deref())?;
    let guests = state.engine.list_guests(&auth, status, params.limit).await?;
    Ok(Json(guests.into()))
}

/// PUT /api/v1/guests/:id/status
pub async fn update_guest_status(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<GuestStatusUpdate>, JsonRejection>,
) -> Result<Json<Guest>, ApiError> {
    let Path(guest_id) = path?;
    let Json(update) = payload?;
    let to = parse_field::<GuestStatus>("status", &update.status)?;
    Ok(Json(state.engine.update_guest_status(&auth, guest_id, to).await?))
}
