//! Amenity booking endpoints

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{
    parse_opt_field, BookingStatusUpdate, CreateBookingRequest, CredentialResponse,
    ListResponse, StatusListQuery,
};
use crate::auth::AuthContextExt;
use crate::domain::{Booking, BookingStatus};
use crate::engine::NewBooking;
use crate::server::AppState;

/// POST /api/v1/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let Json(request) = payload?;
    let booking = state
        .engine
        .create_booking(&auth, NewBooking::try_from(request)?)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /api/v1/bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    query: Result<Query<StatusListQuery>, QueryRejection>,
) -> Result<Json<ListResponse<Booking>>, ApiError> {
    let Query(params) = query?;
    let status = parse_opt_field::<BookingStatus>("status", params.status.as_deref())?;
    let bookings = state
        .engine
        .list_bookings(&auth, status, params.limit)
        .await?;
    Ok(Json(bookings.into()))
}

/// PUT /api/v1/bookings/:id/status
pub async fn update_booking_status(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<BookingStatusUpdate>, JsonRejection>,
) -> Result<Json<Booking>, ApiError> {
    let Path(booking_id) = path?;
    let Json(update) = payload?;
    let booking = state
        .engine
        .update_booking_status(&auth, booking_id, update.target()?, update.override_window)
        .await?;
    Ok(Json(booking))
}

/// POST /api/v1/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Booking>, ApiError> {
    let Path(booking_id) = path?;
    Ok(Json(state.engine.cancel_booking(&auth, booking_id).await?))
}

/// POST /api/v1/bookings/:id/credential
pub async fn issue_credential(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let Path(booking_id) = path?;
    let pass = state.engine.issue_booking_pass(&auth, booking_id).await?;
    Ok(Json(CredentialResponse {
        booking_id,
        expires_in_seconds: (pass.expires_at - Utc::now()).num_seconds().max(0),
        token: pass.token,
    }))
}
