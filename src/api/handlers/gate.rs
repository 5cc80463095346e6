//! Scanner endpoints used by gate devices and operators

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{
    CheckInResponse, CheckoutRequest, DeliveryScanRequest, IdentityScanRequest,
    ScanTokenRequest, VehicleScanRequest,
};
use crate::auth::AuthContextExt;
use crate::domain::{AttendanceEvent, Booking};
use crate::engine::{CheckoutTarget, DeliveryScan, IdentityScan, VehicleScan, VehicleScanOutcome};
use crate::server::AppState;

/// POST /api/v1/gate/credential-scan
pub async fn credential_scan(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    payload: Result<Json<ScanTokenRequest>, JsonRejection>,
) -> Result<Json<CheckInResponse>, ApiError> {
    let Json(request) = payload?;
    let receipt = state
        .engine
        .scan_booking_pass(&auth, request.token.trim())
        .await?;
    Ok(Json(receipt.into()))
}

/// POST /api/v1/gate/booking-checkout
pub async fn booking_checkout(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<Booking>, ApiError> {
    let Json(request) = payload?;
    let target = CheckoutTarget::try_from(request)?;
    Ok(Json(state.engine.checkout_booking(&auth, target).await?))
}

/// POST /api/v1/gate/vehicle-scan
pub async fn vehicle_scan(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    payload: Result<Json<VehicleScanRequest>, JsonRejection>,
) -> Result<Json<VehicleScanOutcome>, ApiError> {
    let Json(request) = payload?;
    let outcome = state
        .engine
        .scan_vehicle(&auth, VehicleScan::try_from(request)?)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/gate/identity-scan
pub async fn identity_scan(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    payload: Result<Json<IdentityScanRequest>, JsonRejection>,
) -> Result<Json<AttendanceEvent>, ApiError> {
    let Json(request) = payload?;
    let event = state
        .engine
        .identity_scan(&auth, IdentityScan::try_from(request)?)
        .await?;
    Ok(Json(event))
}

/// POST /api/v1/gate/delivery-scan
pub async fn delivery_scan(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    payload: Result<Json<DeliveryScanRequest>, JsonRejection>,
) -> Result<Json<AttendanceEvent>, ApiError> {
    let Json(request) = payload?;
    let event = state
        .engine
        .delivery_scan(&auth, DeliveryScan::try_from(request)?)
        .await?;
    Ok(Json(event))
}
