//! REST routes for the gatehouse.

use axum::routing::{get, post, put};
use axum::Router;

use super::handlers::{bookings, gate, guests, records};
use crate::server::AppState;

/// Build the `/api` router. Every route here sits behind the auth middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        // Amenity bookings
        .route(
            "/v1/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/v1/bookings/:id/status", put(bookings::update_booking_status))
        .route("/v1/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/v1/bookings/:id/credential", post(bookings::issue_credential))
        // Gate scanners
        .route("/v1/gate/credential-scan", post(gate::credential_scan))
        .route("/v1/gate/booking-checkout", post(gate::booking_checkout))
        .route("/v1/gate/vehicle-scan", post(gate::vehicle_scan))
        .route("/v1/gate/identity-scan", post(gate::identity_scan))
        .route("/v1/gate/delivery-scan", post(gate::delivery_scan))
        // Reads
        .route("/v1/attendance", get(records::list_attendance))
        .route("/v1/vehicles", get(records::list_vehicles))
        .route("/v1/deliveries/pending", get(records::pending_deliveries))
        // Guests
        .route(
            "/v1/guests",
            post(guests::create_guest).get(guests::list_guests),
        )
        .route("/v1/guests/:id/status", put(guests::update_guest_status))
}
