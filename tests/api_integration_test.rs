//! REST API integration tests.
//!
//! Requests go through the full router (auth middleware, handlers, error envelope) against an
//! in-memory SQLite store.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use gatehouse::auth::{RateLimiter, Role, RATE_LIMIT_REMAINING};
use gatehouse::domain::Operator;
use gatehouse::infra::DirectoryStore;

use common::*;

// ============================================================================
// Test Helpers
// ============================================================================

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let error_code = response
        .headers()
        .get("x-error-code")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, error_code, value)
}

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

async fn create_pool_booking(h: &Harness, app: &Router) -> Value {
    let (status, _, body) = send(
        app,
        Method::POST,
        "/api/v1/bookings",
        Some(&h.resident_token()),
        Some(json!({
            "amenityId": h.community.pool.id,
            "date": today(),
            "startTime": "09:00",
            "endTime": "10:00",
            "partySize": 2
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

// ============================================================================
// Health and metrics
// ============================================================================

#[tokio::test]
async fn test_health_and_ready_need_no_credential() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, _, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "gatehouse");

    let (status, _, body) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ledger"]["parked"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_reports_counters() {
    let h = Harness::new().await;
    let app = h.router();
    create_pool_booking(&h, &app).await;

    let (status, _, body) = send(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics?format=prometheus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&text).unwrap().contains("gatehouse"));
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_credential_is_401_with_envelope() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, code, body) = send(&app, Method::GET, "/api/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code.as_deref(), Some("AUTH_REQUIRED"));
    assert_eq!(body["error"]["code"], "AUTH_REQUIRED");
    assert_eq!(body["error"]["numeric_code"], 1001);
}

#[tokio::test]
async fn test_garbage_credential_is_401() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, code, _) =
        send(&app, Method::GET, "/api/v1/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code.as_deref(), Some("INVALID_TOKEN"));
}

#[tokio::test]
async fn test_unlinked_operator_is_tenant_unresolved() {
    let h = Harness::new().await;
    let app = h.router();

    let drifter = Operator {
        id: Uuid::new_v4(),
        tenant_id: None,
        name: "Unlinked".to_string(),
    };
    h.store.upsert_operator(&drifter).await.unwrap();
    let token = h.token(Role::Operator, drifter.id, None);

    let (status, code, _) =
        send(&app, Method::GET, "/api/v1/attendance", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code.as_deref(), Some("TENANT_UNRESOLVED"));
}

#[tokio::test]
async fn test_role_mismatch_is_403() {
    let h = Harness::new().await;
    let app = h.router();

    // Residents cannot read the tenant ledger
    let (status, code, _) = send(
        &app,
        Method::GET,
        "/api/v1/attendance",
        Some(&h.resident_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code.as_deref(), Some("FORBIDDEN"));

    // Devices cannot create bookings
    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/v1/bookings",
        Some(&h.device_token()),
        Some(json!({
            "amenityId": h.community.pool.id,
            "date": today(),
            "startTime": "09:00",
            "endTime": "10:00",
            "partySize": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rate_limit_budget_is_reported_then_enforced() {
    let h = Harness::new().await;
    let app = h.router_with_limiter(Some(Arc::new(RateLimiter::new(2))));
    let token = h.resident_token();

    let list = || {
        Request::builder()
            .method(Method::GET)
            .uri("/api/v1/bookings")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    for expected in ["1", "0"] {
        let response = app.clone().oneshot(list()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(RATE_LIMIT_REMAINING).unwrap(),
            expected
        );
    }

    let (status, code, _) = send(&app, Method::GET, "/api/v1/bookings", Some(&token), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(code.as_deref(), Some("RATE_LIMIT_EXCEEDED"));
}

// ============================================================================
// Bookings
// ============================================================================

#[tokio::test]
async fn test_booking_flow_over_http() {
    let h = Harness::new().await;
    let app = h.router();

    let booking = create_pool_booking(&h, &app).await;
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["startTime"], "09:00");
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, _, confirmed) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/bookings/{id}/status"),
        Some(&h.operator_token()),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");

    let (status, _, credential) = send(
        &app,
        Method::POST,
        &format!("/api/v1/bookings/{id}/credential"),
        Some(&h.resident_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(credential["bookingId"], id.as_str());
    let token = credential["token"].as_str().unwrap().to_string();

    let (status, _, receipt) = send(
        &app,
        Method::POST,
        "/api/v1/gate/credential-scan",
        Some(&h.device_token()),
        Some(json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["bookingId"], id.as_str());
    assert_eq!(receipt["residentName"], h.community.resident.name.as_str());
    assert_eq!(receipt["amenityName"], h.community.pool.name.as_str());
    assert_eq!(receipt["status"], "checked-in");

    // Second presentation of the same pass
    let (status, code, _) = send(
        &app,
        Method::POST,
        "/api/v1/gate/credential-scan",
        Some(&h.device_token()),
        Some(json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_STATE_TRANSITION"));

    let (status, _, checked_out) = send(
        &app,
        Method::POST,
        "/api/v1/gate/booking-checkout",
        Some(&h.device_token()),
        Some(json!({ "bookingId": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checked_out["status"], "checked-out");

    let (status, _, ledger) = send(
        &app,
        Method::GET,
        "/api/v1/attendance?source=amenity_checkin",
        Some(&h.operator_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["count"], 2);
}

#[tokio::test]
async fn test_double_booking_is_409() {
    let h = Harness::new().await;
    let app = h.router();

    let booking = create_pool_booking(&h, &app).await;
    let id = booking["id"].as_str().unwrap();
    send(
        &app,
        Method::PUT,
        &format!("/api/v1/bookings/{id}/status"),
        Some(&h.operator_token()),
        Some(json!({ "status": "approved" })),
    )
    .await;

    let (status, code, body) = send(
        &app,
        Method::POST,
        "/api/v1/bookings",
        Some(&h.resident_token()),
        Some(json!({
            "amenityId": h.community.pool.id,
            "date": today(),
            "startTime": "09:30",
            "endTime": "11:00",
            "partySize": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code.as_deref(), Some("SLOT_CONFLICT"));
    assert_eq!(body["error"]["numeric_code"], 5001);
}

#[tokio::test]
async fn test_malformed_body_and_fields_are_400() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, code, _) = send(
        &app,
        Method::POST,
        "/api/v1/bookings",
        Some(&h.resident_token()),
        Some(json!({ "amenityId": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_REQUEST_BODY"));

    let (status, code, body) = send(
        &app,
        Method::POST,
        "/api/v1/bookings",
        Some(&h.resident_token()),
        Some(json!({
            "amenityId": h.community.pool.id,
            "date": "tomorrow",
            "startTime": "09:00",
            "endTime": "10:00",
            "partySize": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_FIELD_VALUE"));
    assert_eq!(body["error"]["details"]["field"], "date");

    let (status, code, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/bookings/{}/status", Uuid::new_v4()),
        Some(&h.operator_token()),
        Some(json!({ "status": "teleported" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_FIELD_VALUE"));
}

#[tokio::test]
async fn test_unknown_booking_is_404() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, code, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/bookings/{}/status", Uuid::new_v4()),
        Some(&h.operator_token()),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code.as_deref(), Some("RESOURCE_NOT_FOUND"));
}

#[tokio::test]
async fn test_forged_pass_is_invalid_credential() {
    let h = Harness::new().await;
    let app = h.router();

    // A resident bearer token is not a booking pass
    let (status, code, _) = send(
        &app,
        Method::POST,
        "/api/v1/gate/credential-scan",
        Some(&h.device_token()),
        Some(json!({ "token": h.resident_token() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_CREDENTIAL"));
}

// ============================================================================
// Tenant isolation
// ============================================================================

#[tokio::test]
async fn test_other_tenant_operator_gets_403() {
    let h = Harness::new().await;
    let app = h.router();
    let other = h.other_community().await;

    let booking = create_pool_booking(&h, &app).await;
    let id = booking["id"].as_str().unwrap();

    let outsider = h.token(Role::Operator, other.operator_id, None);
    let (status, code, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/bookings/{id}/status"),
        Some(&outsider),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code.as_deref(), Some("FORBIDDEN"));
    assert!(body["error"].get("details").is_none());

    let (status, _, listed) = send(
        &app,
        Method::GET,
        "/api/v1/bookings",
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 0);
}

// ============================================================================
// Gate scans, guests and deliveries
// ============================================================================

#[tokio::test]
async fn test_vehicle_scan_over_http() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, _, entry) = send(
        &app,
        Method::POST,
        "/api/v1/gate/vehicle-scan",
        Some(&h.device_token()),
        Some(json!({ "plate": "KA01AB1234", "direction": "entry", "location": "Gate 2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["classification"], "unauthorized");
    assert_eq!(entry["orphan"], false);
    assert!(entry["recordId"].is_string());

    let (status, _, open) = send(
        &app,
        Method::GET,
        "/api/v1/vehicles?open=true",
        Some(&h.operator_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open["count"], 1);

    let (status, code, _) = send(
        &app,
        Method::POST,
        "/api/v1/gate/vehicle-scan",
        Some(&h.device_token()),
        Some(json!({ "plate": "KA01AB1234", "direction": "sideways" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_FIELD_VALUE"));
}

#[tokio::test]
async fn test_guest_registration_and_approval() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, _, guest) = send(
        &app,
        Method::POST,
        "/api/v1/guests",
        Some(&h.resident_token()),
        Some(json!({
            "name": "Kiran",
            "partySize": 2,
            "visitDate": today(),
            "vehiclePlate": "ka 02 cd 5678"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(guest["status"], "pending");
    assert_eq!(guest["vehiclePlate"], "KA02CD5678");
    let id = guest["id"].as_str().unwrap();

    let (status, _, approved) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/guests/{id}/status"),
        Some(&h.operator_token()),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (status, _, listed) = send(
        &app,
        Method::GET,
        "/api/v1/guests?status=approved",
        Some(&h.resident_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);
}

#[tokio::test]
async fn test_identity_scan_for_unknown_subject_is_404() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, _, event) = send(
        &app,
        Method::POST,
        "/api/v1/gate/identity-scan",
        Some(&h.device_token()),
        Some(json!({
            "subjectId": h.community.worker.id,
            "subjectType": "worker",
            "direction": "entry"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["personName"], "Ramesh");

    let (status, code, _) = send(
        &app,
        Method::POST,
        "/api/v1/gate/identity-scan",
        Some(&h.device_token()),
        Some(json!({
            "subjectId": Uuid::new_v4(),
            "subjectType": "resident",
            "direction": "entry"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code.as_deref(), Some("RESOURCE_NOT_FOUND"));
}

#[tokio::test]
async fn test_delivery_scan_then_pending_list() {
    let h = Harness::new().await;
    let app = h.router();

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/v1/gate/delivery-scan",
        Some(&h.device_token()),
        Some(json!({
            "residentId": h.community.resident.id,
            "courierName": "Swiggy",
            "direction": "entry"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, pending) = send(
        &app,
        Method::GET,
        "/api/v1/deliveries/pending",
        Some(&h.resident_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["count"], 1);
    assert_eq!(pending["items"][0]["personName"], "Swiggy");
}
