//! Gatehouse Library
//!
//! Multi-tenant access control for residential communities: amenity bookings, guest
//! pre-authorization, vehicle-plate reconciliation and an append-only attendance ledger.
//!
//! ## Modules
//!
//! - [`domain`] - Lifecycle records, ledger entries and directory types
//! - [`infra`] - Store traits and their PostgreSQL and SQLite implementations
//! - [`auth`] - Tenant Guard (per-kind JWT verification) and the auth middleware
//! - [`credential`] - Signed booking passes presented as QR codes
//! - [`engine`] - Lifecycle state machines, vehicle reconciler and ledger recorder
//! - [`metrics`] - In-process counters and gauges
//! - [`api`] - REST API routes
//! - [`server`] - Configuration and HTTP bootstrap

pub mod api;
pub mod auth;
pub mod credential;
pub mod domain;
pub mod engine;
pub mod infra;
pub mod metrics;
pub mod migrations;
pub mod server;

// Re-export commonly used types
pub use domain::{
    AttendanceEvent, Booking, BookingStatus, Guest, GuestStatus, TenantId, VehicleEntryRecord,
};

pub use engine::GateEngine;
pub use infra::{GateError, Result};
