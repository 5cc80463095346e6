//! REST API handlers organized by domain.

pub mod bookings;
pub mod gate;
pub mod guests;
pub mod health;
pub mod records;

pub use health::{health_check, metrics, readiness_check};
