//! HTTP surface: routes, handlers, wire types and the error envelope.

pub mod error;
pub mod handlers;
mod rest;
pub mod types;

pub use error::{ApiError, ErrorCode};
pub use rest::router;
