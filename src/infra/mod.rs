//! Infrastructure layer for the gatehouse
//!
//! Contains the store traits and their implementations:
//! - PostgreSQL (production)
//! - SQLite (local development, tests, single-gate installs)
//! - Retry with backoff for ledger writes

mod error;
pub mod postgres;
mod retry;
pub mod sqlite;
mod traits;

pub use error::*;
pub use postgres::PgGateStore;
pub use retry::{is_retryable_db_error, Attempted, RetryConfig};
pub use sqlite::SqliteGateStore;
pub use traits::*;
