//! SQLite store for local development, tests and single-gate deployments
//!
//! SQLite serializes writers, so every conditional update here is naturally atomic.
//! Identifiers are stored as hyphenated UUID text and timestamps as fixed-width RFC 3339.

mod attendance;
mod bookings;
mod directory;
mod guests;
mod vehicles;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::domain::{CLOCK_FORMAT, DATE_FORMAT};
use crate::infra::{GateError, Result, StorePing};

/// SQLite implementation of every gatehouse store trait
#[derive(Clone)]
pub struct SqliteGateStore {
    pool: SqlitePool,
}

impl SqliteGateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a private in-memory database with the schema applied.
    ///
    /// Each SQLite connection to `:memory:` sees its own database, so the pool is pinned to a
    /// single connection that never expires.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool);
        store.initialize().await?;
        Ok(store)
    }

    /// Apply the embedded migrations
    pub async fn initialize(&self) -> Result<()> {
        crate::migrations::run_sqlite(&self.pool)
            .await
            .map_err(|e| GateError::Internal(format!("sqlite migration failed: {e}")))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StorePing for SqliteGateStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| GateError::Internal(format!("Invalid {field}: {e}")))
}

pub(crate) fn parse_opt_uuid(field: &str, raw: Option<String>) -> Result<Option<Uuid>> {
    raw.map(|s| parse_uuid(field, &s)).transpose()
}

pub(crate) fn parse_ts(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GateError::Internal(format!("Invalid {field}: {e}")))
}

pub(crate) fn parse_opt_ts(field: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(field, &s)).transpose()
}

pub(crate) fn parse_day(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| GateError::Internal(format!("Invalid {field}: {e}")))
}

pub(crate) fn parse_clock_field(field: &str, raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, CLOCK_FORMAT)
        .map_err(|e| GateError::Internal(format!("Invalid {field}: {e}")))
}

pub(crate) fn day_string(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn clock_string(time: &NaiveTime) -> String {
    time.format(CLOCK_FORMAT).to_string()
}

/// `?, ?, ?` for an `IN (...)` list
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_pings() {
        let store = SqliteGateStore::in_memory().await.unwrap();
        store.ping().await.unwrap();
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_parse_helpers_report_field() {
        let err = parse_uuid("tenant_id", "nope").unwrap_err();
        assert!(err.to_string().contains("tenant_id"));
        assert!(parse_opt_ts("exit_at", None).unwrap().is_none());
    }
}
