//! PostgreSQL store for production deployments
//!
//! Conditional updates use `status = ANY($n)` against the allowed from-states. Booking creation
//! and confirmation serialize per amenity-day with a transaction-scoped advisory lock. Vehicle
//! entries serialize per tenant and plate the same way, so at most one record per plate stays
//! open, and exit matching claims its row with `FOR UPDATE SKIP LOCKED`.

mod attendance;
mod bookings;
mod directory;
mod guests;
mod vehicles;

use async_trait::async_trait;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::domain::{TenantId, DATE_FORMAT};
use crate::infra::{GateError, Result, StorePing};

/// PostgreSQL implementation of every gatehouse store trait
#[derive(Clone)]
pub struct PgGateStore {
    pool: PgPool,
}

impl PgGateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create from connection string
    pub async fn from_url(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded migrations
    pub async fn initialize(&self) -> Result<()> {
        crate::migrations::run_postgres(&self.pool)
            .await
            .map_err(|e| GateError::Internal(format!("postgres migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorePing for PgGateStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Advisory lock key derived from a scope label and its parts
pub(crate) fn advisory_lock_key(scope: &str, parts: &[&[u8]]) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    for part in parts {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Lock held while a booking claims a slot on an amenity-day
pub(crate) fn slot_lock_key(amenity_id: Uuid, date: NaiveDate) -> i64 {
    let day = date.format(DATE_FORMAT).to_string();
    advisory_lock_key("booking-slot", &[amenity_id.as_bytes(), day.as_bytes()])
}

/// Lock held while an entry supersedes and replaces the open record for a plate
pub(crate) fn plate_lock_key(tenant_id: TenantId, plate: &str) -> i64 {
    advisory_lock_key("vehicle-plate", &[tenant_id.0.as_bytes(), plate.as_bytes()])
}
