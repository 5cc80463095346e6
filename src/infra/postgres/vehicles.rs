use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{plate_lock_key, PgGateStore};
use crate::domain::{CloseReason, TenantId, VehicleEntryRecord};
use crate::infra::{GateError, Result, VehicleLog};

const VEHICLE_COLUMNS: &str = "id, tenant_id, plate, entry_at, exit_at, classification, \
     linked_resident_id, linked_guest_id, close_reason";

#[derive(Debug, FromRow)]
struct VehicleRow {
    id: Uuid,
    tenant_id: Uuid,
    plate: String,
    entry_at: DateTime<Utc>,
    exit_at: Option<DateTime<Utc>>,
    classification: String,
    linked_resident_id: Option<Uuid>,
    linked_guest_id: Option<Uuid>,
    close_reason: Option<String>,
}

impl TryFrom<VehicleRow> for VehicleEntryRecord {
    type Error = GateError;

    fn try_from(row: VehicleRow) -> Result<Self> {
        Ok(VehicleEntryRecord {
            id: row.id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            plate: row.plate,
            entry_at: row.entry_at,
            exit_at: row.exit_at,
            classification: row
                .classification
                .parse()
                .map_err(|e| GateError::Internal(format!("Invalid classification: {e}")))?,
            linked_resident_id: row.linked_resident_id,
            linked_guest_id: row.linked_guest_id,
            close_reason: row
                .close_reason
                .map(|s| s.parse::<CloseReason>())
                .transpose()
                .map_err(|e| GateError::Internal(format!("Invalid close_reason: {e}")))?,
        })
    }
}

#[async_trait]
impl VehicleLog for PgGateStore {
    async fn open_entry(&self, record: &VehicleEntryRecord) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(plate_lock_key(record.tenant_id, &record.plate))
            .execute(&mut *tx)
            .await?;

        let superseded = sqlx::query(
            r#"
            UPDATE vehicle_entries
            SET exit_at = $1, close_reason = $2
            WHERE tenant_id = $3 AND plate = $4 AND exit_at IS NULL
            "#,
        )
        .bind(record.entry_at)
        .bind(CloseReason::Superseded.as_str())
        .bind(record.tenant_id.0)
        .bind(&record.plate)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let sql = format!(
            "INSERT INTO vehicle_entries ({VEHICLE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(record.tenant_id.0)
            .bind(&record.plate)
            .bind(record.entry_at)
            .bind(record.exit_at)
            .bind(record.classification.as_str())
            .bind(record.linked_resident_id)
            .bind(record.linked_guest_id)
            .bind(record.close_reason.map(|r| r.as_str()))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(superseded)
    }

    async fn close_latest_open(
        &self,
        tenant_id: TenantId,
        plate: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<VehicleEntryRecord>> {
        let sql = format!(
            r#"
            UPDATE vehicle_entries
            SET exit_at = $1, close_reason = $2
            WHERE seq = (
                SELECT seq FROM vehicle_entries
                WHERE tenant_id = $3 AND plate = $4 AND exit_at IS NULL
                ORDER BY entry_at DESC, seq DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {VEHICLE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, VehicleRow>(&sql)
            .bind(at)
            .bind(CloseReason::ExitScan.as_str())
            .bind(tenant_id.0)
            .bind(plate)
            .fetch_optional(&self.pool)
            .await?;
        row.map(VehicleEntryRecord::try_from).transpose()
    }

    async fn list_entries(
        &self,
        tenant_id: TenantId,
        open_only: bool,
        limit: u32,
    ) -> Result<Vec<VehicleEntryRecord>> {
        let sql = format!(
            r#"
            SELECT {VEHICLE_COLUMNS} FROM vehicle_entries
            WHERE tenant_id = $1 AND (NOT $2 OR exit_at IS NULL)
            ORDER BY entry_at DESC, seq DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, VehicleRow>(&sql)
            .bind(tenant_id.0)
            .bind(open_only)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(VehicleEntryRecord::try_from).collect()
    }
}
