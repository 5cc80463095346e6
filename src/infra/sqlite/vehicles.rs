use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid, SqliteGateStore};
use crate::domain::{timestamp_string, CloseReason, TenantId, VehicleEntryRecord};
use crate::infra::{GateError, Result, VehicleLog};

const VEHICLE_COLUMNS: &str = "id, tenant_id, plate, entry_at, exit_at, classification, \
     linked_resident_id, linked_guest_id, close_reason";

#[derive(Debug, FromRow)]
struct VehicleRow {
    id: String,
    tenant_id: String,
    plate: String,
    entry_at: String,
    exit_at: Option<String>,
    classification: String,
    linked_resident_id: Option<String>,
    linked_guest_id: Option<String>,
    close_reason: Option<String>,
}

impl TryFrom<VehicleRow> for VehicleEntryRecord {
    type Error = GateError;

    fn try_from(row: VehicleRow) -> Result<Self> {
        Ok(VehicleEntryRecord {
            id: parse_uuid("vehicle entry id", &row.id)?,
            tenant_id: TenantId::from_uuid(parse_uuid("tenant_id", &row.tenant_id)?),
            plate: row.plate,
            entry_at: parse_ts("entry_at", &row.entry_at)?,
            exit_at: parse_opt_ts("exit_at", row.exit_at)?,
            classification: row
                .classification
                .parse()
                .map_err(|e| GateError::Internal(format!("Invalid classification: {e}")))?,
            linked_resident_id: parse_opt_uuid("linked_resident_id", row.linked_resident_id)?,
            linked_guest_id: parse_opt_uuid("linked_guest_id", row.linked_guest_id)?,
            close_reason: row
                .close_reason
                .map(|s| s.parse::<CloseReason>())
                .transpose()
                .map_err(|e| GateError::Internal(format!("Invalid close_reason: {e}")))?,
        })
    }
}

#[async_trait]
impl VehicleLog for SqliteGateStore {
    async fn open_entry(&self, record: &VehicleEntryRecord) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let tenant = record.tenant_id.0.to_string();
        let entry_at = timestamp_string(&record.entry_at);

        let superseded = sqlx::query(
            r#"
            UPDATE vehicle_entries
            SET exit_at = ?, close_reason = ?
            WHERE tenant_id = ? AND plate = ? AND exit_at IS NULL
            "#,
        )
        .bind(&entry_at)
        .bind(CloseReason::Superseded.as_str())
        .bind(&tenant)
        .bind(&record.plate)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let sql = format!(
            "INSERT INTO vehicle_entries ({VEHICLE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(record.id.to_string())
            .bind(&tenant)
            .bind(&record.plate)
            .bind(&entry_at)
            .bind(record.exit_at.as_ref().map(timestamp_string))
            .bind(record.classification.as_str())
            .bind(record.linked_resident_id.map(|id| id.to_string()))
            .bind(record.linked_guest_id.map(|id| id.to_string()))
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
            SET exit_at = ?, close_reason = ?
            WHERE seq = (
                SELECT seq FROM vehicle_entries
                WHERE tenant_id = ? AND plate = ? AND exit_at IS NULL
                ORDER BY entry_at DESC, seq DESC
                LIMIT 1
            )
            AND exit_at IS NULL
            RETURNING {VEHICLE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, VehicleRow>(&sql)
            .bind(timestamp_string(&at))
            .bind(CloseReason::ExitScan.as_str())
            .bind(tenant_id.0.to_string())
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
            WHERE tenant_id = ?1 AND (?2 = 0 OR exit_at IS NULL)
            ORDER BY entry_at DESC, seq DESC
            LIMIT ?3
            "#
        );
        let rows = sqlx::query_as::<_, VehicleRow>(&sql)
            .bind(tenant_id.0.to_string())
            .bind(open_only)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(VehicleEntryRecord::try_from).collect()
    }
}
