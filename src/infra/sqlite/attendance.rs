use async_trait::async_trait;
use sqlx::FromRow;

use super::{parse_opt_uuid, parse_ts, parse_uuid, SqliteGateStore};
use crate::domain::{timestamp_string, AttendanceEvent, AttendanceQuery, TenantId};
use crate::infra::{AttendanceLedger, GateError, Result};

const ATTENDANCE_COLUMNS: &str = "id, tenant_id, subject_id, guest_id, booking_id, person_name, \
     occurred_at, direction, source, location, vehicle_plate, purpose, verification_method, \
     verified_by, outcome, digest";

#[derive(Debug, FromRow)]
struct AttendanceRow {
    id: String,
    tenant_id: String,
    subject_id: Option<String>,
    guest_id: Option<String>,
    booking_id: Option<String>,
    person_name: String,
    occurred_at: String,
    direction: String,
    source: String,
    location: String,
    vehicle_plate: Option<String>,
    purpose: Option<String>,
    verification_method: String,
    verified_by: String,
    outcome: String,
    digest: String,
}

impl TryFrom<AttendanceRow> for AttendanceEvent {
    type Error = GateError;

    fn try_from(row: AttendanceRow) -> Result<Self> {
        let bad = |e: crate::domain::ParseEnumError| GateError::Internal(e.to_string());
        Ok(AttendanceEvent {
            id: parse_uuid("attendance id", &row.id)?,
            tenant_id: TenantId::from_uuid(parse_uuid("tenant_id", &row.tenant_id)?),
            subject_id: parse_opt_uuid("subject_id", row.subject_id)?,
            guest_id: parse_opt_uuid("guest_id", row.guest_id)?,
            booking_id: parse_opt_uuid("booking_id", row.booking_id)?,
            person_name: row.person_name,
            timestamp: parse_ts("occurred_at", &row.occurred_at)?,
            direction: row.direction.parse().map_err(bad)?,
            source: row.source.parse().map_err(bad)?,
            location: row.location,
            vehicle_plate: row.vehicle_plate,
            purpose: row.purpose,
            verification_method: row.verification_method.parse().map_err(bad)?,
            verified_by: parse_uuid("verified_by", &row.verified_by)?,
            outcome: row.outcome.parse().map_err(bad)?,
            digest: row.digest,
        })
    }
}

#[async_trait]
impl AttendanceLedger for SqliteGateStore {
    async fn append(&self, event: &AttendanceEvent) -> Result<()> {
        let sql = format!(
            "INSERT INTO attendance_events ({ATTENDANCE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO NOTHING"
        );
        sqlx::query(&sql)
            .bind(event.id.to_string())
            .bind(event.tenant_id.0.to_string())
            .bind(event.subject_id.map(|id| id.to_string()))
            .bind(event.guest_id.map(|id| id.to_string()))
            .bind(event.booking_id.map(|id| id.to_string()))
            .bind(&event.person_name)
            .bind(timestamp_string(&event.timestamp))
            .bind(event.direction.as_str())
            .bind(event.source.as_str())
            .bind(&event.location)
            .bind(&event.vehicle_plate)
            .bind(&event.purpose)
            .bind(event.verification_method.as_str())
            .bind(event.verified_by.to_string())
            .bind(event.outcome.as_str())
            .bind(&event.digest)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, query: &AttendanceQuery) -> Result<Vec<AttendanceEvent>> {
        let sql = format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS} FROM attendance_events
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR source = ?2)
              AND (?3 IS NULL OR direction = ?3)
              AND (?4 IS NULL OR subject_id = ?4)
              AND (?5 IS NULL OR occurred_at >= ?5)
              AND (?6 IS NULL OR occurred_at < ?6)
            ORDER BY occurred_at DESC, seq DESC
            LIMIT ?7
            "#
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(query.tenant_id.0.to_string())
            .bind(query.source.map(|s| s.as_str()))
            .bind(query.direction.map(|d| d.as_str()))
            .bind(query.subject_id.map(|id| id.to_string()))
            .bind(query.since.as_ref().map(timestamp_string))
            .bind(query.until.as_ref().map(timestamp_string))
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AttendanceEvent::try_from).collect()
    }
}
