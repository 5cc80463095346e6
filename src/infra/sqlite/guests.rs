use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{day_string, parse_day, parse_opt_ts, parse_ts, parse_uuid, placeholders, SqliteGateStore};
use crate::domain::{timestamp_string, Guest, GuestStatus, TenantId};
use crate::infra::{GateError, GuestFilter, GuestStore, Result};

const GUEST_COLUMNS: &str = "id, tenant_id, host_resident_id, name, party_size, purpose, \
     visit_date, valid_until, vehicle_plate, status, entry_at, exit_at, created_at";

#[derive(Debug, FromRow)]
struct GuestRow {
    id: String,
    tenant_id: String,
    host_resident_id: String,
    name: String,
    party_size: i64,
    purpose: Option<String>,
    visit_date: String,
    valid_until: String,
    vehicle_plate: Option<String>,
    status: String,
    entry_at: Option<String>,
    exit_at: Option<String>,
    created_at: String,
}

impl TryFrom<GuestRow> for Guest {
    type Error = GateError;

    fn try_from(row: GuestRow) -> Result<Self> {
        Ok(Guest {
            id: parse_uuid("guest id", &row.id)?,
            tenant_id: TenantId::from_uuid(parse_uuid("tenant_id", &row.tenant_id)?),
            host_resident_id: parse_uuid("host_resident_id", &row.host_resident_id)?,
            name: row.name,
            party_size: row.party_size as i32,
            purpose: row.purpose,
            visit_date: parse_day("visit_date", &row.visit_date)?,
            valid_until: parse_ts("valid_until", &row.valid_until)?,
            vehicle_plate: row.vehicle_plate,
            status: row
                .status
                .parse()
                .map_err(|e| GateError::Internal(format!("Invalid guest status: {e}")))?,
            entry_at: parse_opt_ts("entry_at", row.entry_at)?,
            exit_at: parse_opt_ts("exit_at", row.exit_at)?,
            created_at: parse_ts("created_at", &row.created_at)?,
        })
    }
}

pub(crate) fn guest_stamp_clause(to: GuestStatus) -> &'static str {
    match to {
        GuestStatus::CheckedIn => ", entry_at = ?",
        GuestStatus::CheckedOut => ", exit_at = ?",
        _ => "",
    }
}

#[async_trait]
impl GuestStore for SqliteGateStore {
    async fn create_guest(&self, guest: &Guest) -> Result<()> {
        let sql = format!(
            "INSERT INTO guests ({GUEST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(guest.id.to_string())
            .bind(guest.tenant_id.0.to_string())
            .bind(guest.host_resident_id.to_string())
            .bind(&guest.name)
            .bind(guest.party_size as i64)
            .bind(&guest.purpose)
            .bind(day_string(&guest.visit_date))
            .bind(timestamp_string(&guest.valid_until))
            .bind(&guest.vehicle_plate)
            .bind(guest.status.as_str())
            .bind(guest.entry_at.as_ref().map(timestamp_string))
            .bind(guest.exit_at.as_ref().map(timestamp_string))
            .bind(timestamp_string(&guest.created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_guest(&self, id: Uuid) -> Result<Option<Guest>> {
        let sql = format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = ?");
        let row = sqlx::query_as::<_, GuestRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Guest::try_from).transpose()
    }

    async fn list_guests(&self, filter: &GuestFilter) -> Result<Vec<Guest>> {
        let sql = format!(
            r#"
            SELECT {GUEST_COLUMNS} FROM guests
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR host_resident_id = ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY visit_date DESC, created_at DESC
            LIMIT ?4
            "#
        );
        let rows = sqlx::query_as::<_, GuestRow>(&sql)
            .bind(filter.tenant_id.0.to_string())
            .bind(filter.host_resident_id.map(|id| id.to_string()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Guest::try_from).collect()
    }

    async fn transition_guest(
        &self,
        id: Uuid,
        to: GuestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Guest>> {
        let from = to.predecessors();
        if from.is_empty() {
            return Ok(None);
        }

        let stamp = guest_stamp_clause(to);
        let sql = format!(
            "UPDATE guests SET status = ?{stamp} WHERE id = ? AND status IN ({}) RETURNING {GUEST_COLUMNS}",
            placeholders(from.len())
        );

        let mut query = sqlx::query_as::<_, GuestRow>(&sql).bind(to.as_str());
        if !stamp.is_empty() {
            query = query.bind(timestamp_string(&at));
        }
        query = query.bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.map(Guest::try_from).transpose()
    }

    async fn find_guest_by_plate(
        &self,
        tenant_id: TenantId,
        plate: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>> {
        let sql = format!(
            r#"
            SELECT {GUEST_COLUMNS} FROM guests
            WHERE tenant_id = ?
              AND vehicle_plate = ?
              AND status IN ('approved', 'checked-in')
              AND visit_date <= ?
              AND valid_until >= ?
            ORDER BY CASE status WHEN 'approved' THEN 0 ELSE 1 END,
                     visit_date DESC,
                     created_at DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, GuestRow>(&sql)
            .bind(tenant_id.0.to_string())
            .bind(plate)
            .bind(day_string(&today))
            .bind(timestamp_string(&now))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Guest::try_from).transpose()
    }
}
