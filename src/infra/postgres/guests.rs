use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::PgGateStore;
use crate::domain::{Guest, GuestStatus, TenantId};
use crate::infra::{GateError, GuestFilter, GuestStore, Result};

const GUEST_COLUMNS: &str = "id, tenant_id, host_resident_id, name, party_size, purpose, \
     visit_date, valid_until, vehicle_plate, status, entry_at, exit_at, created_at";

#[derive(Debug, FromRow)]
struct GuestRow {
    id: Uuid,
    tenant_id: Uuid,
    host_resident_id: Uuid,
    name: String,
    party_size: i32,
    purpose: Option<String>,
    visit_date: NaiveDate,
    valid_until: DateTime<Utc>,
    vehicle_plate: Option<String>,
    status: String,
    entry_at: Option<DateTime<Utc>>,
    exit_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<GuestRow> for Guest {
    type Error = GateError;

    fn try_from(row: GuestRow) -> Result<Self> {
        Ok(Guest {
            id: row.id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            host_resident_id: row.host_resident_id,
            name: row.name,
            party_size: row.party_size,
            purpose: row.purpose,
            visit_date: row.visit_date,
            valid_until: row.valid_until,
            vehicle_plate: row.vehicle_plate,
            status: row
                .status
                .parse()
                .map_err(|e| GateError::Internal(format!("Invalid guest status: {e}")))?,
            entry_at: row.entry_at,
            exit_at: row.exit_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl GuestStore for PgGateStore {
    async fn create_guest(&self, guest: &Guest) -> Result<()> {
        let sql = format!(
            "INSERT INTO guests ({GUEST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        sqlx::query(&sql)
            .bind(guest.id)
            .bind(guest.tenant_id.0)
            .bind(guest.host_resident_id)
            .bind(&guest.name)
            .bind(guest.party_size)
            .bind(&guest.purpose)
            .bind(guest.visit_date)
            .bind(guest.valid_until)
            .bind(&guest.vehicle_plate)
            .bind(guest.status.as_str())
            .bind(guest.entry_at)
            .bind(guest.exit_at)
            .bind(guest.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_guest(&self, id: Uuid) -> Result<Option<Guest>> {
        let sql = format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = $1");
        let row = sqlx::query_as::<_, GuestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Guest::try_from).transpose()
    }

    async fn list_guests(&self, filter: &GuestFilter) -> Result<Vec<Guest>> {
        let sql = format!(
            r#"
            SELECT {GUEST_COLUMNS} FROM guests
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR host_resident_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY visit_date DESC, created_at DESC
            LIMIT $4
            "#
        );
        let rows = sqlx::query_as::<_, GuestRow>(&sql)
            .bind(filter.tenant_id.0)
            .bind(filter.host_resident_id)
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
        let from: Vec<String> = to
            .predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        if from.is_empty() {
            return Ok(None);
        }

        let stamp = match to {
            GuestStatus::CheckedIn => Some(", entry_at = $4"),
            GuestStatus::CheckedOut => Some(", exit_at = $4"),
            _ => None,
        };
        let sql = format!(
            "UPDATE guests SET status = $1{} WHERE id = $2 AND status = ANY($3) RETURNING {GUEST_COLUMNS}",
            stamp.unwrap_or("")
        );

        let mut query = sqlx::query_as::<_, GuestRow>(&sql)
            .bind(to.as_str())
            .bind(id)
            .bind(from);
        if stamp.is_some() {
            query = query.bind(at);
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
            WHERE tenant_id = $1
              AND vehicle_plate = $2
              AND status IN ('approved', 'checked-in')
              AND visit_date <= $3
              AND valid_until >= $4
            ORDER BY (status = 'approved') DESC, visit_date DESC, created_at DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, GuestRow>(&sql)
            .bind(tenant_id.0)
            .bind(plate)
            .bind(today)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Guest::try_from).transpose()
    }
}
