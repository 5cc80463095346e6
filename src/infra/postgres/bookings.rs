use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{slot_lock_key, PgGateStore};
use crate::domain::{Booking, BookingStatus, TenantId, DATE_FORMAT};
use crate::infra::{BookingFilter, BookingStore, GateError, Result};

const BOOKING_COLUMNS: &str = "id, tenant_id, amenity_id, resident_id, booking_date, start_time, \
     end_time, party_size, status, entry_at, exit_at, cancelled_at, entry_synthesized, created_at";

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    tenant_id: Uuid,
    amenity_id: Uuid,
    resident_id: Uuid,
    booking_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    party_size: i32,
    status: String,
    entry_at: Option<DateTime<Utc>>,
    exit_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    entry_synthesized: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = GateError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Booking {
            id: row.id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            amenity_id: row.amenity_id,
            resident_id: row.resident_id,
            date: row.booking_date,
            start_time: row.start_time,
            end_time: row.end_time,
            party_size: row.party_size,
            status: row
                .status
                .parse()
                .map_err(|e| GateError::Internal(format!("Invalid booking status: {e}")))?,
            entry_at: row.entry_at,
            exit_at: row.exit_at,
            cancelled_at: row.cancelled_at,
            entry_synthesized: row.entry_synthesized,
            created_at: row.created_at,
        })
    }
}

/// Extra `SET` assignments for a target status; `$4` is the transition time.
fn booking_stamp_clause(to: BookingStatus) -> Option<&'static str> {
    match to {
        BookingStatus::CheckedIn => Some(", entry_at = $4, exit_at = NULL"),
        BookingStatus::CheckedOut => Some(
            ", exit_at = $4, \
             entry_synthesized = (entry_at IS NULL) OR entry_synthesized, \
             entry_at = COALESCE(entry_at, $4)",
        ),
        BookingStatus::Cancelled => Some(", cancelled_at = $4"),
        _ => None,
    }
}

fn status_list(statuses: &[BookingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl BookingStore for PgGateStore {
    async fn create_booking(&self, booking: &Booking) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let date = booking.date.format(DATE_FORMAT).to_string();
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(slot_lock_key(booking.amenity_id, booking.date))
            .execute(&mut *tx)
            .await?;

        let (overlapping,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM bookings
                WHERE amenity_id = $1
                  AND booking_date = $2
                  AND status = ANY($3)
                  AND start_time < $4
                  AND end_time > $5
            )
            "#,
        )
        .bind(booking.amenity_id)
        .bind(booking.date)
        .bind(status_list(&BookingStatus::SLOT_HOLDING))
        .bind(booking.end_time)
        .bind(booking.start_time)
        .fetch_one(&mut *tx)
        .await?;

        if overlapping {
            return Err(GateError::Conflict(format!(
                "amenity {} already booked on {} between {} and {}",
                booking.amenity_id,
                date,
                booking.start_time.format("%H:%M"),
                booking.end_time.format("%H:%M"),
            )));
        }

        let sql = format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        sqlx::query(&sql)
            .bind(booking.id)
            .bind(booking.tenant_id.0)
            .bind(booking.amenity_id)
            .bind(booking.resident_id)
            .bind(booking.date)
            .bind(booking.start_time)
            .bind(booking.end_time)
            .bind(booking.party_size)
            .bind(booking.status.as_str())
            .bind(booking.entry_at)
            .bind(booking.exit_at)
            .bind(booking.cancelled_at)
            .bind(booking.entry_synthesized)
            .bind(booking.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR resident_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY booking_date DESC, start_time DESC, created_at DESC
            LIMIT $4
            "#
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(filter.tenant_id.0)
            .bind(filter.resident_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>> {
        let from = to.predecessors();
        if from.is_empty() {
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        if to.claims_slot() {
            let slot: Option<(Uuid, NaiveDate)> =
                sqlx::query_as("SELECT amenity_id, booking_date FROM bookings WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some((amenity_id, date)) = slot else {
                return Ok(None);
            };
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(slot_lock_key(amenity_id, date))
                .execute(&mut *tx)
                .await?;
        }

        let stamps = booking_stamp_clause(to);
        // Slot-claiming targets carry no stamps, so the guard takes $4
        let slot_guard = if to.claims_slot() {
            r#"
              AND NOT EXISTS (
                  SELECT 1 FROM bookings AS other
                  WHERE other.id <> bookings.id
                    AND other.amenity_id = bookings.amenity_id
                    AND other.booking_date = bookings.booking_date
                    AND other.status = ANY($4)
                    AND other.start_time < bookings.end_time
                    AND other.end_time > bookings.start_time
              )"#
        } else {
            ""
        };
        let sql = format!(
            "UPDATE bookings SET status = $1{} WHERE id = $2 AND status = ANY($3){slot_guard} RETURNING {BOOKING_COLUMNS}",
            stamps.unwrap_or("")
        );

        let mut query = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(to.as_str())
            .bind(id)
            .bind(status_list(from));
        if stamps.is_some() {
            query = query.bind(at);
        }
        if to.claims_slot() {
            query = query.bind(status_list(&BookingStatus::SLOT_HOLDING));
        }

        let row = query.fetch_optional(&mut *tx).await?;
        tx.commit().await?;
        row.map(Booking::try_from).transpose()
    }
}
