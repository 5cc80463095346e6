use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    clock_string, day_string, parse_clock_field, parse_day, parse_opt_ts, parse_ts, parse_uuid,
    placeholders, SqliteGateStore,
};
use crate::domain::{timestamp_string, Booking, BookingStatus, TenantId};
use crate::infra::{BookingFilter, BookingStore, GateError, Result};

const BOOKING_COLUMNS: &str = "id, tenant_id, amenity_id, resident_id, booking_date, start_time, \
     end_time, party_size, status, entry_at, exit_at, cancelled_at, entry_synthesized, created_at";

#[derive(Debug, FromRow)]
struct BookingRow {
    id: String,
    tenant_id: String,
    amenity_id: String,
    resident_id: String,
    booking_date: String,
    start_time: String,
    end_time: String,
    party_size: i64,
    status: String,
    entry_at: Option<String>,
    exit_at: Option<String>,
    cancelled_at: Option<String>,
    entry_synthesized: bool,
    created_at: String,
}

impl TryFrom<BookingRow> for Booking {
    type Error = GateError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Booking {
            id: parse_uuid("booking id", &row.id)?,
            tenant_id: TenantId::from_uuid(parse_uuid("tenant_id", &row.tenant_id)?),
            amenity_id: parse_uuid("amenity_id", &row.amenity_id)?,
            resident_id: parse_uuid("resident_id", &row.resident_id)?,
            date: parse_day("booking_date", &row.booking_date)?,
            start_time: parse_clock_field("start_time", &row.start_time)?,
            end_time: parse_clock_field("end_time", &row.end_time)?,
            party_size: row.party_size as i32,
            status: row
                .status
                .parse()
                .map_err(|e| GateError::Internal(format!("Invalid booking status: {e}")))?,
            entry_at: parse_opt_ts("entry_at", row.entry_at)?,
            exit_at: parse_opt_ts("exit_at", row.exit_at)?,
            cancelled_at: parse_opt_ts("cancelled_at", row.cancelled_at)?,
            entry_synthesized: row.entry_synthesized,
            created_at: parse_ts("created_at", &row.created_at)?,
        })
    }
}

/// Extra `SET` assignments for a target status and how many timestamp binds they take.
pub(crate) fn booking_stamp_clause(to: BookingStatus) -> (&'static str, usize) {
    match to {
        BookingStatus::CheckedIn => (", entry_at = ?, exit_at = NULL", 1),
        BookingStatus::CheckedOut => (
            ", exit_at = ?, \
             entry_synthesized = CASE WHEN entry_at IS NULL THEN 1 ELSE entry_synthesized END, \
             entry_at = COALESCE(entry_at, ?)",
            2,
        ),
        BookingStatus::Cancelled => (", cancelled_at = ?", 1),
        _ => ("", 0),
    }
}

#[async_trait]
impl BookingStore for SqliteGateStore {
    async fn create_booking(&self, booking: &Booking) -> Result<()> {
        let holding = BookingStatus::SLOT_HOLDING;
        let sql = format!(
            r#"
            INSERT INTO bookings ({BOOKING_COLUMNS})
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM bookings
                WHERE amenity_id = ?
                  AND booking_date = ?
                  AND status IN ({})
                  AND start_time < ?
                  AND end_time > ?
            )
            "#,
            placeholders(holding.len())
        );

        let date = day_string(&booking.date);
        let start = clock_string(&booking.start_time);
        let end = clock_string(&booking.end_time);

        let mut query = sqlx::query(&sql)
            .bind(booking.id.to_string())
            .bind(booking.tenant_id.0.to_string())
            .bind(booking.amenity_id.to_string())
            .bind(booking.resident_id.to_string())
            .bind(&date)
            .bind(&start)
            .bind(&end)
            .bind(booking.party_size as i64)
            .bind(booking.status.as_str())
            .bind(booking.entry_at.as_ref().map(timestamp_string))
            .bind(booking.exit_at.as_ref().map(timestamp_string))
            .bind(booking.cancelled_at.as_ref().map(timestamp_string))
            .bind(booking.entry_synthesized)
            .bind(timestamp_string(&booking.created_at))
            .bind(booking.amenity_id.to_string())
            .bind(&date);
        for status in holding {
            query = query.bind(status.as_str());
        }
        let result = query.bind(&end).bind(&start).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(GateError::Conflict(format!(
                "amenity {} already booked on {} between {} and {}",
                booking.amenity_id, date, start, end
            )));
        }
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?");
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR resident_id = ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY booking_date DESC, start_time DESC, created_at DESC
            LIMIT ?4
            "#
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(filter.tenant_id.0.to_string())
            .bind(filter.resident_id.map(|id| id.to_string()))
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

        let holding = BookingStatus::SLOT_HOLDING;
        let (stamps, stamp_binds) = booking_stamp_clause(to);
        let slot_guard = if to.claims_slot() {
            format!(
                r#"
                AND NOT EXISTS (
                    SELECT 1 FROM bookings AS other
                    WHERE other.id <> bookings.id
                      AND other.amenity_id = bookings.amenity_id
                      AND other.booking_date = bookings.booking_date
                      AND other.status IN ({})
                      AND other.start_time < bookings.end_time
                      AND other.end_time > bookings.start_time
                )"#,
                placeholders(holding.len())
            )
        } else {
            String::new()
        };
        let sql = format!(
            "UPDATE bookings SET status = ?{stamps} WHERE id = ? AND status IN ({}){slot_guard} RETURNING {BOOKING_COLUMNS}",
            placeholders(from.len())
        );

        let now = timestamp_string(&at);
        let mut query = sqlx::query_as::<_, BookingRow>(&sql).bind(to.as_str());
        for _ in 0..stamp_binds {
            query = query.bind(now.clone());
        }
        query = query.bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }
        if to.claims_slot() {
            for status in holding {
                query = query.bind(status.as_str());
            }
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.map(Booking::try_from).transpose()
    }
}
