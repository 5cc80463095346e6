//! Request and response bodies for the REST handlers.
//!
//! Wire names are camelCase. Enum-valued fields arrive as strings and are parsed here so a bad
//! value is reported as `INVALID_FIELD_VALUE` naming the field, not as an opaque body error.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{validation_error, ApiError};
use crate::domain::{parse_clock, parse_date, BookingStatus, ParseEnumError};
use crate::engine::{
    AttendanceFilter, CheckInReceipt, CheckoutTarget, DeliveryScan, IdentityScan, NewBooking,
    NewGuest, VehicleScan,
};

pub(crate) fn parse_field<T>(field: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse::<T>()
        .map_err(|e| validation_error(field, e.to_string()))
}

pub(crate) fn parse_opt_field<T>(field: &str, raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.filter(|s| !s.is_empty())
        .map(|s| parse_field(field, s))
        .transpose()
}

fn date_field(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    parse_date(raw).ok_or_else(|| validation_error(field, format!("{field} must be YYYY-MM-DD")))
}

/// `{ items, count }` wrapper for list endpoints
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

// ============================================================================
// Bookings
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub amenity_id: Uuid,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub party_size: i32,
}

impl TryFrom<CreateBookingRequest> for NewBooking {
    type Error = ApiError;

    fn try_from(req: CreateBookingRequest) -> Result<Self, Self::Error> {
        let clock = |field: &str, raw: &str| {
            parse_clock(raw).ok_or_else(|| validation_error(field, format!("{field} must be HH:MM")))
        };
        Ok(NewBooking {
            amenity_id: req.amenity_id,
            date: date_field("date", &req.date)?,
            start_time: clock("startTime", &req.start_time)?,
            end_time: clock("endTime", &req.end_time)?,
            party_size: req.party_size,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BookingStatusUpdate {
    pub status: String,
    /// Lets an operator record a no-show before the booking date has passed
    #[serde(default, rename = "override")]
    pub override_window: bool,
}

impl BookingStatusUpdate {
    pub fn target(&self) -> Result<BookingStatus, ApiError> {
        parse_field("status", &self.status)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub booking_id: Uuid,
    pub token: String,
    pub expires_in_seconds: i64,
}

// ============================================================================
// Gate
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ScanTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub booking_id: Uuid,
    pub resident_name: String,
    pub amenity_name: String,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_at: Option<DateTime<Utc>>,
}

impl From<CheckInReceipt> for CheckInResponse {
    fn from(receipt: CheckInReceipt) -> Self {
        Self {
            booking_id: receipt.booking.id,
            resident_name: receipt.resident_name,
            amenity_name: receipt.amenity_name,
            status: receipt.booking.status,
            entry_at: receipt.booking.entry_at,
        }
    }
}

/// Exactly one of `bookingId` or `token`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub booking_id: Option<Uuid>,
    pub token: Option<String>,
}

impl TryFrom<CheckoutRequest> for CheckoutTarget {
    type Error = ApiError;

    fn try_from(req: CheckoutRequest) -> Result<Self, Self::Error> {
        let token = req.token.filter(|t| !t.trim().is_empty());
        match (req.booking_id, token) {
            (Some(id), None) => Ok(CheckoutTarget::Booking(id)),
            (None, Some(token)) => Ok(CheckoutTarget::Pass(token)),
            (Some(_), Some(_)) => Err(validation_error(
                "bookingId",
                "send either bookingId or token, not both",
            )),
            (None, None) => Err(validation_error("bookingId", "bookingId or token is required")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VehicleScanRequest {
    pub plate: String,
    pub direction: String,
    pub location: Option<String>,
}

impl TryFrom<VehicleScanRequest> for VehicleScan {
    type Error = ApiError;

    fn try_from(req: VehicleScanRequest) -> Result<Self, Self::Error> {
        Ok(VehicleScan {
            direction: parse_field("direction", &req.direction)?,
            plate: req.plate,
            location: req.location,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityScanRequest {
    pub subject_id: Uuid,
    pub subject_type: String,
    pub direction: String,
    pub location: Option<String>,
}

impl TryFrom<IdentityScanRequest> for IdentityScan {
    type Error = ApiError;

    fn try_from(req: IdentityScanRequest) -> Result<Self, Self::Error> {
        Ok(IdentityScan {
            subject_id: req.subject_id,
            subject_type: parse_field("subjectType", &req.subject_type)?,
            direction: parse_field("direction", &req.direction)?,
            location: req.location,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryScanRequest {
    pub resident_id: Uuid,
    pub courier_name: String,
    pub direction: String,
    pub location: Option<String>,
}

impl TryFrom<DeliveryScanRequest> for DeliveryScan {
    type Error = ApiError;

    fn try_from(req: DeliveryScanRequest) -> Result<Self, Self::Error> {
        Ok(DeliveryScan {
            resident_id: req.resident_id,
            courier_name: req.courier_name,
            direction: parse_field("direction", &req.direction)?,
            location: req.location,
        })
    }
}

// ============================================================================
// Reads
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AttendanceQueryParams {
    pub source: Option<String>,
    pub direction: Option<String>,
    pub date: Option<String>,
    pub limit: Option<u32>,
}

impl TryFrom<AttendanceQueryParams> for AttendanceFilter {
    type Error = ApiError;

    fn try_from(params: AttendanceQueryParams) -> Result<Self, Self::Error> {
        Ok(AttendanceFilter {
            source: parse_opt_field("source", params.source.as_deref())?,
            direction: parse_opt_field("direction", params.direction.as_deref())?,
            date: params
                .date
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|d| date_field("date", d))
                .transpose()?,
            limit: params.limit,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VehicleListQuery {
    #[serde(default)]
    pub open: bool,
    pub limit: Option<u32>,
}

// ============================================================================
// Guests
// ============================================================================

fn default_party_size() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGuestRequest {
    pub name: String,
    #[serde(default = "default_party_size")]
    pub party_size: i32,
    pub purpose: Option<String>,
    pub visit_date: String,
    pub valid_until: Option<DateTime<Utc>>,
    pub vehicle_plate: Option<String>,
}

impl TryFrom<CreateGuestRequest> for NewGuest {
    type Error = ApiError;

    fn try_from(req: CreateGuestRequest) -> Result<Self, Self::Error> {
        Ok(NewGuest {
            visit_date: date_field("visitDate", &req.visit_date)?,
            name: req.name,
            party_size: req.party_size,
            purpose: req.purpose,
            valid_until: req.valid_until,
            vehicle_plate: req.vehicle_plate.filter(|p| !p.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GuestStatusUpdate {
    pub status: String,
}
