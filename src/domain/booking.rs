//! Amenity booking model and its lifecycle table.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ParseEnumError, TenantId};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "checked-in")]
    CheckedIn,
    #[serde(rename = "checked-out")]
    CheckedOut,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "no_show")]
    NoShow,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 8] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Approved,
        BookingStatus::CheckedIn,
        BookingStatus::CheckedOut,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::NoShow,
    ];

    /// Statuses that hold the amenity slot for overlap checks.
    pub const SLOT_HOLDING: [BookingStatus; 3] = [
        BookingStatus::Confirmed,
        BookingStatus::Approved,
        BookingStatus::CheckedIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Approved => "approved",
            BookingStatus::CheckedIn => "checked-in",
            BookingStatus::CheckedOut => "checked-out",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    /// States from which a booking may enter `self`.
    ///
    /// `Pending` has no predecessors: it is only reachable through creation.
    /// No status lists itself, so re-requesting the current status is always rejected.
    pub fn predecessors(&self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Pending => &[],
            Confirmed => &[Pending, Approved],
            Approved => &[Pending, Confirmed],
            CheckedIn => &[Confirmed, Approved],
            CheckedOut => &[CheckedIn],
            Completed => &[CheckedOut],
            NoShow => &[Confirmed, Approved],
            Cancelled => &[Pending, Confirmed, Approved, CheckedIn],
        }
    }

    pub fn can_transition_to(&self, to: BookingStatus) -> bool {
        to.predecessors().contains(self)
    }

    /// Entering this status from `Pending` takes the slot, so overlap is rechecked on the way in.
    pub fn claims_slot(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Approved)
    }

    /// A booking in one of these states accepts a QR or manual check-in.
    pub fn accepts_check_in(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Approved)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("booking status", s))
    }
}

/// Amenity reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub amenity_id: Uuid,
    pub resident_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "clock")]
    pub start_time: NaiveTime,
    #[serde(with = "clock")]
    pub end_time: NaiveTime,
    pub party_size: i32,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Set when check-out had to invent the entry timestamp.
    pub entry_synthesized: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Build a fresh `pending` booking.
    pub fn new(
        tenant_id: TenantId,
        amenity_id: Uuid,
        resident_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        party_size: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            amenity_id,
            resident_id,
            date,
            start_time,
            end_time,
            party_size,
            status: BookingStatus::Pending,
            entry_at: None,
            exit_at: None,
            cancelled_at: None,
            entry_synthesized: false,
            created_at: Utc::now(),
        }
    }

    /// Half-open slot overlap on the same day.
    pub fn overlaps(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        self.date == date && self.start_time < end && start < self.end_time
    }
}

/// Serde adapter for `HH:MM` slot boundaries.
mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::domain::CLOCK_FORMAT;

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(CLOCK_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, CLOCK_FORMAT).map_err(serde::de::Error::custom)
    }
}
