//! Pre-authorized visitor model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ParseEnumError, TenantId};

/// Guest lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuestStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "checked-in")]
    CheckedIn,
    #[serde(rename = "checked-out")]
    CheckedOut,
}

impl GuestStatus {
    pub const ALL: [GuestStatus; 5] = [
        GuestStatus::Pending,
        GuestStatus::Approved,
        GuestStatus::Rejected,
        GuestStatus::CheckedIn,
        GuestStatus::CheckedOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GuestStatus::Pending => "pending",
            GuestStatus::Approved => "approved",
            GuestStatus::Rejected => "rejected",
            GuestStatus::CheckedIn => "checked-in",
            GuestStatus::CheckedOut => "checked-out",
        }
    }

    /// States from which a guest may enter `self`.
    pub fn predecessors(&self) -> &'static [GuestStatus] {
        use GuestStatus::*;
        match self {
            Pending => &[],
            Approved | Rejected => &[Pending],
            CheckedIn => &[Approved],
            CheckedOut => &[CheckedIn],
        }
    }

    pub fn can_transition_to(&self, to: GuestStatus) -> bool {
        to.predecessors().contains(self)
    }
}

impl fmt::Display for GuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GuestStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("guest status", s))
    }
}

/// Visitor registered by a resident host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub host_resident_id: Uuid,
    pub name: String,
    pub party_size: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub visit_date: NaiveDate,
    pub valid_until: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_plate: Option<String>,
    pub status: GuestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Guest {
    /// Whether the pass covers `now`: the visit day has arrived on the site calendar (`today`)
    /// and the pass has not lapsed.
    pub fn is_date_valid(&self, today: NaiveDate, now: DateTime<Utc>) -> bool {
        self.visit_date <= today && now <= self.valid_until
    }
}
