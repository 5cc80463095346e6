//! Vehicle log records and plate handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ParseEnumError, TenantId};

/// Who a plate belongs to, as decided at entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClassification {
    Resident,
    Guest,
    Unauthorized,
}

impl VehicleClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClassification::Resident => "resident",
            VehicleClassification::Guest => "guest",
            VehicleClassification::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for VehicleClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClassification {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resident" => Ok(VehicleClassification::Resident),
            "guest" => Ok(VehicleClassification::Guest),
            "unauthorized" => Ok(VehicleClassification::Unauthorized),
            other => Err(ParseEnumError::new("vehicle classification", other)),
        }
    }
}

/// Why an entry record was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Matched by an exit scan
    ExitScan,
    /// A newer entry for the same plate replaced it
    Superseded,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ExitScan => "exit_scan",
            CloseReason::Superseded => "superseded",
        }
    }
}

impl FromStr for CloseReason {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exit_scan" => Ok(CloseReason::ExitScan),
            "superseded" => Ok(CloseReason::Superseded),
            other => Err(ParseEnumError::new("close reason", other)),
        }
    }
}

/// One visit of a vehicle through the main gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleEntryRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub plate: String,
    pub entry_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_at: Option<DateTime<Utc>>,
    pub classification: VehicleClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_resident_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_guest_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
}

impl VehicleEntryRecord {
    pub fn open(
        tenant_id: TenantId,
        plate: String,
        entry_at: DateTime<Utc>,
        classification: VehicleClassification,
        linked_resident_id: Option<Uuid>,
        linked_guest_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            plate,
            entry_at,
            exit_at: None,
            classification,
            linked_resident_id,
            linked_guest_id,
            close_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_at.is_none()
    }
}

/// Canonical plate form: trimmed, uppercased, with spaces and dashes removed.
///
/// Returns `None` when nothing is left.
pub fn normalize_plate(raw: &str) -> Option<String> {
    let plate: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect();
    if plate.is_empty() {
        None
    } else {
        Some(plate)
    }
}
