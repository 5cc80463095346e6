//! Directory records the engine reads but never edits.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::{ParseEnumError, TenantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amenity {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub capacity: i32,
    pub operational: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Normalized plates
    #[serde(default)]
    pub vehicle_plates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Gate staff or society administrator.
///
/// Older operator profiles were created before tenants were linked, so `tenant_id` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: Uuid,
    pub tenant_id: Option<TenantId>,
    pub name: String,
}

/// Kind of person presented at an identity scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Resident,
    Worker,
}

impl FromStr for SubjectType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resident" => Ok(SubjectType::Resident),
            "worker" => Ok(SubjectType::Worker),
            other => Err(ParseEnumError::new("subject type", other)),
        }
    }
}
