//! Attendance ledger entries.
//!
//! Every entry/exit observed by the gatehouse (main gate, amenity desk, delivery point,
//! manual operator action) becomes one immutable [`AttendanceEvent`]. Each event carries a
//! SHA-256 digest over its canonical fields so that rows altered after the fact can be
//! detected by recomputing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{timestamp_string, ParseEnumError, TenantId};

/// Domain prefix for attendance digests
pub const DOMAIN_ATTENDANCE: &[u8] = b"GATEHOUSE_ATTENDANCE_V1";

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ParseEnumError::new($kind, other)),
                }
            }
        }
    };
}

wire_enum!(
    /// Whether the subject is coming in or going out
    Direction, "direction" {
        Entry => "entry",
        Exit => "exit",
    }
);

wire_enum!(
    /// Where the event was observed
    EventSource, "event source" {
        MainGate => "main_gate",
        AmenityCheckin => "amenity_checkin",
        DeliveryPoint => "delivery_point",
        ManualAdmin => "manual_admin",
    }
);

wire_enum!(
    /// How the subject was identified
    VerificationMethod, "verification method" {
        FacialRecognition => "facial_recognition",
        Manual => "manual",
        QrCode => "qr_code",
        VehiclePlate => "vehicle_plate",
        Override => "override",
    }
);

wire_enum!(
    /// Result of the identification
    Outcome, "outcome" {
        Verified => "verified",
        Failed => "failed",
        ManualOverride => "manual_override",
    }
);

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    pub person_name: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub source: EventSource,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_plate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub verification_method: VerificationMethod,
    pub verified_by: Uuid,
    pub outcome: Outcome,
    /// Hex SHA-256 over the canonical fields
    pub digest: String,
}

impl AttendanceEvent {
    pub fn builder(
        tenant_id: TenantId,
        direction: Direction,
        source: EventSource,
        verified_by: Uuid,
    ) -> AttendanceEventBuilder {
        AttendanceEventBuilder::new(tenant_id, direction, source, verified_by)
    }

    /// Recompute the digest from the stored fields.
    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_ATTENDANCE);
        hasher.update(self.id.as_bytes());
        hasher.update(self.tenant_id.0.as_bytes());
        update_opt_uuid(&mut hasher, self.subject_id);
        update_opt_uuid(&mut hasher, self.guest_id);
        update_opt_uuid(&mut hasher, self.booking_id);
        update_str(&mut hasher, &self.person_name);
        update_str(&mut hasher, &timestamp_string(&self.timestamp));
        update_str(&mut hasher, self.direction.as_str());
        update_str(&mut hasher, self.source.as_str());
        update_str(&mut hasher, &self.location);
        update_opt_str(&mut hasher, self.vehicle_plate.as_deref());
        update_opt_str(&mut hasher, self.purpose.as_deref());
        update_str(&mut hasher, self.verification_method.as_str());
        hasher.update(self.verified_by.as_bytes());
        update_str(&mut hasher, self.outcome.as_str());
        hex::encode(hasher.finalize())
    }

    /// True when the stored digest still matches the fields.
    pub fn verify_digest(&self) -> bool {
        self.digest == self.compute_digest()
    }
}

fn update_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u32).to_be_bytes());
    hasher.update(s.as_bytes());
}

fn update_opt_str(hasher: &mut Sha256, s: Option<&str>) {
    match s {
        Some(s) => {
            hasher.update([1u8]);
            update_str(hasher, s);
        }
        None => hasher.update([0u8]),
    }
}

fn update_opt_uuid(hasher: &mut Sha256, id: Option<Uuid>) {
    match id {
        Some(id) => {
            hasher.update([1u8]);
            hasher.update(id.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

/// Builder for [`AttendanceEvent`]
#[derive(Debug, Clone)]
pub struct AttendanceEventBuilder {
    event: AttendanceEvent,
}

impl AttendanceEventBuilder {
    fn new(tenant_id: TenantId, direction: Direction, source: EventSource, verified_by: Uuid) -> Self {
        Self {
            event: AttendanceEvent {
                id: Uuid::new_v4(),
                tenant_id,
                subject_id: None,
                guest_id: None,
                booking_id: None,
                person_name: String::new(),
                timestamp: Utc::now(),
                direction,
                source,
                location: String::new(),
                vehicle_plate: None,
                purpose: None,
                verification_method: VerificationMethod::Manual,
                verified_by,
                outcome: Outcome::Verified,
                digest: String::new(),
            },
        }
    }

    pub fn subject(mut self, subject_id: Uuid) -> Self {
        self.event.subject_id = Some(subject_id);
        self
    }

    pub fn maybe_subject(mut self, subject_id: Option<Uuid>) -> Self {
        self.event.subject_id = subject_id;
        self
    }

    pub fn guest(mut self, guest_id: Option<Uuid>) -> Self {
        self.event.guest_id = guest_id;
        self
    }

    pub fn booking(mut self, booking_id: Uuid) -> Self {
        self.event.booking_id = Some(booking_id);
        self
    }

    pub fn person_name(mut self, name: impl Into<String>) -> Self {
        self.event.person_name = name.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.event.location = location.into();
        self
    }

    pub fn vehicle_plate(mut self, plate: impl Into<String>) -> Self {
        self.event.vehicle_plate = Some(plate.into());
        self
    }

    pub fn purpose(mut self, purpose: Option<String>) -> Self {
        self.event.purpose = purpose;
        self
    }

    pub fn method(mut self, method: VerificationMethod) -> Self {
        self.event.verification_method = method;
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.event.outcome = outcome;
        self
    }

    pub fn build(mut self) -> AttendanceEvent {
        self.event.digest = self.event.compute_digest();
        self.event
    }
}

/// Filter for ledger reads. Always tenant-scoped.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceQuery {
    pub tenant_id: TenantId,
    pub source: Option<EventSource>,
    pub direction: Option<Direction>,
    pub subject_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u32,
}

impl AttendanceQuery {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 500;

    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            source: None,
            direction: None,
            subject_id: None,
            since: None,
            until: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttendanceEvent {
        AttendanceEvent::builder(
            TenantId::new(),
            Direction::Entry,
            EventSource::MainGate,
            Uuid::new_v4(),
        )
        .subject(Uuid::new_v4())
        .person_name("Ravi Kumar")
        .location("Main Gate")
        .vehicle_plate("KA01AB1234")
        .method(VerificationMethod::VehiclePlate)
        .build()
    }

    #[test]
    fn test_builder_sets_digest() {
        let event = sample();
        assert_eq!(event.digest.len(), 64);
        assert!(event.verify_digest());
    }

    #[test]
    fn test_tampering_breaks_digest() {
        let mut event = sample();
        event.direction = Direction::Exit;
        assert!(!event.verify_digest());

        let mut event = sample();
        event.vehicle_plate = None;
        assert!(!event.verify_digest());
    }

    #[test]
    fn test_absent_and_empty_fields_hash_differently() {
        let mut a = sample();
        a.purpose = None;
        let mut b = a.clone();
        b.purpose = Some(String::new());
        assert_ne!(a.compute_digest(), b.compute_digest());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!("amenity_checkin".parse::<EventSource>().unwrap(), EventSource::AmenityCheckin);
        assert_eq!(VerificationMethod::FacialRecognition.to_string(), "facial_recognition");
        assert_eq!(Outcome::ManualOverride.as_str(), "manual_override");
        assert!("sideways".parse::<Direction>().is_err());

        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["source"], "main_gate");
        assert_eq!(json["verificationMethod"], "vehicle_plate");
    }

    #[test]
    fn test_query_limit_clamped() {
        let q = AttendanceQuery::for_tenant(TenantId::new());
        assert_eq!(q.clone().with_limit(None).limit, 100);
        assert_eq!(q.clone().with_limit(Some(10_000)).limit, 500);
        assert_eq!(q.with_limit(Some(0)).limit, 1);
    }
}
