//! Vehicle reconciler: pairs gate exits with the latest open entry for a plate

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{clamp_limit, GateEngine, MAIN_GATE};
use crate::auth::AuthContext;
use crate::domain::{
    normalize_plate, AttendanceEvent, Direction, EventSource, Guest, GuestStatus, Outcome,
    Resident, VehicleClassification, VehicleEntryRecord, VerificationMethod,
};
use crate::infra::{GateError, Result};
use crate::metrics::{labelled, metric_names};

#[derive(Debug, Clone)]
pub struct VehicleScan {
    pub plate: String,
    pub direction: Direction,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleScanOutcome {
    pub plate: String,
    pub classification: VehicleClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    /// Exit with no open entry to close
    pub orphan: bool,
    /// Guest promoted to checked-in by this scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<Uuid>,
    pub event_id: Uuid,
}

enum Match {
    Resident(Resident),
    Guest(Guest),
    Unknown,
}

impl Match {
    fn classification(&self) -> VehicleClassification {
        match self {
            Match::Resident(_) => VehicleClassification::Resident,
            Match::Guest(_) => VehicleClassification::Guest,
            Match::Unknown => VehicleClassification::Unauthorized,
        }
    }
}

fn outcome_for(classification: VehicleClassification) -> Outcome {
    match classification {
        VehicleClassification::Unauthorized => Outcome::Failed,
        _ => Outcome::Verified,
    }
}

impl GateEngine {
    pub async fn scan_vehicle(
        &self,
        ctx: &AuthContext,
        scan: VehicleScan,
    ) -> Result<VehicleScanOutcome> {
        Self::ensure_gate_staff(ctx)?;

        let plate = normalize_plate(&scan.plate)
            .ok_or_else(|| GateError::InvalidInput("plate is empty".to_string()))?;
        let location = scan
            .location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| MAIN_GATE.to_string());

        match scan.direction {
            Direction::Entry => self.vehicle_entry(ctx, plate, location).await,
            Direction::Exit => self.vehicle_exit(ctx, plate, location).await,
        }
    }

    /// Operator view of the vehicle log, newest first
    pub async fn list_vehicle_entries(
        &self,
        ctx: &AuthContext,
        open_only: bool,
        limit: Option<u32>,
    ) -> Result<Vec<VehicleEntryRecord>> {
        Self::ensure_operator(ctx)?;
        self.stores
            .vehicles
            .list_entries(ctx.tenant_id, open_only, clamp_limit(limit))
            .await
    }

    /// Resident roster first, then a date-valid approved or checked-in guest.
    async fn classify_plate(
        &self,
        ctx: &AuthContext,
        plate: &str,
        now: DateTime<Utc>,
    ) -> Result<Match> {
        if let Some(resident) = self
            .stores
            .directory
            .find_resident_by_plate(ctx.tenant_id, plate)
            .await?
        {
            return Ok(Match::Resident(resident));
        }

        let today = self.config.site_clock.date_of(now);
        let guest = self
            .stores
            .guests
            .find_guest_by_plate(ctx.tenant_id, plate, today, now)
            .await?
            .filter(|g| g.is_date_valid(today, now));
        Ok(guest.map(Match::Guest).unwrap_or(Match::Unknown))
    }

    /// The entry record is committed before any guest promotion, so a failed write never
    /// leaves a checked-in guest without a record.
    async fn vehicle_entry(
        &self,
        ctx: &AuthContext,
        plate: String,
        location: String,
    ) -> Result<VehicleScanOutcome> {
        let now = Utc::now();
        let matched = self.classify_plate(ctx, &plate, now).await?;
        let classification = matched.classification();

        let (resident_id, guest_id, person_name, purpose) = match &matched {
            Match::Resident(r) => (Some(r.id), None, r.name.clone(), None),
            Match::Guest(g) => (None, Some(g.id), g.name.clone(), g.purpose.clone()),
            Match::Unknown => (None, None, format!("Unregistered vehicle {plate}"), None),
        };

        let record = VehicleEntryRecord::open(
            ctx.tenant_id,
            plate.clone(),
            now,
            classification,
            resident_id,
            guest_id,
        );
        let superseded = self.stores.vehicles.open_entry(&record).await?;
        if superseded > 0 {
            tracing::warn!(
                tenant_id = %ctx.tenant_id,
                plate = %plate,
                superseded,
                "entry scan closed stale open records"
            );
            self.metrics
                .add_counter(metric_names::VEHICLE_SUPERSEDED, superseded)
                .await;
        }

        let mut promoted = None;
        if let Match::Guest(guest) = &matched {
            if guest.status == GuestStatus::Approved {
                match self.transition_guest(guest, GuestStatus::CheckedIn).await {
                    Ok(updated) => promoted = Some(updated.id),
                    Err(GateError::IllegalStateTransition { .. }) => {
                        tracing::debug!(guest_id = %guest.id, "guest already checked in by a concurrent scan");
                    }
                    Err(e) => {
                        // The record stands; the guest stays approved and the next scan retries
                        tracing::warn!(
                            guest_id = %guest.id,
                            record_id = %record.id,
                            error = %e,
                            "guest promotion failed after vehicle entry"
                        );
                    }
                }
            }
        }

        let event = AttendanceEvent::builder(
            ctx.tenant_id,
            Direction::Entry,
            EventSource::MainGate,
            ctx.subject_id,
        )
        .maybe_subject(resident_id)
        .guest(guest_id)
        .person_name(person_name)
        .at(now)
        .location(location)
        .vehicle_plate(plate.clone())
        .purpose(purpose)
        .method(VerificationMethod::VehiclePlate)
        .outcome(outcome_for(classification))
        .build();
        let event_id = event.id;
        self.recorder.record(event).await;

        self.metrics
            .inc_counter(&labelled(metric_names::VEHICLE_ENTRIES, classification.as_str()))
            .await;
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            plate = %plate,
            classification = %classification.as_str(),
            record_id = %record.id,
            "vehicle entry"
        );

        Ok(VehicleScanOutcome {
            plate,
            classification,
            record_id: Some(record.id),
            orphan: false,
            guest_id: promoted,
            event_id,
        })
    }

    async fn vehicle_exit(
        &self,
        ctx: &AuthContext,
        plate: String,
        location: String,
    ) -> Result<VehicleScanOutcome> {
        let now = Utc::now();
        let closed = self
            .stores
            .vehicles
            .close_latest_open(ctx.tenant_id, &plate, now)
            .await?;

        let (classification, resident_id, guest_id, person_name, record_id) = match &closed {
            Some(record) => {
                let name = self
                    .linked_name(record.linked_resident_id, record.linked_guest_id)
                    .await
                    .unwrap_or_else(|| format!("Unregistered vehicle {plate}"));
                (
                    record.classification,
                    record.linked_resident_id,
                    record.linked_guest_id,
                    name,
                    Some(record.id),
                )
            }
            None => {
                // Orphan exit: identify the plate for the audit entry, nothing is closed
                let matched = self.classify_plate(ctx, &plate, now).await?;
                let classification = matched.classification();
                match matched {
                    Match::Resident(r) => (classification, Some(r.id), None, r.name, None),
                    Match::Guest(g) => (classification, None, Some(g.id), g.name, None),
                    Match::Unknown => (
                        classification,
                        None,
                        None,
                        format!("Unregistered vehicle {plate}"),
                        None,
                    ),
                }
            }
        };

        let event = AttendanceEvent::builder(
            ctx.tenant_id,
            Direction::Exit,
            EventSource::MainGate,
            ctx.subject_id,
        )
        .maybe_subject(resident_id)
        .guest(guest_id)
        .person_name(person_name)
        .at(now)
        .location(location)
        .vehicle_plate(plate.clone())
        .method(VerificationMethod::VehiclePlate)
        .outcome(outcome_for(classification))
        .build();
        let event_id = event.id;
        self.recorder.record(event).await;

        let orphan = closed.is_none();
        if orphan {
            tracing::warn!(tenant_id = %ctx.tenant_id, plate = %plate, "exit scan with no open entry");
            self.metrics
                .inc_counter(metric_names::VEHICLE_ORPHAN_EXITS)
                .await;
        } else {
            self.metrics
                .inc_counter(&labelled(metric_names::VEHICLE_EXITS, classification.as_str()))
                .await;
        }

        Ok(VehicleScanOutcome {
            plate,
            classification,
            record_id,
            orphan,
            guest_id: None,
            event_id,
        })
    }

    async fn linked_name(&self, resident_id: Option<Uuid>, guest_id: Option<Uuid>) -> Option<String> {
        if let Some(id) = resident_id {
            return Some(self.resident_name(id).await);
        }
        let id = guest_id?;
        match self.stores.guests.get_guest(id).await {
            Ok(guest) => guest.map(|g| g.name),
            Err(e) => {
                tracing::warn!(guest_id = %id, error = %e, "guest lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::domain::TenantId;
    use crate::engine::test_support::{ctx, MockStores};
    use chrono::Duration;

    fn approved_guest(tenant: TenantId, plate: &str) -> Guest {
        Guest {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            host_resident_id: Uuid::new_v4(),
            name: "Kiran".to_string(),
            party_size: 1,
            purpose: Some("visit".to_string()),
            visit_date: Utc::now().date_naive(),
            valid_until: Utc::now() + Duration::hours(6),
            vehicle_plate: Some(plate.to_string()),
            status: GuestStatus::Approved,
            entry_at: None,
            exit_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_unknown_plate_entry_is_unauthorized() {
        let tenant = TenantId::new();
        let mut mocks = MockStores::new();
        mocks
            .directory
            .expect_find_resident_by_plate()
            .returning(|_, _| Ok(None));
        mocks
            .guests
            .expect_find_guest_by_plate()
            .returning(|_, _, _, _| Ok(None));
        mocks
            .vehicles
            .expect_open_entry()
            .withf(|r| {
                r.plate == "KA01AB1234" && r.classification == VehicleClassification::Unauthorized
            })
            .times(1)
            .returning(|_| Ok(0));
        mocks
            .ledger
            .expect_append()
            .withf(|e| e.outcome == Outcome::Failed && e.direction == Direction::Entry)
            .times(1)
            .returning(|_| Ok(()));

        let outcome = mocks
            .engine()
            .scan_vehicle(
                &ctx(Role::Device, tenant),
                VehicleScan {
                    plate: "ka01 ab-1234".to_string(),
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.classification, VehicleClassification::Unauthorized);
        assert!(outcome.record_id.is_some());
        assert!(!outcome.orphan);
    }

    #[tokio::test]
    async fn test_guest_plate_promotes_guest() {
        let tenant = TenantId::new();
        let guest = approved_guest(tenant, "KA02CD5678");
        let mut checked_in = guest.clone();
        checked_in.status = GuestStatus::CheckedIn;
        let guest_id = guest.id;

        let mut mocks = MockStores::new();
        mocks
            .directory
            .expect_find_resident_by_plate()
            .returning(|_, _| Ok(None));
        mocks
            .guests
            .expect_find_guest_by_plate()
            .returning(move |_, _, _, _| Ok(Some(guest.clone())));
        mocks
            .guests
            .expect_transition_guest()
            .withf(move |id, to, _| *id == guest_id && *to == GuestStatus::CheckedIn)
            .times(1)
            .returning(move |_, _, _| Ok(Some(checked_in.clone())));
        mocks.vehicles.expect_open_entry().returning(|_| Ok(0));
        // One event only: the vehicle entry doubles as the guest's entry
        mocks
            .ledger
            .expect_append()
            .withf(move |e| e.guest_id == Some(guest_id))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = mocks
            .engine()
            .scan_vehicle(
                &ctx(Role::Device, tenant),
                VehicleScan {
                    plate: "KA02CD5678".to_string(),
                    direction: Direction::Entry,
                    location: Some("North gate".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.classification, VehicleClassification::Guest);
        assert_eq!(outcome.guest_id, Some(guest_id));
    }

    #[tokio::test]
    async fn test_losing_promotion_race_still_classifies_guest() {
        let tenant = TenantId::new();
        let guest = approved_guest(tenant, "KA02CD5678");
        let mut raced = guest.clone();
        raced.status = GuestStatus::CheckedIn;

        let mut mocks = MockStores::new();
        mocks
            .directory
            .expect_find_resident_by_plate()
            .returning(|_, _| Ok(None));
        mocks
            .guests
            .expect_find_guest_by_plate()
            .returning(move |_, _, _, _| Ok(Some(guest.clone())));
        mocks
            .guests
            .expect_transition_guest()
            .returning(|_, _, _| Ok(None));
        mocks
            .guests
            .expect_get_guest()
            .returning(move |_| Ok(Some(raced.clone())));
        mocks.vehicles.expect_open_entry().returning(|_| Ok(0));
        mocks.ledger.expect_append().returning(|_| Ok(()));

        let outcome = mocks
            .engine()
            .scan_vehicle(
                &ctx(Role::Device, tenant),
                VehicleScan {
                    plate: "KA02CD5678".to_string(),
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.classification, VehicleClassification::Guest);
        assert_eq!(outcome.guest_id, None);
    }

    #[tokio::test]
    async fn test_failed_entry_write_leaves_guest_approved() {
        let tenant = TenantId::new();
        let guest = approved_guest(tenant, "KA02CD5678");

        let mut mocks = MockStores::new();
        mocks
            .directory
            .expect_find_resident_by_plate()
            .returning(|_, _| Ok(None));
        mocks
            .guests
            .expect_find_guest_by_plate()
            .returning(move |_, _, _, _| Ok(Some(guest.clone())));
        mocks
            .vehicles
            .expect_open_entry()
            .times(1)
            .returning(|_| Err(GateError::Database(sqlx::Error::PoolTimedOut)));
        mocks.guests.expect_transition_guest().never();
        mocks.ledger.expect_append().never();

        let err = mocks
            .engine()
            .scan_vehicle(
                &ctx(Role::Device, tenant),
                VehicleScan {
                    plate: "KA02CD5678".to_string(),
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Database(_)));
    }

    #[tokio::test]
    async fn test_promotion_failure_keeps_the_entry() {
        let tenant = TenantId::new();
        let guest = approved_guest(tenant, "KA02CD5678");
        let guest_id = guest.id;

        let mut mocks = MockStores::new();
        let mut seq = mockall::Sequence::new();
        mocks
            .directory
            .expect_find_resident_by_plate()
            .returning(|_, _| Ok(None));
        mocks
            .guests
            .expect_find_guest_by_plate()
            .returning(move |_, _, _, _| Ok(Some(guest.clone())));
        mocks
            .vehicles
            .expect_open_entry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(0));
        mocks
            .guests
            .expect_transition_guest()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(GateError::Database(sqlx::Error::PoolTimedOut)));
        mocks
            .ledger
            .expect_append()
            .withf(move |e| e.guest_id == Some(guest_id))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = mocks
            .engine()
            .scan_vehicle(
                &ctx(Role::Device, tenant),
                VehicleScan {
                    plate: "KA02CD5678".to_string(),
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.classification, VehicleClassification::Guest);
        assert!(outcome.record_id.is_some());
        assert_eq!(outcome.guest_id, None);
    }

    #[tokio::test]
    async fn test_orphan_exit_is_logged_not_rejected() {
        let tenant = TenantId::new();
        let mut mocks = MockStores::new();
        mocks
            .vehicles
            .expect_close_latest_open()
            .returning(|_, _, _| Ok(None));
        mocks
            .directory
            .expect_find_resident_by_plate()
            .returning(|_, _| Ok(None));
        mocks
            .guests
            .expect_find_guest_by_plate()
            .returning(|_, _, _, _| Ok(None));
        mocks
            .ledger
            .expect_append()
            .withf(|e| e.direction == Direction::Exit)
            .times(1)
            .returning(|_| Ok(()));

        let engine = mocks.engine();
        let outcome = engine
            .scan_vehicle(
                &ctx(Role::Operator, tenant),
                VehicleScan {
                    plate: "MH12XY0001".to_string(),
                    direction: Direction::Exit,
                    location: None,
                },
            )
            .await
            .unwrap();

        assert!(outcome.orphan);
        assert_eq!(outcome.record_id, None);
        assert_eq!(
            engine
                .metrics()
                .get_counter(metric_names::VEHICLE_ORPHAN_EXITS)
                .await,
            1
        );
    }

    #[tokio::test]
    async fn test_blank_plate_is_invalid() {
        let err = MockStores::new()
            .engine()
            .scan_vehicle(
                &ctx(Role::Device, TenantId::new()),
                VehicleScan {
                    plate: " - ".to_string(),
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_residents_cannot_scan() {
        let err = MockStores::new()
            .engine()
            .scan_vehicle(
                &ctx(Role::Resident, TenantId::new()),
                VehicleScan {
                    plate: "KA01AB1234".to_string(),
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Forbidden(_)));
    }
}
