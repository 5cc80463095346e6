//! Identity and delivery scans, plus the operator ledger view

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use super::{GateEngine, MAIN_GATE};
use crate::auth::AuthContext;
use crate::domain::{
    AttendanceEvent, AttendanceQuery, Direction, EventSource, Outcome, SubjectType,
    VerificationMethod,
};
use crate::infra::{GateError, Result};

#[derive(Debug, Clone)]
pub struct IdentityScan {
    pub subject_id: Uuid,
    pub subject_type: SubjectType,
    pub direction: Direction,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeliveryScan {
    pub resident_id: Uuid,
    pub courier_name: String,
    pub direction: Direction,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub source: Option<EventSource>,
    pub direction: Option<Direction>,
    /// Calendar day on the site clock
    pub date: Option<NaiveDate>,
    pub limit: Option<u32>,
}

fn location_or(location: Option<String>, default: &str) -> String {
    location
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl GateEngine {
    /// Resident or worker recognized at the gate
    pub async fn identity_scan(
        &self,
        ctx: &AuthContext,
        scan: IdentityScan,
    ) -> Result<AttendanceEvent> {
        Self::ensure_gate_staff(ctx)?;

        let directory = &self.stores.directory;
        let (tenant_id, name) = match scan.subject_type {
            SubjectType::Resident => directory
                .get_resident(scan.subject_id)
                .await?
                .map(|r| (r.tenant_id, r.name))
                .ok_or_else(|| GateError::not_found("resident", scan.subject_id))?,
            SubjectType::Worker => directory
                .get_worker(scan.subject_id)
                .await?
                .map(|w| (w.tenant_id, w.name))
                .ok_or_else(|| GateError::not_found("worker", scan.subject_id))?,
        };
        ctx.ensure_tenant(tenant_id)?;

        let event = AttendanceEvent::builder(
            ctx.tenant_id,
            scan.direction,
            EventSource::MainGate,
            ctx.subject_id,
        )
        .subject(scan.subject_id)
        .person_name(name)
        .location(location_or(scan.location, MAIN_GATE))
        .method(VerificationMethod::FacialRecognition)
        .outcome(Outcome::Verified)
        .build();

        tracing::info!(
            tenant_id = %ctx.tenant_id,
            subject_id = %scan.subject_id,
            direction = %scan.direction,
            "identity scan"
        );
        self.recorder.record(event.clone()).await;
        Ok(event)
    }

    /// Courier arrival (entry) or collection (exit) for a resident
    pub async fn delivery_scan(
        &self,
        ctx: &AuthContext,
        scan: DeliveryScan,
    ) -> Result<AttendanceEvent> {
        Self::ensure_gate_staff(ctx)?;

        let courier = scan.courier_name.trim();
        if courier.is_empty() {
            return Err(GateError::InvalidInput("courierName is required".to_string()));
        }

        let resident = self
            .stores
            .directory
            .get_resident(scan.resident_id)
            .await?
            .ok_or_else(|| GateError::not_found("resident", scan.resident_id))?;
        ctx.ensure_tenant(resident.tenant_id)?;

        let event = AttendanceEvent::builder(
            ctx.tenant_id,
            scan.direction,
            EventSource::DeliveryPoint,
            ctx.subject_id,
        )
        .subject(resident.id)
        .person_name(courier)
        .location(location_or(scan.location, "Delivery point"))
        .purpose(Some(format!("delivery for {}", resident.name)))
        .method(VerificationMethod::Manual)
        .outcome(Outcome::Verified)
        .build();

        tracing::info!(
            tenant_id = %ctx.tenant_id,
            resident_id = %resident.id,
            direction = %scan.direction,
            "delivery scan"
        );
        self.recorder.record(event.clone()).await;
        Ok(event)
    }

    pub async fn list_attendance(
        &self,
        ctx: &AuthContext,
        filter: AttendanceFilter,
    ) -> Result<Vec<AttendanceEvent>> {
        Self::ensure_operator(ctx)?;

        let mut query = AttendanceQuery::for_tenant(ctx.tenant_id).with_limit(filter.limit);
        query.source = filter.source;
        query.direction = filter.direction;
        if let Some(date) = filter.date {
            let start = self.config.site_clock.day_start(date);
            query.since = Some(start);
            query.until = Some(start + Duration::days(1));
        }

        self.stores.ledger.query(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::domain::{Resident, TenantId, Worker};
    use crate::engine::test_support::{ctx, MockStores};

    fn resident(tenant: TenantId) -> Resident {
        Resident {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            name: "Anil".to_string(),
            unit: Some("B-402".to_string()),
            vehicle_plates: vec![],
        }
    }

    #[tokio::test]
    async fn test_worker_identity_scan() {
        let tenant = TenantId::new();
        let worker = Worker {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            name: "Sunita".to_string(),
            department: Some("housekeeping".to_string()),
        };
        let worker_id = worker.id;

        let mut mocks = MockStores::new();
        mocks
            .directory
            .expect_get_worker()
            .returning(move |_| Ok(Some(worker.clone())));
        mocks.ledger.expect_append().times(1).returning(|_| Ok(()));

        let event = mocks
            .engine()
            .identity_scan(
                &ctx(Role::Device, tenant),
                IdentityScan {
                    subject_id: worker_id,
                    subject_type: SubjectType::Worker,
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(event.subject_id, Some(worker_id));
        assert_eq!(event.person_name, "Sunita");
        assert_eq!(event.verification_method, VerificationMethod::FacialRecognition);
        assert!(event.verify_digest());
    }

    #[tokio::test]
    async fn test_identity_scan_unknown_and_foreign_subjects() {
        let tenant = TenantId::new();
        let foreign = resident(TenantId::new());

        let mut mocks = MockStores::new();
        let foreign_id = foreign.id;
        mocks.directory.expect_get_resident().returning(move |id| {
            if id == foreign_id {
                Ok(Some(foreign.clone()))
            } else {
                Ok(None)
            }
        });
        mocks.ledger.expect_append().never();
        let engine = mocks.engine();
        let device = ctx(Role::Device, tenant);

        let scan = |subject_id| IdentityScan {
            subject_id,
            subject_type: SubjectType::Resident,
            direction: Direction::Entry,
            location: None,
        };

        assert!(matches!(
            engine.identity_scan(&device, scan(Uuid::new_v4())).await,
            Err(GateError::NotFound { .. })
        ));
        assert!(matches!(
            engine.identity_scan(&device, scan(foreign_id)).await,
            Err(GateError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_delivery_scan_targets_recipient() {
        let tenant = TenantId::new();
        let recipient = resident(tenant);
        let recipient_id = recipient.id;

        let mut mocks = MockStores::new();
        mocks
            .directory
            .expect_get_resident()
            .returning(move |_| Ok(Some(recipient.clone())));
        mocks
            .ledger
            .expect_append()
            .withf(move |e| {
                e.source == EventSource::DeliveryPoint && e.subject_id == Some(recipient_id)
            })
            .times(1)
            .returning(|_| Ok(()));

        let event = mocks
            .engine()
            .delivery_scan(
                &ctx(Role::Operator, tenant),
                DeliveryScan {
                    resident_id: recipient_id,
                    courier_name: "Swift Couriers".to_string(),
                    direction: Direction::Entry,
                    location: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(event.person_name, "Swift Couriers");
        assert_eq!(event.location, "Delivery point");
    }

    #[tokio::test]
    async fn test_attendance_date_filter_covers_one_day() {
        let tenant = TenantId::new();
        let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let mut mocks = MockStores::new();
        mocks
            .ledger
            .expect_query()
            .withf(move |q| {
                q.tenant_id == tenant
                    && q.limit == AttendanceQuery::MAX_LIMIT
                    && q.since.map(|s| s.date_naive()) == Some(day)
                    && q.until.map(|u| u.date_naive()) == day.succ_opt()
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        let events = mocks
            .engine()
            .list_attendance(
                &ctx(Role::Operator, tenant),
                AttendanceFilter {
                    date: Some(day),
                    limit: Some(10_000),
                    ..AttendanceFilter::default()
                },
            )
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_residents_cannot_read_ledger() {
        let err = MockStores::new()
            .engine()
            .list_attendance(
                &ctx(Role::Resident, TenantId::new()),
                AttendanceFilter::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Forbidden(_)));
    }
}
