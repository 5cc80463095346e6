//! Guest pre-authorization lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::{clamp_limit, GateEngine, MAIN_GATE};
use crate::auth::{AuthContext, Role};
use crate::domain::{
    normalize_plate, AttendanceEvent, Direction, EventSource, Guest, GuestStatus, Outcome,
    VerificationMethod,
};
use crate::infra::{GateError, GuestFilter, Result};
use crate::metrics::{labelled, metric_names};

#[derive(Debug, Clone)]
pub struct NewGuest {
    pub name: String,
    pub party_size: i32,
    pub purpose: Option<String>,
    pub visit_date: NaiveDate,
    /// Defaults to the end of the visit day
    pub valid_until: Option<DateTime<Utc>>,
    pub vehicle_plate: Option<String>,
}

impl GateEngine {
    pub async fn create_guest(&self, ctx: &AuthContext, req: NewGuest) -> Result<Guest> {
        ctx.require_role(&[Role::Resident])?;

        let name = req.name.trim();
        if name.is_empty() {
            return Err(GateError::InvalidInput("guest name is required".to_string()));
        }
        if req.party_size < 1 {
            return Err(GateError::InvalidInput(
                "partySize must be at least 1".to_string(),
            ));
        }

        let clock = &self.config.site_clock;
        let valid_until = req
            .valid_until
            .unwrap_or_else(|| clock.day_end(req.visit_date));
        if valid_until < clock.day_start(req.visit_date) {
            return Err(GateError::InvalidInput(
                "validUntil is before the visit date".to_string(),
            ));
        }

        let vehicle_plate = match req.vehicle_plate.as_deref() {
            Some(raw) => Some(
                normalize_plate(raw)
                    .ok_or_else(|| GateError::InvalidInput("vehiclePlate is empty".to_string()))?,
            ),
            None => None,
        };

        let guest = Guest {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            host_resident_id: ctx.subject_id,
            name: name.to_string(),
            party_size: req.party_size,
            purpose: req.purpose.filter(|p| !p.trim().is_empty()),
            visit_date: req.visit_date,
            valid_until,
            vehicle_plate,
            status: GuestStatus::Pending,
            entry_at: None,
            exit_at: None,
            created_at: Utc::now(),
        };

        self.stores.guests.create_guest(&guest).await?;
        self.metrics.inc_counter(metric_names::GUESTS_CREATED).await;
        tracing::info!(
            guest_id = %guest.id,
            tenant_id = %guest.tenant_id,
            visit_date = %guest.visit_date,
            "guest registered"
        );
        Ok(guest)
    }

    pub async fn list_guests(
        &self,
        ctx: &AuthContext,
        status: Option<GuestStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Guest>> {
        let host_resident_id = match ctx.role {
            Role::Resident => Some(ctx.subject_id),
            Role::Operator => None,
            Role::Device => {
                return Err(GateError::Forbidden("devices cannot list guests".to_string()))
            }
        };

        self.stores
            .guests
            .list_guests(&GuestFilter {
                tenant_id: ctx.tenant_id,
                host_resident_id,
                status,
                limit: clamp_limit(limit),
            })
            .await
    }

    /// Operator approval, rejection and manual check-in/out
    pub async fn update_guest_status(
        &self,
        ctx: &AuthContext,
        guest_id: Uuid,
        to: GuestStatus,
    ) -> Result<Guest> {
        Self::ensure_operator(ctx)?;

        let guest = self
            .stores
            .guests
            .get_guest(guest_id)
            .await?
            .ok_or_else(|| GateError::not_found("guest", guest_id))?;
        ctx.ensure_tenant(guest.tenant_id)?;

        let updated = self.transition_guest(&guest, to).await?;

        let direction = match to {
            GuestStatus::CheckedIn => Some(Direction::Entry),
            GuestStatus::CheckedOut => Some(Direction::Exit),
            _ => None,
        };
        if let Some(direction) = direction {
            let at = match direction {
                Direction::Entry => updated.entry_at,
                Direction::Exit => updated.exit_at,
            };
            let mut builder = AttendanceEvent::builder(
                updated.tenant_id,
                direction,
                EventSource::MainGate,
                ctx.subject_id,
            )
            .guest(Some(updated.id))
            .person_name(updated.name.clone())
            .at(at.unwrap_or_else(Utc::now))
            .location(MAIN_GATE)
            .purpose(updated.purpose.clone())
            .method(VerificationMethod::Manual)
            .outcome(Outcome::Verified);
            if let Some(plate) = &updated.vehicle_plate {
                builder = builder.vehicle_plate(plate.clone());
            }
            self.recorder.record(builder.build()).await;
        }

        Ok(updated)
    }

    /// Conditional update shared with the vehicle reconciler
    pub(crate) async fn transition_guest(&self, guest: &Guest, to: GuestStatus) -> Result<Guest> {
        if !guest.status.can_transition_to(to) {
            return Err(GateError::illegal_transition(
                "guest",
                guest.id,
                guest.status,
                to,
            ));
        }

        match self
            .stores
            .guests
            .transition_guest(guest.id, to, Utc::now())
            .await?
        {
            Some(updated) => {
                self.metrics
                    .inc_counter(&labelled(metric_names::GUEST_TRANSITIONS, to.as_str()))
                    .await;
                tracing::info!(
                    guest_id = %updated.id,
                    tenant_id = %updated.tenant_id,
                    from = %guest.status,
                    to = %to,
                    "guest transitioned"
                );
                Ok(updated)
            }
            None => match self.stores.guests.get_guest(guest.id).await? {
                Some(current) => Err(GateError::illegal_transition(
                    "guest",
                    current.id,
                    current.status,
                    to,
                )),
                None => Err(GateError::not_found("guest", guest.id)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SiteClock, TenantId};
    use crate::engine::test_support::{ctx, MockStores};
    use chrono::{Duration, FixedOffset};

    fn day_start(date: NaiveDate) -> DateTime<Utc> {
        SiteClock::utc().day_start(date)
    }

    fn day_end(date: NaiveDate) -> DateTime<Utc> {
        SiteClock::utc().day_end(date)
    }

    fn guest(tenant: TenantId, status: GuestStatus) -> Guest {
        let today = Utc::now().date_naive();
        Guest {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            host_resident_id: Uuid::new_v4(),
            name: "Meera".to_string(),
            party_size: 2,
            purpose: Some("dinner".to_string()),
            visit_date: today,
            valid_until: day_end(today),
            vehicle_plate: None,
            status,
            entry_at: None,
            exit_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_plate_and_defaults_validity() {
        let tenant = TenantId::new();
        let mut mocks = MockStores::new();
        mocks.guests.expect_create_guest().times(1).returning(|_| Ok(()));

        let resident = ctx(Role::Resident, tenant);
        let visit = Utc::now().date_naive();
        let guest = mocks
            .engine()
            .create_guest(
                &resident,
                NewGuest {
                    name: "  Meera ".to_string(),
                    party_size: 1,
                    purpose: None,
                    visit_date: visit,
                    valid_until: None,
                    vehicle_plate: Some("ka-02 cd 5678".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(guest.status, GuestStatus::Pending);
        assert_eq!(guest.name, "Meera");
        assert_eq!(guest.host_resident_id, resident.subject_id);
        assert_eq!(guest.vehicle_plate.as_deref(), Some("KA02CD5678"));
        assert_eq!(guest.valid_until, day_end(visit));
    }

    #[tokio::test]
    async fn test_default_validity_ends_with_the_site_day() {
        let clock = SiteClock::new(FixedOffset::east_opt(5 * 3600 + 1800).unwrap());
        let mut mocks = MockStores::new();
        mocks.guests.expect_create_guest().times(1).returning(|_| Ok(()));

        let visit = clock.today();
        let guest = mocks
            .engine_on(clock)
            .create_guest(
                &ctx(Role::Resident, TenantId::new()),
                NewGuest {
                    name: "Meera".to_string(),
                    party_size: 1,
                    purpose: None,
                    visit_date: visit,
                    valid_until: None,
                    vehicle_plate: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(guest.valid_until, clock.day_end(visit));
        assert_eq!(guest.valid_until, day_end(visit) - Duration::minutes(330));
    }

    #[tokio::test]
    async fn test_create_rejects_validity_before_visit() {
        let visit = Utc::now().date_naive();
        let err = MockStores::new()
            .engine()
            .create_guest(
                &ctx(Role::Resident, TenantId::new()),
                NewGuest {
                    name: "Meera".to_string(),
                    party_size: 1,
                    purpose: None,
                    visit_date: visit,
                    valid_until: Some(day_start(visit) - Duration::hours(1)),
                    vehicle_plate: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_only_operators_approve() {
        let err = MockStores::new()
            .engine()
            .update_guest_status(
                &ctx(Role::Resident, TenantId::new()),
                Uuid::new_v4(),
                GuestStatus::Approved,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_approve_writes_no_ledger_entry() {
        let tenant = TenantId::new();
        let pending = guest(tenant, GuestStatus::Pending);
        let mut approved = pending.clone();
        approved.status = GuestStatus::Approved;

        let mut mocks = MockStores::new();
        mocks
            .guests
            .expect_get_guest()
            .returning(move |_| Ok(Some(pending.clone())));
        mocks
            .guests
            .expect_transition_guest()
            .returning(move |_, _, _| Ok(Some(approved.clone())));
        mocks.ledger.expect_append().never();

        let updated = mocks
            .engine()
            .update_guest_status(&ctx(Role::Operator, tenant), Uuid::new_v4(), GuestStatus::Approved)
            .await
            .unwrap();
        assert_eq!(updated.status, GuestStatus::Approved);
    }

    #[tokio::test]
    async fn test_manual_check_in_writes_entry_event() {
        let tenant = TenantId::new();
        let approved = guest(tenant, GuestStatus::Approved);
        let mut checked_in = approved.clone();
        checked_in.status = GuestStatus::CheckedIn;
        checked_in.entry_at = Some(Utc::now());
        let guest_id = approved.id;

        let mut mocks = MockStores::new();
        mocks
            .guests
            .expect_get_guest()
            .returning(move |_| Ok(Some(approved.clone())));
        mocks
            .guests
            .expect_transition_guest()
            .returning(move |_, _, _| Ok(Some(checked_in.clone())));
        mocks
            .ledger
            .expect_append()
            .withf(move |e| {
                e.guest_id == Some(guest_id)
                    && e.direction == Direction::Entry
                    && e.source == EventSource::MainGate
                    && e.verification_method == VerificationMethod::Manual
            })
            .times(1)
            .returning(|_| Ok(()));

        mocks
            .engine()
            .update_guest_status(&ctx(Role::Operator, tenant), guest_id, GuestStatus::CheckedIn)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_same_state_is_illegal() {
        let tenant = TenantId::new();
        let approved = guest(tenant, GuestStatus::Approved);

        let mut mocks = MockStores::new();
        mocks
            .guests
            .expect_get_guest()
            .returning(move |_| Ok(Some(approved.clone())));
        mocks.guests.expect_transition_guest().never();

        let err = mocks
            .engine()
            .update_guest_status(&ctx(Role::Operator, tenant), Uuid::new_v4(), GuestStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::IllegalStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_foreign_guest_is_forbidden() {
        let foreign = guest(TenantId::new(), GuestStatus::Pending);
        let mut mocks = MockStores::new();
        mocks
            .guests
            .expect_get_guest()
            .returning(move |_| Ok(Some(foreign.clone())));

        let err = mocks
            .engine()
            .update_guest_status(
                &ctx(Role::Operator, TenantId::new()),
                Uuid::new_v4(),
                GuestStatus::Approved,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Forbidden(_)));
    }
}
