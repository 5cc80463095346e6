//! Amenity booking lifecycle

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{clamp_limit, GateEngine};
use crate::auth::{AuthContext, Role};
use crate::credential::IssuedPass;
use crate::domain::{
    Amenity, AttendanceEvent, Booking, BookingStatus, Direction, EventSource, Outcome,
    VerificationMethod,
};
use crate::infra::{BookingFilter, GateError, Result};
use crate::metrics::{labelled, metric_names};

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub amenity_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub party_size: i32,
}

/// Checkout by booking id (manual) or by re-presenting the pass
#[derive(Debug, Clone)]
pub enum CheckoutTarget {
    Booking(Uuid),
    Pass(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInReceipt {
    pub booking: Booking,
    pub resident_name: String,
    pub amenity_name: String,
}

impl GateEngine {
    pub async fn create_booking(&self, ctx: &AuthContext, req: NewBooking) -> Result<Booking> {
        ctx.require_role(&[Role::Resident])?;

        if req.start_time >= req.end_time {
            return Err(GateError::InvalidInput(
                "startTime must be before endTime".to_string(),
            ));
        }
        if req.party_size < 1 {
            return Err(GateError::InvalidInput(
                "partySize must be at least 1".to_string(),
            ));
        }

        let amenity = self.load_amenity(ctx, req.amenity_id).await?;
        if !amenity.operational {
            return Err(GateError::ResourceUnavailable(format!(
                "{} is not operational",
                amenity.name
            )));
        }
        if req.party_size > amenity.capacity {
            return Err(GateError::ResourceUnavailable(format!(
                "party of {} exceeds {} capacity of {}",
                req.party_size, amenity.name, amenity.capacity
            )));
        }

        let booking = Booking::new(
            ctx.tenant_id,
            amenity.id,
            ctx.subject_id,
            req.date,
            req.start_time,
            req.end_time,
            req.party_size,
        );

        if let Err(e) = self.stores.bookings.create_booking(&booking).await {
            if matches!(e, GateError::Conflict(_)) {
                self.metrics.inc_counter(metric_names::BOOKING_CONFLICTS).await;
            }
            return Err(e);
        }

        self.metrics.inc_counter(metric_names::BOOKINGS_CREATED).await;
        tracing::info!(
            booking_id = %booking.id,
            tenant_id = %booking.tenant_id,
            amenity_id = %booking.amenity_id,
            date = %booking.date,
            "booking created"
        );
        Ok(booking)
    }

    /// Residents see their own bookings, operators the whole tenant
    pub async fn list_bookings(
        &self,
        ctx: &AuthContext,
        status: Option<BookingStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Booking>> {
        let resident_id = match ctx.role {
            Role::Resident => Some(ctx.subject_id),
            Role::Operator => None,
            Role::Device => {
                return Err(GateError::Forbidden(
                    "devices cannot list bookings".to_string(),
                ))
            }
        };

        self.stores
            .bookings
            .list_bookings(&BookingFilter {
                tenant_id: ctx.tenant_id,
                resident_id,
                status,
                limit: clamp_limit(limit),
            })
            .await
    }

    /// Operator-driven status change
    pub async fn update_booking_status(
        &self,
        ctx: &AuthContext,
        booking_id: Uuid,
        to: BookingStatus,
        override_window: bool,
    ) -> Result<Booking> {
        Self::ensure_operator(ctx)?;
        let booking = self.load_booking(ctx, booking_id).await?;

        match to {
            BookingStatus::CheckedIn => self
                .check_in(ctx, booking, VerificationMethod::Manual)
                .await
                .map(|receipt| receipt.booking),
            BookingStatus::CheckedOut => {
                self.check_out(ctx, booking, VerificationMethod::Manual).await
            }
            BookingStatus::NoShow => {
                let today = self.today();
                if booking.status.can_transition_to(to) && booking.date >= today && !override_window
                {
                    return Err(GateError::OutOfWindow(format!(
                        "booking date {} has not passed",
                        booking.date
                    )));
                }
                if override_window {
                    tracing::info!(
                        booking_id = %booking.id,
                        operator_id = %ctx.subject_id,
                        "no-show recorded with operator override"
                    );
                }
                self.transition(&booking, to).await
            }
            _ => self.transition(&booking, to).await,
        }
    }

    /// Owner (or an operator) cancels
    pub async fn cancel_booking(&self, ctx: &AuthContext, booking_id: Uuid) -> Result<Booking> {
        ctx.require_role(&[Role::Resident, Role::Operator])?;
        let booking = self.load_booking(ctx, booking_id).await?;
        if ctx.is_resident() && booking.resident_id != ctx.subject_id {
            return Err(GateError::Forbidden(
                "only the booking owner can cancel".to_string(),
            ));
        }
        self.transition(&booking, BookingStatus::Cancelled).await
    }

    /// Sign a pass for an owned booking. Nothing is consumed.
    pub async fn issue_booking_pass(
        &self,
        ctx: &AuthContext,
        booking_id: Uuid,
    ) -> Result<IssuedPass> {
        ctx.require_role(&[Role::Resident])?;
        let booking = self.load_booking(ctx, booking_id).await?;
        if booking.resident_id != ctx.subject_id {
            return Err(GateError::Forbidden(
                "booking belongs to another resident".to_string(),
            ));
        }

        let pass = self
            .passes
            .issue(&booking, self.config.site_clock.day_end(booking.date))?;
        self.metrics.inc_counter(metric_names::CREDENTIALS_ISSUED).await;
        tracing::debug!(
            booking_id = %booking.id,
            expires_at = %pass.expires_at,
            "booking pass issued"
        );
        Ok(pass)
    }

    /// Consume a booking pass at the amenity scanner
    pub async fn scan_booking_pass(&self, ctx: &AuthContext, token: &str) -> Result<CheckInReceipt> {
        Self::ensure_gate_staff(ctx)?;

        let booking = self.booking_from_pass(ctx, token).await?;
        self.check_in(ctx, booking, VerificationMethod::QrCode).await
    }

    pub async fn checkout_booking(
        &self,
        ctx: &AuthContext,
        target: CheckoutTarget,
    ) -> Result<Booking> {
        Self::ensure_gate_staff(ctx)?;

        let (booking, method) = match target {
            CheckoutTarget::Booking(id) => {
                (self.load_booking(ctx, id).await?, VerificationMethod::Manual)
            }
            CheckoutTarget::Pass(token) => (
                self.booking_from_pass(ctx, &token).await?,
                VerificationMethod::QrCode,
            ),
        };
        self.check_out(ctx, booking, method).await
    }

    async fn booking_from_pass(&self, ctx: &AuthContext, token: &str) -> Result<Booking> {
        let pass = match self.passes.verify(token) {
            Ok(pass) => pass,
            Err(e) => {
                self.metrics
                    .inc_counter(metric_names::CREDENTIALS_REJECTED)
                    .await;
                tracing::info!(error = %e, "booking pass rejected");
                return Err(e);
            }
        };

        let booking = self.load_booking(ctx, pass.booking_id).await?;
        if booking.tenant_id != pass.tenant_id
            || booking.resident_id != pass.resident_id
            || booking.amenity_id != pass.amenity_id
        {
            self.metrics
                .inc_counter(metric_names::CREDENTIALS_REJECTED)
                .await;
            return Err(GateError::InvalidCredential(
                "pass does not match booking".to_string(),
            ));
        }
        Ok(booking)
    }

    async fn check_in(
        &self,
        ctx: &AuthContext,
        booking: Booking,
        method: VerificationMethod,
    ) -> Result<CheckInReceipt> {
        if !booking.status.accepts_check_in() {
            return Err(GateError::illegal_transition(
                "booking",
                booking.id,
                booking.status,
                BookingStatus::CheckedIn,
            ));
        }

        let amenity = self
            .stores
            .directory
            .get_amenity(booking.amenity_id)
            .await?
            .ok_or_else(|| GateError::not_found("amenity", booking.amenity_id))?;
        if !amenity.operational {
            return Err(GateError::ResourceUnavailable(format!(
                "{} is not operational",
                amenity.name
            )));
        }

        let now = Utc::now();
        if booking.date != self.config.site_clock.date_of(now) {
            return Err(GateError::OutOfWindow(format!(
                "booking is for {}, not today",
                booking.date
            )));
        }

        let booking = self.transition(&booking, BookingStatus::CheckedIn).await?;
        let resident_name = self.resident_name(booking.resident_id).await;

        let event = AttendanceEvent::builder(
            booking.tenant_id,
            Direction::Entry,
            EventSource::AmenityCheckin,
            ctx.subject_id,
        )
        .subject(booking.resident_id)
        .booking(booking.id)
        .person_name(resident_name.clone())
        .at(booking.entry_at.unwrap_or(now))
        .location(amenity.name.clone())
        .method(method)
        .outcome(Outcome::Verified)
        .build();
        self.recorder.record(event).await;

        Ok(CheckInReceipt {
            booking,
            resident_name,
            amenity_name: amenity.name,
        })
    }

    async fn check_out(
        &self,
        ctx: &AuthContext,
        booking: Booking,
        method: VerificationMethod,
    ) -> Result<Booking> {
        let booking = self.transition(&booking, BookingStatus::CheckedOut).await?;

        if booking.entry_synthesized {
            tracing::warn!(
                booking_id = %booking.id,
                tenant_id = %booking.tenant_id,
                "checked out without a recorded entry, entry time synthesized"
            );
        }

        let location = match self.stores.directory.get_amenity(booking.amenity_id).await {
            Ok(Some(amenity)) => amenity.name,
            _ => format!("amenity {}", booking.amenity_id),
        };
        let resident_name = self.resident_name(booking.resident_id).await;

        let event = AttendanceEvent::builder(
            booking.tenant_id,
            Direction::Exit,
            EventSource::AmenityCheckin,
            ctx.subject_id,
        )
        .subject(booking.resident_id)
        .booking(booking.id)
        .person_name(resident_name)
        .at(booking.exit_at.unwrap_or_else(Utc::now))
        .location(location)
        .method(method)
        .outcome(Outcome::Verified)
        .build();
        self.recorder.record(event).await;

        Ok(booking)
    }

    /// Conditional update; on a miss, reload to report why.
    async fn transition(&self, booking: &Booking, to: BookingStatus) -> Result<Booking> {
        if !booking.status.can_transition_to(to) {
            return Err(GateError::illegal_transition(
                "booking",
                booking.id,
                booking.status,
                to,
            ));
        }

        let updated = self
            .stores
            .bookings
            .transition_booking(booking.id, to, Utc::now())
            .await?;

        match updated {
            Some(updated) => {
                self.metrics
                    .inc_counter(&labelled(metric_names::BOOKING_TRANSITIONS, to.as_str()))
                    .await;
                tracing::info!(
                    booking_id = %updated.id,
                    tenant_id = %updated.tenant_id,
                    from = %booking.status,
                    to = %to,
                    "booking transitioned"
                );
                Ok(updated)
            }
            None => match self.stores.bookings.get_booking(booking.id).await? {
                // Still eligible, so the store refused because the slot is now held
                Some(current) if to.claims_slot() && current.status.can_transition_to(to) => {
                    self.metrics.inc_counter(metric_names::BOOKING_CONFLICTS).await;
                    Err(GateError::Conflict(format!(
                        "amenity {} already booked on {} between {} and {}",
                        current.amenity_id,
                        current.date,
                        current.start_time.format("%H:%M"),
                        current.end_time.format("%H:%M"),
                    )))
                }
                Some(current) => Err(GateError::illegal_transition(
                    "booking",
                    current.id,
                    current.status,
                    to,
                )),
                None => Err(GateError::not_found("booking", booking.id)),
            },
        }
    }

    async fn load_booking(&self, ctx: &AuthContext, id: Uuid) -> Result<Booking> {
        let booking = self
            .stores
            .bookings
            .get_booking(id)
            .await?
            .ok_or_else(|| GateError::not_found("booking", id))?;
        ctx.ensure_tenant(booking.tenant_id)?;
        Ok(booking)
    }

    async fn load_amenity(&self, ctx: &AuthContext, id: Uuid) -> Result<Amenity> {
        let amenity = self
            .stores
            .directory
            .get_amenity(id)
            .await?
            .ok_or_else(|| GateError::not_found("amenity", id))?;
        ctx.ensure_tenant(amenity.tenant_id)?;
        Ok(amenity)
    }
}
