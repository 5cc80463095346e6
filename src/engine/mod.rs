//! Lifecycle engine
//!
//! Every operation takes the caller's [`AuthContext`] explicitly, validates the request against
//! the current lifecycle state, commits the change through a conditional store update and then
//! hands the attendance event to the [`LedgerRecorder`].

mod booking;
mod gate;
mod guest;
pub mod ledger;
mod pending;
mod vehicle;

pub use booking::{CheckInReceipt, CheckoutTarget, NewBooking};
pub use gate::{AttendanceFilter, DeliveryScan, IdentityScan};
pub use guest::NewGuest;
pub use ledger::{FlushStats, LedgerOutcome, LedgerRecorder, PendingLedgerQueue};
pub use vehicle::{VehicleScan, VehicleScanOutcome};

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::credential::BookingPassIssuer;
use crate::domain::SiteClock;
use crate::infra::{
    AttendanceLedger, BookingStore, DirectoryStore, GateStore, GuestStore, RetryConfig, VehicleLog,
};
use crate::metrics::MetricsRegistry;

/// Default gate label when a scanner sends none
pub const MAIN_GATE: &str = "Main gate";

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 500;

pub(crate) fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Store handles, one per concern
#[derive(Clone)]
pub struct Stores {
    pub directory: Arc<dyn DirectoryStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub guests: Arc<dyn GuestStore>,
    pub vehicles: Arc<dyn VehicleLog>,
    pub ledger: Arc<dyn AttendanceLedger>,
}

impl Stores {
    /// Route every concern to one backend
    pub fn from_store<S: GateStore + 'static>(store: Arc<S>) -> Self {
        Self {
            directory: store.clone(),
            bookings: store.clone(),
            guests: store.clone(),
            vehicles: store.clone(),
            ledger: store,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Calendar used for "today", booking dates and visit dates
    pub site_clock: SiteClock,
    pub pending_delivery_window: Duration,
    pub pending_delivery_limit: u32,
    pub ledger_retry: RetryConfig,
    pub ledger_queue_capacity: usize,
    pub ledger_max_flush_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            site_clock: SiteClock::utc(),
            pending_delivery_window: Duration::hours(12),
            pending_delivery_limit: 5,
            ledger_retry: RetryConfig::ledger(),
            ledger_queue_capacity: ledger::DEFAULT_QUEUE_CAPACITY,
            ledger_max_flush_attempts: ledger::DEFAULT_MAX_FLUSH_ATTEMPTS,
        }
    }
}

pub struct GateEngine {
    stores: Stores,
    recorder: Arc<LedgerRecorder>,
    passes: Arc<BookingPassIssuer>,
    metrics: Arc<MetricsRegistry>,
    config: EngineConfig,
}

impl GateEngine {
    pub fn new(
        stores: Stores,
        passes: Arc<BookingPassIssuer>,
        metrics: Arc<MetricsRegistry>,
        config: EngineConfig,
    ) -> Self {
        let recorder = LedgerRecorder::new(stores.ledger.clone(), metrics.clone())
            .with_retry(config.ledger_retry.clone())
            .with_queue_capacity(config.ledger_queue_capacity)
            .with_max_flush_attempts(config.ledger_max_flush_attempts);

        Self {
            stores,
            recorder: Arc::new(recorder),
            passes,
            metrics,
            config,
        }
    }

    pub fn recorder(&self) -> Arc<LedgerRecorder> {
        self.recorder.clone()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current day on the site calendar
    pub fn today(&self) -> NaiveDate {
        self.config.site_clock.today()
    }

    /// Resident display name for ledger entries. A missing profile never fails a committed
    /// transition.
    async fn resident_name(&self, resident_id: Uuid) -> String {
        match self.stores.directory.get_resident(resident_id).await {
            Ok(Some(resident)) => resident.name,
            Ok(None) => {
                tracing::warn!(%resident_id, "resident profile missing");
                format!("resident {resident_id}")
            }
            Err(e) => {
                tracing::warn!(%resident_id, error = %e, "resident lookup failed");
                format!("resident {resident_id}")
            }
        }
    }

    fn ensure_operator(ctx: &AuthContext) -> crate::infra::Result<()> {
        ctx.require_role(&[crate::auth::Role::Operator])
    }

    /// Scans come from gate devices or operators at the desk
    fn ensure_gate_staff(ctx: &AuthContext) -> crate::infra::Result<()> {
        if ctx.is_gate_staff() {
            Ok(())
        } else {
            Err(crate::infra::GateError::Forbidden(format!(
                "{} credentials cannot submit gate scans",
                ctx.role
            )))
        }
    }
}
