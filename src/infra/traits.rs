//! Store traits for the gatehouse engine
//!
//! Every lifecycle mutation goes through a conditional update whose `WHERE` clause carries the
//! allowed from-states, so two racing callers cannot both win. The ledger trait exposes no
//! update or delete.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    Amenity, AttendanceEvent, AttendanceQuery, Booking, BookingStatus, Guest, GuestStatus,
    Operator, Resident, TenantId, VehicleEntryRecord, Worker,
};

use super::Result;

/// Read access to the community directory, plus seeding for bootstrap tooling.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_amenity(&self, id: Uuid) -> Result<Option<Amenity>>;

    async fn get_resident(&self, id: Uuid) -> Result<Option<Resident>>;

    async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>>;

    async fn get_operator(&self, id: Uuid) -> Result<Option<Operator>>;

    /// Tenant linked to an operator profile, if any
    async fn operator_tenant(&self, operator_id: Uuid) -> Result<Option<TenantId>>;

    /// Resident in `tenant_id` whose roster lists the normalized `plate`
    async fn find_resident_by_plate(
        &self,
        tenant_id: TenantId,
        plate: &str,
    ) -> Result<Option<Resident>>;

    async fn upsert_amenity(&self, amenity: &Amenity) -> Result<()>;

    async fn upsert_resident(&self, resident: &Resident) -> Result<()>;

    async fn upsert_worker(&self, worker: &Worker) -> Result<()>;

    async fn upsert_operator(&self, operator: &Operator) -> Result<()>;
}

/// Listing filter for bookings
#[derive(Debug, Clone, PartialEq)]
pub struct BookingFilter {
    pub tenant_id: TenantId,
    pub resident_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub limit: u32,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a `pending` booking unless a slot-holding booking for the same amenity overlaps it.
    ///
    /// The overlap check and the insert are atomic. Fails with `Conflict` on overlap.
    async fn create_booking(&self, booking: &Booking) -> Result<()>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>>;

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>>;

    /// Move a booking to `to` if its current status is one of `to.predecessors()`.
    ///
    /// Stamps timestamps as the status requires (entry on check-in, exit on check-out with a
    /// synthesized entry if missing, cancellation time on cancel). Returns `None` when no row
    /// matched, either because the id is unknown or the precondition failed.
    async fn transition_booking(
        &self,
        id: Uuid,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>>;
}

/// Listing filter for guests
#[derive(Debug, Clone, PartialEq)]
pub struct GuestFilter {
    pub tenant_id: TenantId,
    pub host_resident_id: Option<Uuid>,
    pub status: Option<GuestStatus>,
    pub limit: u32,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait GuestStore: Send + Sync {
    async fn create_guest(&self, guest: &Guest) -> Result<()>;

    async fn get_guest(&self, id: Uuid) -> Result<Option<Guest>>;

    async fn list_guests(&self, filter: &GuestFilter) -> Result<Vec<Guest>>;

    /// Conditional status update, same contract as [`BookingStore::transition_booking`].
    async fn transition_guest(
        &self,
        id: Uuid,
        to: GuestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Guest>>;

    /// Approved or checked-in guest in `tenant_id` with this plate whose pass covers `now`
    async fn find_guest_by_plate(
        &self,
        tenant_id: TenantId,
        plate: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VehicleLog: Send + Sync {
    /// Insert an open record, first closing any record still open for the same tenant and plate
    /// with reason `superseded`. Returns how many records were superseded.
    async fn open_entry(&self, record: &VehicleEntryRecord) -> Result<u64>;

    /// Close the most recent open record for the plate (last in, first closed).
    async fn close_latest_open(
        &self,
        tenant_id: TenantId,
        plate: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<VehicleEntryRecord>>;

    /// Newest first
    async fn list_entries(
        &self,
        tenant_id: TenantId,
        open_only: bool,
        limit: u32,
    ) -> Result<Vec<VehicleEntryRecord>>;
}

/// Append-only attendance trail
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AttendanceLedger: Send + Sync {
    /// Append an event. Appending an id that already exists is a no-op.
    async fn append(&self, event: &AttendanceEvent) -> Result<()>;

    /// Newest first
    async fn query(&self, query: &AttendanceQuery) -> Result<Vec<AttendanceEvent>>;
}

/// Liveness check for the backing database
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorePing: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Every store concern in one object, for wiring a single backend into the engine.
pub trait GateStore:
    DirectoryStore + BookingStore + GuestStore + VehicleLog + AttendanceLedger + StorePing
{
}

impl<T> GateStore for T where
    T: DirectoryStore + BookingStore + GuestStore + VehicleLog + AttendanceLedger + StorePing
{
}

/// Individual component health
#[derive(Debug, Clone)]
pub enum ComponentHealth {
    Healthy,
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentHealth::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ComponentHealth::Unhealthy { .. })
    }
}
