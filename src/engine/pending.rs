//! Deliveries that arrived recently for a resident.
//!
//! There is no "collected" state; an arrival simply ages out of the trailing window.

use chrono::Utc;

use super::GateEngine;
use crate::auth::{AuthContext, Role};
use crate::domain::{AttendanceEvent, AttendanceQuery, Direction, EventSource};
use crate::infra::Result;

impl GateEngine {
    pub async fn pending_deliveries(&self, ctx: &AuthContext) -> Result<Vec<AttendanceEvent>> {
        ctx.require_role(&[Role::Resident])?;

        let mut query = AttendanceQuery::for_tenant(ctx.tenant_id)
            .with_limit(Some(self.config.pending_delivery_limit));
        query.source = Some(EventSource::DeliveryPoint);
        query.direction = Some(Direction::Entry);
        query.subject_id = Some(ctx.subject_id);
        query.since = Some(Utc::now() - self.config.pending_delivery_window);

        self.stores.ledger.query(&query).await
    }
}
