//! Common test utilities and fixtures for integration tests
//!
//! Every harness owns a private in-memory SQLite database with one tenant seeded: a pool, a
//! resident with a registered car, a worker, an operator and a gate device.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use chrono::{Duration, NaiveTime, Utc};
use uuid::Uuid;

use gatehouse::auth::{AuthContext, AuthMiddlewareState, RateLimiter, Role, TenantGuard};
use gatehouse::credential::BookingPassIssuer;
use gatehouse::domain::{Amenity, Operator, Resident, TenantId, Worker};
use gatehouse::engine::{EngineConfig, GateEngine, NewBooking, Stores};
use gatehouse::infra::{DirectoryStore, SqliteGateStore};
use gatehouse::metrics::MetricsRegistry;
use gatehouse::server::{build_router, AppState};

pub const ISSUER: &str = "gatehouse";
pub const AUDIENCE: &str = "gatehouse-api";
pub const RESIDENT_SECRET: &[u8] = b"resident-secret-for-tests-000000";
pub const OPERATOR_SECRET: &[u8] = b"operator-secret-for-tests-000000";
pub const DEVICE_SECRET: &[u8] = b"device-secret-for-tests-00000000";
pub const PASS_SECRET: &[u8] = b"pass-secret-for-tests-0000000000";

pub const RESIDENT_PLATE: &str = "KA05MN4321";

pub fn slot(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// One seeded tenant
pub struct Community {
    pub tenant: TenantId,
    pub pool: Amenity,
    pub resident: Resident,
    pub worker: Worker,
    pub operator_id: Uuid,
    pub device_id: Uuid,
}

impl Community {
    pub fn resident_ctx(&self) -> AuthContext {
        AuthContext::new(self.resident.id, self.tenant, Role::Resident)
    }

    pub fn operator_ctx(&self) -> AuthContext {
        AuthContext::new(self.operator_id, self.tenant, Role::Operator)
    }

    pub fn device_ctx(&self) -> AuthContext {
        AuthContext::new(self.device_id, self.tenant, Role::Device)
    }

    /// Today's 09:00 to 10:00 pool slot for two
    pub fn pool_booking(&self) -> NewBooking {
        NewBooking {
            amenity_id: self.pool.id,
            date: Utc::now().date_naive(),
            start_time: slot(9, 0),
            end_time: slot(10, 0),
            party_size: 2,
        }
    }
}

pub struct Harness {
    pub store: Arc<SqliteGateStore>,
    pub engine: Arc<GateEngine>,
    pub guard: Arc<TenantGuard>,
    pub metrics: Arc<MetricsRegistry>,
    pub community: Community,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteGateStore::in_memory().await.unwrap());
        let stores = Stores::from_store(store.clone());
        let metrics = Arc::new(MetricsRegistry::new());

        let guard = Arc::new(
            TenantGuard::new(ISSUER, AUDIENCE)
                .with_secret(Role::Resident, RESIDENT_SECRET)
                .with_secret(Role::Operator, OPERATOR_SECRET)
                .with_secret(Role::Device, DEVICE_SECRET)
                .with_directory(stores.directory.clone()),
        );
        let passes = Arc::new(BookingPassIssuer::new(PASS_SECRET, ISSUER, Duration::hours(48)));
        let engine = Arc::new(GateEngine::new(
            stores,
            passes,
            metrics.clone(),
            EngineConfig::default(),
        ));

        let community = seed_community(store.as_ref(), "Sunrise Towers").await;

        Self {
            store,
            engine,
            guard,
            metrics,
            community,
        }
    }

    /// A second, unrelated tenant in the same database
    pub async fn other_community(&self) -> Community {
        seed_community(self.store.as_ref(), "Lakeview Enclave").await
    }

    pub fn router(&self) -> Router {
        self.router_with_limiter(None)
    }

    pub fn router_with_limiter(&self, rate_limiter: Option<Arc<RateLimiter>>) -> Router {
        let auth_state = AuthMiddlewareState {
            guard: self.guard.clone(),
            rate_limiter,
            metrics: self.metrics.clone(),
        };
        build_router(auth_state).with_state(AppState {
            engine: self.engine.clone(),
            store: self.store.clone(),
        })
    }

    pub fn token(&self, role: Role, subject: Uuid, tenant: Option<TenantId>) -> String {
        self.guard
            .issue(role, subject, tenant, Duration::hours(1))
            .unwrap()
    }

    pub fn resident_token(&self) -> String {
        let c = &self.community;
        self.token(Role::Resident, c.resident.id, Some(c.tenant))
    }

    /// Operator credential without a tenant claim; the guard resolves it from the directory
    pub fn operator_token(&self) -> String {
        self.token(Role::Operator, self.community.operator_id, None)
    }

    pub fn device_token(&self) -> String {
        let c = &self.community;
        self.token(Role::Device, c.device_id, Some(c.tenant))
    }
}

async fn seed_community(directory: &dyn DirectoryStore, name: &str) -> Community {
    let tenant = TenantId::new();

    let pool = Amenity {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        name: format!("{name} Pool"),
        capacity: 10,
        operational: true,
    };
    let resident = Resident {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        name: "Priya Raman".to_string(),
        unit: Some("A-1203".to_string()),
        vehicle_plates: vec![RESIDENT_PLATE.to_string()],
    };
    let worker = Worker {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        name: "Ramesh".to_string(),
        department: Some("security".to_string()),
    };
    let operator = Operator {
        id: Uuid::new_v4(),
        tenant_id: Some(tenant),
        name: format!("{name} front desk"),
    };

    directory.upsert_amenity(&pool).await.unwrap();
    directory.upsert_resident(&resident).await.unwrap();
    directory.upsert_worker(&worker).await.unwrap();
    directory.upsert_operator(&operator).await.unwrap();

    Community {
        tenant,
        pool,
        resident,
        worker,
        operator_id: operator.id,
        device_id: Uuid::new_v4(),
    }
}
