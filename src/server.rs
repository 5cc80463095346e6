//! HTTP server bootstrap for the gatehouse.
//!
//! This module wires together:
//! - configuration
//! - the store backend (Postgres or SQLite, chosen by `DATABASE_URL`)
//! - the Tenant Guard, booking-pass issuer and lifecycle engine
//! - the Axum router and the background ledger flush

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::api::handlers::{health_check, metrics, readiness_check};
use crate::auth::{AuthMiddlewareState, RateLimiter, Role, TenantGuard};
use crate::credential::BookingPassIssuer;
use crate::domain::SiteClock;
use crate::engine::{EngineConfig, GateEngine, Stores};
use crate::infra::{PgGateStore, SqliteGateStore, StorePing};
use crate::metrics::MetricsRegistry;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `postgres://…` or `sqlite:…`
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub max_connections: u32,
    pub migrate_on_startup: bool,
    pub secrets: CredentialSecrets,
    pub token_issuer: String,
    pub token_audience: String,
    pub booking_pass_ttl: chrono::Duration,
    /// Site calendar; the server's local offset unless `SITE_UTC_OFFSET` is set
    pub site_clock: SiteClock,
    pub pending_delivery_window: chrono::Duration,
    pub pending_delivery_limit: u32,
    pub rate_limit_per_minute: Option<u32>,
    pub ledger_flush_every: Duration,
}

/// One signing secret per credential kind, plus the booking-pass secret.
#[derive(Clone)]
pub struct CredentialSecrets {
    pub resident: String,
    pub operator: String,
    pub device: String,
    pub booking_pass: String,
}

impl std::fmt::Debug for CredentialSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialSecrets(<redacted>)")
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn required_secret(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => anyhow::bail!("{name} must be set"),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/gatehouse".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_or("PORT", 8080);
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {host}:{port}: {e}"))?;

        let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
            .ok()
            .map(|v| {
                !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "off"
                )
            })
            .unwrap_or(true);

        let secrets = CredentialSecrets {
            resident: required_secret("RESIDENT_TOKEN_SECRET")?,
            operator: required_secret("OPERATOR_TOKEN_SECRET")?,
            device: required_secret("DEVICE_TOKEN_SECRET")?,
            booking_pass: required_secret("BOOKING_PASS_SECRET")?,
        };

        let site_clock = match std::env::var("SITE_UTC_OFFSET") {
            Ok(raw) if !raw.trim().is_empty() => SiteClock::parse(&raw).ok_or_else(|| {
                anyhow::anyhow!("Invalid SITE_UTC_OFFSET {raw:?}, expected e.g. +05:30 or Z")
            })?,
            _ => SiteClock::server_local(),
        };

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0);

        Ok(Self {
            database_url,
            listen_addr,
            max_connections: env_or("MAX_DB_CONNECTIONS", 10),
            migrate_on_startup,
            secrets,
            token_issuer: std::env::var("TOKEN_ISSUER").unwrap_or_else(|_| "gatehouse".to_string()),
            token_audience: std::env::var("TOKEN_AUDIENCE")
                .unwrap_or_else(|_| "gatehouse-api".to_string()),
            booking_pass_ttl: chrono::Duration::hours(env_or("BOOKING_PASS_TTL_HOURS", 48)),
            site_clock,
            pending_delivery_window: chrono::Duration::hours(env_or(
                "PENDING_DELIVERY_WINDOW_HOURS",
                12,
            )),
            pending_delivery_limit: env_or("PENDING_DELIVERY_LIMIT", 5),
            rate_limit_per_minute,
            ledger_flush_every: Duration::from_secs(env_or("LEDGER_RETRY_FLUSH_SECS", 30).max(1)),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            site_clock: self.site_clock,
            pending_delivery_window: self.pending_delivery_window,
            pending_delivery_limit: self.pending_delivery_limit,
            ..EngineConfig::default()
        }
    }

    /// Tenant Guard with one key per credential kind
    pub fn tenant_guard(&self) -> TenantGuard {
        TenantGuard::new(&self.token_issuer, &self.token_audience)
            .with_secret(Role::Resident, self.secrets.resident.as_bytes())
            .with_secret(Role::Operator, self.secrets.operator.as_bytes())
            .with_secret(Role::Device, self.secrets.device.as_bytes())
    }

    pub fn pass_issuer(&self) -> BookingPassIssuer {
        BookingPassIssuer::new(
            self.secrets.booking_pass.as_bytes(),
            &self.token_issuer,
            self.booking_pass_ttl,
        )
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GateEngine>,
    /// Pinged by the readiness check
    pub store: Arc<dyn StorePing>,
}

/// Open the configured backend and apply migrations when enabled.
pub async fn open_stores(config: &Config) -> anyhow::Result<(Stores, Arc<dyn StorePing>)> {
    let url = config.database_url.as_str();

    if url.starts_with("sqlite:") {
        let store = if url.contains(":memory:") {
            // in_memory() always applies the schema
            SqliteGateStore::in_memory().await?
        } else {
            let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?;
            let store = SqliteGateStore::new(pool);
            if config.migrate_on_startup {
                store.initialize().await?;
            }
            store
        };
        info!("Using SQLite store");
        let store = Arc::new(store);
        return Ok((Stores::from_store(store.clone()), store));
    }

    let store = PgGateStore::from_url(url, config.max_connections).await?;
    if config.migrate_on_startup {
        store.initialize().await?;
        info!("DB migrations applied");
    } else {
        info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
    }
    info!("Using Postgres store");
    let store = Arc::new(store);
    Ok((Stores::from_store(store.clone()), store))
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting gatehouse v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let (stores, ping) = open_stores(&config).await?;

    let metrics = Arc::new(MetricsRegistry::new());
    let guard = Arc::new(config.tenant_guard().with_directory(stores.directory.clone()));
    let engine = Arc::new(GateEngine::new(
        stores,
        Arc::new(config.pass_issuer()),
        metrics.clone(),
        config.engine_config(),
    ));

    let rate_limiter = config.rate_limit_per_minute.map(|rpm| {
        info!(rpm, "Per-tenant rate limiting enabled");
        Arc::new(RateLimiter::new(rpm))
    });

    let auth_state = AuthMiddlewareState {
        guard,
        rate_limiter,
        metrics,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = engine
        .recorder()
        .spawn_flush_task(config.ledger_flush_every, shutdown_rx);

    let state = AppState {
        engine,
        store: ping,
    };

    let mut app = build_router(auth_state);
    if let Some(cors_layer) = cors_layer_from_env()? {
        app = app.layer(cors_layer);
    }
    let app = app.with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("gatehouse is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = flusher.await {
        warn!(error = %e, "ledger flush task ended abnormally");
    }
    info!("gatehouse stopped");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// `/api` behind the Tenant Guard, health checks and metrics outside it.
pub fn build_router(auth_state: AuthMiddlewareState) -> Router<AppState> {
    let api = crate::api::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        crate::auth::auth_middleware,
    ));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    cors_layer(&origins)
}

fn cors_layer(origins: &str) -> anyhow::Result<Option<CorsLayer>> {
    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_origin_list() {
        assert!(cors_layer("").unwrap().is_none());
        assert!(cors_layer("*").unwrap().is_some());
        assert!(cors_layer("https://gate.example.com, https://admin.example.com")
            .unwrap()
            .is_some());
        assert!(cors_layer("https://ok.example.com,bad\norigin").is_err());
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let secrets = CredentialSecrets {
            resident: "r".repeat(32),
            operator: "o".repeat(32),
            device: "d".repeat(32),
            booking_pass: "p".repeat(32),
        };
        let shown = format!("{secrets:?}");
        assert!(!shown.contains("rrrr"));
        assert!(shown.contains("redacted"));
    }
}
