//! In-process metrics for the gatehouse
//!
//! Counters and gauges keyed by dotted names, exported as JSON or Prometheus text.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeriesKind {
    Counter,
    Gauge,
}

impl SeriesKind {
    fn as_str(self) -> &'static str {
        match self {
            SeriesKind::Counter => "counter",
            SeriesKind::Gauge => "gauge",
        }
    }
}

struct Series {
    kind: SeriesKind,
    value: AtomicU64,
}

/// Shared by the engine, the ledger recorder and the auth middleware
pub struct MetricsRegistry {
    series: RwLock<BTreeMap<String, Arc<Series>>>,
    started: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(BTreeMap::new()),
            started: Instant::now(),
        }
    }

    /// Look up a series, registering it on first use. A name keeps the kind it was first
    /// registered with.
    async fn series(&self, name: &str, kind: SeriesKind) -> Arc<Series> {
        if let Some(series) = self.series.read().await.get(name) {
            return Arc::clone(series);
        }
        let mut all = self.series.write().await;
        Arc::clone(all.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Series {
                kind,
                value: AtomicU64::new(0),
            })
        }))
    }

    pub async fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1).await;
    }

    pub async fn add_counter(&self, name: &str, value: u64) {
        self.series(name, SeriesKind::Counter)
            .await
            .value
            .fetch_add(value, Ordering::Relaxed);
    }

    pub async fn set_gauge(&self, name: &str, value: u64) {
        self.series(name, SeriesKind::Gauge)
            .await
            .value
            .store(value, Ordering::Relaxed);
    }

    async fn read(&self, name: &str, kind: SeriesKind) -> u64 {
        self.series
            .read()
            .await
            .get(name)
            .filter(|s| s.kind == kind)
            .map_or(0, |s| s.value.load(Ordering::Relaxed))
    }

    /// Zero for names never touched
    pub async fn get_counter(&self, name: &str) -> u64 {
        self.read(name, SeriesKind::Counter).await
    }

    pub async fn get_gauge(&self, name: &str) -> u64 {
        self.read(name, SeriesKind::Gauge).await
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    async fn snapshot(&self) -> Vec<(String, SeriesKind, u64)> {
        self.series
            .read()
            .await
            .iter()
            .map(|(name, s)| (name.clone(), s.kind, s.value.load(Ordering::Relaxed)))
            .collect()
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let mut counters = serde_json::Map::new();
        let mut gauges = serde_json::Map::new();
        for (name, kind, value) in self.snapshot().await {
            let bucket = match kind {
                SeriesKind::Counter => &mut counters,
                SeriesKind::Gauge => &mut gauges,
            };
            bucket.insert(name, value.into());
        }

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "counters": counters,
            "gauges": gauges,
        })
    }

    /// Prometheus text exposition; dots and dashes in names become underscores
    pub async fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP gatehouse_uptime_seconds Time since service start");
        let _ = writeln!(out, "# TYPE gatehouse_uptime_seconds gauge");
        let _ = writeln!(out, "gatehouse_uptime_seconds {}", self.uptime_seconds());

        for (name, kind, value) in self.snapshot().await {
            let name = name.replace(['.', '-'], "_");
            let _ = writeln!(out, "# TYPE {name} {}", kind.as_str());
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Predefined metric names
pub mod metric_names {
    // Lifecycle transitions, suffixed with the target status
    pub const BOOKING_TRANSITIONS: &str = "gatehouse.bookings.transition";
    pub const BOOKINGS_CREATED: &str = "gatehouse.bookings.created";
    pub const BOOKING_CONFLICTS: &str = "gatehouse.bookings.conflicts";
    pub const GUEST_TRANSITIONS: &str = "gatehouse.guests.transition";
    pub const GUESTS_CREATED: &str = "gatehouse.guests.created";

    // Ledger
    pub const LEDGER_APPENDS: &str = "gatehouse.ledger.appends";
    pub const LEDGER_RETRIES: &str = "gatehouse.ledger.retries";
    pub const LEDGER_FAILURES: &str = "gatehouse.ledger.failures";
    pub const LEDGER_PARKED: &str = "gatehouse.ledger.parked";
    pub const LEDGER_RECOVERED: &str = "gatehouse.ledger.recovered";
    pub const LEDGER_DROPPED: &str = "gatehouse.ledger.dropped";
    pub const LEDGER_PENDING: &str = "gatehouse.ledger.pending";

    // Vehicles, suffixed with the classification
    pub const VEHICLE_ENTRIES: &str = "gatehouse.vehicles.entry";
    pub const VEHICLE_EXITS: &str = "gatehouse.vehicles.exit";
    pub const VEHICLE_ORPHAN_EXITS: &str = "gatehouse.vehicles.orphan_exits";
    pub const VEHICLE_SUPERSEDED: &str = "gatehouse.vehicles.superseded";

    // Credentials
    pub const CREDENTIALS_ISSUED: &str = "gatehouse.credentials.issued";
    pub const CREDENTIALS_REJECTED: &str = "gatehouse.credentials.rejected";

    // Auth
    pub const AUTH_FAILURES: &str = "gatehouse.auth.failures";
}

/// `base.suffix` helper for labelled counters
pub fn labelled(base: &str, label: &str) -> String {
    format!("{base}.{label}")
}
