//! Ledger writes that follow a committed transition
//!
//! A lifecycle change is committed before its attendance event is written. If the append keeps
//! failing, the event is parked in memory and retried by a background flush; the caller still
//! sees the transition succeed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::domain::AttendanceEvent;
use crate::infra::{AttendanceLedger, GateError, RetryConfig};
use crate::metrics::{metric_names, MetricsRegistry};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_FLUSH_ATTEMPTS: u32 = 20;

/// Result of recording one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Appended,
    /// Kept for the background flush
    Parked,
}

#[derive(Debug, Clone)]
struct ParkedEntry {
    event: AttendanceEvent,
    flush_attempts: u32,
    last_error: String,
    parked_at: DateTime<Utc>,
}

/// Bounded in-memory queue of events waiting to be appended
pub struct PendingLedgerQueue {
    entries: Mutex<VecDeque<ParkedEntry>>,
    capacity: usize,
}

impl PendingLedgerQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Park an entry. Returns the entry evicted to make room, if any.
    async fn push(&self, entry: ParkedEntry) -> Option<ParkedEntry> {
        let mut entries = self.entries.lock().await;
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(entry);
        evicted
    }

    async fn drain(&self) -> Vec<ParkedEntry> {
        self.entries.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Counts from one flush pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub recovered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

pub struct LedgerRecorder {
    ledger: Arc<dyn AttendanceLedger>,
    retry: RetryConfig,
    queue: PendingLedgerQueue,
    max_flush_attempts: u32,
    metrics: Arc<MetricsRegistry>,
}

impl LedgerRecorder {
    pub fn new(ledger: Arc<dyn AttendanceLedger>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            ledger,
            retry: RetryConfig::ledger(),
            queue: PendingLedgerQueue::new(DEFAULT_QUEUE_CAPACITY),
            max_flush_attempts: DEFAULT_MAX_FLUSH_ATTEMPTS,
            metrics,
        }
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue = PendingLedgerQueue::new(capacity);
        self
    }

    pub fn with_max_flush_attempts(mut self, attempts: u32) -> Self {
        self.max_flush_attempts = attempts.max(1);
        self
    }

    /// Append with in-place retries, parking the event if every attempt fails.
    pub async fn record(&self, event: AttendanceEvent) -> LedgerOutcome {
        let ledger = Arc::clone(&self.ledger);
        let outcome = self
            .retry
            .run(
                "ledger_append",
                || {
                    let ledger = Arc::clone(&ledger);
                    let event = event.clone();
                    async move { ledger.append(&event).await }
                },
                GateError::is_transient,
            )
            .await;

        if outcome.attempts > 1 {
            self.metrics
                .add_counter(metric_names::LEDGER_RETRIES, (outcome.attempts - 1) as u64)
                .await;
        }

        match outcome.result {
            Ok(()) => {
                self.metrics.inc_counter(metric_names::LEDGER_APPENDS).await;
                LedgerOutcome::Appended
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    tenant_id = %event.tenant_id,
                    source = %event.source,
                    direction = %event.direction,
                    attempts = outcome.attempts,
                    error = %e,
                    "attendance append failed, parking event for retry"
                );
                self.metrics.inc_counter(metric_names::LEDGER_FAILURES).await;
                self.park(ParkedEntry {
                    event,
                    flush_attempts: 0,
                    last_error: e.to_string(),
                    parked_at: Utc::now(),
                })
                .await;
                LedgerOutcome::Parked
            }
        }
    }

    async fn park(&self, entry: ParkedEntry) {
        if let Some(evicted) = self.queue.push(entry).await {
            tracing::error!(
                event_id = %evicted.event.id,
                tenant_id = %evicted.event.tenant_id,
                parked_at = %evicted.parked_at,
                "pending ledger queue full, dropping oldest event"
            );
            self.metrics.inc_counter(metric_names::LEDGER_DROPPED).await;
        }
        self.metrics.inc_counter(metric_names::LEDGER_PARKED).await;
        self.publish_depth().await;
    }

    async fn publish_depth(&self) {
        let depth = self.queue.len().await as u64;
        self.metrics
            .set_gauge(metric_names::LEDGER_PENDING, depth)
            .await;
    }

    pub async fn pending(&self) -> usize {
        self.queue.len().await
    }

    /// One attempt per parked event
    pub async fn flush(&self) -> FlushStats {
        let entries = self.queue.drain().await;
        let mut stats = FlushStats::default();

        for mut entry in entries {
            match self.ledger.append(&entry.event).await {
                Ok(()) => {
                    stats.recovered += 1;
                    self.metrics.inc_counter(metric_names::LEDGER_RECOVERED).await;
                    self.metrics.inc_counter(metric_names::LEDGER_APPENDS).await;
                }
                Err(e) => {
                    entry.flush_attempts += 1;
                    entry.last_error = e.to_string();
                    if entry.flush_attempts >= self.max_flush_attempts {
                        tracing::error!(
                            event_id = %entry.event.id,
                            tenant_id = %entry.event.tenant_id,
                            attempts = entry.flush_attempts,
                            error = %entry.last_error,
                            "giving up on attendance event"
                        );
                        stats.dropped += 1;
                        self.metrics.inc_counter(metric_names::LEDGER_DROPPED).await;
                    } else {
                        stats.requeued += 1;
                        if let Some(evicted) = self.queue.push(entry).await {
                            tracing::error!(
                                event_id = %evicted.event.id,
                                "pending ledger queue full, dropping oldest event"
                            );
                            stats.dropped += 1;
                            self.metrics.inc_counter(metric_names::LEDGER_DROPPED).await;
                        }
                    }
                }
            }
        }

        if stats != FlushStats::default() {
            tracing::info!(
                recovered = stats.recovered,
                requeued = stats.requeued,
                dropped = stats.dropped,
                "pending ledger flush"
            );
        }
        self.publish_depth().await;
        stats
    }

    /// Periodic flush until `shutdown` flips to true; a final pass runs before exit.
    pub fn spawn_flush_task(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if self.pending().await > 0 {
                            self.flush().await;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            let remaining = self.pending().await;
            if remaining > 0 {
                let stats = self.flush().await;
                if stats.requeued > 0 {
                    tracing::warn!(lost = stats.requeued, "attendance events still pending at shutdown");
                }
            }
            tracing::info!("ledger flush task stopped");
        })
    }
}
