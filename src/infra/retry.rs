//! Bounded exponential backoff for store writes that must not be lost
//!
//! Used by the ledger recorder: a committed lifecycle transition is never rolled back, so its
//! attendance entry is retried in place before being parked for the background flush.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Backoff policy for in-request retries
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap on a single delay
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomized in either direction, clamped to 0.0..=1.0
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::ledger()
    }
}

impl RetryConfig {
    /// Short enough that a gate scan still answers promptly
    pub fn ledger() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(400),
            multiplier: 2.0,
            jitter: 0.3,
        }
    }

    pub fn immediate() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Wait before retry `n` (0 is the first retry)
    pub fn backoff(&self, n: u32) -> Duration {
        let exp = i32::try_from(n).unwrap_or(i32::MAX);
        let nominal = (self.initial_delay.as_secs_f64() * self.multiplier.powi(exp))
            .min(self.max_delay.as_secs_f64());

        if self.jitter <= 0.0 || nominal <= 0.0 {
            return Duration::from_secs_f64(nominal);
        }

        let spread = nominal * self.jitter;
        let jittered = nominal + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Drive `op` until it succeeds, `retryable` rejects the error, or the budget runs out.
    ///
    /// `op_name` only labels the warnings logged between attempts.
    pub async fn run<F, Fut, T, E, P>(&self, op_name: &str, op: F, retryable: P) -> Attempted<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempts = 1;
        loop {
            let err = match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(op = op_name, attempts, "store write recovered");
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) => err,
            };

            if attempts > self.max_retries || !retryable(&err) {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }

            let wait = self.backoff(attempts - 1);
            tracing::warn!(
                op = op_name,
                attempt = attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "store write failed, backing off"
            );
            tokio::time::sleep(wait).await;
            attempts += 1;
        }
    }
}

/// Final result plus how many tries it took (1 = first try)
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Transient connection, lock and serialization failures on either backend.
pub fn is_retryable_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().unwrap_or_default();
            match code.as_ref() {
                // postgres: serialization_failure, deadlock_detected
                "40001" | "40P01" => true,
                // sqlite: SQLITE_BUSY, SQLITE_LOCKED
                "5" | "6" => true,
                // postgres connection exception / operator intervention classes
                c => c.starts_with("08") || c.starts_with("57"),
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.0,
        };

        let waits: Vec<_> = (0..5).map(|n| config.backoff(n).as_millis()).collect();
        assert_eq!(waits, vec![100, 200, 400, 800, 1000]);
        assert_eq!(config.backoff(40), Duration::from_secs(1));
    }

    #[test]
    fn test_ledger_jitter_bounds() {
        let config = RetryConfig::ledger().with_jitter(0.5);
        for _ in 0..50 {
            let wait = config.backoff(1);
            assert!(wait >= Duration::from_millis(25) && wait <= Duration::from_millis(75));
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::immediate().with_max_retries(5);

        let attempted = config
            .run(
                "append",
                || {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err("busy")
                        } else {
                            Ok("written")
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(attempted.result, Ok("written"));
        assert_eq!(attempted.attempts, 3);
    }

    #[tokio::test]
    async fn test_gives_up_when_budget_spent() {
        let attempted = RetryConfig::immediate()
            .with_max_retries(2)
            .run("append", || async { Err::<(), _>("down") }, |_| true)
            .await;

        assert!(attempted.result.is_err());
        assert_eq!(attempted.attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempted = RetryConfig::immediate()
            .with_max_retries(5)
            .run("append", || async { Err::<(), _>("constraint") }, |_| false)
            .await;

        assert_eq!(attempted.attempts, 1);
    }

    #[test]
    fn test_retryable_db_errors() {
        assert!(is_retryable_db_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_retryable_db_error(&sqlx::Error::RowNotFound));
        assert!(!is_retryable_db_error(&sqlx::Error::PoolClosed));
    }
}
