//! Transaction Executor
//!
//! Runs a unit of work inside one PostgreSQL transaction:
//!
//! ```text
//! BEGIN ─▶ SET TRANSACTION ISOLATION ─▶ unit(&mut conn) ─┬─ Ok  ─▶ COMMIT
//!                                                        └─ Err ─▶ ROLLBACK
//! ```
//!
//! A whole attempt is re-run only when the engine aborted it with a
//! serialization failure or a deadlock, bounded by [`RetryPolicy`].
//! The `sqlx::Transaction` handle rolls back on drop, so a panic inside the
//! unit of work or a caller dropping the future (cancellation) before COMMIT
//! leaves nothing behind.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::LedgerError;

/// Transaction isolation level. Anything weaker than read committed is not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Isolation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Isolation::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Isolation::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Isolation::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Jittered exponential backoff between transaction attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_attempts = max_attempts.max(1);
        let clamped_base = base_delay_ms.max(1);
        let clamped_max_delay = max_delay_ms.max(clamped_base);
        Self {
            max_attempts: clamped_attempts,
            base_delay_ms: clamped_base,
            max_delay_ms: clamped_max_delay,
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Single attempt, no retry
    pub fn no_retry() -> Self {
        Self::new(1, 1, 1, 0.0)
    }

    /// Delay before attempt `attempt + 1` (0-based)
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let jittered = if self.jitter_pct > 0.0 {
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rand::thread_rng().gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    /// Delay before the next attempt, or `None` when the error must be
    /// surfaced. `attempts_made` counts attempts already run (at least 1).
    pub fn retry_after(&self, attempts_made: usize, retryable: bool) -> Option<Duration> {
        if !retryable || attempts_made >= self.max_attempts {
            return None;
        }
        Some(self.next_delay(attempts_made.saturating_sub(1)))
    }

    /// Sleep before the next attempt. Returns `false` when `err` must be
    /// surfaced instead.
    pub async fn backoff(&self, attempts_made: usize, err: &LedgerError) -> bool {
        let Some(delay) = self.retry_after(attempts_made, err.is_retryable()) else {
            return false;
        };
        warn!(
            attempt = attempts_made,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transaction aborted by engine, retrying"
        );
        sleep(delay).await;
        true
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 10, 200, 0.2)
    }
}

/// Unit of work: receives the transaction-scoped connection
pub type UnitOfWork<'c, T> = BoxFuture<'c, Result<T, LedgerError>>;

/// Opens, commits and rolls back transactions on a pool
#[derive(Debug, Clone)]
pub struct TxExecutor {
    pool: PgPool,
    isolation: Isolation,
    retry: RetryPolicy,
    timeout: Duration,
}

impl TxExecutor {
    pub fn new(pool: PgPool, isolation: Isolation, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            pool,
            isolation,
            retry,
            timeout,
        }
    }

    /// Run `unit` in a transaction, retrying the whole attempt on
    /// serialization/deadlock aborts. Every other error is returned as is.
    pub async fn exec_tx<T, F>(&self, mut unit: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> UnitOfWork<'c, T> + Send,
    {
        let mut attempts_made = 0;
        loop {
            let err = match self.run_once(attempts_made, &mut unit).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempts_made += 1;

            if !self.retry.backoff(attempts_made, &err).await {
                return Err(err);
            }
        }
    }

    async fn run_once<T, F>(&self, attempt: usize, unit: &mut F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> UnitOfWork<'c, T> + Send,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query(self.isolation.as_sql())
            .execute(&mut *tx)
            .await?;

        let outcome = match tokio::time::timeout(self.timeout, unit(&mut *tx)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::timeout(format!(
                "transaction exceeded {} ms",
                self.timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(value) => {
                // Deferred constraints fire here, after the unit succeeded
                if let Err(commit_err) = tx.commit().await {
                    warn!(attempt, error = %commit_err, "Commit failed");
                    return Err(commit_err.into());
                }
                debug!(attempt, "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                // A failed rollback must not hide why we rolled back; the
                // server discards the transaction once the connection drops.
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        attempt,
                        error = %err,
                        rollback_error = %rollback_err,
                        "Rollback failed"
                    );
                } else {
                    debug!(attempt, error = %err, "Transaction rolled back");
                }
                Err(err)
            }
        }
    }
}
