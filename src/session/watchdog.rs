//! Watchdog: forcibly destroys a worker whose task was interrupted but
//! never completed.
//!
//! A task may disable cooperative interruption; without this unit a stuck
//! worker would pin its writer, its reader and the pooled slot forever.
//! The destroy path bypasses [`ReleaseState`](crate::pool::ReleaseState):
//! a destroyed worker must never be returned to the idle pool, and any
//! other context racing toward release either finds the flag already
//! settled or settles it into a no-op close.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::pool::{WorkerHandle, WorkerKey, WorkerPool};
use crate::task::TaskContext;

/// Coarse polling interval for observing the task state.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn the watchdog for one session.
///
/// `kill_timeout` is the grace period between observing interruption and
/// destroying the worker.
pub(crate) fn spawn(
    pool: Arc<dyn WorkerPool>,
    key: WorkerKey,
    worker: Arc<WorkerHandle>,
    ctx: Arc<TaskContext>,
    kill_timeout: Duration,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if ctx.is_completed() {
                return;
            }
            if ctx.is_interrupted() {
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }

        // Interrupted but not completed: give the task the grace period,
        // then kill the worker rather than leave it blocked forever.
        tokio::time::sleep(kill_timeout).await;
        if !ctx.is_completed() {
            // Best effort: completion may still flip between this check
            // and the destroy.
            tracing::warn!(
                worker = worker.id(),
                timeout_ms = kill_timeout.as_millis() as u64,
                "task interrupted but not completed, destroying worker"
            );
            if let Err(err) = pool.destroy(&key, worker).await {
                tracing::warn!(error = %err, "failed to destroy unresponsive worker");
            }
        }
    })
}
