//! Delayed job queue backed by the tokio runtime.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;

use relay_sync::{Job, JobScheduler, SyncError};

/// Base delay before the first apply retry; doubles per attempt.
pub const APPLY_RETRY_BASE: Duration = Duration::from_secs(1);
pub const APPLY_RETRY_MAX: Duration = Duration::from_secs(60);

/// A job plus the attempt number it will run as (1-based).
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: Job,
    pub attempt: u32,
}

/// Delay before retry number `attempt + 1`.
pub fn retry_backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    APPLY_RETRY_BASE
        .checked_mul(factor)
        .map_or(APPLY_RETRY_MAX, |d| d.min(APPLY_RETRY_MAX))
}

/// [`JobScheduler`] that hands jobs to the worker queue, after a timer when a
/// delay is requested. Never blocks the caller.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl TokioScheduler {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<QueuedJob>), SyncError> {
        let handle = Handle::try_current()
            .map_err(|e| SyncError::Scheduler(format!("no tokio runtime: {e}")))?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((Self { handle, tx }, rx))
    }

    pub fn enqueue(&self, queued: QueuedJob, delay: Duration) -> Result<(), SyncError> {
        if self.tx.is_closed() {
            return Err(closed());
        }
        if delay.is_zero() {
            return self.tx.send(queued).map_err(|_| closed());
        }

        let deadline = Instant::now() + delay;
        let tx = self.tx.clone();
        self.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if tx.send(queued).is_err() {
                tracing::warn!("job queue closed before a delayed job was due; dropped");
            }
        });
        Ok(())
    }
}

impl JobScheduler for TokioScheduler {
    fn schedule(&self, job: Job, delay: Duration) -> Result<(), SyncError> {
        self.enqueue(QueuedJob { job, attempt: 1 }, delay)
    }
}

fn closed() -> SyncError {
    SyncError::Scheduler("job queue closed".to_string())
}
