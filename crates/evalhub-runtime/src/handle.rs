//! Dispatch completion handle.
//!
//! Returned by [`Runtime::dispatch`](crate::Runtime::dispatch). Holding the
//! handle is optional: dropping it leaves the workers running to
//! completion. Awaiting [`DispatchHandle::wait`] resolves once every worker
//! has drained the queue (or stopped on cancellation).

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Outcome counters produced by a single worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate outcome of a dispatch, available after drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Benchmarks queued for this dispatch.
    pub total: usize,
    /// Benchmarks the backend accepted: a run object was created, or the
    /// backend handed them to an external driver.
    pub succeeded: usize,
    /// Benchmarks that reached the failed state.
    pub failed: usize,
    /// Benchmarks that never reached an outcome: not started because the
    /// dispatch was cancelled, or lost with an aborted worker.
    pub cancelled: usize,
}

impl DispatchSummary {
    fn merge(&mut self, report: WorkerReport) {
        self.succeeded += report.succeeded;
        self.failed += report.failed;
    }
}

/// Handle to an in-flight dispatch.
pub struct DispatchHandle {
    job_id: String,
    total: usize,
    workers: Vec<JoinHandle<WorkerReport>>,
    settled: WorkerReport,
    cancel_tx: watch::Sender<bool>,
}

impl DispatchHandle {
    /// Wrap spawned workers. `cancel_tx` is the sender side of the signal
    /// the workers poll between benchmarks.
    pub fn new(
        job_id: impl Into<String>,
        total: usize,
        workers: Vec<JoinHandle<WorkerReport>>,
        cancel_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            total,
            workers,
            settled: WorkerReport::default(),
            cancel_tx,
        }
    }

    /// A handle for a dispatch that started no workers.
    pub fn completed(job_id: impl Into<String>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self::new(job_id, 0, Vec::new(), cancel_tx)
    }

    /// A handle for `total` benchmarks accepted up front, without workers.
    pub fn handed_off(job_id: impl Into<String>, total: usize) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let mut handle = Self::new(job_id, total, Vec::new(), cancel_tx);
        handle.settled.succeeded = total;
        handle
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Number of workers started for this dispatch.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Ask workers to stop pulling new benchmarks.
    ///
    /// Benchmarks already in flight run to completion.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
        debug!(job_id = %self.job_id, "dispatch cancellation requested");
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Wait for every worker to finish and summarize the outcome.
    pub async fn wait(self) -> DispatchSummary {
        let mut summary = DispatchSummary {
            total: self.total,
            ..DispatchSummary::default()
        };
        summary.merge(self.settled);

        for worker in self.workers {
            match worker.await {
                Ok(report) => summary.merge(report),
                Err(e) => {
                    error!(job_id = %self.job_id, error = %e, "dispatch worker aborted");
                }
            }
        }

        summary.cancelled = summary
            .total
            .saturating_sub(summary.succeeded + summary.failed);
        summary
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("job_id", &self.job_id)
            .field("total", &self.total)
            .field("workers", &self.workers.len())
            .finish()
    }
}
