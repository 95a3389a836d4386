//! The `Runtime` trait implemented by every execution backend.

use std::sync::Arc;

use async_trait::async_trait;

use evalhub_core::EvaluationJob;

use crate::error::RuntimeResult;
use crate::handle::DispatchHandle;
use crate::status::StatusSink;

/// An execution backend for evaluation jobs.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Stable identity of this backend (e.g. `kubernetes`).
    fn name(&self) -> &'static str;

    /// Start executing every benchmark of `evaluation`.
    ///
    /// Returns as soon as work is queued; it never waits for benchmark
    /// outcomes. Only structurally invalid input is reported here.
    /// Per-benchmark failures go to `sink`. Must be called from within a
    /// Tokio runtime.
    fn dispatch(
        &self,
        evaluation: Arc<EvaluationJob>,
        sink: Arc<dyn StatusSink>,
    ) -> RuntimeResult<DispatchHandle>;

    /// Remove everything this backend created for `evaluation`.
    async fn teardown(&self, evaluation: &EvaluationJob) -> RuntimeResult<()>;
}
