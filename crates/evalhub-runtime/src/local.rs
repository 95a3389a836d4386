//! Local runtime: accepts evaluations without running anything.
//!
//! Used when the service runs outside a cluster; benchmarks are expected
//! to be driven by an external process.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use evalhub_core::EvaluationJob;

use crate::error::RuntimeResult;
use crate::handle::DispatchHandle;
use crate::runtime::Runtime;
use crate::status::StatusSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRuntime;

impl LocalRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    fn name(&self) -> &'static str {
        "local"
    }

    fn dispatch(
        &self,
        evaluation: Arc<EvaluationJob>,
        _sink: Arc<dyn StatusSink>,
    ) -> RuntimeResult<DispatchHandle> {
        info!(
            job_id = %evaluation.id,
            benchmark_count = evaluation.benchmarks.len(),
            "local runtime accepted evaluation"
        );
        Ok(DispatchHandle::handed_off(
            evaluation.id.clone(),
            evaluation.benchmarks.len(),
        ))
    }

    async fn teardown(&self, evaluation: &EvaluationJob) -> RuntimeResult<()> {
        debug!(job_id = %evaluation.id, "local runtime has nothing to tear down");
        Ok(())
    }
}
