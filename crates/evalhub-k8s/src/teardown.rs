//! Teardown: best-effort removal of every object of an evaluation.
//!
//! Names are recomputed from the identity triple, so teardown works even
//! when dispatch never ran or only partially succeeded.

use tracing::{debug, info};

use evalhub_core::EvaluationJob;

use crate::cluster::ClusterApi;
use crate::error::{ClusterError, ClusterResult, TeardownError};
use crate::naming::{config_map_name, job_name};

/// Delete the Job and ConfigMap of every benchmark in `evaluation`.
///
/// Not-found counts as success. Every deletion is attempted; all other
/// failures are collected into one [`TeardownError`].
pub async fn teardown(
    cluster: &dyn ClusterApi,
    namespace: &str,
    evaluation: &EvaluationJob,
) -> Result<(), TeardownError> {
    info!(
        job_id = %evaluation.id,
        benchmark_count = evaluation.benchmarks.len(),
        %namespace,
        "deleting evaluation runtime resources"
    );

    let mut errors = Vec::new();
    for benchmark in &evaluation.benchmarks {
        let job = job_name(&evaluation.id, &benchmark.provider_id, &benchmark.id);
        let config_map = config_map_name(&evaluation.id, &benchmark.provider_id, &benchmark.id);
        debug!(
            job_id = %evaluation.id,
            benchmark_id = %benchmark.id,
            job_name = %job,
            config_map_name = %config_map,
            "deleting benchmark resources"
        );

        let job_result = cluster.delete_job(namespace, &job).await;
        errors.extend(unexpected(job_result));

        // The owner link usually garbage-collects the ConfigMap already;
        // delete it anyway in case the link was never set.
        let config_map_result = cluster.delete_config_map(namespace, &config_map).await;
        errors.extend(unexpected(config_map_result));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TeardownError::new(errors))
    }
}

fn unexpected(result: ClusterResult<()>) -> Option<ClusterError> {
    result.err().filter(|e| !e.is_not_found())
}
