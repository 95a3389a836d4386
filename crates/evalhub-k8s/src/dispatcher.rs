//! Dispatcher: bounded fan-out of per-benchmark pipelines.
//!
//! ```text
//! dispatch(evaluation)
//!   ├── validate (empty id, benchmarks sharing an object name)
//!   ├── queue ← every benchmark index (fixed capacity, never refilled)
//!   └── min(5, K) workers, each looping:
//!         pull → cancelled? stop
//!              → JobConfig → objects → ConfigMap → Job → owner link
//!              └── on failure: compensate, report FAILED to the sink
//! ```
//!
//! Per-benchmark failures never reach the caller of `dispatch`; they are
//! isolated to their own pipeline and reported through the status sink.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use evalhub_core::{BenchmarkConfig, EvaluationJob, ProviderCatalog, StatusEvent};
use evalhub_runtime::{DispatchHandle, StatusSink, WorkerReport};

use crate::builders::{build_objects, owner_reference};
use crate::cluster::ClusterApi;
use crate::environment::RuntimeEnvironment;
use crate::error::{ClusterResult, K8sError, K8sResult};
use crate::job_config::JobConfig;
use crate::naming::job_name;

/// Upper bound on concurrent benchmark pipelines per dispatch.
pub const MAX_BENCHMARK_WORKERS: usize = 5;

/// Progress of one benchmark pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pending,
    ConfigResolved,
    DataObjectCreated,
    RunObjectCreated,
}

/// A pipeline failure and the last stage it reached.
#[derive(Debug)]
struct PipelineFailure {
    stage: Stage,
    error: K8sError,
}

type WorkQueue = Arc<Mutex<VecDeque<usize>>>;

/// Fans benchmarks out over a bounded worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    cluster: Arc<dyn ClusterApi>,
    providers: Arc<ProviderCatalog>,
    environment: Arc<RuntimeEnvironment>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    /// `shutdown` stops every dispatch of this dispatcher once it flips
    /// to `true`.
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        providers: Arc<ProviderCatalog>,
        environment: Arc<RuntimeEnvironment>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cluster,
            providers,
            environment,
            shutdown,
        }
    }

    /// Structural checks run before any worker starts.
    pub fn validate(evaluation: &EvaluationJob) -> K8sResult<()> {
        if evaluation.id.trim().is_empty() {
            return Err(K8sError::validation("evaluation id is required"));
        }
        // Distinct raw ids can sanitize to the same object name.
        let mut seen: HashMap<String, &BenchmarkConfig> = HashMap::new();
        for benchmark in &evaluation.benchmarks {
            let name = job_name(&evaluation.id, &benchmark.provider_id, &benchmark.id);
            if let Some(first) = seen.get(&name) {
                return Err(K8sError::validation(format!(
                    "benchmark {:?} for provider {:?} collides with benchmark {:?} for provider {:?} on object name {name:?}",
                    benchmark.id, benchmark.provider_id, first.id, first.provider_id
                )));
            }
            seen.insert(name, benchmark);
        }
        Ok(())
    }

    /// Queue every benchmark and start the workers. Returns immediately.
    pub fn dispatch(
        &self,
        evaluation: Arc<EvaluationJob>,
        sink: Arc<dyn StatusSink>,
    ) -> K8sResult<DispatchHandle> {
        Self::validate(&evaluation)?;

        let total = evaluation.benchmarks.len();
        if total == 0 {
            debug!(job_id = %evaluation.id, "evaluation has no benchmarks");
            return Ok(DispatchHandle::completed(evaluation.id.clone()));
        }

        let mut queue = VecDeque::with_capacity(total);
        queue.extend(0..total);
        let queue: WorkQueue = Arc::new(Mutex::new(queue));

        let worker_count = total.min(MAX_BENCHMARK_WORKERS);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let pipeline = Arc::new(Pipeline {
            cluster: self.cluster.clone(),
            providers: self.providers.clone(),
            environment: self.environment.clone(),
            evaluation: evaluation.clone(),
            sink,
        });

        let workers = (0..worker_count)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    pipeline.clone(),
                    queue.clone(),
                    cancel_rx.clone(),
                    self.shutdown.clone(),
                ))
            })
            .collect();

        info!(
            job_id = %evaluation.id,
            benchmark_count = total,
            worker_count,
            "evaluation dispatched"
        );
        Ok(DispatchHandle::new(evaluation.id.clone(), total, workers, cancel_tx))
    }
}

async fn run_worker(
    worker: usize,
    pipeline: Arc<Pipeline>,
    queue: WorkQueue,
    cancel: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    let job_id = pipeline.evaluation.id.as_str();

    loop {
        let next = queue.lock().await.pop_front();
        let Some(index) = next else { break };
        let benchmark = &pipeline.evaluation.benchmarks[index];

        if *cancel.borrow() || *shutdown.borrow() {
            warn!(
                %job_id,
                benchmark_id = %benchmark.id,
                worker,
                "benchmark processing cancelled"
            );
            break;
        }

        match pipeline.run(benchmark).await {
            Ok(()) => report.succeeded += 1,
            Err(failure) => {
                report.failed += 1;
                let message = format!("job {job_id} benchmark {}: {}", benchmark.id, failure.error);
                error!(
                    %job_id,
                    provider_id = %benchmark.provider_id,
                    benchmark_id = %benchmark.id,
                    stage = ?failure.stage,
                    error = %failure.error,
                    "benchmark pipeline failed"
                );
                pipeline.report_failure(benchmark, message).await;
            }
        }
    }

    debug!(%job_id, worker, ?report, "worker drained");
    report
}

/// Shared, read-only context of one dispatch.
struct Pipeline {
    cluster: Arc<dyn ClusterApi>,
    providers: Arc<ProviderCatalog>,
    environment: Arc<RuntimeEnvironment>,
    evaluation: Arc<EvaluationJob>,
    sink: Arc<dyn StatusSink>,
}

impl Pipeline {
    /// Run one benchmark through every stage, in order.
    async fn run(&self, benchmark: &BenchmarkConfig) -> Result<(), PipelineFailure> {
        let mut stage = Stage::Pending;
        let fail = |stage: Stage| move |error: K8sError| PipelineFailure { stage, error };

        let provider = self
            .providers
            .get(&benchmark.provider_id)
            .ok_or_else(|| K8sError::UnknownProvider(benchmark.provider_id.clone()))
            .map_err(fail(stage))?;
        let config = JobConfig::build(&self.evaluation, provider, &benchmark.id, &self.environment)
            .map_err(fail(stage))?;
        stage = Stage::ConfigResolved;

        let objects = build_objects(&config).map_err(fail(stage))?;
        info!(
            job_id = %config.job_id,
            benchmark_id = %config.benchmark_id,
            namespace = %config.namespace,
            service_account = config.instance.as_ref().map(|w| w.service_account.as_str()),
            "job config resolved"
        );

        self.cluster
            .create_config_map(&objects.config_map)
            .await
            .map_err(|source| K8sError::Cluster {
                action: "create config map",
                source,
            })
            .map_err(fail(stage))?;
        stage = Stage::DataObjectCreated;

        let created = match self.cluster.create_job(&objects.job).await {
            Ok(job) => job,
            Err(source) => {
                // Never replaces the Job creation error.
                if let Err(e) = self.compensate(&config, &objects.config_map).await {
                    error!(
                        job_id = %config.job_id,
                        benchmark_id = %config.benchmark_id,
                        namespace = %config.namespace,
                        error = %e,
                        "failed to delete config map after job creation error"
                    );
                }
                return Err(fail(stage)(K8sError::Cluster {
                    action: "create job",
                    source,
                }));
            }
        };
        stage = Stage::RunObjectCreated;

        let job_name = created.metadata.name.as_deref().unwrap_or_default();
        info!(
            job_id = %config.job_id,
            benchmark_id = %config.benchmark_id,
            namespace = %config.namespace,
            name = %job_name,
            ?stage,
            "job created"
        );
        self.link_owner(&config, &objects.config_map, &created).await;
        Ok(())
    }

    /// Remove the data object after its run object failed to create.
    /// A ConfigMap that is already gone counts as removed.
    async fn compensate(&self, config: &JobConfig, config_map: &ConfigMap) -> ClusterResult<()> {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        match self.cluster.delete_config_map(&config.namespace, name).await {
            Ok(()) => {
                debug!(namespace = %config.namespace, %name, "orphaned config map removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Make the Job the controller of its ConfigMap. Failure leaves an
    /// orphan for teardown to reclaim; the benchmark still succeeds.
    async fn link_owner(
        &self,
        config: &JobConfig,
        config_map: &ConfigMap,
        job: &Job,
    ) {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        let Some(owner) = owner_reference(job) else {
            error!(
                job_id = %config.job_id,
                benchmark_id = %config.benchmark_id,
                %name,
                "created job has no uid, config map left without owner"
            );
            return;
        };
        if let Err(e) = self
            .cluster
            .set_config_map_owner(&config.namespace, name, owner)
            .await
        {
            error!(
                job_id = %config.job_id,
                benchmark_id = %config.benchmark_id,
                namespace = %config.namespace,
                %name,
                error = %e,
                "failed to set config map owner reference"
            );
        }
    }

    async fn report_failure(&self, benchmark: &BenchmarkConfig, message: String) {
        let event = StatusEvent::failed(benchmark, message);
        if let Err(e) = self
            .sink
            .report_benchmark_status(&self.evaluation.id, &event)
            .await
        {
            error!(
                job_id = %self.evaluation.id,
                benchmark_id = %benchmark.id,
                error = %e,
                "failed to update benchmark status"
            );
        }
    }
}
