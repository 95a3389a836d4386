//! End-to-end dispatch and teardown against the in-memory cluster.
//!
//! These tests drive `K8sRuntime` through the `Runtime` trait exactly as
//! the service does, and check the resulting cluster state:
//! 1. One ConfigMap and one Job per benchmark, with the Job owning the ConfigMap
//! 2. At most five benchmark pipelines in flight at once
//! 3. A failed Job creation leaves no ConfigMap behind
//! 4. Teardown attempts every deletion and aggregates failures
//! 5. Cancellation stops workers from pulling new benchmarks

use std::collections::HashSet;
use std::sync::{Arc, Once};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use evalhub_core::{
    BenchmarkConfig, BenchmarkState, EvaluationJob, K8sRuntimeSettings, ModelRef,
    ProviderCatalog, ProviderResource, ProviderRuntime,
};
use evalhub_k8s::{
    config_map_name, job_name, InMemoryCluster, K8sRuntime, Operation, RuntimeEnvironment,
    TeardownError, MAX_BENCHMARK_WORKERS,
};
use evalhub_runtime::{MemoryStatusSink, Runtime, RuntimeError};

// ── Tracing setup ────────────────────────────────────────────────

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── Fixtures ─────────────────────────────────────────────────────

const NAMESPACE: &str = "default";

fn test_catalog() -> Arc<ProviderCatalog> {
    Arc::new(ProviderCatalog::new(vec![ProviderResource {
        id: "provider-1".to_string(),
        runtime: Some(ProviderRuntime {
            k8s: Some(K8sRuntimeSettings {
                image: "adapter:latest".to_string(),
                ..Default::default()
            }),
        }),
        ..Default::default()
    }]))
}

fn test_runtime(cluster: Arc<InMemoryCluster>) -> (K8sRuntime, watch::Sender<bool>) {
    init_tracing();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let environment = RuntimeEnvironment {
        service_url: Some("http://evalhub:8080".to_string()),
        ..Default::default()
    };
    let runtime = K8sRuntime::new(cluster, test_catalog(), environment, shutdown_rx);
    (runtime, shutdown_tx)
}

fn evaluation_with(id: &str, benchmark_ids: &[String]) -> Arc<EvaluationJob> {
    Arc::new(EvaluationJob {
        id: id.to_string(),
        model: ModelRef {
            url: "http://model:8000/v1".to_string(),
            name: "granite".to_string(),
        },
        benchmarks: benchmark_ids
            .iter()
            .map(|b| BenchmarkConfig::new(b.as_str(), "provider-1"))
            .collect(),
        experiment: None,
        retry_attempts: None,
        timeout_minutes: None,
    })
}

fn bench_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("bench-{i}")).collect()
}

// ── Tests ────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_single_benchmark() {
    let cluster = Arc::new(InMemoryCluster::new());
    let (runtime, _shutdown) = test_runtime(cluster.clone());
    let sink = Arc::new(MemoryStatusSink::new());

    let mut bench = BenchmarkConfig::new("bench-1", "provider-1");
    bench.parameters.insert("num_examples".to_string(), json!(5));
    bench.parameters.insert("foo".to_string(), json!("bar"));
    let evaluation = Arc::new(EvaluationJob {
        id: "job-123".to_string(),
        model: ModelRef {
            url: "http://model".to_string(),
            name: "model".to_string(),
        },
        benchmarks: vec![bench],
        experiment: None,
        retry_attempts: None,
        timeout_minutes: None,
    });

    let summary = runtime.dispatch(evaluation, sink.clone()).unwrap().wait().await;
    assert_eq!(summary.succeeded, 1);
    assert!(sink.events().await.is_empty());

    let job = cluster
        .job(NAMESPACE, "eval-job-job-123-provider-1-bench-1")
        .await
        .expect("job created");
    let cm = cluster
        .config_map(NAMESPACE, "eval-job-job-123-provider-1-bench-1-spec")
        .await
        .expect("config map created");
    assert_eq!(cluster.jobs().await.len(), 1);
    assert_eq!(cluster.config_maps().await.len(), 1);

    let data = cm.data.as_ref().unwrap();
    let spec: Value = serde_json::from_str(&data["job.json"]).unwrap();
    assert_eq!(spec["id"], "job-123");
    assert_eq!(spec["benchmark_id"], "bench-1");
    assert_eq!(spec["num_examples"], 5);
    assert_eq!(spec["benchmark_config"], json!({"foo": "bar"}));

    let owners = cm.metadata.owner_references.as_ref().unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "Job");
    assert_eq!(owners[0].name, "eval-job-job-123-provider-1-bench-1");
    assert_eq!(Some(&owners[0].uid), job.metadata.uid.as_ref());
    assert_eq!(owners[0].controller, Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded_and_each_benchmark_runs_once() {
    let cluster = Arc::new(InMemoryCluster::new().with_latency(Duration::from_millis(20)));
    let (runtime, _shutdown) = test_runtime(cluster.clone());
    let sink = Arc::new(MemoryStatusSink::new());

    let ids = bench_ids(12);
    let handle = runtime
        .dispatch(evaluation_with("job-many", &ids), sink.clone())
        .unwrap();
    assert_eq!(handle.worker_count(), MAX_BENCHMARK_WORKERS);

    let summary = handle.wait().await;
    assert_eq!(summary.succeeded, 12);
    assert_eq!(summary.cancelled, 0);
    assert!(
        cluster.max_in_flight() <= MAX_BENCHMARK_WORKERS,
        "max in flight {}",
        cluster.max_in_flight()
    );

    let created = cluster.calls(Operation::CreateJob).await;
    assert_eq!(created.len(), 12);
    let unique: HashSet<&String> = created.iter().collect();
    assert_eq!(unique.len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn small_evaluations_use_fewer_workers() {
    let cluster = Arc::new(InMemoryCluster::new().with_latency(Duration::from_millis(10)));
    let (runtime, _shutdown) = test_runtime(cluster.clone());

    let handle = runtime
        .dispatch(
            evaluation_with("job-small", &bench_ids(3)),
            Arc::new(MemoryStatusSink::new()),
        )
        .unwrap();
    assert_eq!(handle.worker_count(), 3);
    handle.wait().await;
    assert!(cluster.max_in_flight() <= 3);
}

#[tokio::test]
async fn failed_job_creation_is_compensated() {
    let failing = job_name("job-comp", "provider-1", "bench-1");
    let cluster = Arc::new(InMemoryCluster::new().failing(Operation::CreateJob, failing));
    let (runtime, _shutdown) = test_runtime(cluster.clone());
    let sink = Arc::new(MemoryStatusSink::new());

    let summary = runtime
        .dispatch(evaluation_with("job-comp", &bench_ids(3)), sink.clone())
        .unwrap()
        .wait()
        .await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    assert!(cluster
        .config_map(NAMESPACE, &config_map_name("job-comp", "provider-1", "bench-1"))
        .await
        .is_none());
    assert_eq!(cluster.config_maps().await.len(), 2);

    let events = sink.events_for("job-comp").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].benchmark_id, "bench-1");
    assert_eq!(events[0].status, BenchmarkState::Failed);
    let info = events[0].error_message.as_ref().unwrap();
    assert_eq!(info.message_code, "evaluation_job_failed");
    assert!(info.message.contains("create job"), "{}", info.message);
}

#[tokio::test]
async fn per_benchmark_validation_failures_go_to_sink() {
    let cluster = Arc::new(InMemoryCluster::new());
    let (runtime, _shutdown) = test_runtime(cluster.clone());
    let sink = Arc::new(MemoryStatusSink::new());

    let mut evaluation = (*evaluation_with("job-val", &bench_ids(2))).clone();
    evaluation.retry_attempts = Some(-1);

    let summary = runtime
        .dispatch(Arc::new(evaluation), sink.clone())
        .unwrap()
        .wait()
        .await;
    assert_eq!(summary.failed, 2);
    assert!(cluster.jobs().await.is_empty());
    assert!(cluster.config_maps().await.is_empty());
    for event in sink.events_for("job-val").await {
        let message = event.error_message.unwrap().message;
        assert!(message.contains("non-negative"), "{message}");
    }
}

#[tokio::test]
async fn duplicate_benchmarks_are_rejected_synchronously() {
    let cluster = Arc::new(InMemoryCluster::new());
    let (runtime, _shutdown) = test_runtime(cluster.clone());

    let ids = vec!["same".to_string(), "same".to_string()];
    let result = runtime.dispatch(
        evaluation_with("job-dup", &ids),
        Arc::new(MemoryStatusSink::new()),
    );
    assert!(matches!(result, Err(RuntimeError::InvalidEvaluation(_))));

    // Distinct ids that sanitize to the same object name.
    let ids = vec!["arc_easy".to_string(), "arc-easy".to_string()];
    let result = runtime.dispatch(
        evaluation_with("job-dup", &ids),
        Arc::new(MemoryStatusSink::new()),
    );
    assert!(matches!(result, Err(RuntimeError::InvalidEvaluation(_))));
    assert!(cluster.calls(Operation::CreateConfigMap).await.is_empty());
}

#[tokio::test]
async fn teardown_removes_everything_dispatch_created() {
    let cluster = Arc::new(InMemoryCluster::new());
    let (runtime, _shutdown) = test_runtime(cluster.clone());
    let evaluation = evaluation_with("job-td", &bench_ids(3));

    runtime
        .dispatch(evaluation.clone(), Arc::new(MemoryStatusSink::new()))
        .unwrap()
        .wait()
        .await;
    assert_eq!(cluster.jobs().await.len(), 3);

    runtime.teardown(&evaluation).await.unwrap();
    assert!(cluster.jobs().await.is_empty());
    assert!(cluster.config_maps().await.is_empty());
}

#[tokio::test]
async fn teardown_of_never_dispatched_evaluation_succeeds() {
    let cluster = Arc::new(InMemoryCluster::new());
    let (runtime, _shutdown) = test_runtime(cluster.clone());

    runtime
        .teardown(&evaluation_with("job-none", &bench_ids(2)))
        .await
        .unwrap();
    assert_eq!(cluster.calls(Operation::DeleteJob).await.len(), 2);
    assert_eq!(cluster.calls(Operation::DeleteConfigMap).await.len(), 2);
}

#[tokio::test]
async fn teardown_aggregates_partial_failures() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .failing(Operation::DeleteJob, job_name("job-pf", "provider-1", "bench-0"))
            .failing(
                Operation::DeleteConfigMap,
                config_map_name("job-pf", "provider-1", "bench-2"),
            ),
    );
    let (runtime, _shutdown) = test_runtime(cluster.clone());

    let err = runtime
        .teardown_resources(&evaluation_with("job-pf", &bench_ids(3)))
        .await
        .unwrap_err();
    let causes = err.errors();
    assert_eq!(causes.len(), 2);
    assert!(causes[0].to_string().contains("bench-0"));
    assert!(causes[1].to_string().contains("bench-2-spec"));
    assert_eq!(cluster.calls(Operation::DeleteJob).await.len(), 3);
    assert_eq!(cluster.calls(Operation::DeleteConfigMap).await.len(), 3);

    // Same failure through the trait keeps every cause reachable.
    let err = runtime
        .teardown(&evaluation_with("job-pf", &bench_ids(3)))
        .await
        .unwrap_err();
    let RuntimeError::Teardown(source) = err else {
        panic!("expected teardown error");
    };
    assert_eq!(source.downcast_ref::<TeardownError>().unwrap().errors().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_stops_pulling_new_benchmarks() {
    let cluster = Arc::new(InMemoryCluster::new().with_latency(Duration::from_millis(50)));
    let (runtime, _shutdown) = test_runtime(cluster.clone());

    let handle = runtime
        .dispatch(
            evaluation_with("job-cancel", &bench_ids(12)),
            Arc::new(MemoryStatusSink::new()),
        )
        .unwrap();
    handle.cancel();
    let summary = handle.wait().await;

    assert!(summary.succeeded <= MAX_BENCHMARK_WORKERS);
    assert_eq!(summary.succeeded + summary.failed + summary.cancelled, 12);
    assert!(summary.cancelled >= 12 - MAX_BENCHMARK_WORKERS);
    assert_eq!(cluster.jobs().await.len(), summary.succeeded);
}

#[tokio::test]
async fn runtime_shutdown_cancels_new_dispatches() {
    let cluster = Arc::new(InMemoryCluster::new());
    let (runtime, shutdown) = test_runtime(cluster.clone());
    shutdown.send_replace(true);

    let summary = runtime
        .dispatch(
            evaluation_with("job-sd", &bench_ids(4)),
            Arc::new(MemoryStatusSink::new()),
        )
        .unwrap()
        .wait()
        .await;
    assert_eq!(summary.cancelled, 4);
    assert!(cluster.calls(Operation::CreateConfigMap).await.is_empty());
}
