//! evalhub-k8s: runs evaluation benchmarks as Kubernetes Jobs.
//!
//! Each benchmark becomes a ConfigMap holding its job spec (the data
//! object) and a Job running the provider's adapter (the run object). The
//! ConfigMap is created first, then the Job, then the Job is made the
//! ConfigMap's controller so deleting the Job cascades.
//!
//! # Architecture
//!
//! ```text
//! K8sRuntime ── Runtime impl
//!   ├── Dispatcher (≤5 workers per dispatch)
//!   │     └── JobConfig::build → build_objects → ClusterApi
//!   ├── teardown (recomputed names, aggregated errors)
//!   └── ClusterApi
//!         ├── KubeClusterApi (kube client)
//!         └── InMemoryCluster (tests)
//! ```

pub mod builders;
pub mod cluster;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod job_config;
pub mod kube_api;
pub mod naming;
pub mod quantity;
pub mod runtime;
pub mod teardown;

pub use builders::{build_config_map, build_job, build_objects, ClusterObjects};
pub use cluster::{ClusterApi, InMemoryCluster, Operation};
pub use dispatcher::{Dispatcher, MAX_BENCHMARK_WORKERS};
pub use environment::RuntimeEnvironment;
pub use error::{ClusterError, ClusterResult, K8sError, K8sResult, TeardownError};
pub use job_config::JobConfig;
pub use kube_api::KubeClusterApi;
pub use naming::{build_name, config_map_name, job_name, sanitize_label};
pub use runtime::K8sRuntime;
pub use teardown::teardown;
