//! Domain types for EvalHub evaluation requests.
//!
//! These types describe what a caller submits (an [`EvaluationJob`] with its
//! benchmarks), how providers are configured to run them, and the
//! [`StatusEvent`]s reported back for each benchmark. All types are
//! serializable to/from JSON, which is also the wire format of the API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of an evaluation job.
pub type JobId = String;

/// Identifier of a provider (e.g. `lm_evaluation_harness`).
pub type ProviderId = String;

/// Identifier of a benchmark within a provider.
pub type BenchmarkId = String;

/// Message code attached to benchmark failures raised by a runtime.
pub const MESSAGE_CODE_EVALUATION_JOB_FAILED: &str = "evaluation_job_failed";

// ── Evaluation ─────────────────────────────────────────────────────

/// The model under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ModelRef {
    pub url: String,
    pub name: String,
}

/// A key/value tag forwarded to the experiment tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentTag {
    pub key: String,
    pub value: String,
}

/// Experiment-tracking metadata for an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ExperimentTag>,
}

/// One independently schedulable benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub id: BenchmarkId,
    pub provider_id: ProviderId,
    /// Free-form benchmark parameters (JSON-compatible values).
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl BenchmarkConfig {
    /// Create a benchmark with no parameters.
    pub fn new(id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
            parameters: Map::new(),
        }
    }
}

/// A submitted evaluation: one model, many benchmarks.
///
/// Immutable once submitted; runtimes only read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationJob {
    pub id: JobId,
    pub model: ModelRef,
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<ExperimentConfig>,
    /// Retry attempts granted to each benchmark run. Kept signed so a
    /// negative request can be rejected instead of wrapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<i32>,
    /// Wall-clock budget per benchmark run, in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

// ── Providers ─────────────────────────────────────────────────────

/// An environment variable handed to the adapter container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Kubernetes execution settings for a provider's adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct K8sRuntimeSettings {
    /// Adapter container image.
    #[serde(default)]
    pub image: String,
    /// Entrypoint command tokens.
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// Default environment for the adapter.
    #[serde(default)]
    pub env: Vec<EnvVar>,
    pub cpu_request: Option<String>,
    pub memory_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
}

/// Per-environment runtime settings of a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProviderRuntime {
    pub k8s: Option<K8sRuntimeSettings>,
}

/// A named source of benchmark execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProviderResource {
    #[serde(default)]
    pub id: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<ProviderRuntime>,
}

impl ProviderResource {
    /// Kubernetes settings, if the provider can run on a cluster.
    pub fn k8s(&self) -> Option<&K8sRuntimeSettings> {
        self.runtime.as_ref().and_then(|r| r.k8s.as_ref())
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Terminal state reported for a benchmark. Runtimes only ever report
/// failures; progress of successful runs is tracked by the adapter itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkState {
    Failed,
}

/// Human-readable message with a machine-readable code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageInfo {
    pub message: String,
    pub message_code: String,
}

/// Status update for one benchmark of an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusEvent {
    pub provider_id: ProviderId,
    pub benchmark_id: BenchmarkId,
    pub status: BenchmarkState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<MessageInfo>,
}

impl StatusEvent {
    /// A terminal failure for `benchmark`, carrying `message`.
    pub fn failed(benchmark: &BenchmarkConfig, message: impl Into<String>) -> Self {
        Self {
            provider_id: benchmark.provider_id.clone(),
            benchmark_id: benchmark.id.clone(),
            status: BenchmarkState::Failed,
            error_message: Some(MessageInfo {
                message: message.into(),
                message_code: MESSAGE_CODE_EVALUATION_JOB_FAILED.to_string(),
            }),
        }
    }
}
