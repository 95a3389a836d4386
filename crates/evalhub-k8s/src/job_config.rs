//! JobConfigBuilder: resolves one benchmark of an evaluation into a fully
//! validated execution configuration.
//!
//! Resolution is a pure function of the evaluation, the provider, the
//! benchmark identity, and the injected [`RuntimeEnvironment`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use evalhub_core::{EnvVar, EvaluationJob, ExperimentTag, ModelRef, ProviderResource};

use crate::environment::RuntimeEnvironment;
use crate::error::{K8sError, K8sResult};

pub const DEFAULT_CPU_REQUEST: &str = "250m";
pub const DEFAULT_MEMORY_REQUEST: &str = "512Mi";
pub const DEFAULT_CPU_LIMIT: &str = "1";
pub const DEFAULT_MEMORY_LIMIT: &str = "2Gi";

/// Parameter lifted out of the benchmark config into its own field.
pub const NUM_EXAMPLES_KEY: &str = "num_examples";

const SERVICE_ACCOUNT_SUFFIX: &str = "-jobs";
const SERVICE_CA_SUFFIX: &str = "-service-ca";
const EVALHUB_SERVICE_PORT: u16 = 8443;

/// CPU and memory requests/limits with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuantities {
    pub cpu_request: String,
    pub memory_request: String,
    pub cpu_limit: String,
    pub memory_limit: String,
}

/// Per-instance wiring derived from the EvalHub instance name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceWiring {
    pub instance_name: String,
    pub service_account: String,
    pub service_ca_config_map: String,
    pub evalhub_url: String,
}

impl InstanceWiring {
    fn new(instance_name: &str, namespace: &str) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            service_account: format!("{instance_name}{SERVICE_ACCOUNT_SUFFIX}"),
            service_ca_config_map: format!("{instance_name}{SERVICE_CA_SUFFIX}"),
            evalhub_url: format!(
                "https://{instance_name}.{namespace}.svc.cluster.local:{EVALHUB_SERVICE_PORT}"
            ),
        }
    }
}

/// Fully resolved execution spec for one benchmark. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub job_id: String,
    pub provider_id: String,
    pub benchmark_id: String,
    pub namespace: String,
    /// Backoff limit of the run object.
    pub retry_attempts: i32,
    /// Active deadline of the run object.
    pub timeout_seconds: Option<i64>,
    pub adapter_image: String,
    pub entrypoint: Vec<String>,
    pub default_env: Vec<EnvVar>,
    pub resources: ResourceQuantities,
    /// Pretty-printed job-spec document stored in the data object.
    pub job_spec_json: String,
    pub instance: Option<InstanceWiring>,
    pub mlflow_tracking_uri: Option<String>,
    pub mlflow_workspace: Option<String>,
}

/// Document the adapter reads from its mounted data object.
#[derive(Debug, Serialize)]
struct JobSpec<'a> {
    id: &'a str,
    benchmark_id: &'a str,
    model: &'a ModelRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_examples: Option<i64>,
    benchmark_config: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "str::is_empty")]
    experiment_name: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tags: &'a [ExperimentTag],
    callback_url: &'a str,
}

impl JobConfig {
    /// Resolve `benchmark_id` of `evaluation` against `provider`.
    ///
    /// Validation runs in a fixed order and stops at the first failure.
    pub fn build(
        evaluation: &EvaluationJob,
        provider: &ProviderResource,
        benchmark_id: &str,
        env: &RuntimeEnvironment,
    ) -> K8sResult<Self> {
        let settings = provider.k8s().ok_or_else(|| {
            K8sError::validation(format!(
                "provider {:?} missing runtime configuration",
                provider.id
            ))
        })?;
        if settings.image.trim().is_empty() {
            return Err(K8sError::validation("runtime adapter image is required"));
        }
        if evaluation.model.url.is_empty() || evaluation.model.name.is_empty() {
            return Err(K8sError::validation("model url and name are required"));
        }
        let service_url = env
            .service_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| K8sError::validation("callback service URL is required"))?;
        let retry_attempts = evaluation.retry_attempts.unwrap_or(0);
        if retry_attempts < 0 {
            return Err(K8sError::validation(format!(
                "retry attempts must be non-negative, got {retry_attempts}"
            )));
        }
        let benchmark = evaluation
            .benchmarks
            .iter()
            .find(|b| b.id == benchmark_id && b.provider_id == provider.id)
            .ok_or_else(|| {
                K8sError::validation(format!("benchmark config not found for {benchmark_id:?}"))
            })?;

        let namespace = env.namespace().to_string();

        let mut parameters: BTreeMap<String, Value> = benchmark
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let num_examples = parameters
            .remove(NUM_EXAMPLES_KEY)
            .as_ref()
            .and_then(num_examples_from);

        let (experiment_name, tags) = match &evaluation.experiment {
            Some(exp) => (exp.name.as_str(), exp.tags.as_slice()),
            None => ("", &[][..]),
        };
        let spec = JobSpec {
            id: &evaluation.id,
            benchmark_id,
            model: &evaluation.model,
            num_examples,
            benchmark_config: parameters,
            experiment_name,
            tags,
            callback_url: service_url,
        };
        let job_spec_json = serde_json::to_string_pretty(&spec)?;

        let instance = env
            .instance_name
            .as_deref()
            .map(|name| InstanceWiring::new(name, &namespace));

        Ok(Self {
            job_id: evaluation.id.clone(),
            provider_id: provider.id.clone(),
            benchmark_id: benchmark_id.to_string(),
            namespace,
            retry_attempts,
            timeout_seconds: evaluation.timeout_minutes.map(|m| i64::from(m) * 60),
            adapter_image: settings.image.clone(),
            entrypoint: settings.entrypoint.clone(),
            default_env: settings.env.clone(),
            resources: ResourceQuantities {
                cpu_request: or_default(&settings.cpu_request, DEFAULT_CPU_REQUEST),
                memory_request: or_default(&settings.memory_request, DEFAULT_MEMORY_REQUEST),
                cpu_limit: or_default(&settings.cpu_limit, DEFAULT_CPU_LIMIT),
                memory_limit: or_default(&settings.memory_limit, DEFAULT_MEMORY_LIMIT),
            },
            job_spec_json,
            instance,
            mlflow_tracking_uri: env.mlflow_tracking_uri.clone(),
            mlflow_workspace: env.mlflow_workspace.clone(),
        })
    }
}

/// Integers pass through; floats truncate toward zero; anything else is
/// treated as absent.
fn num_examples_from(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    n.as_i64()
        .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
        .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
}

fn or_default(value: &Option<String>, fallback: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
