//! `evalhub render`: print the objects one benchmark would create.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use evalhub_core::{EvalHubConfig, EvaluationJob, ProviderCatalog};
use evalhub_k8s::{build_objects, JobConfig, RuntimeEnvironment};

use super::{load_evaluation, load_providers};

pub fn render(
    config: &EvalHubConfig,
    evaluation_path: &Path,
    benchmark_id: &str,
    provider_id: Option<&str>,
) -> Result<()> {
    let evaluation = load_evaluation(evaluation_path)?;
    let providers = load_providers(config)?;
    let environment = RuntimeEnvironment::from_config(config);

    let rendered = render_objects(&evaluation, &providers, &environment, benchmark_id, provider_id)?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

/// Build the ConfigMap and Job for one benchmark as JSON.
pub fn render_objects(
    evaluation: &EvaluationJob,
    providers: &ProviderCatalog,
    environment: &RuntimeEnvironment,
    benchmark_id: &str,
    provider_id: Option<&str>,
) -> Result<Value> {
    let benchmark = evaluation
        .benchmarks
        .iter()
        .find(|b| b.id == benchmark_id && provider_id.is_none_or(|p| b.provider_id == p))
        .ok_or_else(|| anyhow!("benchmark {benchmark_id:?} not in evaluation {}", evaluation.id))?;
    let provider = providers
        .get(&benchmark.provider_id)
        .ok_or_else(|| {
            anyhow!(
                "provider {:?} not found (known providers: {})",
                benchmark.provider_id,
                providers.ids().join(", ")
            )
        })?;

    let job_config = JobConfig::build(evaluation, provider, &benchmark.id, environment)
        .context("resolving job config")?;
    let objects = build_objects(&job_config).context("building cluster objects")?;

    Ok(json!({
        "configMap": objects.config_map,
        "job": objects.job,
    }))
}
