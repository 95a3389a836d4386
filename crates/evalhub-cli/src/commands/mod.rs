pub mod dispatch;
pub mod render;
pub mod teardown;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use evalhub_core::{EvalHubConfig, EvaluationJob, ProviderCatalog};
use evalhub_k8s::K8sRuntime;
use evalhub_runtime::{LocalRuntime, Runtime};

const DEFAULT_CONFIG_FILE: &str = "evalhub.toml";

/// Load service configuration and apply environment overrides.
///
/// An explicit path must exist; the default `evalhub.toml` is optional.
pub fn load_config(path: Option<&Path>) -> Result<EvalHubConfig> {
    let config = match path {
        Some(path) => EvalHubConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            EvalHubConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => EvalHubConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Read an evaluation request from a JSON file.
pub fn load_evaluation(path: &Path) -> Result<EvaluationJob> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading evaluation {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing evaluation {}", path.display()))
}

pub fn load_providers(config: &EvalHubConfig) -> Result<Arc<ProviderCatalog>> {
    let catalog = ProviderCatalog::load_dir(&config.service.providers_dir)
        .context("loading provider catalog")?;
    Ok(Arc::new(catalog))
}

/// Pick the execution backend: local mode or the Kubernetes cluster.
pub async fn build_runtime(
    config: &EvalHubConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<Arc<dyn Runtime>> {
    let runtime: Arc<dyn Runtime> = if config.service.local_mode {
        Arc::new(LocalRuntime::new())
    } else {
        let providers = load_providers(config)?;
        let runtime = K8sRuntime::connect(config, providers, shutdown)
            .await
            .context("connecting to kubernetes")?;
        Arc::new(runtime)
    };
    info!(runtime = runtime.name(), "runtime selected");
    Ok(runtime)
}
