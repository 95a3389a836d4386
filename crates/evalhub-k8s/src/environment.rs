//! Execution environment consumed by job resolution.
//!
//! Gathered once from [`EvalHubConfig`] (file plus env overrides) and the
//! in-cluster namespace file, then injected into the runtime so job
//! building never touches process state.

use std::path::Path;

use tracing::debug;

use evalhub_core::EvalHubConfig;

/// Namespace used when neither an override nor a discovered one exists.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Resolved inputs from the deployment environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    /// Callback/service URL adapters report to. Required at dispatch time.
    pub service_url: Option<String>,
    /// Explicit namespace override.
    pub namespace: Option<String>,
    /// Namespace read from the service-account file, if any.
    pub discovered_namespace: Option<String>,
    /// EvalHub instance name; enables per-instance wiring.
    pub instance_name: Option<String>,
    pub mlflow_tracking_uri: Option<String>,
    pub mlflow_workspace: Option<String>,
}

impl RuntimeEnvironment {
    /// Build from service configuration, reading the namespace file.
    pub fn from_config(config: &EvalHubConfig) -> Self {
        let k8s = &config.kubernetes;
        Self {
            service_url: non_blank(config.service.callback_url.as_deref()),
            namespace: non_blank(k8s.namespace.as_deref()),
            discovered_namespace: read_namespace_file(&k8s.namespace_file),
            instance_name: non_blank(k8s.instance_name.as_deref()),
            mlflow_tracking_uri: non_blank(k8s.mlflow_tracking_uri.as_deref()),
            mlflow_workspace: non_blank(k8s.mlflow_workspace.as_deref()),
        }
    }

    /// Target namespace: override, then discovered, then `default`.
    pub fn namespace(&self) -> &str {
        resolve_namespace(self.namespace.as_deref(), self.discovered_namespace.as_deref())
    }
}

/// Pick the first non-blank of `configured` and `discovered`, falling back
/// to [`DEFAULT_NAMESPACE`].
pub fn resolve_namespace<'a>(configured: Option<&'a str>, discovered: Option<&'a str>) -> &'a str {
    [configured, discovered]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|ns| !ns.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
}

/// Best-effort read of the in-cluster namespace file. Any failure means
/// "not running in a cluster".
pub fn read_namespace_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => non_blank(Some(&content)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "in-cluster namespace unavailable");
            None
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
