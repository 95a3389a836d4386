//! evalhub.toml configuration parser.
//!
//! The file is optional in every field; environment variables set by the
//! deploying operator take precedence over file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default location of the in-cluster service-account namespace file.
pub const IN_CLUSTER_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Environment variable carrying the callback/service URL.
pub const SERVICE_URL_ENV: &str = "SERVICE_URL";
/// Environment variable carrying the EvalHub instance name.
pub const INSTANCE_NAME_ENV: &str = "EVALHUB_INSTANCE_NAME";
pub const MLFLOW_TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
pub const MLFLOW_WORKSPACE_ENV: &str = "MLFLOW_WORKSPACE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvalHubConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// URL adapters call back to with results.
    pub callback_url: Option<String>,
    /// Use the no-op local runtime instead of a cluster.
    #[serde(default)]
    pub local_mode: bool,
    /// Directory holding one `*.toml` file per provider.
    #[serde(default = "default_providers_dir")]
    pub providers_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            local_mode: false,
            providers_dir: default_providers_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KubernetesConfig {
    /// Explicit target namespace; wins over the discovered one.
    pub namespace: Option<String>,
    /// File the in-cluster namespace is read from.
    #[serde(default = "default_namespace_file")]
    pub namespace_file: PathBuf,
    /// Name of the EvalHub instance (set by the operator).
    pub instance_name: Option<String>,
    pub mlflow_tracking_uri: Option<String>,
    pub mlflow_workspace: Option<String>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            namespace_file: default_namespace_file(),
            instance_name: None,
            mlflow_tracking_uri: None,
            mlflow_workspace: None,
        }
    }
}

fn default_providers_dir() -> PathBuf {
    PathBuf::from("config/providers")
}

fn default_namespace_file() -> PathBuf {
    PathBuf::from(IN_CLUSTER_NAMESPACE_FILE)
}

impl EvalHubConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply process environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Values are trimmed; blank values are
    /// treated as unset and leave the file value in place.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get(SERVICE_URL_ENV) {
            self.service.callback_url = Some(url);
        }
        if let Some(name) = get(INSTANCE_NAME_ENV) {
            self.kubernetes.instance_name = Some(name);
        }
        if let Some(uri) = get(MLFLOW_TRACKING_URI_ENV) {
            self.kubernetes.mlflow_tracking_uri = Some(uri);
        }
        if let Some(ws) = get(MLFLOW_WORKSPACE_ENV) {
            self.kubernetes.mlflow_workspace = Some(ws);
        }
        self
    }
}
