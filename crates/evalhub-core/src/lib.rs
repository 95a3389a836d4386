//! evalhub-core: domain types and configuration for EvalHub.
//!
//! Everything the execution backends share: the evaluation request model
//! (jobs, benchmarks, model references), provider runtime settings, the
//! status events reported back per benchmark, the immutable provider
//! catalog, and `evalhub.toml` loading.

pub mod config;
pub mod error;
pub mod providers;
pub mod types;

pub use config::{EvalHubConfig, KubernetesConfig, ServiceConfig};
pub use error::{ConfigError, ConfigResult};
pub use providers::ProviderCatalog;
pub use types::*;
