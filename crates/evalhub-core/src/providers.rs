//! Provider catalog: the read-only provider lookup table.
//!
//! Built once (from a directory of TOML files or from an in-memory list)
//! and shared across dispatch workers behind an `Arc`. The catalog is never
//! mutated after construction; a refresh builds a new catalog and swaps it
//! in wholesale.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::types::ProviderResource;

/// Immutable snapshot of provider settings, keyed by provider id.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    providers: HashMap<String, ProviderResource>,
}

impl ProviderCatalog {
    /// Build a catalog from providers. Later duplicates replace earlier ones.
    pub fn new(providers: impl IntoIterator<Item = ProviderResource>) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        Self { providers }
    }

    /// Load every `*.toml` file in `dir` as one provider.
    ///
    /// Files without an `id` are skipped. A missing directory yields an
    /// empty catalog.
    pub fn load_dir(dir: &Path) -> ConfigResult<Self> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "no providers found");
                return Ok(Self::default());
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut providers = HashMap::new();
        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let provider: ProviderResource =
                toml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;

            if provider.id.is_empty() {
                warn!(file = %path.display(), "provider config missing id, skipping");
                continue;
            }
            if providers.contains_key(&provider.id) {
                return Err(ConfigError::DuplicateProvider {
                    id: provider.id,
                    path,
                });
            }

            debug!(provider_id = %provider.id, file = %path.display(), "provider loaded");
            providers.insert(provider.id.clone(), provider);
        }

        info!(dir = %dir.display(), count = providers.len(), "provider catalog loaded");
        Ok(Self { providers })
    }

    /// Look up a provider by id.
    pub fn get(&self, provider_id: &str) -> Option<&ProviderResource> {
        self.providers.get(provider_id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
