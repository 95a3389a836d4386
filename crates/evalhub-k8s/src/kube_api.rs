//! `kube`-backed implementation of [`ClusterApi`].

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use crate::cluster::ClusterApi;
use crate::error::{ClusterError, ClusterResult, K8sResult};

/// Talks to the API server through a shared `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config, falling back to the local kubeconfig.
    pub async fn connect() -> K8sResult<Self> {
        let client = Client::try_default().await?;
        debug!(default_namespace = %client.default_namespace(), "kubernetes client ready");
        Ok(Self::new(client))
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of(namespace: Option<&str>, kind: &'static str, name: &str) -> ClusterResult<String> {
    namespace
        .filter(|ns| !ns.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ClusterError::Transport {
            kind,
            name: name.to_string(),
            message: "namespace and name are required".to_string(),
        })
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn create_config_map(&self, config_map: &ConfigMap) -> ClusterResult<ConfigMap> {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        let namespace = namespace_of(config_map.metadata.namespace.as_deref(), "ConfigMap", name)?;
        self.config_maps(&namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|e| ClusterError::from_kube(e, "ConfigMap", name))
    }

    async fn create_job(&self, job: &Job) -> ClusterResult<Job> {
        let name = job.metadata.name.as_deref().unwrap_or_default();
        let namespace = namespace_of(job.metadata.namespace.as_deref(), "Job", name)?;
        self.jobs(&namespace)
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| ClusterError::from_kube(e, "Job", name))
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        self.config_maps(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "ConfigMap", name))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        self.jobs(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "Job", name))
    }

    async fn set_config_map_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: OwnerReference,
    ) -> ClusterResult<()> {
        let patch = json!({ "metadata": { "ownerReferences": [owner] } });
        self.config_maps(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, "ConfigMap", name))
    }
}
