//! Cluster primitives: the seam between the dispatcher and the API server.
//!
//! [`ClusterApi`] is implemented by the `kube`-backed
//! [`KubeClusterApi`](crate::KubeClusterApi) and by [`InMemoryCluster`],
//! a fake cluster for tests with failure injection and in-flight tracking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tokio::sync::Mutex;

use crate::error::{ClusterError, ClusterResult};

/// Create/delete/link primitives consumed by dispatch and teardown.
///
/// Implementations must be safe to call from many workers at once, and
/// deletes must report a missing object as [`ClusterError::NotFound`].
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_config_map(&self, config_map: &ConfigMap) -> ClusterResult<ConfigMap>;

    /// Create a Job. The returned object carries the server-assigned uid.
    async fn create_job(&self, job: &Job) -> ClusterResult<Job>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClusterResult<()>;

    /// Delete a Job with background propagation, so its pods and any
    /// ConfigMap it controls are garbage-collected.
    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<()>;

    /// Replace the owner references of a ConfigMap with `owner`.
    async fn set_config_map_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: OwnerReference,
    ) -> ClusterResult<()>;
}

// ── In-memory cluster ──────────────────────────────────────────────

/// A cluster primitive, for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateConfigMap,
    CreateJob,
    DeleteConfigMap,
    DeleteJob,
    SetOwner,
}

impl Operation {
    fn kind(self) -> &'static str {
        match self {
            Self::CreateConfigMap | Self::DeleteConfigMap | Self::SetOwner => "ConfigMap",
            Self::CreateJob | Self::DeleteJob => "Job",
        }
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: Operation,
    /// `None` matches every object.
    name: Option<String>,
}

type ObjectKey = (String, String);

#[derive(Debug, Default)]
struct ClusterState {
    config_maps: BTreeMap<ObjectKey, ConfigMap>,
    jobs: BTreeMap<ObjectKey, Job>,
    failures: Vec<FailureRule>,
    calls: Vec<(Operation, String)>,
    next_uid: u64,
}

/// In-memory cluster (for testing).
///
/// Deleting a Job cascades to ConfigMaps it controls, the way the garbage
/// collector would.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call for `latency` so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail `op` on the object called `name` with a server error.
    pub fn failing(mut self, op: Operation, name: impl Into<String>) -> Self {
        self.state.get_mut().failures.push(FailureRule {
            op,
            name: Some(name.into()),
        });
        self
    }

    /// Fail `op` for every object.
    pub fn failing_all(mut self, op: Operation) -> Self {
        self.state.get_mut().failures.push(FailureRule { op, name: None });
        self
    }

    pub async fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        let state = self.state.lock().await;
        state.config_maps.get(&key(namespace, name)).cloned()
    }

    pub async fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        let state = self.state.lock().await;
        state.jobs.get(&key(namespace, name)).cloned()
    }

    pub async fn config_maps(&self) -> Vec<ConfigMap> {
        self.state.lock().await.config_maps.values().cloned().collect()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.values().cloned().collect()
    }

    /// Names passed to `op`, in call order (failed calls included).
    pub async fn calls(&self, op: Operation) -> Vec<String> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Highest number of calls observed in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Record the call, simulate latency, and apply failure rules.
    async fn enter(&self, op: Operation, name: &str) -> ClusterResult<InFlight<'_>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.calls.push((op, name.to_string()));
        let injected = state
            .failures
            .iter()
            .any(|rule| rule.op == op && rule.name.as_deref().is_none_or(|n| n == name));
        if injected {
            return Err(ClusterError::Api {
                kind: op.kind(),
                name: name.to_string(),
                code: 500,
                message: format!("injected {op:?} failure"),
            });
        }
        Ok(guard)
    }
}

/// Decrements the in-flight counter when the call completes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

fn object_key(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> ObjectKey {
    key(
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn create_config_map(&self, config_map: &ConfigMap) -> ClusterResult<ConfigMap> {
        let k = object_key(&config_map.metadata);
        let _call = self.enter(Operation::CreateConfigMap, &k.1).await?;

        let mut state = self.state.lock().await;
        if state.config_maps.contains_key(&k) {
            return Err(ClusterError::AlreadyExists {
                kind: "ConfigMap",
                name: k.1,
            });
        }
        state.config_maps.insert(k, config_map.clone());
        Ok(config_map.clone())
    }

    async fn create_job(&self, job: &Job) -> ClusterResult<Job> {
        let k = object_key(&job.metadata);
        let _call = self.enter(Operation::CreateJob, &k.1).await?;

        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&k) {
            return Err(ClusterError::AlreadyExists { kind: "Job", name: k.1 });
        }
        state.next_uid += 1;
        let mut created = job.clone();
        created.metadata.uid = Some(format!("uid-{}", state.next_uid));
        state.jobs.insert(k, created.clone());
        Ok(created)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        let _call = self.enter(Operation::DeleteConfigMap, name).await?;

        let mut state = self.state.lock().await;
        match state.config_maps.remove(&key(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                kind: "ConfigMap",
                name: name.to_string(),
            }),
        }
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        let _call = self.enter(Operation::DeleteJob, name).await?;

        let mut state = self.state.lock().await;
        let removed = state
            .jobs
            .remove(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound {
                kind: "Job",
                name: name.to_string(),
            })?;

        if let Some(uid) = removed.metadata.uid {
            state.config_maps.retain(|_, cm| {
                !cm.metadata
                    .owner_references
                    .iter()
                    .flatten()
                    .any(|owner| owner.uid == uid)
            });
        }
        Ok(())
    }

    async fn set_config_map_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: OwnerReference,
    ) -> ClusterResult<()> {
        let _call = self.enter(Operation::SetOwner, name).await?;

        let mut state = self.state.lock().await;
        let config_map = state
            .config_maps
            .get_mut(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound {
                kind: "ConfigMap",
                name: name.to_string(),
            })?;
        config_map.metadata.owner_references = Some(vec![owner]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn test_config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn test_job(name: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn owner_of(job: &Job) -> OwnerReference {
        OwnerReference {
            api_version: "batch/v1".to_string(),
            kind: "Job".to_string(),
            name: job.metadata.name.clone().unwrap_or_default(),
            uid: job.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_uid_and_rejects_duplicates() {
        let cluster = InMemoryCluster::new();
        let created = cluster.create_job(&test_job("run")).await.unwrap();
        assert_eq!(created.metadata.uid.as_deref(), Some("uid-1"));

        let err = cluster.create_job(&test_job("run")).await.unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let cluster = InMemoryCluster::new();
        let err = cluster.delete_config_map("ns", "nope").await.unwrap_err();
        assert!(err.is_not_found());
        let err = cluster.delete_job("ns", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn job_deletion_cascades_to_owned_config_map() {
        let cluster = InMemoryCluster::new();
        cluster.create_config_map(&test_config_map("run-spec")).await.unwrap();
        cluster.create_config_map(&test_config_map("other")).await.unwrap();
        let job = cluster.create_job(&test_job("run")).await.unwrap();
        cluster
            .set_config_map_owner("ns", "run-spec", owner_of(&job))
            .await
            .unwrap();

        cluster.delete_job("ns", "run").await.unwrap();

        assert!(cluster.config_map("ns", "run-spec").await.is_none());
        assert!(cluster.config_map("ns", "other").await.is_some());
        assert_eq!(cluster.calls(Operation::DeleteJob).await, vec!["run"]);
    }

    #[tokio::test]
    async fn injected_failures_match_by_operation_and_name() {
        let cluster = InMemoryCluster::new().failing(Operation::CreateJob, "bad");

        assert!(cluster.create_job(&test_job("good")).await.is_ok());
        let err = cluster.create_job(&test_job("bad")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Api { code: 500, .. }));
        assert_eq!(cluster.calls(Operation::CreateJob).await, vec!["good", "bad"]);
    }

    #[tokio::test]
    async fn failing_all_matches_every_object() {
        let cluster = InMemoryCluster::new().failing_all(Operation::CreateConfigMap);
        assert!(cluster.create_config_map(&test_config_map("a")).await.is_err());
        assert!(cluster.create_config_map(&test_config_map("b")).await.is_err());
        assert!(cluster.config_maps().await.is_empty());
    }

    #[tokio::test]
    async fn in_flight_counter_returns_to_zero() {
        let cluster = InMemoryCluster::new();
        cluster.create_config_map(&test_config_map("a")).await.unwrap();
        assert_eq!(cluster.max_in_flight(), 1);
        assert_eq!(cluster.in_flight.load(Ordering::SeqCst), 0);
    }
}
