//! `K8sRuntime`: the Kubernetes execution backend.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use evalhub_core::{EvalHubConfig, EvaluationJob, ProviderCatalog};
use evalhub_runtime::{DispatchHandle, Runtime, RuntimeError, RuntimeResult, StatusSink};

use crate::cluster::ClusterApi;
use crate::dispatcher::Dispatcher;
use crate::environment::RuntimeEnvironment;
use crate::error::{K8sResult, TeardownError};
use crate::kube_api::KubeClusterApi;
use crate::teardown::teardown;

pub const RUNTIME_NAME: &str = "kubernetes";

/// Runs each benchmark as a Kubernetes Job.
#[derive(Clone)]
pub struct K8sRuntime {
    cluster: Arc<dyn ClusterApi>,
    environment: Arc<RuntimeEnvironment>,
    dispatcher: Dispatcher,
}

impl K8sRuntime {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        providers: Arc<ProviderCatalog>,
        environment: RuntimeEnvironment,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let environment = Arc::new(environment);
        let dispatcher = Dispatcher::new(
            cluster.clone(),
            providers,
            environment.clone(),
            shutdown,
        );
        Self {
            cluster,
            environment,
            dispatcher,
        }
    }

    /// Connect to the cluster from `config` and build the runtime.
    pub async fn connect(
        config: &EvalHubConfig,
        providers: Arc<ProviderCatalog>,
        shutdown: watch::Receiver<bool>,
    ) -> K8sResult<Self> {
        let cluster = KubeClusterApi::connect().await?;
        let environment = RuntimeEnvironment::from_config(config);
        info!(
            namespace = %environment.namespace(),
            providers = providers.len(),
            instance = environment.instance_name.as_deref(),
            "kubernetes runtime ready"
        );
        Ok(Self::new(Arc::new(cluster), providers, environment, shutdown))
    }

    pub fn environment(&self) -> &RuntimeEnvironment {
        &self.environment
    }

    /// Teardown with the typed, inspectable aggregate error.
    pub async fn teardown_resources(&self, evaluation: &EvaluationJob) -> Result<(), TeardownError> {
        teardown(
            self.cluster.as_ref(),
            self.environment.namespace(),
            evaluation,
        )
        .await
    }
}

#[async_trait]
impl Runtime for K8sRuntime {
    fn name(&self) -> &'static str {
        RUNTIME_NAME
    }

    fn dispatch(
        &self,
        evaluation: Arc<EvaluationJob>,
        sink: Arc<dyn StatusSink>,
    ) -> RuntimeResult<DispatchHandle> {
        self.dispatcher
            .dispatch(evaluation, sink)
            .map_err(|e| RuntimeError::InvalidEvaluation(e.to_string()))
    }

    async fn teardown(&self, evaluation: &EvaluationJob) -> RuntimeResult<()> {
        self.teardown_resources(evaluation)
            .await
            .map_err(|e| RuntimeError::Teardown(Box::new(e)))
    }
}
