//! ResourceSpecBuilder: turns a [`JobConfig`] into the ConfigMap (data
//! object) and Job (run object) submitted to the cluster.
//!
//! Pure: no cluster I/O happens here.

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMap, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar,
    PodSpec, PodTemplateSpec, ResourceRequirements, SeccompProfile, SecurityContext, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use crate::error::{K8sError, K8sResult};
use crate::job_config::JobConfig;
use crate::naming::{config_map_name, job_name, label_value};
use crate::quantity::QuantityParser;

// ── Constants ──────────────────────────────────────────────────────

/// Run objects are reclaimed this long after they finish.
pub const JOB_TTL_SECONDS: i32 = 3600;
pub const ADAPTER_CONTAINER_NAME: &str = "adapter";

/// Data-object key holding the job-spec document.
pub const JOB_SPEC_FILE_NAME: &str = "job.json";
pub const JOB_SPEC_VOLUME_NAME: &str = "job-spec";
pub const JOB_SPEC_MOUNT_PATH: &str = "/meta/job.json";
pub const DATA_VOLUME_NAME: &str = "data";
pub const DATA_MOUNT_PATH: &str = "/data";
pub const SERVICE_CA_VOLUME_NAME: &str = "service-ca";
pub const SERVICE_CA_MOUNT_PATH: &str = "/etc/pki/ca-trust/source/anchors";

pub const ENV_JOB_ID: &str = "JOB_ID";
pub const ENV_EVALHUB_URL: &str = "EVALHUB_URL";
pub const ENV_MLFLOW_TRACKING_URI: &str = "MLFLOW_TRACKING_URI";
pub const ENV_MLFLOW_WORKSPACE: &str = "MLFLOW_WORKSPACE";

pub const LABEL_APP: &str = "app";
pub const LABEL_COMPONENT: &str = "component";
pub const LABEL_JOB_ID: &str = "job_id";
pub const LABEL_PROVIDER_ID: &str = "provider_id";
pub const LABEL_BENCHMARK_ID: &str = "benchmark_id";
pub const APP_NAME: &str = "evalhub";
pub const COMPONENT_NAME: &str = "evaluation-job";

const RUN_AS_USER: i64 = 1000;
const RUN_AS_GROUP: i64 = 1000;

// ── Object pair ────────────────────────────────────────────────────

/// The two objects materialized per benchmark.
#[derive(Debug, Clone)]
pub struct ClusterObjects {
    pub config_map: ConfigMap,
    pub job: Job,
}

/// Build both objects, or neither.
pub fn build_objects(cfg: &JobConfig) -> K8sResult<ClusterObjects> {
    let job = build_job(cfg)?;
    Ok(ClusterObjects {
        config_map: build_config_map(cfg),
        job,
    })
}

/// Identity labels attached to every object of a benchmark.
pub fn job_labels(job_id: &str, provider_id: &str, benchmark_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), APP_NAME.to_string()),
        (LABEL_COMPONENT.to_string(), COMPONENT_NAME.to_string()),
        (LABEL_JOB_ID.to_string(), label_value(job_id)),
        (LABEL_PROVIDER_ID.to_string(), label_value(provider_id)),
        (LABEL_BENCHMARK_ID.to_string(), label_value(benchmark_id)),
    ])
}

pub fn build_config_map(cfg: &JobConfig) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&cfg.job_id, &cfg.provider_id, &cfg.benchmark_id)),
            namespace: Some(cfg.namespace.clone()),
            labels: Some(job_labels(&cfg.job_id, &cfg.provider_id, &cfg.benchmark_id)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            JOB_SPEC_FILE_NAME.to_string(),
            cfg.job_spec_json.clone(),
        )])),
        ..Default::default()
    }
}

pub fn build_job(cfg: &JobConfig) -> K8sResult<Job> {
    if cfg.adapter_image.trim().is_empty() {
        return Err(K8sError::validation("adapter image is required"));
    }
    let labels = job_labels(&cfg.job_id, &cfg.provider_id, &cfg.benchmark_id);
    let data_object = config_map_name(&cfg.job_id, &cfg.provider_id, &cfg.benchmark_id);

    let mut volume_mounts = vec![
        VolumeMount {
            name: JOB_SPEC_VOLUME_NAME.to_string(),
            mount_path: JOB_SPEC_MOUNT_PATH.to_string(),
            sub_path: Some(JOB_SPEC_FILE_NAME.to_string()),
            read_only: Some(true),
            ..Default::default()
        },
        VolumeMount {
            name: DATA_VOLUME_NAME.to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        },
    ];
    let mut volumes = vec![
        config_map_volume(JOB_SPEC_VOLUME_NAME, &data_object),
        Volume {
            name: DATA_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    ];
    if let Some(wiring) = &cfg.instance {
        volume_mounts.push(VolumeMount {
            name: SERVICE_CA_VOLUME_NAME.to_string(),
            mount_path: SERVICE_CA_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
        volumes.push(config_map_volume(
            SERVICE_CA_VOLUME_NAME,
            &wiring.service_ca_config_map,
        ));
    }

    let container = Container {
        name: ADAPTER_CONTAINER_NAME.to_string(),
        image: Some(cfg.adapter_image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(build_command(&cfg.entrypoint)),
        env: Some(build_env(cfg)),
        resources: Some(build_resources(cfg)?),
        security_context: Some(security_context()),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(job_name(&cfg.job_id, &cfg.provider_id, &cfg.benchmark_id)),
            namespace: Some(cfg.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(cfg.retry_attempts),
            ttl_seconds_after_finished: Some(JOB_TTL_SECONDS),
            active_deadline_seconds: cfg.timeout_seconds,
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    service_account_name: cfg
                        .instance
                        .as_ref()
                        .map(|w| w.service_account.clone()),
                    containers: vec![container],
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Owner reference making `job` the controller of its data object.
///
/// Returns `None` when the job carries no server-assigned uid.
pub fn owner_reference(job: &Job) -> Option<OwnerReference> {
    let name = job.metadata.name.clone()?;
    let uid = job.metadata.uid.clone()?;
    Some(OwnerReference {
        api_version: "batch/v1".to_string(),
        kind: "Job".to_string(),
        name,
        uid,
        controller: Some(true),
        ..Default::default()
    })
}

// ── Container pieces ───────────────────────────────────────────────

fn config_map_volume(volume_name: &str, config_map: &str) -> Volume {
    Volume {
        name: volume_name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string().into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Trimmed, non-blank entrypoint tokens.
fn build_command(entrypoint: &[String]) -> Vec<String> {
    entrypoint
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Synthetic variables first, then provider defaults deduplicated by name.
/// Provider entries can never shadow a synthetic variable.
fn build_env(cfg: &JobConfig) -> Vec<EnvVar> {
    let mut synthetic = vec![(ENV_JOB_ID, cfg.job_id.as_str())];
    if let Some(wiring) = &cfg.instance {
        synthetic.push((ENV_EVALHUB_URL, wiring.evalhub_url.as_str()));
    }
    if let Some(uri) = &cfg.mlflow_tracking_uri {
        synthetic.push((ENV_MLFLOW_TRACKING_URI, uri.as_str()));
    }
    if let Some(workspace) = &cfg.mlflow_workspace {
        synthetic.push((ENV_MLFLOW_WORKSPACE, workspace.as_str()));
    }

    let provider = cfg
        .default_env
        .iter()
        .map(|var| (var.name.as_str(), var.value.as_str()));

    let mut seen = HashSet::new();
    synthetic
        .into_iter()
        .chain(provider)
        .filter(|(name, _)| !name.is_empty() && seen.insert(*name))
        .map(|(name, value)| EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        })
        .collect()
}

fn build_resources(cfg: &JobConfig) -> K8sResult<ResourceRequirements> {
    let parser = QuantityParser::shared()?;
    let res = &cfg.resources;
    Ok(ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), parser.parse("cpu request", &res.cpu_request)?),
            ("memory".to_string(), parser.parse("memory request", &res.memory_request)?),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), parser.parse("cpu limit", &res.cpu_limit)?),
            ("memory".to_string(), parser.parse("memory limit", &res.memory_limit)?),
        ])),
        ..Default::default()
    })
}

/// Fixed hardening baseline; not configurable per job.
fn security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        run_as_non_root: Some(true),
        run_as_user: Some(RUN_AS_USER),
        run_as_group: Some(RUN_AS_GROUP),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_config::{InstanceWiring, ResourceQuantities};
    use serde_json::{json, Value};

    fn test_config() -> JobConfig {
        JobConfig {
            job_id: "job-123".to_string(),
            provider_id: "provider-1".to_string(),
            benchmark_id: "bench-1".to_string(),
            namespace: "evals".to_string(),
            retry_attempts: 2,
            timeout_seconds: None,
            adapter_image: "adapter:latest".to_string(),
            entrypoint: vec!["python".to_string(), " ".to_string(), " -m ".to_string(), "adapter".to_string()],
            default_env: vec![
                evalhub_core::EnvVar::new("HF_HOME", "/data/hf"),
                evalhub_core::EnvVar::new("JOB_ID", "spoofed"),
                evalhub_core::EnvVar::new("", "nameless"),
                evalhub_core::EnvVar::new("HF_HOME", "/dup"),
            ],
            resources: ResourceQuantities {
                cpu_request: "250m".to_string(),
                memory_request: "512Mi".to_string(),
                cpu_limit: "1".to_string(),
                memory_limit: "2Gi".to_string(),
            },
            job_spec_json: "{\n  \"id\": \"job-123\"\n}".to_string(),
            instance: None,
            mlflow_tracking_uri: None,
            mlflow_workspace: None,
        }
    }

    fn pod_spec(job: &Job) -> &PodSpec {
        job.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
    }

    #[test]
    fn config_map_carries_job_spec() {
        let cm = build_config_map(&test_config());
        assert_eq!(
            cm.metadata.name.as_deref(),
            Some("eval-job-job-123-provider-1-bench-1-spec")
        );
        assert_eq!(cm.metadata.namespace.as_deref(), Some("evals"));
        let data = cm.data.unwrap();
        assert!(data[JOB_SPEC_FILE_NAME].contains("\"id\": \"job-123\""));

        let labels = cm.metadata.labels.unwrap();
        assert_eq!(labels[LABEL_APP], "evalhub");
        assert_eq!(labels[LABEL_COMPONENT], "evaluation-job");
        assert_eq!(labels[LABEL_PROVIDER_ID], "provider-1");
    }

    #[test]
    fn job_has_single_attempt_semantics() {
        let job = build_job(&test_config()).unwrap();
        let spec = job.spec.as_ref().unwrap();

        assert_eq!(job.metadata.name.as_deref(), Some("eval-job-job-123-provider-1-bench-1"));
        assert_eq!(spec.backoff_limit, Some(2));
        assert_eq!(spec.ttl_seconds_after_finished, Some(JOB_TTL_SECONDS));
        assert!(spec.active_deadline_seconds.is_none());
        assert_eq!(pod_spec(&job).restart_policy.as_deref(), Some("Never"));
        assert!(pod_spec(&job).service_account_name.is_none());
    }

    #[test]
    fn empty_image_is_rejected_without_objects() {
        let mut cfg = test_config();
        cfg.adapter_image = String::new();

        assert!(matches!(build_job(&cfg), Err(K8sError::Validation(_))));
        assert!(matches!(build_objects(&cfg), Err(K8sError::Validation(_))));
    }

    #[test]
    fn container_command_and_env() {
        let job = build_job(&test_config()).unwrap();
        let container = &pod_spec(&job).containers[0];

        assert_eq!(container.name, ADAPTER_CONTAINER_NAME);
        assert_eq!(
            container.command.as_deref().unwrap(),
            &["python", "-m", "adapter"]
        );

        let env: Vec<(&str, &str)> = container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(env, vec![("JOB_ID", "job-123"), ("HF_HOME", "/data/hf")]);
    }

    #[test]
    fn blank_entrypoint_yields_empty_command() {
        let mut cfg = test_config();
        cfg.entrypoint = vec!["  ".to_string()];
        let job = build_job(&cfg).unwrap();
        assert!(pod_spec(&job).containers[0].command.as_ref().unwrap().is_empty());
    }

    #[test]
    fn malformed_quantity_is_an_error() {
        let mut cfg = test_config();
        cfg.resources.memory_limit = "two gigs".to_string();

        let err = build_job(&cfg).unwrap_err();
        assert!(matches!(err, K8sError::InvalidQuantity { field: "memory limit", .. }));
    }

    #[test]
    fn security_and_volumes_serialize_as_expected() {
        let job = build_job(&test_config()).unwrap();
        let pod = serde_json::to_value(pod_spec(&job)).unwrap();
        let container = &pod["containers"][0];

        assert_eq!(
            container["securityContext"],
            json!({
                "allowPrivilegeEscalation": false,
                "runAsNonRoot": true,
                "runAsUser": 1000,
                "runAsGroup": 1000,
                "capabilities": { "drop": ["ALL"] },
                "seccompProfile": { "type": "RuntimeDefault" }
            })
        );
        assert_eq!(
            container["resources"],
            json!({
                "requests": { "cpu": "250m", "memory": "512Mi" },
                "limits": { "cpu": "1", "memory": "2Gi" }
            })
        );
        assert_eq!(
            container["volumeMounts"],
            json!([
                { "name": "job-spec", "mountPath": "/meta/job.json", "subPath": "job.json", "readOnly": true },
                { "name": "data", "mountPath": "/data" }
            ])
        );
        assert_eq!(
            pod["volumes"],
            json!([
                { "name": "job-spec", "configMap": { "name": "eval-job-job-123-provider-1-bench-1-spec" } },
                { "name": "data", "emptyDir": {} }
            ])
        );
    }

    #[test]
    fn instance_wiring_adds_service_ca_and_env() {
        let mut cfg = test_config();
        cfg.timeout_seconds = Some(600);
        cfg.instance = Some(InstanceWiring {
            instance_name: "hub".to_string(),
            service_account: "hub-jobs".to_string(),
            service_ca_config_map: "hub-service-ca".to_string(),
            evalhub_url: "https://hub.evals.svc.cluster.local:8443".to_string(),
        });
        cfg.mlflow_workspace = Some("team-a".to_string());
        cfg.default_env.push(evalhub_core::EnvVar::new("EVALHUB_URL", "http://spoofed"));

        let job = build_job(&cfg).unwrap();
        assert_eq!(job.spec.as_ref().unwrap().active_deadline_seconds, Some(600));
        let pod = pod_spec(&job);
        assert_eq!(pod.service_account_name.as_deref(), Some("hub-jobs"));

        let value = serde_json::to_value(pod).unwrap();
        let volumes = value["volumes"].as_array().unwrap();
        assert_eq!(
            volumes[2],
            json!({ "name": "service-ca", "configMap": { "name": "hub-service-ca" } })
        );
        let mounts = value["containers"][0]["volumeMounts"].as_array().unwrap();
        assert_eq!(mounts[2]["mountPath"], SERVICE_CA_MOUNT_PATH);
        assert_eq!(mounts[2]["readOnly"], true);

        let env: Vec<Value> = value["containers"][0]["env"].as_array().unwrap().clone();
        let evalhub_url: Vec<&Value> = env.iter().filter(|e| e["name"] == "EVALHUB_URL").collect();
        assert_eq!(evalhub_url.len(), 1);
        assert_eq!(evalhub_url[0]["value"], "https://hub.evals.svc.cluster.local:8443");
        assert!(env.iter().any(|e| e["name"] == "MLFLOW_WORKSPACE" && e["value"] == "team-a"));
    }

    #[test]
    fn labels_are_sanitized() {
        let labels = job_labels("Job 1", "LM_Eval", "AraDiCE_boolq");
        assert_eq!(labels[LABEL_JOB_ID], "job-1");
        assert_eq!(labels[LABEL_PROVIDER_ID], "lm-eval");
        assert_eq!(labels[LABEL_BENCHMARK_ID], "aradice-boolq");
    }

    #[test]
    fn owner_reference_requires_uid() {
        let mut job = build_job(&test_config()).unwrap();
        assert!(owner_reference(&job).is_none());

        job.metadata.uid = Some("uid-1".to_string());
        let owner = owner_reference(&job).unwrap();
        assert_eq!(owner.kind, "Job");
        assert_eq!(owner.api_version, "batch/v1");
        assert_eq!(owner.uid, "uid-1");
        assert_eq!(owner.controller, Some(true));
    }
}
