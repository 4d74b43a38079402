//! Install and uninstall Job construction
//!
//! Builds the Kubernetes Jobs that provision and deprovision a cluster.
//! The controller only relies on three properties of these Jobs: their
//! deterministic names, their controller owner reference to the
//! ClusterDeployment, and the `Complete`/`Failed` conditions the Job
//! controller reports. Everything else is payload for the execution backend.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};

use crate::config::ControllerConfig;
use crate::crd::{ClusterDeployment, SecretRef};
use crate::Error;

/// Maximum length of a Job name (it is copied into the `job-name` pod label)
pub const MAX_JOB_NAME_LEN: usize = 63;

/// Suffix of the install Job name
const INSTALL_JOB_SUFFIX: &str = "install";

/// Suffix of the uninstall Job name
const UNINSTALL_JOB_SUFFIX: &str = "uninstall";

/// Length of the digest appended to truncated Job names
const NAME_HASH_LEN: usize = 8;

/// Label carrying the owning ClusterDeployment's name
pub const CLUSTER_DEPLOYMENT_NAME_LABEL: &str = "hive.openshift.io/cluster-deployment-name";

/// Label marking the purpose of a Job ("install" or "uninstall")
pub const JOB_TYPE_LABEL: &str = "hive.openshift.io/job-type";

/// Key of the install metadata inside the metadata ConfigMap
pub const METADATA_KEY: &str = "metadata.json";

/// Shared working directory of the install pod
const WORK_DIR: &str = "/output";

/// Failed installs are not rerun in place
const INSTALL_JOB_BACKOFF_LIMIT: i32 = 0;

/// Deprovision is safe to repeat
const UNINSTALL_JOB_BACKOFF_LIMIT: i32 = 6;

/// Derive the install Job name for a ClusterDeployment
pub fn install_job_name(cluster_deployment: &str) -> String {
    job_name(cluster_deployment, INSTALL_JOB_SUFFIX)
}

/// Derive the uninstall Job name for a ClusterDeployment
pub fn uninstall_job_name(cluster_deployment: &str) -> String {
    job_name(cluster_deployment, UNINSTALL_JOB_SUFFIX)
}

/// Name of the ConfigMap the installer uploads `metadata.json` into
pub fn metadata_config_map_name(cluster_deployment: &str) -> String {
    format!("{cluster_deployment}-metadata")
}

/// `<name>-<suffix>`, or a truncated name plus a digest of the full name when too long
fn job_name(cluster_deployment: &str, suffix: &str) -> String {
    let name = format!("{cluster_deployment}-{suffix}");
    if name.len() <= MAX_JOB_NAME_LEN {
        return name;
    }

    let digest = Sha256::digest(cluster_deployment.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    let hash = &hex[..NAME_HASH_LEN];

    // lengths are bytes; DNS-1123 names are ASCII
    let mut keep = MAX_JOB_NAME_LEN - suffix.len() - NAME_HASH_LEN - 2;
    while !cluster_deployment.is_char_boundary(keep) {
        keep -= 1;
    }
    let prefix = cluster_deployment[..keep].trim_end_matches(['-', '.']);
    format!("{prefix}-{hash}-{suffix}")
}

/// Controller owner reference pointing at the ClusterDeployment
///
/// Fails when the object has never been persisted (no uid).
fn owner_reference(cd: &ClusterDeployment) -> Result<OwnerReference, Error> {
    cd.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation(format!(
            "ClusterDeployment {} has no uid, cannot own a Job",
            cd.name_any()
        ))
    })
}

fn job_labels(cd_name: &str, job_type: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            CLUSTER_DEPLOYMENT_NAME_LABEL.to_string(),
            cd_name.to_string(),
        ),
        (JOB_TYPE_LABEL.to_string(), job_type.to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            "hive-operator".to_string(),
        ),
    ])
}

fn secret_env(name: &str, secret: &SecretRef, key: &str, optional: bool) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.name.clone(),
                key: key.to_string(),
                optional: optional.then_some(true),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn aws_credential_env(cd: &ClusterDeployment) -> Vec<EnvVar> {
    cd.spec
        .platform_secrets
        .aws
        .as_ref()
        .map(|aws| {
            vec![
                secret_env(
                    "AWS_ACCESS_KEY_ID",
                    &aws.credentials,
                    "aws_access_key_id",
                    false,
                ),
                secret_env(
                    "AWS_SECRET_ACCESS_KEY",
                    &aws.credentials,
                    "aws_secret_access_key",
                    false,
                ),
            ]
        })
        .unwrap_or_default()
}

fn job(
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    owner: OwnerReference,
    backoff_limit: i32,
    pod: PodSpec,
) -> Job {
    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(backoff_limit),
            completions: Some(1),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    ..pod
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the install Job for a ClusterDeployment
///
/// The pod copies `openshift-install` out of the installer image in an init
/// container, then `hiveutil install-manager` runs it and uploads
/// `metadata.json` to the `<name>-metadata` ConfigMap. The pod runs as the
/// shared installer ServiceAccount so it may write that ConfigMap.
pub fn generate_installer_job(cd: &ClusterDeployment, config: &ControllerConfig) -> Result<Job, Error> {
    let name = cd.name_any();
    let namespace = cd
        .namespace()
        .ok_or_else(|| Error::validation(format!("ClusterDeployment {name} has no namespace")))?;
    let owner = owner_reference(cd)?;

    let work_dir_mount = VolumeMount {
        name: "output".to_string(),
        mount_path: WORK_DIR.to_string(),
        ..Default::default()
    };

    let installer = Container {
        name: "installer".to_string(),
        image: Some(config.installer_image.clone()),
        image_pull_policy: Some(config.installer_pull_policy.to_string()),
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        args: Some(vec![format!("cp -v /bin/openshift-install {WORK_DIR}/")]),
        volume_mounts: Some(vec![work_dir_mount.clone()]),
        ..Default::default()
    };

    let mut env = aws_credential_env(cd);
    if let Some(pull_secret) = &cd.spec.pull_secret {
        env.push(secret_env("PULL_SECRET", pull_secret, ".dockerconfigjson", false));
    }
    if let Some(ssh_key) = &cd.spec.ssh_key {
        env.push(secret_env("SSH_PUB_KEY", ssh_key, "ssh-publickey", true));
    }

    let install_manager = Container {
        name: "hive".to_string(),
        image: Some(config.hive_image.clone()),
        image_pull_policy: Some(config.hive_pull_policy.to_string()),
        command: Some(vec!["/usr/bin/hiveutil".to_string()]),
        args: Some(vec![
            "install-manager".to_string(),
            "--work-dir".to_string(),
            WORK_DIR.to_string(),
            "--log-level".to_string(),
            "debug".to_string(),
            namespace.clone(),
            name.clone(),
        ]),
        env: Some(env),
        volume_mounts: Some(vec![work_dir_mount]),
        ..Default::default()
    };

    let pod = PodSpec {
        init_containers: Some(vec![installer]),
        containers: vec![install_manager],
        service_account_name: Some(config.service_account_name.clone()),
        volumes: Some(vec![Volume {
            name: "output".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Ok(job(
        install_job_name(&name),
        namespace,
        job_labels(&name, INSTALL_JOB_SUFFIX),
        owner,
        INSTALL_JOB_BACKOFF_LIMIT,
        pod,
    ))
}

/// Build the uninstall Job for a ClusterDeployment
///
/// Deprovisions every AWS resource tagged as owned by the cluster. Only AWS
/// ClusterDeployments are supported.
pub fn generate_uninstaller_job(cd: &ClusterDeployment, config: &ControllerConfig) -> Result<Job, Error> {
    let name = cd.name_any();
    let namespace = cd
        .namespace()
        .ok_or_else(|| Error::validation(format!("ClusterDeployment {name} has no namespace")))?;
    let aws = cd.spec.platform.aws.as_ref().ok_or_else(|| {
        Error::validation(format!(
            "ClusterDeployment {name} has no AWS platform, only AWS clusters can be deprovisioned"
        ))
    })?;
    let owner = owner_reference(cd)?;

    let mut args = vec![
        "aws-tag-deprovision".to_string(),
        "--loglevel".to_string(),
        "debug".to_string(),
        "--region".to_string(),
        aws.region.clone(),
        format!("kubernetes.io/cluster/{name}=owned"),
    ];
    let cluster_uuid = cd.status_or_default().cluster_uuid;
    if !cluster_uuid.is_empty() {
        args.push(format!("tectonicClusterID={cluster_uuid}"));
    }

    let deprovision = Container {
        name: "deprovision".to_string(),
        image: Some(config.uninstaller_image.clone()),
        image_pull_policy: Some(config.uninstaller_pull_policy.to_string()),
        command: Some(vec!["/usr/bin/hiveutil".to_string()]),
        args: Some(args),
        env: Some(aws_credential_env(cd)),
        ..Default::default()
    };

    let pod = PodSpec {
        containers: vec![deprovision],
        ..Default::default()
    };

    Ok(job(
        uninstall_job_name(&name),
        namespace,
        job_labels(&name, UNINSTALL_JOB_SUFFIX),
        owner,
        UNINSTALL_JOB_BACKOFF_LIMIT,
        pod,
    ))
}

/// Status of a Job condition, if the condition is reported at all
pub fn job_condition_status<'a>(job: &'a Job, condition_type: &str) -> Option<&'a str> {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == condition_type))
        .map(|c| c.status.as_str())
}

/// Check if a Job has completed successfully
///
/// Only the `Complete` condition is consulted; a Job that also reports
/// `Failed=True` still counts as successful.
pub fn is_successful(job: &Job) -> bool {
    job_condition_status(job, "Complete") == Some("True")
}

/// Check if a Job has failed
pub fn is_failed(job: &Job) -> bool {
    job_condition_status(job, "Failed") == Some("True")
}
