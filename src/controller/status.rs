//! ClusterDeployment status synthesis
//!
//! Status is derived from the observed install Job and, once the install has
//! completed, from the `metadata.json` the installer uploads to the
//! `<name>-metadata` ConfigMap.

use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use serde::Deserialize;
use tracing::{debug, info};

use crate::crd::{ClusterDeployment, ClusterDeploymentStatus};
use crate::install::{is_successful, metadata_config_map_name, METADATA_KEY};
use crate::Error;

use super::KubeClient;

/// Install metadata written by the installer
///
/// Only the fields the controller reads are modelled; everything else in
/// the document is ignored.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ClusterMetadata {
    /// AWS section
    pub aws: AwsClusterMetadata,
}

/// AWS section of the install metadata
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AwsClusterMetadata {
    /// Tags identifying the cluster's cloud resources
    pub identifier: AwsIdentifier,
}

/// Tags identifying a cluster's AWS resources
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AwsIdentifier {
    /// Stable cluster ID
    #[serde(rename = "tectonicClusterID")]
    pub tectonic_cluster_id: String,
}

impl ClusterMetadata {
    /// Decode `metadata.json`, naming `configmap` in any error
    pub fn parse(configmap: &str, raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw).map_err(|e| Error::metadata(configmap, e.to_string()))
    }

    /// The stable cluster identifier
    pub fn cluster_uuid(&self) -> &str {
        &self.aws.identifier.tectonic_cluster_id
    }
}

/// Read the cluster identifier from the metadata ConfigMap of `cd_name`
pub async fn read_cluster_uuid(
    kube: &dyn KubeClient,
    namespace: &str,
    cd_name: &str,
) -> Result<String, Error> {
    let cm_name = metadata_config_map_name(cd_name);
    let cm = kube
        .get_config_map(namespace, &cm_name)
        .await?
        .ok_or_else(|| Error::metadata(&cm_name, "configmap not found"))?;

    let raw = cm
        .data
        .as_ref()
        .and_then(|data| data.get(METADATA_KEY))
        .ok_or_else(|| Error::metadata(&cm_name, format!("missing key {METADATA_KEY}")))?;

    let metadata = ClusterMetadata::parse(&cm_name, raw)?;
    debug!(configmap = %cm_name, cluster_uuid = %metadata.cluster_uuid(), "read cluster metadata");
    Ok(metadata.cluster_uuid().to_string())
}

/// Compute the new status of `cd` and persist it when it changed
///
/// `installed` follows the install Job's `Complete` condition but is never
/// lowered, and a known cluster UUID is never replaced. Returns whether a
/// write was made. On error nothing is persisted.
pub async fn sync_status(
    kube: &dyn KubeClient,
    cd: &mut ClusterDeployment,
    install_job: Option<&Job>,
) -> Result<bool, Error> {
    let previous = cd.status_or_default();
    if previous.is_fully_installed() {
        debug!(cluster_uuid = %previous.cluster_uuid, "cluster fully installed, status is final");
        return Ok(false);
    }
    let mut status = previous.clone();

    status.installed = installed_after(&previous, install_job);

    if status.installed && status.cluster_uuid.is_empty() {
        let namespace = cd.namespace().unwrap_or_default();
        status.cluster_uuid = read_cluster_uuid(kube, &namespace, &cd.name_any()).await?;
    }

    if status == previous {
        debug!("status unchanged");
        return Ok(false);
    }

    info!(
        installed = status.installed,
        cluster_uuid = %status.cluster_uuid,
        "status changed, updating cluster deployment"
    );
    cd.status = Some(status);
    kube.patch_status(cd).await?;
    Ok(true)
}

/// Installed flag after observing `install_job`; once true it stays true
pub fn installed_after(previous: &ClusterDeploymentStatus, install_job: Option<&Job>) -> bool {
    match install_job {
        Some(job) => previous.installed || is_successful(job),
        None => previous.installed,
    }
}
