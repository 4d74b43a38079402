//! ClusterDeployment Custom Resource Definition
//!
//! A ClusterDeployment describes a cluster that the operator installs by
//! running an installer Job, and later deprovisions with an uninstaller Job
//! once the resource is deleted.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{MachinePool, NetworkingSpec, PlatformSecrets, PlatformSpec, SecretRef};

/// API group of the ClusterDeployment CRD
pub const HIVE_API_GROUP: &str = "hive.openshift.io";

/// Finalizer that holds a ClusterDeployment until its cloud resources are deprovisioned
pub const FINALIZER_DEPROVISION: &str = "hive.openshift.io/deprovision";

/// Annotation holding a duration after which the cluster is deleted
pub const DELETE_AFTER_ANNOTATION: &str = "hive.openshift.io/delete-after";

/// Specification for a ClusterDeployment
///
/// The controller never interprets the spec itself; it is handed to the
/// installer and uninstaller Jobs.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hive.openshift.io",
    version = "v1alpha1",
    kind = "ClusterDeployment",
    plural = "clusterdeployments",
    shortname = "cd",
    status = "ClusterDeploymentStatus",
    namespaced,
    printcolumn = r#"{"name":"Installed","type":"boolean","jsonPath":".status.installed"}"#,
    printcolumn = r#"{"name":"ClusterUUID","type":"string","jsonPath":".status.clusterUUID"}"#,
    printcolumn = r#"{"name":"BaseDomain","type":"string","jsonPath":".spec.baseDomain"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeploymentSpec {
    /// Base DNS domain of the cluster
    pub base_domain: String,

    /// Cluster network configuration
    #[serde(default)]
    pub networking: NetworkingSpec,

    /// Control plane machine pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<MachinePool>,

    /// Compute machine pools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compute: Vec<MachinePool>,

    /// Cloud platform configuration
    pub platform: PlatformSpec,

    /// Credentials for the cloud platform
    #[serde(default)]
    pub platform_secrets: PlatformSecrets,

    /// Secret with the image pull secret (`.dockerconfigjson`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<SecretRef>,

    /// Secret with the SSH public key installed on every machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<SecretRef>,
}

/// Observed status of a ClusterDeployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeploymentStatus {
    /// True once the install Job has completed; never reverts
    #[serde(default)]
    pub installed: bool,

    /// Stable cluster identifier read from the install metadata; immutable once set
    #[serde(
        rename = "clusterUUID",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_uuid: String,
}

impl ClusterDeploymentStatus {
    /// Returns true if the install has completed and the identifier is known
    pub fn is_fully_installed(&self) -> bool {
        self.installed && !self.cluster_uuid.is_empty()
    }
}

impl ClusterDeployment {
    /// Status of the resource, or the default (not installed) status
    pub fn status_or_default(&self) -> ClusterDeploymentStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Returns true if the install has been observed as complete
    pub fn is_installed(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.installed)
    }

    /// Value of the delete-after annotation, if present
    pub fn delete_after(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(DELETE_AFTER_ANNOTATION))
            .map(String::as_str)
    }
}
