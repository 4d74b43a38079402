//! Supporting types for the ClusterDeployment CRD

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a Secret in the ClusterDeployment's namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretRef {
    /// Name of the Secret
    pub name: String,
}

impl SecretRef {
    /// Create a reference to the named Secret
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Cloud platform the cluster is installed on
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PlatformSpec {
    /// Amazon Web Services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsPlatform>,
}

/// AWS platform configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsPlatform {
    /// Region the cluster is created in
    pub region: String,

    /// Extra tags applied to every resource the installer creates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_tags: BTreeMap<String, String>,

    /// Instance type used when a machine pool does not set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_instance_type: Option<String>,
}

/// Credentials for the cloud platform
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PlatformSecrets {
    /// AWS credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsPlatformSecrets>,
}

/// AWS credentials Secret
///
/// The Secret must carry `aws_access_key_id` and `aws_secret_access_key`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AwsPlatformSecrets {
    /// Secret holding the access key pair
    pub credentials: SecretRef,
}

/// A pool of machines with the same configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachinePool {
    /// Pool name (e.g. "master", "worker")
    pub name: String,

    /// Number of machines; the installer default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i64>,

    /// Instance type override for this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
}

/// Cluster network configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct NetworkingSpec {
    /// Network plugin type
    #[serde(rename = "type", default = "default_network_type")]
    pub type_: String,

    /// CIDR for machine IPs
    #[serde(rename = "machineCIDR", default, skip_serializing_if = "Option::is_none")]
    pub machine_cidr: Option<String>,

    /// CIDR for service IPs
    #[serde(rename = "serviceCIDR", default, skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,

    /// CIDR for pod IPs
    #[serde(rename = "clusterNetworkCIDR", default, skip_serializing_if = "Option::is_none")]
    pub cluster_network_cidr: Option<String>,
}

fn default_network_type() -> String {
    "OpenshiftSDN".to_string()
}

impl Default for NetworkingSpec {
    fn default() -> Self {
        Self {
            type_: default_network_type(),
            machine_cidr: None,
            service_cidr: None,
            cluster_network_cidr: None,
        }
    }
}
