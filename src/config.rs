//! Process-wide controller configuration
//!
//! Names of the shared installer identity and the images used by install and
//! uninstall Jobs are fixed for the whole process. They are carried in
//! [`ControllerConfig`] and handed to the controller through its `Context`.

use std::time::Duration;

/// Default installer image
pub const DEFAULT_INSTALLER_IMAGE: &str =
    "registry.svc.ci.openshift.org/openshift/origin-v4.0:installer";

/// Default uninstaller image
pub const DEFAULT_UNINSTALLER_IMAGE: &str =
    "registry.svc.ci.openshift.org/openshift/origin-v4.0:installer";

/// Default image carrying `hiveutil`
pub const DEFAULT_HIVE_IMAGE: &str = "hive-controller:latest";

/// Name shared by the installer ServiceAccount, Role and RoleBinding
pub const DEFAULT_INSTALLER_ACCESS_NAME: &str = "cluster-installer";

/// Delay before a failed reconcile is retried
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Container image pull policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PullPolicy {
    /// Always pull
    Always,
    /// Pull only when the image is not present on the node
    #[default]
    IfNotPresent,
    /// Never pull
    Never,
}

impl PullPolicy {
    /// Kubernetes string form of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

impl std::fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PullPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "ifnotpresent" => Ok(Self::IfNotPresent),
            "never" => Ok(Self::Never),
            _ => Err(crate::Error::validation(format!(
                "invalid pull policy: {s}, expected one of: Always, IfNotPresent, Never"
            ))),
        }
    }
}

/// Fixed configuration shared by every reconcile cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// ServiceAccount the install Job runs as
    pub service_account_name: String,
    /// Role granted to the installer ServiceAccount
    pub role_name: String,
    /// RoleBinding tying the Role to the ServiceAccount
    pub role_binding_name: String,
    /// Image providing `openshift-install`
    pub installer_image: String,
    /// Pull policy for the installer image
    pub installer_pull_policy: PullPolicy,
    /// Image running deprovision
    pub uninstaller_image: String,
    /// Pull policy for the uninstaller image
    pub uninstaller_pull_policy: PullPolicy,
    /// Image providing `hiveutil`, which drives the install and uploads its results
    pub hive_image: String,
    /// Pull policy for the hive image
    pub hive_pull_policy: PullPolicy,
    /// Requeue delay after a failed reconcile
    pub error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            service_account_name: DEFAULT_INSTALLER_ACCESS_NAME.to_string(),
            role_name: DEFAULT_INSTALLER_ACCESS_NAME.to_string(),
            role_binding_name: DEFAULT_INSTALLER_ACCESS_NAME.to_string(),
            installer_image: DEFAULT_INSTALLER_IMAGE.to_string(),
            installer_pull_policy: PullPolicy::Always,
            uninstaller_image: DEFAULT_UNINSTALLER_IMAGE.to_string(),
            uninstaller_pull_policy: PullPolicy::Always,
            hive_image: DEFAULT_HIVE_IMAGE.to_string(),
            hive_pull_policy: PullPolicy::IfNotPresent,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }
}
