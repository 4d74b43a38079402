//! Installer access provisioning
//!
//! Install Jobs run as a namespace-scoped ServiceAccount allowed to upload
//! install artifacts (metadata ConfigMap, admin kubeconfig Secret) and to
//! update ClusterDeployments. The ServiceAccount, Role and RoleBinding are
//! shared by every ClusterDeployment in the namespace and are never owned by
//! any of them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::crd::HIVE_API_GROUP;
use crate::Error;

use super::KubeClient;

/// Verbs granted on every resource in the installer Role
const INSTALLER_VERBS: [&str; 5] = ["create", "delete", "get", "list", "update"];

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            "app.kubernetes.io/managed-by".to_string(),
            "hive-operator".to_string(),
        )])),
        ..Default::default()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// ServiceAccount the install Job runs as
pub fn installer_service_account(config: &ControllerConfig, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(&config.service_account_name, namespace),
        ..Default::default()
    }
}

/// Role granting the installer access to install artifacts and ClusterDeployments
pub fn installer_role(config: &ControllerConfig, namespace: &str) -> Role {
    Role {
        metadata: meta(&config.role_name, namespace),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(strings(&[""])),
                resources: Some(strings(&["secrets", "configmaps"])),
                verbs: strings(&INSTALLER_VERBS),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(strings(&[HIVE_API_GROUP])),
                resources: Some(strings(&[
                    "clusterdeployments",
                    "clusterdeployments/finalizers",
                ])),
                verbs: strings(&INSTALLER_VERBS),
                ..Default::default()
            },
        ]),
    }
}

/// RoleBinding granting the installer Role to the given ServiceAccount
pub fn installer_role_binding(
    config: &ControllerConfig,
    namespace: &str,
    service_account: &str,
) -> RoleBinding {
    RoleBinding {
        metadata: meta(&config.role_binding_name, namespace),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: config.role_name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Ensure the installer ServiceAccount, Role and RoleBinding exist in `namespace`
///
/// Each object is looked up by its fixed name and created only when absent.
/// Existing objects are left untouched. A create that loses a race with
/// another writer fails with AlreadyExists and aborts the cycle; the next
/// cycle finds the object and moves on.
pub async fn ensure_install_access(
    kube: &dyn KubeClient,
    config: &ControllerConfig,
    namespace: &str,
) -> Result<ServiceAccount, Error> {
    let sa_name = &config.service_account_name;
    let service_account = match kube.get_service_account(namespace, sa_name).await? {
        Some(sa) => {
            debug!(name = %sa_name, "service account already exists");
            sa
        }
        None => {
            let sa = kube
                .create_service_account(&installer_service_account(config, namespace))
                .await?;
            info!(name = %sa_name, "created service account");
            sa
        }
    };

    if kube.get_role(namespace, &config.role_name).await?.is_some() {
        debug!(name = %config.role_name, "role already exists");
    } else {
        kube.create_role(&installer_role(config, namespace)).await?;
        info!(name = %config.role_name, "created role");
    }

    if kube
        .get_role_binding(namespace, &config.role_binding_name)
        .await?
        .is_some()
    {
        debug!(name = %config.role_binding_name, "role binding already exists");
    } else {
        let binding = installer_role_binding(config, namespace, &service_account.name_any());
        kube.create_role_binding(&binding).await?;
        info!(name = %config.role_binding_name, "created role binding");
    }

    Ok(service_account)
}
