//! Kubernetes client abstraction for the ClusterDeployment controller
//!
//! Every read and write the controller performs goes through [`KubeClient`],
//! so reconciliation can be exercised against mocks or an in-memory store.
//! Lookups return `Ok(None)` on 404; every other API error is surfaced.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::ClusterDeployment;
use crate::Error;

/// Trait abstracting Kubernetes API operations used by the controller
///
/// Writes to a ClusterDeployment carry its `metadata.resourceVersion`; the
/// API server rejects them with 409 Conflict when the object changed since
/// it was read.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a ClusterDeployment, `None` if it does not exist
    async fn get_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDeployment>, Error>;

    /// Persist the finalizers of a ClusterDeployment
    async fn patch_finalizers(&self, cd: &ClusterDeployment) -> Result<(), Error>;

    /// Persist the status of a ClusterDeployment
    async fn patch_status(&self, cd: &ClusterDeployment) -> Result<(), Error>;

    /// Request deletion of a ClusterDeployment
    async fn delete_cluster_deployment(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Get a ServiceAccount, `None` if it does not exist
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceAccount>, Error>;

    /// Create a ServiceAccount
    async fn create_service_account(&self, sa: &ServiceAccount) -> Result<ServiceAccount, Error>;

    /// Get a Role, `None` if it does not exist
    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>, Error>;

    /// Create a Role
    async fn create_role(&self, role: &Role) -> Result<Role, Error>;

    /// Get a RoleBinding, `None` if it does not exist
    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RoleBinding>, Error>;

    /// Create a RoleBinding
    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error>;

    /// Get a Job, `None` if it does not exist
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, Error>;

    /// Create a Job
    async fn create_job(&self, job: &Job) -> Result<Job, Error>;

    /// Get a ConfigMap, `None` if it does not exist
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn cluster_deployments(&self, cd: &ClusterDeployment) -> Result<Api<ClusterDeployment>, Error> {
        let namespace = cd.namespace().ok_or_else(|| {
            Error::validation(format!("ClusterDeployment {} has no namespace", cd.name_any()))
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }

    fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, Error> {
        obj.namespace()
            .ok_or_else(|| Error::validation(format!("{} has no namespace", obj.name_any())))
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDeployment>, Error> {
        let api: Api<ClusterDeployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_finalizers(&self, cd: &ClusterDeployment) -> Result<(), Error> {
        let api = self.cluster_deployments(cd)?;

        // resourceVersion in a merge patch acts as a precondition
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": cd.resource_version(),
                "finalizers": cd.finalizers(),
            }
        });

        api.patch(&cd.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_status(&self, cd: &ClusterDeployment) -> Result<(), Error> {
        let api = self.cluster_deployments(cd)?;

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": cd.resource_version(),
            },
            "status": cd.status,
        });

        api.patch_status(&cd.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete_cluster_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<ClusterDeployment> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceAccount>, Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_service_account(&self, sa: &ServiceAccount) -> Result<ServiceAccount, Error> {
        let api: Api<ServiceAccount> =
            Api::namespaced(self.client.clone(), &Self::namespace_of(sa)?);
        Ok(api.create(&PostParams::default(), sa).await?)
    }

    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>, Error> {
        let api: Api<Role> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_role(&self, role: &Role) -> Result<Role, Error> {
        let api: Api<Role> = Api::namespaced(self.client.clone(), &Self::namespace_of(role)?);
        Ok(api.create(&PostParams::default(), role).await?)
    }

    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RoleBinding>, Error> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error> {
        let api: Api<RoleBinding> =
            Api::namespaced(self.client.clone(), &Self::namespace_of(binding)?);
        Ok(api.create(&PostParams::default(), binding).await?)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_job(&self, job: &Job) -> Result<Job, Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &Self::namespace_of(job)?);
        Ok(api.create(&PostParams::default(), job).await?)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
