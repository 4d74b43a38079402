//! In-memory API server standing in for Kubernetes
//!
//! Behaves like the parts of the API server the controller relies on:
//! resourceVersion preconditions on ClusterDeployment writes, AlreadyExists
//! on duplicate creates, finalizers blocking deletion, and garbage
//! collection of Jobs owned by a reclaimed ClusterDeployment. Every
//! mutating call is recorded so tests can assert how many writes a cycle
//! made.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ErrorResponse;
use kube::ResourceExt;

use hive::controller::KubeClient;
use hive::crd::ClusterDeployment;
use hive::install::{metadata_config_map_name, METADATA_KEY};
use hive::Error;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn already_exists(kind: &str, name: &str) -> Error {
    api_error(409, "AlreadyExists", format!("{kind} \"{name}\" already exists"))
}

#[derive(Default)]
struct State {
    cluster_deployments: BTreeMap<Key, ClusterDeployment>,
    service_accounts: BTreeMap<Key, ServiceAccount>,
    roles: BTreeMap<Key, Role>,
    role_bindings: BTreeMap<Key, RoleBinding>,
    jobs: BTreeMap<Key, Job>,
    config_maps: BTreeMap<Key, ConfigMap>,
    resource_version: u64,
    mutations: Vec<String>,
    fail_next_cluster_deployment_write: bool,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn check_version(&mut self, cd: &ClusterDeployment) -> Result<Key, Error> {
        let k = key(&cd.namespace().unwrap_or_default(), &cd.name_any());
        if std::mem::take(&mut self.fail_next_cluster_deployment_write) {
            self.next_version();
            return Err(conflict(&k.1));
        }
        let stored = self
            .cluster_deployments
            .get(&k)
            .ok_or_else(|| api_error(404, "NotFound", format!("{} not found", k.1)))?;
        if stored.resource_version() != cd.resource_version() {
            return Err(conflict(&k.1));
        }
        Ok(k)
    }

    /// Drop a ClusterDeployment with no finalizers left and its owned Jobs
    fn reclaim_if_released(&mut self, k: &Key) {
        let Some(cd) = self.cluster_deployments.get(k) else {
            return;
        };
        if cd.metadata.deletion_timestamp.is_none() || !cd.finalizers().is_empty() {
            return;
        }
        let uid = cd.uid();
        self.cluster_deployments.remove(k);
        self.jobs.retain(|_, job| {
            !job.owner_references()
                .iter()
                .any(|owner| Some(&owner.uid) == uid.as_ref())
        });
    }
}

fn conflict(name: &str) -> Error {
    api_error(
        409,
        "Conflict",
        format!("Operation cannot be fulfilled on clusterdeployments \"{name}\": the object has been modified"),
    )
}

fn condition(type_: &str) -> JobCondition {
    JobCondition {
        type_: type_.to_string(),
        status: "True".to_string(),
        ..Default::default()
    }
}

/// In-memory [`KubeClient`]
#[derive(Default)]
pub struct FakeKube {
    state: Mutex<State>,
}

impl FakeKube {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new ClusterDeployment, as `kubectl apply` would
    pub fn create_cluster_deployment(&self, mut cd: ClusterDeployment, created: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        let uid = format!("uid-{}", cd.name_any());
        cd.metadata.uid = Some(uid);
        cd.metadata.creation_timestamp = Some(Time(created));
        cd.metadata.resource_version = Some(state.next_version());
        let k = key(&cd.namespace().unwrap_or_default(), &cd.name_any());
        state.cluster_deployments.insert(k, cd);
    }

    /// Current stored copy of a ClusterDeployment
    pub fn cluster_deployment(&self, namespace: &str, name: &str) -> Option<ClusterDeployment> {
        self.state
            .lock()
            .unwrap()
            .cluster_deployments
            .get(&key(namespace, name))
            .cloned()
    }

    /// Current stored copy of a Job
    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(&key(namespace, name)).cloned()
    }

    /// Names of all Jobs in `namespace`
    pub fn job_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Report a Job as finished with the given conditions set to True
    pub fn finish_job(&self, namespace: &str, name: &str, conditions: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let job = state
            .jobs
            .get_mut(&key(namespace, name))
            .unwrap_or_else(|| panic!("job {namespace}/{name} does not exist"));
        job.metadata.resource_version = Some(version);
        job.status = Some(JobStatus {
            conditions: Some(conditions.iter().map(|c| condition(c)).collect()),
            ..Default::default()
        });
    }

    /// Remove a Job, as TTL cleanup or an administrator would
    pub fn remove_job(&self, namespace: &str, name: &str) {
        self.state.lock().unwrap().jobs.remove(&key(namespace, name));
    }

    /// Upload install metadata for a ClusterDeployment, as the install pod does
    pub fn upload_metadata(&self, namespace: &str, cd_name: &str, cluster_uuid: &str) {
        let raw = format!(
            r#"{{"clusterName":"{cd_name}","aws":{{"region":"us-east-1","identifier":{{"tectonicClusterID":"{cluster_uuid}"}}}}}}"#
        );
        self.put_config_map(namespace, &metadata_config_map_name(cd_name), &raw);
    }

    /// Store a metadata ConfigMap with arbitrary contents
    pub fn put_config_map(&self, namespace: &str, name: &str, metadata_json: &str) {
        let mut cm = ConfigMap::default();
        cm.metadata.name = Some(name.to_string());
        cm.metadata.namespace = Some(namespace.to_string());
        cm.data = Some(BTreeMap::from([(
            METADATA_KEY.to_string(),
            metadata_json.to_string(),
        )]));
        self.state
            .lock()
            .unwrap()
            .config_maps
            .insert(key(namespace, name), cm);
    }

    /// Reject the next ClusterDeployment write with 409 Conflict
    pub fn conflict_on_next_write(&self) {
        self.state.lock().unwrap().fail_next_cluster_deployment_write = true;
    }

    /// Every mutating call made so far
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    /// Number of mutating calls made so far
    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().mutations.len()
    }

    /// Number of recorded mutations starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .mutations
            .iter()
            .filter(|m| m.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl KubeClient for FakeKube {
    async fn get_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDeployment>, Error> {
        Ok(self.cluster_deployment(namespace, name))
    }

    async fn patch_finalizers(&self, cd: &ClusterDeployment) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let k = state.check_version(cd)?;
        let version = state.next_version();
        state.mutations.push(format!("patch_finalizers {}", k.1));
        if let Some(stored) = state.cluster_deployments.get_mut(&k) {
            stored.metadata.finalizers = Some(cd.finalizers().to_vec());
            stored.metadata.resource_version = Some(version);
        }
        state.reclaim_if_released(&k);
        Ok(())
    }

    async fn patch_status(&self, cd: &ClusterDeployment) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let k = state.check_version(cd)?;
        let version = state.next_version();
        state.mutations.push(format!("patch_status {}", k.1));
        if let Some(stored) = state.cluster_deployments.get_mut(&k) {
            stored.status = cd.status.clone();
            stored.metadata.resource_version = Some(version);
        }
        Ok(())
    }

    async fn delete_cluster_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, name);
        let version = state.next_version();
        state.mutations.push(format!("delete_cluster_deployment {name}"));
        let stored = state
            .cluster_deployments
            .get_mut(&k)
            .ok_or_else(|| api_error(404, "NotFound", format!("{name} not found")))?;
        if stored.metadata.deletion_timestamp.is_none() {
            stored.metadata.deletion_timestamp = Some(Time(Utc::now()));
            stored.metadata.resource_version = Some(version);
        }
        state.reclaim_if_released(&k);
        Ok(())
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceAccount>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .service_accounts
            .get(&key(namespace, name))
            .cloned())
    }

    async fn create_service_account(&self, sa: &ServiceAccount) -> Result<ServiceAccount, Error> {
        let mut state = self.state.lock().unwrap();
        let k = key(&sa.namespace().unwrap_or_default(), &sa.name_any());
        if state.service_accounts.contains_key(&k) {
            return Err(already_exists("serviceaccounts", &k.1));
        }
        state.mutations.push(format!("create_service_account {}", k.1));
        state.service_accounts.insert(k, sa.clone());
        Ok(sa.clone())
    }

    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>, Error> {
        Ok(self.state.lock().unwrap().roles.get(&key(namespace, name)).cloned())
    }

    async fn create_role(&self, role: &Role) -> Result<Role, Error> {
        let mut state = self.state.lock().unwrap();
        let k = key(&role.namespace().unwrap_or_default(), &role.name_any());
        if state.roles.contains_key(&k) {
            return Err(already_exists("roles", &k.1));
        }
        state.mutations.push(format!("create_role {}", k.1));
        state.roles.insert(k, role.clone());
        Ok(role.clone())
    }

    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RoleBinding>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .role_bindings
            .get(&key(namespace, name))
            .cloned())
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, Error> {
        let mut state = self.state.lock().unwrap();
        let k = key(&binding.namespace().unwrap_or_default(), &binding.name_any());
        if state.role_bindings.contains_key(&k) {
            return Err(already_exists("rolebindings", &k.1));
        }
        state.mutations.push(format!("create_role_binding {}", k.1));
        state.role_bindings.insert(k, binding.clone());
        Ok(binding.clone())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, Error> {
        Ok(self.job(namespace, name))
    }

    async fn create_job(&self, job: &Job) -> Result<Job, Error> {
        let mut state = self.state.lock().unwrap();
        let k = key(&job.namespace().unwrap_or_default(), &job.name_any());
        if state.jobs.contains_key(&k) {
            return Err(already_exists("jobs", &k.1));
        }
        let mut created = job.clone();
        created.metadata.resource_version = Some(state.next_version());
        created.metadata.uid = Some(format!("uid-{}", k.1));
        state.mutations.push(format!("create_job {}", k.1));
        state.jobs.insert(k, created.clone());
        Ok(created)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .config_maps
            .get(&key(namespace, name))
            .cloned())
    }
}
