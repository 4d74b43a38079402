//! Install Job synchronization

use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::crd::ClusterDeployment;
use crate::install::{generate_installer_job, install_job_name, is_failed, is_successful};
use crate::Error;

use super::KubeClient;

/// Ensure the install Job for `cd` exists and return what was observed
///
/// - an existing Job is returned unchanged
/// - no Job and the cluster already installed returns `None`
/// - no Job otherwise creates one owned by `cd` and returns it
///
/// The Job name is derived from the ClusterDeployment name, so the API
/// server's name uniqueness keeps it to one Job per cluster.
pub async fn sync_install_job(
    kube: &dyn KubeClient,
    config: &ControllerConfig,
    cd: &ClusterDeployment,
) -> Result<Option<Job>, Error> {
    let namespace = cd.namespace().unwrap_or_default();
    let job_name = install_job_name(&cd.name_any());

    if let Some(job) = kube.get_job(&namespace, &job_name).await? {
        debug!(
            job = %job_name,
            successful = is_successful(&job),
            failed = is_failed(&job),
            "install job exists"
        );
        return Ok(Some(job));
    }

    if cd.is_installed() {
        debug!(job = %job_name, "cluster is installed, not recreating install job");
        return Ok(None);
    }

    let job = generate_installer_job(cd, config)?;
    let created = kube.create_job(&job).await?;
    info!(job = %job_name, "created install job");
    Ok(Some(created))
}
