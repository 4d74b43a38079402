//! Deprovisioning of deleted ClusterDeployments
//!
//! A deleted ClusterDeployment is held by its deprovision finalizer until an
//! uninstall Job has completed. The Job is owned by the ClusterDeployment, so
//! its status changes re-trigger reconciliation and no requeue is scheduled.

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{error, info};

use crate::config::ControllerConfig;
use crate::crd::{ClusterDeployment, FINALIZER_DEPROVISION};
use crate::install::{generate_uninstaller_job, is_failed, is_successful};
use crate::Error;

use super::finalizer::remove_finalizer;
use super::KubeClient;

/// Drive the uninstall Job of a deleted ClusterDeployment
///
/// Creates the Job when missing and removes the deprovision finalizer once
/// the Job reports `Complete`. Every outcome is `await_change`.
pub async fn handle_deletion(
    kube: &dyn KubeClient,
    config: &ControllerConfig,
    cd: &mut ClusterDeployment,
) -> Result<Action, Error> {
    let uninstall_job = generate_uninstaller_job(cd, config).inspect_err(|e| {
        error!(error = %e, "error generating uninstaller job");
    })?;
    let namespace = cd.namespace().unwrap_or_default();
    let job_name = uninstall_job.name_any();

    match kube.get_job(&namespace, &job_name).await? {
        None => {
            kube.create_job(&uninstall_job).await?;
            info!(job = %job_name, "created uninstall job");
        }
        Some(job) if is_successful(&job) => {
            info!(job = %job_name, "uninstall job complete, removing finalizer");
            remove_finalizer(cd, FINALIZER_DEPROVISION);
            kube.patch_finalizers(cd).await?;
        }
        Some(job) => {
            info!(
                job = %job_name,
                failed = is_failed(&job),
                "uninstall job not yet complete"
            );
        }
    }

    Ok(Action::await_change())
}
