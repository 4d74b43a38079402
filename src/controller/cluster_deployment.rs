//! ClusterDeployment controller implementation
//!
//! Each cycle re-reads the ClusterDeployment and runs the following steps,
//! any of which may end the cycle:
//!
//! 1. make sure the installer ServiceAccount, Role and RoleBinding exist
//! 2. a deleted ClusterDeployment is handed to the deprovision path
//! 3. an expired ClusterDeployment is deleted
//! 4. the deprovision finalizer is added, alone, before any install work
//! 5. the install Job is created or observed
//! 6. status is updated from the install Job and cluster metadata
//!
//! At most one write to the ClusterDeployment itself happens per cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ControllerConfig;
use crate::crd::{ClusterDeployment, FINALIZER_DEPROVISION};
use crate::Error;

use super::access::ensure_install_access;
use super::deletion::handle_deletion;
use super::expiry::{evaluate, Expiry};
use super::finalizer::{add_finalizer, has_finalizer};
use super::job::sync_install_job;
use super::status::sync_status;
use super::{KubeClient, KubeClientImpl};

/// Controller context containing shared state and clients
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(ControllerConfig::default())
///     .build();
/// ```
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Names and images fixed for the whole process
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context around an existing [`KubeClient`]
    ///
    /// Used where no real Kubernetes client is available, such as tests
    /// driving the controller against an in-memory store.
    pub fn with_kube_client(kube: Arc<dyn KubeClient>, config: ControllerConfig) -> Self {
        Self { kube, config }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    config: ControllerConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            config: ControllerConfig::default(),
        }
    }

    /// Set the controller configuration
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: Arc::new(KubeClientImpl::new(self.client)),
            config: self.config,
        }
    }
}

/// Reconcile a ClusterDeployment resource
///
/// The object handed in by the controller runtime is only used for its
/// identity; the cycle works on a freshly read copy.
#[instrument(
    skip(cd, ctx),
    fields(
        cluster_deployment = %cd.name_any(),
        namespace = %cd.namespace().unwrap_or_default(),
    )
)]
pub async fn reconcile(cd: Arc<ClusterDeployment>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = cd.namespace().ok_or_else(|| {
        Error::validation(format!("ClusterDeployment {} has no namespace", cd.name_any()))
    })?;
    reconcile_cluster_deployment(&namespace, &cd.name_any(), &ctx, Utc::now()).await
}

/// Run one reconcile cycle for the ClusterDeployment `namespace/name` at time `now`
///
/// Returns `await_change` when done, `requeue(D)` when a delete-after
/// expiry is pending, and an error when the cycle was aborted.
pub async fn reconcile_cluster_deployment(
    namespace: &str,
    name: &str,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let kube = ctx.kube.as_ref();

    let Some(mut cd) = kube.get_cluster_deployment(namespace, name).await? else {
        debug!("cluster deployment not found, already deleted");
        return Ok(Action::await_change());
    };
    debug!("reconciling cluster deployment");

    ensure_install_access(kube, &ctx.config, namespace).await?;

    if cd.metadata.deletion_timestamp.is_some() {
        if !has_finalizer(&cd, FINALIZER_DEPROVISION) {
            debug!("deleted without deprovision finalizer, nothing to clean up");
            return Ok(Action::await_change());
        }
        return handle_deletion(kube, &ctx.config, &mut cd).await;
    }

    let mut requeue_after = None;
    match evaluate(&cd, now)? {
        Expiry::Expired => {
            info!("cluster deployment has expired, deleting");
            if let Err(e) = kube.delete_cluster_deployment(namespace, name).await {
                debug!(error = %e, "delete of expired cluster deployment failed");
            }
            return Ok(Action::await_change());
        }
        Expiry::ScheduleAfter(delay) => {
            debug!(requeue_after = ?delay, "cluster deployment expiry pending");
            requeue_after = Some(delay);
        }
        Expiry::None => {}
    }

    if !has_finalizer(&cd, FINALIZER_DEPROVISION) {
        add_finalizer(&mut cd, FINALIZER_DEPROVISION);
        kube.patch_finalizers(&cd).await?;
        info!("added deprovision finalizer");
        return Ok(Action::await_change());
    }

    let install_job = sync_install_job(kube, &ctx.config, &cd).await?;
    sync_status(kube, &mut cd, install_job.as_ref()).await?;

    Ok(requeue_after.map_or_else(Action::await_change, Action::requeue))
}

/// Error policy for the controller
///
/// Every error is retried after the configured delay from a fresh read.
pub fn error_policy(cd: Arc<ClusterDeployment>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        warn!(
            cluster_deployment = %cd.name_any(),
            namespace = %cd.namespace().unwrap_or_default(),
            "cluster deployment changed during reconcile, retrying"
        );
    } else {
        error!(
            ?error,
            cluster_deployment = %cd.name_any(),
            namespace = %cd.namespace().unwrap_or_default(),
            "reconciliation failed"
        );
    }

    Action::requeue(ctx.config.error_requeue)
}
