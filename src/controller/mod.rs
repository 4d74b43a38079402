//! ClusterDeployment controller
//!
//! Reconciles ClusterDeployments into install and uninstall Jobs, keeps their
//! status in step with those Jobs, and enforces the delete-after expiry.

mod access;
mod client;
mod cluster_deployment;
mod deletion;
mod expiry;
mod finalizer;
mod job;
mod status;

pub use access::{
    ensure_install_access, installer_role, installer_role_binding, installer_service_account,
};
pub use client::{KubeClient, KubeClientImpl};
pub use cluster_deployment::{
    error_policy, reconcile, reconcile_cluster_deployment, Context, ContextBuilder,
};
pub use deletion::handle_deletion;
pub use expiry::{evaluate, parse_delete_after, Expiry, EXPIRY_REQUEUE_MARGIN};
pub use finalizer::{add_finalizer, has_finalizer, remove_finalizer};
pub use job::sync_install_job;
pub use status::{
    installed_after, read_cluster_uuid, sync_status, AwsClusterMetadata, AwsIdentifier,
    ClusterMetadata,
};
