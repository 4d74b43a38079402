//! Hive - Kubernetes operator that installs and deprovisions clusters
//!
//! Each `ClusterDeployment` custom resource describes a cluster. The operator
//! runs an install Job for it, records the install outcome in its status,
//! deletes it once its `delete-after` lifetime is over, and holds its
//! deletion until an uninstall Job has deprovisioned the cloud resources.
//!
//! # Modules
//!
//! - [`crd`] - ClusterDeployment Custom Resource Definition
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`install`] - Install and uninstall Job construction
//! - [`config`] - Process-wide controller configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod install;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
