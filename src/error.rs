//! Error types for the ClusterDeployment operator

use thiserror::Error;

/// Main error type for operator operations
///
/// Every variant is fatal for the current reconcile cycle. The controller
/// runtime re-invokes reconciliation through `error_policy`; nothing in the
/// core retries internally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (transient failures, conflicts, already-exists)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid or incomplete ClusterDeployment
    #[error("validation error: {0}")]
    Validation(String),

    /// An annotation value could not be interpreted
    #[error("invalid annotation {annotation}={value:?}: {message}")]
    InvalidAnnotation {
        /// Annotation key
        annotation: String,
        /// Raw annotation value
        value: String,
        /// What was wrong with it
        message: String,
    },

    /// The cluster metadata ConfigMap is missing or malformed
    #[error("cluster metadata error in configmap {configmap}: {message}")]
    Metadata {
        /// Name of the metadata ConfigMap
        configmap: String,
        /// What was wrong with it
        message: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid annotation error
    pub fn invalid_annotation(
        annotation: impl Into<String>,
        value: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::InvalidAnnotation {
            annotation: annotation.into(),
            value: value.into(),
            message: msg.into(),
        }
    }

    /// Create a metadata error for the given ConfigMap
    pub fn metadata(configmap: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Metadata {
            configmap: configmap.into(),
            message: msg.into(),
        }
    }

    /// Returns true if the API server rejected a write against a stale resourceVersion
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409 && ae.reason == "Conflict")
    }

    /// Returns true if the API server reported the object already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409 && ae.reason == "AlreadyExists")
    }
}
