//! Custom Resource Definitions for the operator

mod cluster_deployment;
mod types;

pub use cluster_deployment::{
    ClusterDeployment, ClusterDeploymentSpec, ClusterDeploymentStatus, DELETE_AFTER_ANNOTATION,
    FINALIZER_DEPROVISION, HIVE_API_GROUP,
};
pub use types::{
    AwsPlatform, AwsPlatformSecrets, MachinePool, NetworkingSpec, PlatformSecrets, PlatformSpec,
    SecretRef,
};
