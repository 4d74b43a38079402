//! Hive Operator - installs, expires and deprovisions ClusterDeployments

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use hive::config::{
    ControllerConfig, PullPolicy, DEFAULT_HIVE_IMAGE, DEFAULT_INSTALLER_ACCESS_NAME,
    DEFAULT_INSTALLER_IMAGE, DEFAULT_UNINSTALLER_IMAGE,
};
use hive::controller::{error_policy, reconcile, Context};
use hive::crd::ClusterDeployment;
use hive::install::JOB_TYPE_LABEL;
use hive::telemetry::init_tracing;

/// Server-side watch timeout, kept below the API server's 295s limit
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Field manager used when applying the CRD
const FIELD_MANAGER: &str = "hive-operator";

/// Hive - installs and deprovisions clusters described by ClusterDeployments
#[derive(Parser, Debug)]
#[command(name = "hive-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "HIVE_LOG_JSON")]
    log_json: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches ClusterDeployments and the Jobs they own, and reconciles
    /// them until a shutdown signal is received.
    Controller,
}

/// Controller configuration flags
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Image providing openshift-install
    #[arg(long, env = "HIVE_INSTALLER_IMAGE", default_value = DEFAULT_INSTALLER_IMAGE)]
    installer_image: String,

    /// Pull policy for the installer image
    #[arg(long, env = "HIVE_INSTALLER_PULL_POLICY", default_value = "Always")]
    installer_pull_policy: PullPolicy,

    /// Image running deprovision
    #[arg(long, env = "HIVE_UNINSTALLER_IMAGE", default_value = DEFAULT_UNINSTALLER_IMAGE)]
    uninstaller_image: String,

    /// Pull policy for the uninstaller image
    #[arg(long, env = "HIVE_UNINSTALLER_PULL_POLICY", default_value = "Always")]
    uninstaller_pull_policy: PullPolicy,

    /// Image providing hiveutil
    #[arg(long, env = "HIVE_IMAGE", default_value = DEFAULT_HIVE_IMAGE)]
    hive_image: String,

    /// Pull policy for the hive image
    #[arg(long, env = "HIVE_IMAGE_PULL_POLICY", default_value = "IfNotPresent")]
    hive_pull_policy: PullPolicy,

    /// ServiceAccount install Jobs run as
    #[arg(
        long,
        env = "HIVE_INSTALLER_SERVICE_ACCOUNT",
        default_value = DEFAULT_INSTALLER_ACCESS_NAME
    )]
    installer_service_account: String,

    /// Role granted to the installer ServiceAccount
    #[arg(long, env = "HIVE_INSTALLER_ROLE", default_value = DEFAULT_INSTALLER_ACCESS_NAME)]
    installer_role: String,

    /// RoleBinding tying the installer Role to its ServiceAccount
    #[arg(
        long,
        env = "HIVE_INSTALLER_ROLE_BINDING",
        default_value = DEFAULT_INSTALLER_ACCESS_NAME
    )]
    installer_role_binding: String,

    /// Delay before a failed reconcile is retried (e.g. 5s, 1m)
    #[arg(
        long,
        env = "HIVE_ERROR_REQUEUE",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    error_requeue: Duration,
}

impl From<ControllerArgs> for ControllerConfig {
    fn from(args: ControllerArgs) -> Self {
        Self {
            service_account_name: args.installer_service_account,
            role_name: args.installer_role,
            role_binding_name: args.installer_role_binding,
            installer_image: args.installer_image,
            installer_pull_policy: args.installer_pull_policy,
            uninstaller_image: args.uninstaller_image,
            uninstaller_pull_policy: args.uninstaller_pull_policy,
            hive_image: args.hive_image,
            hive_pull_policy: args.hive_pull_policy,
            error_requeue: args.error_requeue,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json).map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    if cli.crd {
        let crd = serde_yaml::to_string(&ClusterDeployment::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller.into()).await,
    }
}

/// Ensure the ClusterDeployment CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply so
/// the CRD version always matches the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing ClusterDeployment CRD...");
    crds.patch(
        "clusterdeployments.hive.openshift.io",
        &params,
        &Patch::Apply(&ClusterDeployment::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ClusterDeployment CRD: {}", e))?;

    tracing::info!("ClusterDeployment CRD installed/updated");
    Ok(())
}

/// Run the ClusterDeployment controller until a shutdown signal is received
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    tracing::info!(
        installer_image = %config.installer_image,
        hive_image = %config.hive_image,
        "Hive controller starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let cluster_deployments: Api<ClusterDeployment> = Api::all(client.clone());
    let jobs: Api<Job> = Api::all(client.clone());

    let ctx = Arc::new(Context::builder(client).config(config).build());

    tracing::info!("Starting ClusterDeployment controller...");

    Controller::new(
        cluster_deployments,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .owns(
        jobs,
        WatcherConfig::default()
            .labels(JOB_TYPE_LABEL)
            .timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(|result| async move {
        match result {
            Ok((obj, action)) => {
                tracing::debug!(cluster_deployment = %obj.name, ?action, "Reconciliation completed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reconciliation error");
            }
        }
    })
    .await;

    tracing::info!("Hive controller shutting down");
    Ok(())
}
