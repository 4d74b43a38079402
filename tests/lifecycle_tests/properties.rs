//! Guarantees that hold no matter how many cycles run

use kube::ResourceExt;

use hive::controller::KubeClient;
use hive::crd::{ClusterDeploymentStatus, FINALIZER_DEPROVISION};

use super::{now, sample_cluster_deployment, Harness, NAMESPACE};

fn created() -> chrono::DateTime<chrono::Utc> {
    now() - chrono::Duration::minutes(10)
}

/// Reach the installed state with the given cluster UUID
async fn installed(h: &Harness, name: &str, uuid: &str) {
    h.kube
        .create_cluster_deployment(sample_cluster_deployment(name), created());
    h.settle(name).await;
    h.kube
        .finish_job(NAMESPACE, &format!("{name}-install"), &["Complete"]);
    h.kube.upload_metadata(NAMESPACE, name, uuid);
    h.settle(name).await;
}

fn status(h: &Harness, name: &str) -> ClusterDeploymentStatus {
    h.kube
        .cluster_deployment(NAMESPACE, name)
        .unwrap()
        .status_or_default()
}

#[tokio::test]
async fn unchanged_state_makes_no_writes_on_repeat() {
    let h = Harness::new();
    installed(&h, "steady", "uuid-1").await;

    let before = h.kube.mutation_count();
    let status_before = status(&h, "steady");
    for _ in 0..5 {
        h.cycle_ok("steady").await;
    }
    assert_eq!(h.kube.mutation_count(), before, "{:?}", h.kube.mutations());
    assert_eq!(status(&h, "steady"), status_before);
}

#[tokio::test]
async fn installed_and_uuid_never_revert() {
    let h = Harness::new();
    installed(&h, "sticky", "uuid-original").await;
    assert_eq!(
        status(&h, "sticky"),
        ClusterDeploymentStatus {
            installed: true,
            cluster_uuid: "uuid-original".to_string(),
        }
    );

    // The completed Job is cleaned up: no reinstall, status kept
    h.kube.remove_job(NAMESPACE, "sticky-install");
    h.settle("sticky").await;
    assert!(h.kube.job(NAMESPACE, "sticky-install").is_none());
    assert!(status(&h, "sticky").installed);

    // Metadata is rewritten: the recorded UUID is kept
    h.kube.upload_metadata(NAMESPACE, "sticky", "uuid-other");
    h.settle("sticky").await;
    assert_eq!(status(&h, "sticky").cluster_uuid, "uuid-original");
}

#[tokio::test]
async fn installed_is_not_lowered_by_a_replaced_install_job() {
    let h = Harness::new();
    installed(&h, "replaced", "uuid-r").await;

    // Someone recreates the install Job and it fails
    h.kube.remove_job(NAMESPACE, "replaced-install");
    let cd = h.kube.cluster_deployment(NAMESPACE, "replaced").unwrap();
    let job = hive::install::generate_installer_job(&cd, &Default::default()).unwrap();
    h.kube.create_job(&job).await.unwrap();
    h.kube
        .finish_job(NAMESPACE, "replaced-install", &["Failed"]);

    h.settle("replaced").await;
    assert!(status(&h, "replaced").installed);
    assert_eq!(status(&h, "replaced").cluster_uuid, "uuid-r");
}

#[tokio::test]
async fn at_most_one_job_per_purpose() {
    let h = Harness::new();
    h.kube
        .create_cluster_deployment(sample_cluster_deployment("single"), created());

    for _ in 0..5 {
        h.cycle_ok("single").await;
    }
    h.kube.finish_job(NAMESPACE, "single-install", &["Failed"]);
    for _ in 0..5 {
        h.cycle_ok("single").await;
    }
    assert_eq!(h.kube.count("create_job single-install"), 1);

    h.kube
        .delete_cluster_deployment(NAMESPACE, "single")
        .await
        .unwrap();
    for _ in 0..5 {
        h.cycle_ok("single").await;
    }
    h.kube
        .finish_job(NAMESPACE, "single-uninstall", &["Failed"]);
    for _ in 0..5 {
        h.cycle_ok("single").await;
    }
    assert_eq!(h.kube.count("create_job single-uninstall"), 1);
    assert_eq!(h.kube.count("create_job"), 2);
}

#[tokio::test]
async fn finalizer_is_released_only_by_a_complete_uninstall() {
    for (conditions, released) in [
        (&[][..], false),
        (&["Failed"][..], false),
        (&["Complete"][..], true),
        (&["Failed", "Complete"][..], true),
    ] {
        let h = Harness::new();
        installed(&h, "teardown", "uuid-t").await;
        h.kube
            .delete_cluster_deployment(NAMESPACE, "teardown")
            .await
            .unwrap();
        h.cycle_ok("teardown").await;

        h.kube
            .finish_job(NAMESPACE, "teardown-uninstall", conditions);
        for _ in 0..3 {
            h.cycle_ok("teardown").await;
        }

        let remaining = h.kube.cluster_deployment(NAMESPACE, "teardown");
        assert_eq!(remaining.is_none(), released, "conditions {conditions:?}");
        if let Some(cd) = remaining {
            assert!(cd.finalizers().contains(&FINALIZER_DEPROVISION.to_string()));
        }
    }
}

#[tokio::test]
async fn finalizer_is_added_alone_before_any_install_work() {
    let h = Harness::new();
    h.kube
        .create_cluster_deployment(sample_cluster_deployment("guarded"), created());

    h.cycle_ok("guarded").await;
    let first_cycle: Vec<String> = h
        .kube
        .mutations()
        .into_iter()
        .filter(|m| !m.starts_with("create_service_account") && !m.starts_with("create_role"))
        .collect();
    assert_eq!(first_cycle, vec!["patch_finalizers guarded".to_string()]);
}
