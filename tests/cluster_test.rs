//! Smoke tests against a live cluster with the VictoriaMetrics operator
//!
//! Run with `cargo test -- --ignored` and `E2E_*` variables pointing at the
//! installation under test.

use std::time::Duration;
use vm_e2e::{Harness, HarnessConfig, RequireExt, ResourceKind, TracingReporter, WaitError};

async fn harness() -> Harness {
    vm_e2e::telemetry::init_logging();
    let config = HarnessConfig::from_env().expect("valid E2E_* configuration");
    Harness::connect(config).await.expect("kubeconfig")
}

#[tokio::test]
#[ignore] // Requires real cluster
async fn test_operator_and_vmsingle_ready() {
    let harness = harness().await;
    let t = TracingReporter::new("operator_and_vmsingle_ready");
    let timeout = harness.config().timeouts.resource_wait;

    harness
        .wait_until_deployment_available("vm", "vmoperator-victoria-metrics-operator", timeout)
        .await
        .require(&t);
    harness
        .wait_until_operational(ResourceKind::VMSingle, "vm", "overwatch", timeout)
        .await
        .require(&t);
}

#[tokio::test]
#[ignore] // Requires real cluster
async fn test_missing_crd_fails_without_waiting() {
    let harness = harness().await;

    let start = std::time::Instant::now();
    let err = harness
        .wait_until_condition_true(
            ResourceKind::Chaos("notarealchaos".to_string()),
            "default",
            "nothing",
            "AllRecovered",
            Duration::from_secs(60),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WaitError::Transient { .. }));
    assert!(start.elapsed() < Duration::from_secs(30));
}
