//! Switchover controller sequence tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use weft_flow::error::Error;
use weft_flow::handshake;
use weft_flow::switchover::{SwitchoverController, SwitchoverHook};
use weft_test_utils::{pipeline_config, resource_map_for, TestHarness};

fn controller_for(harness: &TestHarness) -> SwitchoverController {
    SwitchoverController::new(
        harness.config.clone(),
        harness.store.clone(),
        harness.invoker.clone(),
    )
}

fn flag_hook(flag: Arc<AtomicBool>) -> SwitchoverHook {
    Box::new(move || {
        Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
    })
}

#[tokio::test(start_paused = true)]
async fn publishes_seeds_and_waits_for_confirmation() {
    let mut config = pipeline_config();
    config.coordinator.coordinator_concurrency = 2;
    let harness = TestHarness::unpublished(config);
    let controller = controller_for(&harness);

    // A healthy generation-1 coordinator confirms a few seconds in.
    let confirmer = tokio::spawn({
        let store = harness.store.clone();
        let paths = harness.paths.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            handshake::confirm(&store, &paths).await
        }
    });

    let hook_ran = Arc::new(AtomicBool::new(false));
    controller
        .run(
            resource_map_for(&harness.config),
            Some(flag_hook(hook_ran.clone())),
        )
        .await
        .expect("switchover should succeed");

    confirmer
        .await
        .expect("confirmer should not panic")
        .expect("confirm should succeed");

    // The map was published at the well-known key.
    assert!(harness
        .store
        .exists(&harness.paths.resource_map())
        .await
        .expect("probe"));

    // Both seeds carry the empty event.
    let seeds = harness.invoker.invocations();
    assert_eq!(seeds.len(), 2);
    for seed in &seeds {
        assert_eq!(seed.function, "fn-coordinator");
        assert_eq!(seed.payload, json!({}));
    }

    assert!(hook_ran.load(Ordering::SeqCst), "hook runs after confirmation");
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_deployment_times_out_and_skips_the_hook() {
    let harness = TestHarness::unpublished(pipeline_config());
    let controller = controller_for(&harness);

    let hook_ran = Arc::new(AtomicBool::new(false));
    let started = tokio::time::Instant::now();
    let err = controller
        .run(
            resource_map_for(&harness.config),
            Some(flag_hook(hook_ran.clone())),
        )
        .await
        .expect_err("no coordinator ever confirms");

    assert!(matches!(err, Error::ConfirmationTimeout { .. }));
    // Polled for 2·(minInterval + 1) = 22 s.
    assert!(started.elapsed() >= Duration::from_secs(22));
    assert!(!hook_ran.load(Ordering::SeqCst), "hook skipped on failure");
}

#[tokio::test(start_paused = true)]
async fn seed_failure_aborts_before_polling() {
    let harness = TestHarness::unpublished(pipeline_config());
    harness.invoker.fail_function("fn-coordinator");
    let controller = controller_for(&harness);

    let hook_ran = Arc::new(AtomicBool::new(false));
    let err = controller
        .run(
            resource_map_for(&harness.config),
            Some(flag_hook(hook_ran.clone())),
        )
        .await
        .expect_err("seeding must fail");

    assert!(err.to_string().contains("rejected"));
    assert!(!hook_ran.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn hook_errors_surface() {
    let harness = TestHarness::unpublished(pipeline_config());
    let controller = controller_for(&harness);

    handshake::confirm(&harness.store, &harness.paths)
        .await
        .expect("pre-confirm");

    let hook: SwitchoverHook = Box::new(|| {
        Box::pin(async { Err(Error::routing_failed("hook exploded")) })
    });
    let err = controller
        .run(resource_map_for(&harness.config), Some(hook))
        .await
        .expect_err("hook error surfaces");
    assert!(err.to_string().contains("hook exploded"));
}
