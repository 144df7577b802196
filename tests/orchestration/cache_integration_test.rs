//! Workflow result memoisation.

use crate::common::*;
use mplp_core::orchestration::WorkflowConfigOverride;
use std::sync::Arc;
use std::time::Duration;

async fn three_stage() -> (mplp_core::CoreOrchestrator, Vec<Arc<MockModule>>) {
    let modules = vec![
        MockModule::ok("plan"),
        MockModule::ok("confirm"),
        MockModule::ok("trace"),
    ];
    let orchestrator =
        started_orchestrator(test_config(&["plan", "confirm", "trace"]), modules.clone()).await;
    (orchestrator, modules)
}

#[tokio::test(start_paused = true)]
async fn test_repeat_within_window_is_served_from_cache() {
    let (orchestrator, modules) = three_stage().await;

    let first = orchestrator.execute_workflow("ctx-42", None).await.unwrap();
    tokio::time::advance(Duration::from_secs(120)).await;
    let second = orchestrator.execute_workflow("ctx-42", None).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.stages, second.stages);
    assert!(second.completed_at >= first.completed_at);
    for module in &modules {
        assert_eq!(module.execution_count(), 1);
    }

    let stats = orchestrator.cache_stats().unwrap();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_reinvokes_modules() {
    let (orchestrator, modules) = three_stage().await;

    orchestrator.execute_workflow("ctx-42", None).await.unwrap();
    tokio::time::advance(Duration::from_secs(301)).await;
    let again = orchestrator.execute_workflow("ctx-42", None).await.unwrap();

    assert!(!again.from_cache);
    for module in &modules {
        assert_eq!(module.execution_count(), 2);
    }
}

#[tokio::test]
async fn test_different_configuration_is_a_different_key() {
    let (orchestrator, modules) = three_stage().await;

    orchestrator.execute_workflow("ctx-42", None).await.unwrap();
    let parallel = orchestrator
        .execute_workflow("ctx-42", Some(WorkflowConfigOverride::new().parallel()))
        .await
        .unwrap();
    let other_context = orchestrator.execute_workflow("ctx-43", None).await.unwrap();

    assert!(!parallel.from_cache);
    assert!(!other_context.from_cache);
    assert_eq!(modules[0].execution_count(), 3);
}

#[tokio::test]
async fn test_failed_workflows_are_never_cached() {
    let broken = Arc::new(MockModule::new("plan", Behavior::Fail));
    let orchestrator = started_orchestrator(test_config(&["plan"]), vec![broken.clone()]).await;

    orchestrator.execute_workflow("ctx-fail", None).await.unwrap();
    let second = orchestrator.execute_workflow("ctx-fail", None).await.unwrap();

    assert!(!second.from_cache);
    assert_eq!(broken.execution_count(), 2);
    assert_eq!(orchestrator.cache_stats().unwrap().size, 0);
}

#[tokio::test]
async fn test_disabled_cache_always_executes() {
    let mut config = test_config(&["plan"]);
    config.cache_enabled = false;
    let plan = MockModule::ok("plan");
    let orchestrator = started_orchestrator(config, vec![plan.clone()]).await;

    orchestrator.execute_workflow("ctx", None).await.unwrap();
    orchestrator.execute_workflow("ctx", None).await.unwrap();

    assert_eq!(plan.execution_count(), 2);
    assert!(orchestrator.cache_stats().is_none());
}
