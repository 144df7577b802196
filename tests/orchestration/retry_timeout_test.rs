//! Stage retries, module and workflow timeouts, rollback.

use crate::common::*;
use mplp_core::constants::events;
use mplp_core::error::ErrorKind;
use mplp_core::events::EventQuery;
use mplp_core::orchestration::{RetryPolicy, WorkflowConfigOverride, WorkflowStatus};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn retrying(max_attempts: u32) -> WorkflowConfigOverride {
    WorkflowConfigOverride::new().retry_policy(
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_delay_ms(100),
    )
}

#[tokio::test(start_paused = true)]
async fn test_stage_retried_until_success() {
    let flaky = Arc::new(MockModule::new("plan", Behavior::FailTimes(2)));
    let orchestrator = started_orchestrator(test_config(&["plan"]), vec![flaky.clone()]).await;

    let result = orchestrator
        .execute_workflow("ctx-retry", Some(retrying(3)))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.stage("plan").unwrap().attempts, 3);
    assert_eq!(flaky.execution_count(), 3);

    let retries = orchestrator
        .event_bus()
        .history_matching(&EventQuery::new().event_type(events::STAGE_RETRYING));
    assert_eq!(retries.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_reports_last_error() {
    let broken = Arc::new(MockModule::new("plan", Behavior::Fail));
    let orchestrator = started_orchestrator(test_config(&["plan"]), vec![broken.clone()]).await;

    let result = orchestrator
        .execute_workflow("ctx-exhaust", Some(retrying(2)))
        .await
        .unwrap();

    let stage = result.stage("plan").unwrap();
    assert_eq!(stage.attempts, 2);
    assert_eq!(stage.error.as_ref().unwrap().kind, ErrorKind::Module);
    assert_eq!(broken.execution_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_module_timeout_is_distinct_error() {
    let slow = Arc::new(MockModule::new("plan", Behavior::Sleep(Duration::from_secs(5))));
    let orchestrator = started_orchestrator(test_config(&["plan"]), vec![slow]).await;

    let result = orchestrator.execute_workflow("ctx-timeout", None).await.unwrap();

    let stage = result.stage("plan").unwrap();
    assert_eq!(stage.error.as_ref().unwrap().kind, ErrorKind::Timeout);
    assert_eq!(result.status, WorkflowStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_module_may_finish_later() {
    let stubborn = Arc::new(MockModule::new(
        "plan",
        Behavior::SleepIgnoringCancellation(Duration::from_secs(3)),
    ));
    let orchestrator = started_orchestrator(test_config(&["plan"]), vec![stubborn.clone()]).await;

    let result = orchestrator.execute_workflow("ctx-late", None).await.unwrap();
    assert_eq!(
        result.stage("plan").unwrap().error.as_ref().unwrap().kind,
        ErrorKind::Timeout
    );
    assert_eq!(stubborn.completed_late.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(stubborn.completed_late.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_workflow_timeout_fails_in_flight_stage() {
    let fast = MockModule::ok("plan");
    let slow = Arc::new(MockModule::new("confirm", Behavior::Sleep(Duration::from_secs(60))));
    let mut config = test_config(&["plan", "confirm"]);
    config.module_timeout_ms = 120_000;
    let orchestrator = started_orchestrator(config, vec![fast, slow]).await;

    let result = orchestrator
        .execute_workflow("ctx-wf-timeout", Some(WorkflowConfigOverride::new().timeout_ms(500)))
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::WorkflowTimeout);
    assert_eq!(result.stage_names(), vec!["plan", "confirm"]);
    assert!(result.stage("plan").unwrap().is_completed());
    let confirm = result.stage("confirm").unwrap();
    assert!(!confirm.is_completed());
    assert_eq!(confirm.error.as_ref().unwrap().kind, ErrorKind::WorkflowTimeout);

    let failed = orchestrator.event_bus().history_matching(
        &EventQuery::new()
            .execution(result.execution_id)
            .event_type(events::STAGE_FAILED),
    );
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].stage.as_deref(), Some("confirm"));
}

#[tokio::test(start_paused = true)]
async fn test_workflow_timeout_fails_every_outstanding_parallel_stage() {
    let mut config = test_config(&["plan", "confirm", "trace"]);
    config.module_timeout_ms = 120_000;
    let modules = ["plan", "confirm", "trace"]
        .into_iter()
        .map(|name| Arc::new(MockModule::new(name, Behavior::Sleep(Duration::from_secs(60)))))
        .collect();
    let orchestrator = started_orchestrator(config, modules).await;

    let result = orchestrator
        .execute_workflow(
            "ctx-parallel-timeout",
            Some(WorkflowConfigOverride::new().parallel().timeout_ms(500)),
        )
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.stages.len(), 3);
    assert!(result
        .stages
        .iter()
        .all(|s| s.error.as_ref().unwrap().kind == ErrorKind::WorkflowTimeout));

    let history = orchestrator
        .event_bus()
        .history_matching(&EventQuery::new().execution(result.execution_id));
    let count = |event_type: &str| history.iter().filter(|e| e.event_type == event_type).count();
    assert_eq!(count(events::STAGE_STARTED), 3);
    assert_eq!(count(events::STAGE_FAILED), 3);
}

#[tokio::test]
async fn test_rollback_runs_in_reverse_completion_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let a = Arc::new(MockModule::new("a", Behavior::Succeed).with_journal(journal.clone()));
    let b = Arc::new(MockModule::new("b", Behavior::Succeed).with_journal(journal.clone()));
    let c = Arc::new(MockModule::new("c", Behavior::Fail).with_journal(journal.clone()));
    let orchestrator = started_orchestrator(
        test_config(&["a", "b", "c"]),
        vec![a.clone(), b.clone(), c.clone()],
    )
    .await;
    journal.lock().clear();

    let result = orchestrator
        .execute_workflow("ctx-rollback", Some(WorkflowConfigOverride::new().rollback_on_failure()))
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(c.rollback_count(), 0);
    let rollbacks: Vec<String> = journal
        .lock()
        .iter()
        .filter(|entry| entry.starts_with("rollback:"))
        .cloned()
        .collect();
    assert_eq!(rollbacks, vec!["rollback:b", "rollback:a"]);

    let rolled_back = orchestrator
        .event_bus()
        .history_matching(&EventQuery::new().event_type(events::STAGE_ROLLED_BACK));
    assert_eq!(rolled_back.len(), 2);
}

#[tokio::test]
async fn test_no_rollback_without_policy() {
    let a = MockModule::ok("a");
    let b = Arc::new(MockModule::new("b", Behavior::Fail));
    let orchestrator = started_orchestrator(test_config(&["a", "b"]), vec![a.clone(), b]).await;

    orchestrator.execute_workflow("ctx-no-rollback", None).await.unwrap();
    assert_eq!(a.rollback_count(), 0);
}
