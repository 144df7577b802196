//! Orchestrator events, listeners and hooks.

use crate::common::*;
use async_trait::async_trait;
use mplp_core::config::{ConfigManager, MplpConfig};
use mplp_core::constants::events;
use mplp_core::error::{ErrorInfo, ListenerError};
use mplp_core::events::{listener_fn, SubscriptionOptions};
use mplp_core::orchestration::{
    ExecutionContext, StageResult, WorkflowHooks, WorkflowResult,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<dyn mplp_core::events::EventListener>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = listener_fn(move |event| {
        let sink = sink.clone();
        async move {
            let label = match &event.stage {
                Some(stage) => format!("{}:{}", event.event_type, stage),
                None => event.event_type.clone(),
            };
            sink.lock().push(label);
            Ok(())
        }
    });
    (seen, listener)
}

#[tokio::test]
async fn test_sequential_workflow_event_sequence() {
    let orchestrator = started_orchestrator(
        test_config(&["plan", "confirm"]),
        vec![MockModule::ok("plan"), MockModule::ok("confirm")],
    )
    .await;
    let (seen, listener) = recorder();
    orchestrator.add_event_listener(listener);

    orchestrator.execute_workflow("ctx-events", None).await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            "workflow_started",
            "stage_started:plan",
            "stage_completed:plan",
            "stage_started:confirm",
            "stage_completed:confirm",
            "workflow_completed",
        ]
    );
}

#[tokio::test]
async fn test_failing_listener_does_not_block_others() {
    let orchestrator =
        started_orchestrator(test_config(&["plan"]), vec![MockModule::ok("plan")]).await;

    let failing_calls = Arc::new(AtomicU32::new(0));
    let healthy_calls = Arc::new(AtomicU32::new(0));

    let counter = failing_calls.clone();
    orchestrator.add_event_type_listener(
        events::WORKFLOW_COMPLETED,
        listener_fn(move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ListenerError::Failed("listener bug".to_string()))
            }
        }),
    );
    let counter = healthy_calls.clone();
    orchestrator.add_event_type_listener(
        events::WORKFLOW_COMPLETED,
        listener_fn(move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    );

    let result = orchestrator.execute_workflow("ctx-isolation", None).await.unwrap();

    assert!(result.is_success());
    assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
    assert!(orchestrator.event_statistics().failed >= 1);
}

#[tokio::test]
async fn test_stage_listener_sees_only_its_stage() {
    let orchestrator = started_orchestrator(
        test_config(&["plan", "confirm", "trace"]),
        vec![
            MockModule::ok("plan"),
            MockModule::ok("confirm"),
            MockModule::ok("trace"),
        ],
    )
    .await;
    let (seen, listener) = recorder();
    orchestrator.add_stage_event_listener("confirm", listener);

    orchestrator.execute_workflow("ctx-stage", None).await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec!["stage_started:confirm", "stage_completed:confirm"]
    );
}

#[tokio::test]
async fn test_removed_listener_stops_receiving() {
    let orchestrator =
        started_orchestrator(test_config(&["plan"]), vec![MockModule::ok("plan")]).await;
    let (seen, listener) = recorder();
    let id = orchestrator.add_event_listener(listener);

    orchestrator.execute_workflow("ctx-1", None).await.unwrap();
    let after_first = seen.lock().len();
    orchestrator.remove_event_listener(id).unwrap();
    orchestrator.execute_workflow("ctx-2", None).await.unwrap();

    assert!(after_first > 0);
    assert_eq!(seen.lock().len(), after_first);
}

#[tokio::test]
async fn test_module_event_reaches_history() {
    let orchestrator =
        started_orchestrator(test_config(&["plan"]), vec![MockModule::ok("plan")]).await;
    let (seen, listener) = recorder();
    orchestrator.add_event_type_listener("plan_*", listener);

    let report = orchestrator
        .emit_module_event("plan_created", Some("plan"), json!({ "tasks": 4 }))
        .await
        .unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(*seen.lock(), vec!["plan_created:plan"]);
    let history = orchestrator.event_history(Some(1));
    assert_eq!(history[0].event_type, "plan_created");
    assert_eq!(history[0].data, Some(json!({ "tasks": 4 })));
}

#[derive(Default)]
struct RecordingHooks {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl WorkflowHooks for RecordingHooks {
    async fn before_workflow(&self, context: &ExecutionContext) {
        self.calls.lock().push(format!("before_workflow:{}", context.context_id));
    }

    async fn after_workflow(&self, result: &WorkflowResult) {
        self.calls.lock().push(format!("after_workflow:{}", result.status));
    }

    async fn before_stage(&self, stage: &str, _context: &ExecutionContext) {
        self.calls.lock().push(format!("before_stage:{stage}"));
    }

    async fn after_stage(&self, result: &StageResult) {
        self.calls.lock().push(format!("after_stage:{}", result.stage));
    }

    async fn on_error(&self, stage: Option<&str>, _error: &ErrorInfo) {
        self.calls
            .lock()
            .push(format!("on_error:{}", stage.unwrap_or("workflow")));
    }
}

#[tokio::test]
async fn test_hooks_observe_workflow_lifecycle() {
    let hooks = Arc::new(RecordingHooks::default());
    let orchestrator = orchestrator_with(test_config(&["plan", "confirm"])).with_hooks(hooks.clone());
    orchestrator
        .register_module(mplp_core::module::ModuleDescriptor::new(MockModule::ok("plan")))
        .await
        .unwrap();
    orchestrator
        .register_module(mplp_core::module::ModuleDescriptor::new(Arc::new(
            MockModule::new("confirm", Behavior::Fail),
        )))
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();

    orchestrator.execute_workflow("ctx-hooks", None).await.unwrap();

    assert_eq!(
        *hooks.calls.lock(),
        vec![
            "before_workflow:ctx-hooks",
            "before_stage:plan",
            "after_stage:plan",
            "before_stage:confirm",
            "on_error:confirm",
            "after_stage:confirm",
            "after_workflow:failed",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_listener_failure_redelivered_after_initialize() {
    let manager = ConfigManager::from_config(MplpConfig::default()).unwrap();
    let orchestrator = manager.build_orchestrator();
    orchestrator.initialize().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    orchestrator.event_bus().subscribe(
        "plan_ready",
        listener_fn(move |_event| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ListenerError::Transient("downstream busy".to_string()))
                } else {
                    Ok(())
                }
            }
        }),
        SubscriptionOptions::new().retries(3),
    );

    orchestrator
        .emit_module_event("plan_ready", Some("plan"), json!({ "items": 3 }))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.event_bus().pending_retries(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let stats = orchestrator.event_statistics();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.pending_retries, 0);

    orchestrator.shutdown().await;
    assert!(orchestrator.event_bus().is_shut_down());
}
