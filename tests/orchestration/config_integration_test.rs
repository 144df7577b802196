//! Orchestrators built from configuration files.

use mplp_core::config::ConfigManager;
use mplp_core::coordinator::{ModuleCoordinator, ServiceModule};
use mplp_core::orchestration::ExecutionMode;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

#[tokio::test]
async fn test_orchestrator_from_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(
        br#"
orchestrator:
  module_timeout_ms: 500
  required_modules: [context, plan]
  default_workflow:
    stages: [context, plan]
    execution_mode: parallel
cache:
  capacity: 10
  ttl_seconds: 30
"#,
    )
    .unwrap();

    let manager = ConfigManager::load(file.path()).unwrap();
    assert_eq!(
        manager.config().orchestrator.default_workflow.execution_mode,
        ExecutionMode::Parallel
    );

    let orchestrator = manager.build_orchestrator();
    let mut coordinator = ModuleCoordinator::new();
    for name in ["context", "plan"] {
        coordinator
            .add(
                Arc::new(ServiceModule::from_fn(name, |ctx| async move {
                    Ok(json!({ "stage": ctx.stage }))
                })),
                "1.0.0",
                &[],
            )
            .unwrap();
    }
    coordinator.install(&orchestrator).await.unwrap();
    orchestrator.initialize().await.unwrap();

    let result = orchestrator.execute_workflow("project-7", None).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.stages.len(), 2);

    let stats = orchestrator.cache_stats().unwrap();
    assert_eq!(stats.capacity, 10);
    assert_eq!(stats.size, 1);

    let statuses = orchestrator.get_module_statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses["plan"].last_execution_time.is_some());

    orchestrator.shutdown().await;
}

#[test]
fn test_toml_file_with_invalid_workflow_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(
        br#"
[orchestrator.default_workflow]
stages = ["plan", "plan"]
"#,
    )
    .unwrap();

    let err = ConfigManager::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("listed twice"));
}
