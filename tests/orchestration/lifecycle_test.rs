//! Module registration, startup, concurrency limits and shutdown.

use crate::common::*;
use mplp_core::coordinator::ModuleCoordinator;
use mplp_core::error::{OrchestrationError, RegistryError};
use mplp_core::module::{ModuleDependency, ModuleDescriptor};
use mplp_core::orchestration::WorkflowConfigOverride;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_initialize_starts_modules_in_dependency_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = orchestrator_with(test_config(&["plan"]));

    let mut coordinator = ModuleCoordinator::new();
    coordinator
        .add(
            Arc::new(MockModule::new("trace", Behavior::Succeed).with_journal(journal.clone())),
            "1.0.0",
            &["confirm"],
        )
        .unwrap()
        .add(
            Arc::new(MockModule::new("confirm", Behavior::Succeed).with_journal(journal.clone())),
            "1.0.0",
            &["plan", "context"],
        )
        .unwrap()
        .add(
            Arc::new(MockModule::new("plan", Behavior::Succeed).with_journal(journal.clone())),
            "1.0.0",
            &["context"],
        )
        .unwrap()
        .add(
            Arc::new(MockModule::new("context", Behavior::Succeed).with_journal(journal.clone())),
            "1.0.0",
            &[],
        )
        .unwrap();
    coordinator.install(&orchestrator).await.unwrap();

    orchestrator.initialize().await.unwrap();

    assert_eq!(
        *journal.lock(),
        vec!["init:context", "init:plan", "init:confirm", "init:trace"]
    );
    assert_eq!(
        orchestrator.registry().compute_shutdown_order().unwrap(),
        vec!["trace", "confirm", "plan", "context"]
    );
    assert_eq!(coordinator.discover().len(), 4);
}

#[tokio::test]
async fn test_missing_required_module_blocks_initialize() {
    let mut config = test_config(&["plan"]);
    config.required_modules = vec!["plan".to_string(), "confirm".to_string()];
    let orchestrator = orchestrator_with(config);
    orchestrator
        .register_module(ModuleDescriptor::new(MockModule::ok("plan")))
        .await
        .unwrap();

    assert_eq!(orchestrator.validate_module_registration(), vec!["confirm"]);
    let err = orchestrator.initialize().await.unwrap_err();
    assert_eq!(
        err,
        OrchestrationError::Registry(RegistryError::ModuleNotFound {
            name: "confirm".to_string()
        })
    );
    assert!(!orchestrator.is_initialized());
}

#[tokio::test]
async fn test_failed_module_start_aborts_initialize() {
    let orchestrator = orchestrator_with(test_config(&["plan"]));
    orchestrator
        .register_module(ModuleDescriptor::new(Arc::new(
            MockModule::new("plan", Behavior::Succeed).failing_initialize(),
        )))
        .await
        .unwrap();

    let err = orchestrator.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::ModuleInitialization { ref module, .. } if module == "plan"
    ));
}

#[tokio::test]
async fn test_registration_errors_surface_to_caller() {
    let orchestrator = orchestrator_with(test_config(&["plan"]));
    orchestrator
        .register_module(ModuleDescriptor::new(MockModule::ok("plan")).with_version("2.1").unwrap())
        .await
        .unwrap();

    let duplicate = orchestrator
        .register_module(ModuleDescriptor::new(MockModule::ok("plan")))
        .await
        .unwrap_err();
    assert!(matches!(
        duplicate,
        OrchestrationError::Registry(RegistryError::DuplicateModule { .. })
    ));

    let missing = orchestrator
        .register_module(ModuleDescriptor::new(MockModule::ok("trace")).depends_on("confirm"))
        .await
        .unwrap_err();
    assert!(matches!(
        missing,
        OrchestrationError::Registry(RegistryError::MissingDependency { .. })
    ));

    let too_old = orchestrator
        .register_module(
            ModuleDescriptor::new(MockModule::ok("confirm")).with_dependency(
                ModuleDependency::required("plan").with_min_version("3.0.0").unwrap(),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        too_old,
        OrchestrationError::Registry(RegistryError::IncompatibleVersion { .. })
    ));
}

#[tokio::test]
async fn test_module_registered_after_initialize_is_started() {
    let orchestrator =
        started_orchestrator(test_config(&["plan"]), vec![MockModule::ok("plan")]).await;
    let late = MockModule::ok("trace");

    orchestrator
        .register_module(ModuleDescriptor::new(late.clone()).depends_on("plan"))
        .await
        .unwrap();

    assert!(orchestrator.registry().is_started("trace"));
    assert_eq!(late.initializations.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit_queues_executions() {
    let mut config = test_config(&["plan"]);
    config.max_concurrent_executions = 1;
    let plan = Arc::new(MockModule::new("plan", Behavior::Sleep(Duration::from_millis(200))));
    let orchestrator = started_orchestrator(config, vec![plan.clone()]).await;

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        orchestrator.execute_workflow("ctx-a", None),
        orchestrator.execute_workflow("ctx-b", None),
    );

    assert!(first.unwrap().is_success());
    assert!(second.unwrap().is_success());
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(plan.execution_count(), 2);
}

#[tokio::test]
async fn test_shutdown_cleans_up_every_module_best_effort() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let plan = Arc::new(MockModule::new("plan", Behavior::Succeed).with_journal(journal.clone()));
    let confirm = Arc::new(
        MockModule::new("confirm", Behavior::Succeed)
            .failing_cleanup()
            .with_journal(journal.clone()),
    );
    let trace = Arc::new(MockModule::new("trace", Behavior::Succeed).with_journal(journal.clone()));

    let orchestrator = orchestrator_with(test_config(&["plan"]));
    orchestrator
        .register_module(ModuleDescriptor::new(plan.clone()))
        .await
        .unwrap();
    orchestrator
        .register_module(ModuleDescriptor::new(confirm.clone()).depends_on("plan"))
        .await
        .unwrap();
    orchestrator
        .register_module(ModuleDescriptor::new(trace.clone()).depends_on("confirm"))
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();
    journal.lock().clear();

    let report = orchestrator.shutdown().await;

    assert_eq!(report.stopped, vec!["trace", "plan"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "confirm");
    assert_eq!(
        *journal.lock(),
        vec!["cleanup:trace", "cleanup:confirm", "cleanup:plan"]
    );
    for module in [&plan, &confirm, &trace] {
        assert_eq!(module.cleanup_count(), 1);
    }

    let err = orchestrator
        .execute_workflow("ctx", Some(WorkflowConfigOverride::new()))
        .await
        .unwrap_err();
    assert_eq!(err, OrchestrationError::ShuttingDown);
    assert!(orchestrator.event_bus().is_shut_down());
}
