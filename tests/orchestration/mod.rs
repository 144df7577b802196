//! Orchestration Integration Tests
//!
//! End-to-end workflow execution against mock and service-backed modules.

pub mod cache_integration_test;
pub mod config_integration_test;
pub mod event_integration_test;
pub mod lifecycle_test;
pub mod retry_timeout_test;
