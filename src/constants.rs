//! # System Constants
//!
//! Event type names and default tuning values shared across the orchestrator,
//! event bus and result cache.

use std::time::Duration;

/// Event type names published by the core. Business modules may publish any
/// other name through the bus; these are the ones the core itself relies on.
pub mod events {
    pub const WORKFLOW_STARTED: &str = "workflow_started";
    pub const WORKFLOW_COMPLETED: &str = "workflow_completed";
    pub const WORKFLOW_FAILED: &str = "workflow_failed";
    pub const WORKFLOW_CACHE_HIT: &str = "workflow_cache_hit";

    pub const STAGE_STARTED: &str = "stage_started";
    pub const STAGE_COMPLETED: &str = "stage_completed";
    pub const STAGE_FAILED: &str = "stage_failed";
    pub const STAGE_RETRYING: &str = "stage_retrying";
    pub const STAGE_ROLLED_BACK: &str = "stage_rolled_back";

    pub const MODULE_REGISTERED: &str = "module_registered";
    pub const MODULE_STARTED: &str = "module_started";
    pub const MODULE_STOPPED: &str = "module_stopped";

    /// Diagnostic emitted when a listener fails. Never produces further diagnostics.
    pub const LISTENER_FAILED: &str = "listener_failed";

    /// Every core event type, in lifecycle order.
    pub const ALL: &[&str] = &[
        WORKFLOW_STARTED,
        STAGE_STARTED,
        STAGE_RETRYING,
        STAGE_COMPLETED,
        STAGE_FAILED,
        STAGE_ROLLED_BACK,
        WORKFLOW_COMPLETED,
        WORKFLOW_FAILED,
        WORKFLOW_CACHE_HIT,
        MODULE_REGISTERED,
        MODULE_STARTED,
        MODULE_STOPPED,
        LISTENER_FAILED,
    ];
}

/// Well-known business module names.
pub mod modules {
    pub const CONTEXT: &str = "context";
    pub const PLAN: &str = "plan";
    pub const CONFIRM: &str = "confirm";
    pub const TRACE: &str = "trace";
    pub const ROLE: &str = "role";
    pub const EXTENSION: &str = "extension";
    pub const COLLAB: &str = "collab";
    pub const DIALOG: &str = "dialog";
    pub const NETWORK: &str = "network";
}

pub mod defaults {
    use super::Duration;

    pub const MODULE_TIMEOUT_MS: u64 = 10_000;
    pub const WORKFLOW_TIMEOUT_MS: u64 = 30_000;
    pub const MAX_CONCURRENT_EXECUTIONS: usize = 100;

    pub const RETRY_MAX_ATTEMPTS: u32 = 1;
    pub const RETRY_DELAY_MS: u64 = 1_000;
    pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

    pub const CACHE_CAPACITY: usize = 1_000;
    /// Freshness window for cached workflow results.
    pub const CACHE_TTL: Duration = Duration::from_secs(300);

    pub const EVENT_HISTORY_LIMIT: usize = 1_000;
    pub const EVENT_RETRY_INTERVAL_MS: u64 = 5_000;
    pub const EVENT_LISTENER_RETRIES: u32 = 3;
}

/// Configuration environment variable prefix (`MPLP_ORCHESTRATOR__MODULE_TIMEOUT_MS=...`).
pub const ENV_PREFIX: &str = "MPLP";
