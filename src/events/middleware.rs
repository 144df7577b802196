//! Event middleware pipeline.
//!
//! Middleware runs in registration order before any listener sees the event.
//! Each stage may rewrite the event or stop delivery altogether.

use super::types::Event;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareAction {
    Continue,
    Stop,
}

#[async_trait]
pub trait EventMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, event: &mut Event) -> MiddlewareAction;
}

/// Adapts a synchronous closure into middleware.
pub struct FnMiddleware<F> {
    name: String,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&mut Event) -> MiddlewareAction + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> EventMiddleware for FnMiddleware<F>
where
    F: Fn(&mut Event) -> MiddlewareAction + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: &mut Event) -> MiddlewareAction {
        (self.func)(event)
    }
}

/// Logs every event at debug level. Installed when event logging is enabled.
#[derive(Debug, Default)]
pub struct EventLoggingMiddleware;

#[async_trait]
impl EventMiddleware for EventLoggingMiddleware {
    fn name(&self) -> &str {
        "event_logging"
    }

    async fn process(&self, event: &mut Event) -> MiddlewareAction {
        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            execution_id = ?event.execution_id,
            stage = ?event.stage,
            "📡 EVENT"
        );
        MiddlewareAction::Continue
    }
}
