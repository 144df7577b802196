//! Listener contract and subscription options.

use super::types::Event;
use crate::constants::defaults;
use crate::error::ListenerError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Predicate deciding whether an event reaches a subscription (or passes a bus-level filter).
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

#[async_trait]
pub trait EventListener: Send + Sync {
    /// Return [`ListenerError::Transient`] to have the delivery retried later.
    async fn on_event(&self, event: &Event) -> Result<(), ListenerError>;
}

/// Adapts an async closure into a listener. The closure receives an owned copy of the event.
pub struct FnListener<F> {
    func: F,
}

impl<F, Fut> FnListener<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    async fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        (self.func)(event.clone()).await
    }
}

/// Shorthand for `Arc::new(FnListener::new(func))`.
pub fn listener_fn<F, Fut>(func: F) -> Arc<dyn EventListener>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    Arc::new(FnListener::new(func))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
pub struct SubscriptionOptions {
    /// Higher priorities are dispatched first
    pub priority: i32,
    /// Remove the subscription after its first delivery
    pub once: bool,
    pub filter: Option<EventFilter>,
    /// Per-delivery time limit; exceeding it counts as a retryable failure
    pub timeout: Option<Duration>,
    /// Redelivery attempts for retryable failures
    pub retries: u32,
    pub tags: Vec<String>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            once: false,
            filter: None,
            timeout: None,
            retries: defaults::EVENT_LISTENER_RETRIES,
            tags: Vec::new(),
        }
    }
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

impl fmt::Debug for SubscriptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionOptions")
            .field("priority", &self.priority)
            .field("once", &self.once)
            .field("filter", &self.filter.as_ref().map(|_| "<filter>"))
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("tags", &self.tags)
            .finish()
    }
}
