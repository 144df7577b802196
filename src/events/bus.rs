//! # Event Bus
//!
//! In-process publish/subscribe with at-least-once local delivery.
//!
//! ## Delivery pipeline
//!
//! ```text
//! publish(event)
//!   ├── bus-level filters for the event type   (any `false` drops the event)
//!   ├── middleware chain, in registration order (may rewrite or stop)
//!   ├── history ring + persistence collaborator
//!   └── matching subscriptions, priority desc then registration order
//!         ├── ok                → delivered
//!         └── err               → failed, `listener_failed` diagnostic,
//!                                 retry queue when the error is retryable
//! ```
//!
//! A failing listener never affects other listeners or the publisher. A
//! listener that panics is reported as a non-retryable failure.
//! Diagnostic events are delivered to their own subscribers, but failures
//! while handling a diagnostic are only logged.

use super::listener::{EventFilter, EventListener, SubscriptionId, SubscriptionOptions};
use super::middleware::{EventMiddleware, MiddlewareAction};
use super::persistence::EventPersistence;
use super::types::{matches_pattern, Event, EventQuery};
use crate::constants::{defaults, events};
use crate::error::{EventBusError, ListenerError};
use crate::orchestration::backoff::RetryPolicy;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub history_limit: usize,
    pub enable_history: bool,
    pub retry_interval_ms: u64,
    /// Backoff shape for listener redelivery; attempt counts come from each subscription
    pub retry_policy: RetryPolicy,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_limit: defaults::EVENT_HISTORY_LIMIT,
            enable_history: true,
            retry_interval_ms: defaults::EVENT_RETRY_INTERVAL_MS,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl EventBusConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusStats {
    pub total_events: u64,
    pub delivered: u64,
    pub failed: u64,
    pub filtered: u64,
    pub stopped_by_middleware: u64,
    pub retried: u64,
    pub pending_retries: usize,
    pub subscriptions: usize,
    pub history_size: usize,
    pub by_type: HashMap<String, u64>,
}

/// What happened to one published event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
    pub filtered: bool,
    pub stopped_by: Option<String>,
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    pattern: String,
    listener: Arc<dyn EventListener>,
    options: SubscriptionOptions,
    seq: u64,
}

impl Subscription {
    fn accepts(&self, event: &Event) -> bool {
        matches_pattern(&event.event_type, &self.pattern)
            && self.options.filter.as_ref().map_or(true, |f| f(event))
    }
}

struct PendingRetry {
    subscription: Subscription,
    event: Event,
    /// Failed deliveries so far
    attempts: u32,
    due: Instant,
}

#[derive(Default)]
struct Counters {
    total_events: u64,
    delivered: u64,
    failed: u64,
    filtered: u64,
    stopped_by_middleware: u64,
    retried: u64,
    by_type: HashMap<String, u64>,
}

struct Failure {
    subscription: Subscription,
    error: ListenerError,
}

pub struct EventBus {
    config: EventBusConfig,
    subscriptions: RwLock<Vec<Subscription>>,
    next_seq: AtomicU64,
    filters: RwLock<HashMap<String, Vec<EventFilter>>>,
    middleware: RwLock<Vec<Arc<dyn EventMiddleware>>>,
    history: Mutex<VecDeque<Event>>,
    retry_queue: Mutex<VecDeque<PendingRetry>>,
    counters: Mutex<Counters>,
    persistence: Option<Arc<dyn EventPersistence>>,
    shutdown: CancellationToken,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            subscriptions: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            filters: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            retry_queue: Mutex::new(VecDeque::new()),
            counters: Mutex::new(Counters::default()),
            persistence: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn EventPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Subscribe to an event type or wildcard pattern.
    pub fn subscribe(
        &self,
        pattern: impl Into<String>,
        listener: Arc<dyn EventListener>,
        options: SubscriptionOptions,
    ) -> SubscriptionId {
        let subscription = Subscription {
            id: SubscriptionId::new(),
            pattern: pattern.into(),
            listener,
            options,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let id = subscription.id;
        debug!(
            subscription_id = %id,
            pattern = %subscription.pattern,
            priority = subscription.options.priority,
            "Subscribed listener"
        );
        self.subscriptions.write().push(subscription);
        id
    }

    /// Subscribe one listener to several patterns; each gets its own subscription id.
    pub fn subscribe_many<I, S>(
        &self,
        patterns: I,
        listener: Arc<dyn EventListener>,
        options: SubscriptionOptions,
    ) -> Vec<SubscriptionId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        patterns
            .into_iter()
            .map(|pattern| self.subscribe(pattern, listener.clone(), options.clone()))
            .collect()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EventBusError> {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        if subscriptions.len() == before {
            return Err(EventBusError::SubscriptionNotFound {
                subscription_id: id.to_string(),
            });
        }
        debug!(subscription_id = %id, "Unsubscribed listener");
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Number of subscriptions whose pattern matches `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| matches_pattern(event_type, &s.pattern))
            .count()
    }

    /// Tags of every subscription matching `event_type`.
    pub fn subscription_tags(&self, event_type: &str) -> Vec<(SubscriptionId, Vec<String>)> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| matches_pattern(event_type, &s.pattern))
            .map(|s| (s.id, s.options.tags.clone()))
            .collect()
    }

    /// Bus-level filter for an event type (or pattern). Every matching filter must accept.
    pub fn add_filter<F>(&self, event_type: impl Into<String>, filter: F)
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filters
            .write()
            .entry(event_type.into())
            .or_default()
            .push(Arc::new(filter));
    }

    pub fn add_middleware(&self, middleware: Arc<dyn EventMiddleware>) {
        debug!(middleware = middleware.name(), "Added event middleware");
        self.middleware.write().push(middleware);
    }

    /// Publish an event and deliver it to every matching subscription.
    pub async fn publish(&self, mut event: Event) -> Result<PublishReport, EventBusError> {
        if self.is_shut_down() {
            return Err(EventBusError::ShutDown);
        }

        {
            let mut counters = self.counters.lock();
            counters.total_events += 1;
            *counters.by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        }

        if !self.passes_filters(&event) {
            self.counters.lock().filtered += 1;
            debug!(event_type = %event.event_type, "Event dropped by bus filter");
            return Ok(PublishReport {
                filtered: true,
                ..PublishReport::default()
            });
        }

        let pipeline: Vec<Arc<dyn EventMiddleware>> = self.middleware.read().clone();
        for middleware in pipeline {
            if middleware.process(&mut event).await == MiddlewareAction::Stop {
                self.counters.lock().stopped_by_middleware += 1;
                debug!(
                    event_type = %event.event_type,
                    middleware = middleware.name(),
                    "Event stopped by middleware"
                );
                return Ok(PublishReport {
                    stopped_by: Some(middleware.name().to_string()),
                    ..PublishReport::default()
                });
            }
        }

        self.record(&event).await;

        let (delivered, failures) = self.dispatch(&event).await;
        let report = PublishReport {
            delivered,
            failed: failures.len(),
            ..PublishReport::default()
        };

        for failure in failures {
            self.handle_failure(&event, failure).await;
        }

        Ok(report)
    }

    fn passes_filters(&self, event: &Event) -> bool {
        let filters = self.filters.read();
        filters
            .iter()
            .filter(|(pattern, _)| matches_pattern(&event.event_type, pattern))
            .all(|(_, list)| list.iter().all(|f| f(event)))
    }

    async fn record(&self, event: &Event) {
        if self.config.enable_history && self.config.history_limit > 0 {
            let mut history = self.history.lock();
            history.push_back(event.clone());
            while history.len() > self.config.history_limit {
                history.pop_front();
            }
        }

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(event).await {
                warn!(event_id = %event.event_id, error = %e, "Failed to persist event");
            }
        }
    }

    /// Subscriptions that should receive `event`, in dispatch order.
    /// One-shot subscriptions are removed in the same critical section.
    fn take_matching(&self, event: &Event) -> Vec<Subscription> {
        let mut subscriptions = self.subscriptions.write();
        let mut matching: Vec<Subscription> = subscriptions
            .iter()
            .filter(|s| s.accepts(event))
            .cloned()
            .collect();

        if matching.iter().any(|s| s.options.once) {
            let once_ids: Vec<SubscriptionId> = matching
                .iter()
                .filter(|s| s.options.once)
                .map(|s| s.id)
                .collect();
            subscriptions.retain(|s| !once_ids.contains(&s.id));
        }

        matching.sort_by(|a, b| {
            b.options
                .priority
                .cmp(&a.options.priority)
                .then(a.seq.cmp(&b.seq))
        });
        matching
    }

    /// Returns the number of successful deliveries and the failures.
    async fn dispatch(&self, event: &Event) -> (usize, Vec<Failure>) {
        let matching = self.take_matching(event);

        let mut delivered = 0;
        let mut failures = Vec::new();
        for subscription in matching {
            match Self::deliver(&subscription, event).await {
                Ok(()) => {
                    self.counters.lock().delivered += 1;
                    delivered += 1;
                }
                Err(error) => {
                    self.counters.lock().failed += 1;
                    warn!(
                        subscription_id = %subscription.id,
                        event_type = %event.event_type,
                        error = %error,
                        "Event listener failed"
                    );
                    failures.push(Failure {
                        subscription,
                        error,
                    });
                }
            }
        }
        (delivered, failures)
    }

    async fn deliver(subscription: &Subscription, event: &Event) -> Result<(), ListenerError> {
        let delivery = AssertUnwindSafe(subscription.listener.on_event(event))
            .catch_unwind()
            .map(|outcome| outcome.unwrap_or_else(|payload| Err(panic_failure(payload))));

        match subscription.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, delivery).await {
                Ok(result) => result,
                Err(_) => Err(ListenerError::Timeout(limit)),
            },
            None => delivery.await,
        }
    }

    async fn handle_failure(&self, event: &Event, failure: Failure) {
        if event.is_diagnostic() {
            return;
        }

        if failure.error.is_retryable() && failure.subscription.options.retries > 0 {
            self.enqueue_retry(failure.subscription.clone(), event.clone(), 1);
        }

        let diagnostic = Event {
            execution_id: event.execution_id,
            stage: event.stage.clone(),
            ..Event::new(events::LISTENER_FAILED)
        }
        .with_data(json!({
            "failed_event_id": event.event_id,
            "failed_event_type": event.event_type,
            "subscription_id": failure.subscription.id.to_string(),
            "error": failure.error.to_string(),
            "retryable": failure.error.is_retryable(),
        }));

        self.record(&diagnostic).await;
        let (_, nested_failures) = self.dispatch(&diagnostic).await;
        for nested in nested_failures {
            error!(
                subscription_id = %nested.subscription.id,
                error = %nested.error,
                "Diagnostic listener failed"
            );
        }
    }

    fn enqueue_retry(&self, subscription: Subscription, event: Event, attempts: u32) {
        let due = Instant::now() + self.config.retry_policy.delay_for_attempt(attempts);
        debug!(
            subscription_id = %subscription.id,
            event_type = %event.event_type,
            attempts,
            "Queued listener retry"
        );
        self.retry_queue.lock().push_back(PendingRetry {
            subscription,
            event,
            attempts,
            due,
        });
    }

    /// Redeliver every queued retry whose backoff has elapsed. Returns how many succeeded.
    pub async fn process_retries(&self) -> usize {
        let now = Instant::now();
        let due: Vec<PendingRetry> = {
            let mut queue = self.retry_queue.lock();
            let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
                queue.drain(..).partition(|r| r.due <= now);
            *queue = waiting;
            ready.into_iter().collect()
        };

        let mut succeeded = 0;
        for retry in due {
            self.counters.lock().retried += 1;
            match Self::deliver(&retry.subscription, &retry.event).await {
                Ok(()) => {
                    self.counters.lock().delivered += 1;
                    succeeded += 1;
                    debug!(
                        subscription_id = %retry.subscription.id,
                        attempts = retry.attempts,
                        "Listener retry succeeded"
                    );
                }
                Err(e) => {
                    self.counters.lock().failed += 1;
                    let attempts = retry.attempts + 1;
                    if e.is_retryable() && retry.attempts < retry.subscription.options.retries {
                        self.enqueue_retry(retry.subscription, retry.event, attempts);
                    } else {
                        error!(
                            subscription_id = %retry.subscription.id,
                            event_type = %retry.event.event_type,
                            attempts,
                            error = %e,
                            "Listener retries exhausted"
                        );
                    }
                }
            }
        }
        succeeded
    }

    pub fn pending_retries(&self) -> usize {
        self.retry_queue.lock().len()
    }

    /// Drain the retry queue on `retry_interval_ms` until [`Self::shutdown`] is called.
    pub fn spawn_retry_processor(self: &Arc<Self>) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        let interval = self.config.retry_interval();
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "🔁 Event retry processor started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        bus.process_retries().await;
                    }
                }
            }
            info!("🔁 Event retry processor stopped");
        })
    }

    /// Most recent events, oldest first. `None` returns the whole ring.
    pub fn history(&self, limit: Option<usize>) -> Vec<Event> {
        let history = self.history.lock();
        let skip = limit.map_or(0, |l| history.len().saturating_sub(l));
        history.iter().skip(skip).cloned().collect()
    }

    pub fn history_matching(&self, query: &EventQuery) -> Vec<Event> {
        query.apply(self.history.lock().iter())
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Redeliver stored events matching `query` to current subscribers.
    ///
    /// Reads from the persistence collaborator when present, else from history.
    /// Replayed events are not recorded again.
    pub async fn replay(&self, query: &EventQuery) -> Result<usize, EventBusError> {
        let events = match &self.persistence {
            Some(persistence) => persistence.load(query).await?,
            None => self.history_matching(query),
        };

        info!(count = events.len(), "Replaying events");
        for event in &events {
            let (_, failures) = self.dispatch(event).await;
            for failure in failures {
                warn!(
                    event_id = %event.event_id,
                    subscription_id = %failure.subscription.id,
                    error = %failure.error,
                    "Listener failed during replay"
                );
            }
        }
        Ok(events.len())
    }

    pub fn stats(&self) -> EventBusStats {
        let counters = self.counters.lock();
        EventBusStats {
            total_events: counters.total_events,
            delivered: counters.delivered,
            failed: counters.failed,
            filtered: counters.filtered,
            stopped_by_middleware: counters.stopped_by_middleware,
            retried: counters.retried,
            pending_retries: self.retry_queue.lock().len(),
            subscriptions: self.subscriptions.read().len(),
            history_size: self.history.lock().len(),
            by_type: counters.by_type.clone(),
        }
    }

    /// Stop the retry processor, drop every subscription and pending retry.
    /// Further publishes fail with [`EventBusError::ShutDown`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.subscriptions.write().clear();
        self.retry_queue.lock().clear();
        info!("Event bus shut down");
    }
}

fn panic_failure(payload: Box<dyn Any + Send>) -> ListenerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    ListenerError::Failed(format!("listener panicked: {message}"))
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
