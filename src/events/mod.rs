//! # Event System
//!
//! In-process publish/subscribe for workflow, stage and module lifecycle events.
//!
//! ```rust
//! use mplp_core::events::{listener_fn, Event, EventBus, EventBusConfig, SubscriptionOptions};
//!
//! tokio_test::block_on(async {
//!     let bus = EventBus::new(EventBusConfig::default());
//!     bus.subscribe(
//!         "stage_*",
//!         listener_fn(|event| async move {
//!             println!("{} {:?}", event.event_type, event.stage);
//!             Ok(())
//!         }),
//!         SubscriptionOptions::default(),
//!     );
//!
//!     let report = bus
//!         .publish(Event::new("stage_completed").with_stage("plan"))
//!         .await
//!         .unwrap();
//!     assert_eq!(report.delivered, 1);
//! });
//! ```

pub mod bus;
pub mod listener;
pub mod middleware;
pub mod persistence;
pub mod types;

// Re-export key types for convenience
pub use bus::{EventBus, EventBusConfig, EventBusStats, PublishReport};
pub use listener::{
    listener_fn, EventFilter, EventListener, FnListener, SubscriptionId, SubscriptionOptions,
};
pub use middleware::{EventLoggingMiddleware, EventMiddleware, FnMiddleware, MiddlewareAction};
pub use persistence::{EventPersistence, InMemoryEventPersistence};
pub use types::{matches_pattern, Event, EventQuery};
