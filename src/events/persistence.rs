//! Event persistence collaborator.
//!
//! The bus never requires persistence; when one is supplied every published
//! event is handed to [`EventPersistence::save`] and replays read from it.

use super::types::{Event, EventQuery};
use crate::error::EventBusError;
use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait EventPersistence: Send + Sync {
    async fn save(&self, event: &Event) -> Result<(), EventBusError>;

    async fn load(&self, query: &EventQuery) -> Result<Vec<Event>, EventBusError>;

    /// Returns `true` when an event was removed.
    async fn remove(&self, event_id: Uuid) -> Result<bool, EventBusError>;

    async fn clear(&self) -> Result<(), EventBusError>;
}

/// Unbounded in-process store, useful for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryEventPersistence {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventPersistence for InMemoryEventPersistence {
    async fn save(&self, event: &Event) -> Result<(), EventBusError> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn load(&self, query: &EventQuery) -> Result<Vec<Event>, EventBusError> {
        Ok(query.apply(self.events.read().iter()))
    }

    async fn remove(&self, event_id: Uuid) -> Result<bool, EventBusError> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.event_id != event_id);
        Ok(events.len() != before)
    }

    async fn clear(&self) -> Result<(), EventBusError> {
        self.events.write().clear();
        Ok(())
    }
}
