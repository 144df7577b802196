//! Event payloads and queries.

use crate::constants::events;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single lifecycle or business event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: String,
    pub execution_id: Option<Uuid>,
    pub stage: Option<String>,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            execution_id: None,
            stage: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Diagnostic events describe listener failures and never trigger further diagnostics.
    pub fn is_diagnostic(&self) -> bool {
        self.event_type == events::LISTENER_FAILED
    }
}

/// Selection criteria for history and persistence lookups. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub execution_id: Option<Uuid>,
    pub stage: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(event_type) = &self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(execution_id) = self.execution_id {
            if event.execution_id != Some(execution_id) {
                return false;
            }
        }
        if let Some(stage) = &self.stage {
            if event.stage.as_deref() != Some(stage.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }

    /// Keep matching events, oldest first, truncated to the most recent `limit`.
    pub fn apply<'a, I>(&self, events: I) -> Vec<Event>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut selected: Vec<Event> = events
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        if let Some(limit) = self.limit {
            if selected.len() > limit {
                let excess = selected.len() - limit;
                selected.drain(..excess);
            }
        }
        selected
    }
}

/// Wildcard match: `*` matches everything, `prefix*` and `*suffix` match by affix.
pub fn matches_pattern(event_type: &str, pattern: &str) -> bool {
    if pattern == "*" {
        true
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        event_type.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        event_type.ends_with(suffix)
    } else {
        event_type == pattern
    }
}
