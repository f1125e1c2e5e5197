//! Unified event bus — trait for emitting analytics events from the engine.
//!
//! The engine accepts an `Arc<dyn EventSink>` and forwards assignments,
//! exposures, interactions and conversions through it. Sinks must never
//! fail the caller; delivery is best-effort.

use crate::types::{AnalyticsEvent, EventType};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Trait for emitting analytics events. Implementations route events to a
/// batching file writer, the tracing log, or an external collector.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// Discards every event. Engines start with this until a sink is attached.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: AnalyticsEvent) {}
}

/// Keeps every emitted event in memory so tests can assert on the
/// assignment, exposure and conversion stream.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().expect("capture sink lock poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("capture sink lock poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("capture sink lock poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("capture sink lock poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: AnalyticsEvent) {
        self.events.lock().expect("capture sink lock poisoned").push(event);
    }
}

/// Build an event for one experiment and visitor. Goal, interaction, value
/// and metadata are left empty for the caller to fill in.
pub fn make_event(
    event_type: EventType,
    experiment_id: impl Into<String>,
    visitor_id: impl Into<String>,
    variant_id: Option<String>,
) -> AnalyticsEvent {
    AnalyticsEvent {
        event_id: Uuid::new_v4(),
        event_type,
        experiment_id: experiment_id.into(),
        variant_id,
        visitor_id: visitor_id.into(),
        goal_name: None,
        interaction_type: None,
        value: None,
        metadata: serde_json::Map::new(),
        timestamp: Utc::now(),
    }
}

/// Shared discard sink; every engine starts with it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Shared capture sink, cloneable into an engine and kept for assertions.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
