//! Sink that writes analytics events into the structured log instead of a
//! collector. Used when the batch logger is disabled.

use splitline_core::event_bus::EventSink;
use splitline_core::types::AnalyticsEvent;
use tracing::info;

pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: AnalyticsEvent) {
        info!(
            target: "splitline::analytics",
            event_type = ?event.event_type,
            experiment_id = %event.experiment_id,
            variant_id = event.variant_id.as_deref().unwrap_or(""),
            visitor_id = %event.visitor_id,
            goal_name = event.goal_name.as_deref().unwrap_or(""),
            interaction_type = event.interaction_type.as_deref().unwrap_or(""),
            "analytics event"
        );
    }
}

/// Forwards every event to each wrapped sink.
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: AnalyticsEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
