//! Experiment session — subscribes the engine to navigation, keeps the
//! assignments active on the current page, and maintains per-session
//! counters (page views, exposures, conversions, interactions).

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use splitline_core::types::Assignment;
use splitline_engine::ExperimentEngine;

use crate::navigation::{NavigationEvent, NavigationObserver};

type Metadata = serde_json::Map<String, serde_json::Value>;

/// Per-session aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub session_id: Uuid,
    pub page_views: u64,
    pub exposures: u64,
    pub conversions: u64,
    pub interactions: u64,
}

/// Binds one engine to one browsing session.
pub struct ExperimentSession {
    engine: Arc<ExperimentEngine>,
    active: DashMap<String, Assignment>,
    metrics: Mutex<SessionMetrics>,
}

impl ExperimentSession {
    pub fn new(engine: Arc<ExperimentEngine>) -> Self {
        let session_id = Uuid::new_v4();
        info!(
            session_id = %session_id,
            visitor_id = %engine.visitor_id(),
            "experiment session started"
        );
        Self {
            engine,
            active: DashMap::new(),
            metrics: Mutex::new(SessionMetrics {
                session_id,
                ..Default::default()
            }),
        }
    }

    pub fn engine(&self) -> &ExperimentEngine {
        &self.engine
    }

    /// Variant to render for an experiment on the current page.
    pub fn variant_for(&self, experiment_id: &str) -> Option<String> {
        self.active.get(experiment_id).map(|a| a.variant_id.clone())
    }

    /// Assignments active on the current page, sorted by experiment id.
    pub fn active_assignments(&self) -> Vec<Assignment> {
        let mut assignments: Vec<Assignment> =
            self.active.iter().map(|entry| entry.value().clone()).collect();
        assignments.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        assignments
    }

    /// Record a goal. Returns whether a conversion was recorded.
    pub fn track_goal(
        &self,
        experiment_id: &str,
        goal_name: &str,
        value: Option<f64>,
        metadata: Metadata,
    ) -> bool {
        let recorded = self
            .engine
            .track_conversion(experiment_id, goal_name, value, metadata)
            .is_some();
        if recorded {
            self.metrics.lock().conversions += 1;
        }
        recorded
    }

    /// Forward a UI interaction. Returns whether an event was emitted.
    pub fn track_interaction(
        &self,
        experiment_id: &str,
        interaction_type: &str,
        metadata: Metadata,
    ) -> bool {
        let emitted = self
            .engine
            .track_interaction(experiment_id, interaction_type, metadata);
        if emitted {
            self.metrics.lock().interactions += 1;
        }
        emitted
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.lock().clone()
    }
}

impl NavigationObserver for ExperimentSession {
    fn on_navigate(&self, event: &NavigationEvent) {
        let assignments = self.engine.evaluate_page(&event.path);

        self.active.clear();
        for assignment in &assignments {
            self.active
                .insert(assignment.experiment_id.clone(), assignment.clone());
        }

        {
            let mut metrics = self.metrics.lock();
            metrics.page_views += 1;
            metrics.exposures += assignments.len() as u64;
        }

        debug!(
            path = %event.path,
            kind = ?event.kind,
            active = assignments.len(),
            "experiments re-evaluated"
        );
    }
}
