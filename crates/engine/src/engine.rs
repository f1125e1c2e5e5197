//! Experiment engine — registry, deterministic assignment, page targeting
//! and conversion attribution for one visitor.
//!
//! Only configuration mistakes are reported to callers. Storage failures
//! during assignment or tracking are logged and degrade to "no experiment
//! applied" so an experiment can never break the page it is embedded in.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use splitline_core::config::EngineConfig;
use splitline_core::event_bus::{make_event, noop_sink, EventSink};
use splitline_core::types::{
    Assignment, AssignmentRecord, ConversionRecord, EventType, Experiment, ExperimentConfig,
    ExperimentExport, ExperimentResults,
};
use splitline_core::{SplitlineError, SplitlineResult};
use splitline_storage::{read_json, write_json, KeyValueStore};

use crate::keys::StoreKeys;
use crate::{bucketing, results, samples, targeting, visitor};

/// Version of the JSON export layout.
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

type Metadata = serde_json::Map<String, serde_json::Value>;

/// A/B/n experiment engine bound to one visitor.
pub struct ExperimentEngine {
    registry: Arc<RwLock<Vec<Experiment>>>,
    store: Arc<dyn KeyValueStore>,
    event_sink: Arc<dyn EventSink>,
    keys: StoreKeys,
    visitor_id: String,
}

impl ExperimentEngine {
    /// Create an engine for the visitor persisted in `store`, generating one
    /// on first use.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        let keys = StoreKeys::new(namespace);
        let visitor_id = visitor::load_or_create(store.as_ref(), &keys);
        Self::build(store, keys, visitor_id)
    }

    /// Create an engine for an explicit visitor id. The id is not written
    /// to the store.
    pub fn with_visitor(
        store: Arc<dyn KeyValueStore>,
        namespace: impl Into<String>,
        visitor_id: impl Into<String>,
    ) -> Self {
        Self::build(store, StoreKeys::new(namespace), visitor_id.into())
    }

    /// Create an engine from configuration, registering the sample
    /// experiments when `seed_sample_data` is set.
    pub fn from_config(config: &EngineConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let engine = match &config.visitor_id {
            Some(id) => Self::with_visitor(store, config.namespace.clone(), id.clone()),
            None => Self::new(store, config.namespace.clone()),
        };
        if config.seed_sample_data {
            engine.seed_sample_experiments();
        }
        engine
    }

    fn build(store: Arc<dyn KeyValueStore>, keys: StoreKeys, visitor_id: String) -> Self {
        let experiments = match read_json::<Vec<Experiment>>(store.as_ref(), &keys.experiments()) {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to load experiment registry, starting empty");
                Vec::new()
            }
        };

        info!(
            namespace = keys.namespace(),
            visitor_id = %visitor_id,
            experiments = experiments.len(),
            "Experiment engine initialized"
        );

        Self {
            registry: Arc::new(RwLock::new(experiments)),
            store,
            event_sink: noop_sink(),
            keys,
            visitor_id,
        }
    }

    /// Attach an event sink for forwarding analytics events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// An engine for another visitor sharing this engine's registry, store
    /// and sink. Used for server-side evaluation and simulations.
    pub fn for_visitor(&self, visitor_id: impl Into<String>) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            event_sink: Arc::clone(&self.event_sink),
            keys: self.keys.clone(),
            visitor_id: visitor_id.into(),
        }
    }

    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    // ─── Registry ──────────────────────────────────────────────────────────

    /// Validate and register an experiment.
    pub fn create_experiment(&self, config: ExperimentConfig) -> SplitlineResult<Experiment> {
        validate(&config)?;

        let mut registry = self.registry.write();
        if registry.iter().any(|e| e.id == config.id) {
            return Err(SplitlineError::configuration(format!(
                "experiment '{}' already exists",
                config.id
            )));
        }

        let experiment = Experiment::from_config(config, Utc::now());
        registry.push(experiment.clone());

        if let Err(e) = write_json(self.store.as_ref(), &self.keys.experiments(), &*registry) {
            warn!(experiment_id = %experiment.id, error = %e, "Failed to persist experiment registry");
        }

        info!(
            experiment_id = %experiment.id,
            variants = experiment.variants.len(),
            traffic_allocation = experiment.traffic_allocation,
            "Experiment created"
        );
        Ok(experiment)
    }

    /// Register the sample experiments that are not registered yet.
    /// Returns how many were added.
    pub fn seed_sample_experiments(&self) -> usize {
        let mut added = 0;
        for config in samples::sample_experiments() {
            if self.experiment(&config.id).is_some() {
                continue;
            }
            match self.create_experiment(config) {
                Ok(_) => added += 1,
                Err(e) => warn!(error = %e, "Failed to seed sample experiment"),
            }
        }
        added
    }

    /// All registered experiments in creation order.
    pub fn experiments(&self) -> Vec<Experiment> {
        self.registry.read().clone()
    }

    pub fn experiment(&self, experiment_id: &str) -> Option<Experiment> {
        self.registry
            .read()
            .iter()
            .find(|e| e.id == experiment_id)
            .cloned()
    }

    /// Experiments whose target pages match `path`, in creation order.
    pub fn active_experiments_for_page(&self, path: &str) -> Vec<Experiment> {
        self.registry
            .read()
            .iter()
            .filter(|e| targeting::matches_any(&e.target_pages, path))
            .cloned()
            .collect()
    }

    // ─── Assignment ────────────────────────────────────────────────────────

    /// Assign the visitor to a variant, reusing the persisted outcome when
    /// one exists. Returns `None` when the visitor is excluded, the
    /// experiment is unknown, or storage is unavailable.
    pub fn assign(&self, experiment_id: &str) -> Option<Assignment> {
        let Some(experiment) = self.experiment(experiment_id) else {
            debug!(experiment_id, "Assignment requested for unknown experiment");
            return None;
        };

        match self.try_assign(&experiment) {
            Ok(assignment) => assignment,
            Err(e) => {
                warn!(experiment_id, error = %e, "Assignment failed, no experiment applied");
                None
            }
        }
    }

    fn try_assign(&self, experiment: &Experiment) -> SplitlineResult<Option<Assignment>> {
        let key = self.keys.assignment(&experiment.id, &self.visitor_id);
        if let Some(record) = read_json::<AssignmentRecord>(self.store.as_ref(), &key)? {
            return Ok(self.to_assignment(&experiment.id, record));
        }

        let record = bucketing::decide(experiment, &self.visitor_id, Utc::now());
        write_json(self.store.as_ref(), &key, &record)?;

        match &record {
            AssignmentRecord::Participating { variant_id, .. } => {
                metrics::counter!("engine.assignments").increment(1);
                debug!(
                    experiment_id = %experiment.id,
                    visitor_id = %self.visitor_id,
                    variant_id = %variant_id,
                    "Visitor assigned"
                );
                self.event_sink.emit(make_event(
                    EventType::ExperimentAssignment,
                    experiment.id.clone(),
                    self.visitor_id.clone(),
                    Some(variant_id.clone()),
                ));
            }
            AssignmentRecord::Excluded { .. } => {
                metrics::counter!("engine.exclusions").increment(1);
                debug!(
                    experiment_id = %experiment.id,
                    visitor_id = %self.visitor_id,
                    "Visitor excluded by traffic allocation"
                );
            }
        }

        Ok(self.to_assignment(&experiment.id, record))
    }

    /// The persisted participating assignment, without creating one.
    pub fn user_variant(&self, experiment_id: &str) -> Option<Assignment> {
        let key = self.keys.assignment(experiment_id, &self.visitor_id);
        match read_json::<AssignmentRecord>(self.store.as_ref(), &key) {
            Ok(record) => record.and_then(|r| self.to_assignment(experiment_id, r)),
            Err(e) => {
                warn!(experiment_id, error = %e, "Failed to read assignment");
                None
            }
        }
    }

    fn to_assignment(&self, experiment_id: &str, record: AssignmentRecord) -> Option<Assignment> {
        match record {
            AssignmentRecord::Participating {
                variant_id,
                assigned_at,
            } => Some(Assignment {
                experiment_id: experiment_id.to_string(),
                visitor_id: self.visitor_id.clone(),
                variant_id,
                assigned_at,
            }),
            AssignmentRecord::Excluded { .. } => None,
        }
    }

    /// Re-evaluate the experiments active on `path`: assign the visitor
    /// where needed and emit an exposure per participating experiment.
    pub fn evaluate_page(&self, path: &str) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        for experiment in self.active_experiments_for_page(path) {
            let Some(assignment) = self.assign(&experiment.id) else {
                continue;
            };

            let mut event = make_event(
                EventType::ExperimentExposure,
                experiment.id.clone(),
                self.visitor_id.clone(),
                Some(assignment.variant_id.clone()),
            );
            event
                .metadata
                .insert("path".into(), serde_json::Value::String(path.to_string()));
            self.event_sink.emit(event);

            assignments.push(assignment);
        }
        assignments
    }

    // ─── Tracking ──────────────────────────────────────────────────────────

    /// Record a conversion for a declared goal. A no-op when the
    /// experiment is unknown, the goal is undeclared, or the visitor does
    /// not participate.
    pub fn track_conversion(
        &self,
        experiment_id: &str,
        goal_name: &str,
        value: Option<f64>,
        metadata: Metadata,
    ) -> Option<ConversionRecord> {
        let Some(experiment) = self.experiment(experiment_id) else {
            warn!(experiment_id, goal_name, "Conversion for unknown experiment ignored");
            return None;
        };
        if !experiment.has_goal(goal_name) {
            warn!(experiment_id, goal_name, "Conversion for undeclared goal ignored");
            return None;
        }
        let Some(assignment) = self.user_variant(experiment_id) else {
            debug!(experiment_id, goal_name, "Conversion without assignment ignored");
            return None;
        };

        let record = ConversionRecord {
            experiment_id: experiment_id.to_string(),
            goal_name: goal_name.to_string(),
            variant_id: assignment.variant_id,
            visitor_id: self.visitor_id.clone(),
            value,
            metadata,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.append_conversion(&record) {
            warn!(experiment_id, goal_name, error = %e, "Failed to persist conversion");
            return None;
        }
        metrics::counter!("engine.conversions").increment(1);

        let mut event = make_event(
            EventType::ExperimentConversion,
            record.experiment_id.clone(),
            record.visitor_id.clone(),
            Some(record.variant_id.clone()),
        );
        event.goal_name = Some(record.goal_name.clone());
        event.value = record.value;
        event.metadata = record.metadata.clone();
        event.timestamp = record.timestamp;
        self.event_sink.emit(event);

        info!(
            experiment_id,
            goal_name,
            variant_id = %record.variant_id,
            "Conversion tracked"
        );
        Some(record)
    }

    fn append_conversion(&self, record: &ConversionRecord) -> SplitlineResult<()> {
        let key = self
            .keys
            .conversions(&record.experiment_id, &self.visitor_id);
        let mut log: Vec<ConversionRecord> =
            read_json(self.store.as_ref(), &key)?.unwrap_or_default();
        log.push(record.clone());
        write_json(self.store.as_ref(), &key, &log)
    }

    /// Forward a UI interaction attributed to the visitor's variant.
    /// Nothing is persisted. Returns whether an event was emitted.
    pub fn track_interaction(
        &self,
        experiment_id: &str,
        interaction_type: &str,
        metadata: Metadata,
    ) -> bool {
        let Some(assignment) = self.user_variant(experiment_id) else {
            debug!(experiment_id, interaction_type, "Interaction without assignment ignored");
            return false;
        };

        let mut event = make_event(
            EventType::ExperimentInteraction,
            experiment_id,
            self.visitor_id.clone(),
            Some(assignment.variant_id),
        );
        event.interaction_type = Some(interaction_type.to_string());
        event.metadata = metadata;
        self.event_sink.emit(event);
        true
    }

    // ─── Results ───────────────────────────────────────────────────────────

    /// Aggregate every persisted assignment and conversion for an experiment.
    pub fn results(&self, experiment_id: &str) -> Option<ExperimentResults> {
        let experiment = self.experiment(experiment_id)?;
        match self.collect_results(&experiment) {
            Ok(results) => Some(results),
            Err(e) => {
                warn!(experiment_id, error = %e, "Failed to compute results");
                None
            }
        }
    }

    fn collect_results(&self, experiment: &Experiment) -> SplitlineResult<ExperimentResults> {
        let store = self.store.as_ref();

        let mut assignments = Vec::new();
        for key in store.keys_with_prefix(&self.keys.assignment_prefix(&experiment.id))? {
            match read_json::<AssignmentRecord>(store, &key) {
                Ok(Some(record)) => assignments.push(record),
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable assignment"),
            }
        }

        let mut conversions = Vec::new();
        for key in store.keys_with_prefix(&self.keys.conversions_prefix(&experiment.id))? {
            match read_json::<Vec<ConversionRecord>>(store, &key) {
                Ok(Some(log)) => conversions.extend(log),
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable conversion log"),
            }
        }

        Ok(results::aggregate(
            experiment,
            &assignments,
            &conversions,
            Utc::now(),
        ))
    }

    /// Definitions and results of every experiment.
    pub fn export(&self) -> ExperimentExport {
        let experiments = self.experiments();
        let results = experiments
            .iter()
            .filter_map(|e| self.results(&e.id))
            .collect();
        ExperimentExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: Utc::now(),
            experiments,
            results,
        }
    }

    pub fn export_json(&self) -> SplitlineResult<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }
}

/// Reject definitions the engine cannot bucket.
fn validate(config: &ExperimentConfig) -> SplitlineResult<()> {
    let id = config.id.trim();
    if id.is_empty() {
        return Err(SplitlineError::configuration("experiment id is required"));
    }
    if id != config.id || id.contains(':') {
        return Err(SplitlineError::configuration(format!(
            "experiment id '{}' must not contain whitespace padding or ':'",
            config.id
        )));
    }
    if config.variants.len() < 2 {
        return Err(SplitlineError::configuration(format!(
            "experiment '{id}' needs at least 2 variants, got {}",
            config.variants.len()
        )));
    }
    for (i, variant) in config.variants.iter().enumerate() {
        if variant.id.trim().is_empty() {
            return Err(SplitlineError::configuration(format!(
                "experiment '{id}' variant {i} has no id"
            )));
        }
        if config.variants[..i].iter().any(|v| v.id == variant.id) {
            return Err(SplitlineError::configuration(format!(
                "experiment '{id}' has duplicate variant '{}'",
                variant.id
            )));
        }
    }
    if config.traffic_allocation > 100 {
        return Err(SplitlineError::configuration(format!(
            "experiment '{id}' traffic allocation {} is outside 0-100",
            config.traffic_allocation
        )));
    }
    Ok(())
}
