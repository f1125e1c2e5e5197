use crate::error::{SplitlineError, SplitlineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ─── Experimentation ────────────────────────────────────────────────────

/// One treatment arm of an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
        }
    }
}

/// Experiment definition as supplied by configuration or the sample-data
/// bootstrap. Validated by the engine before it is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub variants: Vec<Variant>,
    /// Percentage of eligible visitors who participate. Valid range 0–100.
    #[serde(deserialize_with = "deserialize_allocation")]
    pub traffic_allocation: u32,
    #[serde(default)]
    pub target_pages: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
}

impl ExperimentConfig {
    /// Parse a JSON document holding one definition or an array of them.
    pub fn parse_definitions(raw: &str) -> SplitlineResult<Vec<Self>> {
        let invalid = |e: serde_json::Error| {
            SplitlineError::configuration(format!("invalid experiment definition: {e}"))
        };
        let value: serde_json::Value = serde_json::from_str(raw).map_err(invalid)?;
        if value.is_array() {
            serde_json::from_value(value).map_err(invalid)
        } else {
            serde_json::from_value(value).map(|c| vec![c]).map_err(invalid)
        }
    }
}

/// Whole, non-negative percentages only. The upper bound is checked when the
/// engine validates the definition.
fn deserialize_allocation<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw.fract() != 0.0 || raw < 0.0 || raw > f64::from(u32::MAX) {
        return Err(serde::de::Error::custom(format!(
            "trafficAllocation must be an integer from 0 to 100, got {raw}"
        )));
    }
    Ok(raw as u32)
}

/// A registered A/B/n experiment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub description: String,
    pub variants: Vec<Variant>,
    pub traffic_allocation: u32,
    pub target_pages: Vec<String>,
    pub goals: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    pub fn from_config(config: ExperimentConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            id: config.id,
            name: config.name,
            description: config.description,
            variants: config.variants,
            traffic_allocation: config.traffic_allocation,
            target_pages: config.target_pages,
            goals: config.goals,
            created_at,
        }
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn has_goal(&self, goal: &str) -> bool {
        self.goals.iter().any(|g| g == goal)
    }
}

/// Persisted outcome of bucketing one visitor into one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignmentRecord {
    #[serde(rename_all = "camelCase")]
    Participating {
        variant_id: String,
        assigned_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Excluded { decided_at: DateTime<Utc> },
}

/// A visitor's participating assignment, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub experiment_id: String,
    pub visitor_id: String,
    pub variant_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// One occurrence of a tracked goal, attributed to the visitor's variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRecord {
    pub experiment_id: String,
    pub goal_name: String,
    pub variant_id: String,
    pub visitor_id: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated per-variant outcome of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantResults {
    pub variant_id: String,
    pub variant_name: String,
    pub visitors: u64,
    pub conversions: BTreeMap<String, u64>,
    pub conversion_rates: BTreeMap<String, f64>,
    pub total_conversions: u64,
    pub total_value: f64,
}

/// Aggregated results for a whole experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResults {
    pub experiment_id: String,
    pub experiment_name: String,
    pub total_visitors: u64,
    pub excluded_visitors: u64,
    pub variants: Vec<VariantResults>,
    pub computed_at: DateTime<Utc>,
}

impl ExperimentResults {
    pub fn variant(&self, variant_id: &str) -> Option<&VariantResults> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }
}

/// Full dump of definitions and results, offered as a downloadable file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentExport {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub experiments: Vec<Experiment>,
    pub results: Vec<ExperimentResults>,
}

// ─── Analytics ──────────────────────────────────────────────────────────

/// Structured event forwarded to the analytics collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub experiment_id: String,
    pub variant_id: Option<String>,
    pub visitor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ExperimentAssignment,
    ExperimentExposure,
    ExperimentInteraction,
    ExperimentConversion,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_record_wire_format() {
        let record = AssignmentRecord::Participating {
            variant_id: "v1".into(),
            assigned_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "participating");
        assert_eq!(json["variantId"], "v1");

        let excluded: AssignmentRecord =
            serde_json::from_str(r#"{"status":"excluded","decidedAt":"2026-01-01T00:00:00Z"}"#)
                .unwrap();
        assert!(matches!(excluded, AssignmentRecord::Excluded { .. }));
    }

    #[test]
    fn test_config_defaults_optional_fields() {
        let config: ExperimentConfig = serde_json::from_str(
            r#"{"id":"btn-color","variants":[{"id":"v0"},{"id":"v1"}],"trafficAllocation":50}"#,
        )
        .unwrap();
        assert_eq!(config.variants.len(), 2);
        assert!(config.target_pages.is_empty());
        assert!(config.goals.is_empty());

        let experiment = Experiment::from_config(config, Utc::now());
        assert_eq!(experiment.variant("v1").map(|v| v.id.as_str()), Some("v1"));
        assert!(experiment.variant("v2").is_none());
        assert!(!experiment.has_goal("signup"));
    }

    #[test]
    fn test_parse_definitions_accepts_object_or_array() {
        let one = ExperimentConfig::parse_definitions(
            r#"{"id":"a","variants":[{"id":"v0"},{"id":"v1"}],"trafficAllocation":100}"#,
        )
        .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].traffic_allocation, 100);

        let many = ExperimentConfig::parse_definitions(
            r#"[{"id":"a","variants":[],"trafficAllocation":0},
                {"id":"b","variants":[],"trafficAllocation":30}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].id, "b");
    }

    #[test]
    fn test_fractional_or_negative_allocation_is_configuration_error() {
        for allocation in ["-5", "50.5"] {
            let raw = format!(
                r#"{{"id":"a","variants":[{{"id":"v0"}},{{"id":"v1"}}],"trafficAllocation":{allocation}}}"#
            );
            let err = ExperimentConfig::parse_definitions(&raw).unwrap_err();
            assert!(err.is_configuration(), "{allocation}: {err}");
            assert!(
                err.to_string().contains("integer from 0 to 100"),
                "{allocation}: {err}"
            );
        }
    }

    #[test]
    fn test_malformed_definition_is_configuration_error() {
        let err = ExperimentConfig::parse_definitions("{\"id\":").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = AnalyticsEvent {
            event_id: Uuid::new_v4(),
            event_type: EventType::ExperimentConversion,
            experiment_id: "btn-color".into(),
            variant_id: Some("v1".into()),
            visitor_id: "abc123".into(),
            goal_name: Some("signup".into()),
            interaction_type: None,
            value: None,
            metadata: Default::default(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "experiment_conversion");
        assert_eq!(json["goalName"], "signup");
        assert!(json.get("interactionType").is_none());
    }
}
