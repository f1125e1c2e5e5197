//! Per-variant aggregation of assignments and conversions.

use chrono::{DateTime, Utc};
use splitline_core::types::{
    AssignmentRecord, ConversionRecord, Experiment, ExperimentResults, VariantResults,
};
use std::collections::BTreeMap;

/// Aggregate persisted records into results. Conversions for variants the
/// experiment does not declare are ignored.
pub fn aggregate<'a>(
    experiment: &Experiment,
    assignments: impl IntoIterator<Item = &'a AssignmentRecord>,
    conversions: impl IntoIterator<Item = &'a ConversionRecord>,
    computed_at: DateTime<Utc>,
) -> ExperimentResults {
    let mut variants: Vec<VariantResults> = experiment
        .variants
        .iter()
        .map(|v| VariantResults {
            variant_id: v.id.clone(),
            variant_name: v.name.clone(),
            visitors: 0,
            conversions: experiment.goals.iter().map(|g| (g.clone(), 0)).collect(),
            conversion_rates: BTreeMap::new(),
            total_conversions: 0,
            total_value: 0.0,
        })
        .collect();

    let mut excluded = 0u64;
    for record in assignments {
        match record {
            AssignmentRecord::Participating { variant_id, .. } => {
                if let Some(v) = slot(experiment, &mut variants, variant_id) {
                    v.visitors += 1;
                }
            }
            AssignmentRecord::Excluded { .. } => excluded += 1,
        }
    }

    for conversion in conversions {
        let Some(v) = slot(experiment, &mut variants, &conversion.variant_id) else {
            continue;
        };
        *v.conversions
            .entry(conversion.goal_name.clone())
            .or_insert(0) += 1;
        v.total_conversions += 1;
        v.total_value += conversion.value.unwrap_or(0.0);
    }

    for v in &mut variants {
        let visitors = v.visitors;
        v.conversion_rates = v
            .conversions
            .iter()
            .map(|(goal, count)| {
                let rate = if visitors > 0 {
                    *count as f64 / visitors as f64
                } else {
                    0.0
                };
                (goal.clone(), rate)
            })
            .collect();
    }

    ExperimentResults {
        experiment_id: experiment.id.clone(),
        experiment_name: experiment.name.clone(),
        total_visitors: variants.iter().map(|v| v.visitors).sum(),
        excluded_visitors: excluded,
        variants,
        computed_at,
    }
}

/// Results row for `variant_id`, or `None` when the experiment no longer
/// declares that variant.
fn slot<'v>(
    experiment: &Experiment,
    variants: &'v mut [VariantResults],
    variant_id: &str,
) -> Option<&'v mut VariantResults> {
    experiment.variant(variant_id)?;
    variants.iter_mut().find(|v| v.variant_id == variant_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use splitline_core::types::Variant;

    fn experiment() -> Experiment {
        Experiment {
            id: "btn-color".into(),
            name: "Button color".into(),
            description: String::new(),
            variants: vec![Variant::new("v0", "Blue"), Variant::new("v1", "Orange")],
            traffic_allocation: 50,
            target_pages: vec!["/".into()],
            goals: vec!["signup".into(), "click".into()],
            created_at: Utc::now(),
        }
    }

    fn participating(variant: &str) -> AssignmentRecord {
        AssignmentRecord::Participating {
            variant_id: variant.into(),
            assigned_at: Utc::now(),
        }
    }

    fn conversion(variant: &str, goal: &str, value: Option<f64>) -> ConversionRecord {
        ConversionRecord {
            experiment_id: "btn-color".into(),
            goal_name: goal.into(),
            variant_id: variant.into(),
            visitor_id: "visitor".into(),
            value,
            metadata: Default::default(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_rates_per_goal() {
        let assignments = vec![
            participating("v0"),
            participating("v0"),
            participating("v1"),
            AssignmentRecord::Excluded {
                decided_at: Utc::now(),
            },
        ];
        let conversions = vec![
            conversion("v0", "signup", Some(10.0)),
            conversion("v1", "signup", None),
            conversion("v1", "signup", Some(5.0)),
            conversion("v1", "click", None),
        ];

        let results = aggregate(&experiment(), &assignments, &conversions, Utc::now());
        assert_eq!(results.total_visitors, 3);
        assert_eq!(results.excluded_visitors, 1);

        let v0 = results.variant("v0").unwrap();
        assert_eq!(v0.visitors, 2);
        assert_eq!(v0.conversions["signup"], 1);
        assert_eq!(v0.conversions["click"], 0);
        assert!((v0.conversion_rates["signup"] - 0.5).abs() < f64::EPSILON);
        assert!((v0.total_value - 10.0).abs() < f64::EPSILON);

        let v1 = results.variant("v1").unwrap();
        assert_eq!(v1.conversions["signup"], 2);
        assert_eq!(v1.total_conversions, 3);
        assert!((v1.conversion_rates["signup"] - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_experiment_has_zero_rates() {
        let results = aggregate(
            &experiment(),
            &Vec::<AssignmentRecord>::new(),
            &Vec::<ConversionRecord>::new(),
            Utc::now(),
        );
        assert_eq!(results.variants.len(), 2);
        for v in &results.variants {
            assert_eq!(v.visitors, 0);
            assert_eq!(v.conversion_rates["signup"], 0.0);
        }
    }

    #[test]
    fn test_unknown_variant_is_ignored() {
        let assignments = vec![participating("v9")];
        let conversions = vec![conversion("v9", "signup", None)];
        let results = aggregate(&experiment(), &assignments, &conversions, Utc::now());
        assert_eq!(results.total_visitors, 0);
        assert!(results.variants.iter().all(|v| v.total_conversions == 0));
    }
}
