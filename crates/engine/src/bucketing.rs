//! Deterministic bucketing — maps `(experiment, visitor)` pairs onto traffic
//! buckets and variant indices without any server coordination.
//!
//! Both decisions hash the same pair under different salts so that the
//! inclusion draw and the variant draw are independent.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use splitline_core::types::{AssignmentRecord, Experiment};

const TRAFFIC_SALT: &str = "traffic";
const VARIANT_SALT: &str = "variant";

/// Hash `(salt, experiment, visitor)` to a uniformly distributed `u64`.
pub fn hash_pair(salt: &str, experiment_id: &str, visitor_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(experiment_id.as_bytes());
    hasher.update(b":");
    hasher.update(visitor_id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Traffic bucket in `[0, 100)`.
pub fn traffic_bucket(experiment_id: &str, visitor_id: &str) -> u32 {
    (hash_pair(TRAFFIC_SALT, experiment_id, visitor_id) % 100) as u32
}

/// Variant index in `[0, variant_count)`. `variant_count` must be non-zero.
pub fn variant_index(experiment_id: &str, visitor_id: &str, variant_count: usize) -> usize {
    (hash_pair(VARIANT_SALT, experiment_id, visitor_id) % variant_count as u64) as usize
}

/// Compute a fresh assignment outcome. Pure function of the experiment and
/// visitor apart from the timestamp stamped on the record.
pub fn decide(experiment: &Experiment, visitor_id: &str, now: DateTime<Utc>) -> AssignmentRecord {
    let bucket = traffic_bucket(&experiment.id, visitor_id);
    if bucket >= experiment.traffic_allocation || experiment.variants.is_empty() {
        return AssignmentRecord::Excluded { decided_at: now };
    }

    let index = variant_index(&experiment.id, visitor_id, experiment.variants.len());
    AssignmentRecord::Participating {
        variant_id: experiment.variants[index].id.clone(),
        assigned_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitline_core::types::Variant;

    fn experiment(id: &str, allocation: u32, variants: usize) -> Experiment {
        Experiment {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            variants: (0..variants)
                .map(|i| Variant::new(format!("v{i}"), format!("Variant {i}")))
                .collect(),
            traffic_allocation: allocation,
            target_pages: vec!["/".into()],
            goals: vec!["signup".into()],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(
            hash_pair("traffic", "btn-color", "abc123"),
            2876909222043889746
        );
        assert_eq!(traffic_bucket("btn-color", "abc123"), 46);
        assert_eq!(variant_index("btn-color", "abc123", 2), 1);
    }

    #[test]
    fn test_hash_input_is_salt_experiment_visitor() {
        let digest = Sha256::digest(b"variant:btn-color:abc123");
        let expected = u64::from_be_bytes(digest[..8].try_into().unwrap());
        assert_eq!(hash_pair("variant", "btn-color", "abc123"), expected);

        let swapped = Sha256::digest(b"btn-color:abc123:variant");
        let swapped = u64::from_be_bytes(swapped[..8].try_into().unwrap());
        assert_ne!(hash_pair("variant", "btn-color", "abc123"), swapped);
    }

    #[test]
    fn test_salts_are_independent() {
        let traffic = hash_pair(TRAFFIC_SALT, "btn-color", "abc123");
        let variant = hash_pair(VARIANT_SALT, "btn-color", "abc123");
        assert_ne!(traffic, variant);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let exp = experiment("btn-color", 50, 2);
        for i in 0..500 {
            let visitor = format!("visitor-{i}");
            let first = decide(&exp, &visitor, Utc::now());
            let second = decide(&exp, &visitor, Utc::now());
            match (first, second) {
                (
                    AssignmentRecord::Participating { variant_id: a, .. },
                    AssignmentRecord::Participating { variant_id: b, .. },
                ) => assert_eq!(a, b),
                (AssignmentRecord::Excluded { .. }, AssignmentRecord::Excluded { .. }) => {}
                other => panic!("outcome changed between calls: {other:?}"),
            }
        }
    }

    #[test]
    fn test_zero_allocation_excludes_everyone() {
        let exp = experiment("closed", 0, 2);
        for i in 0..1_000 {
            let record = decide(&exp, &format!("visitor-{i}"), Utc::now());
            assert!(matches!(record, AssignmentRecord::Excluded { .. }));
        }
    }

    #[test]
    fn test_full_allocation_includes_everyone() {
        let exp = experiment("open", 100, 3);
        for i in 0..1_000 {
            let record = decide(&exp, &format!("visitor-{i}"), Utc::now());
            assert!(matches!(record, AssignmentRecord::Participating { .. }));
        }
    }

    #[test]
    fn test_traffic_allocation_converges() {
        let population = 100_000;
        let included = (0..population)
            .filter(|i| traffic_bucket("traffic-test", &format!("visitor-{i}")) < 30)
            .count();
        let share = included as f64 / population as f64;
        assert!((share - 0.30).abs() < 0.02, "participation share {share}");
    }

    #[test]
    fn test_variant_balance() {
        let population = 100_000;
        for variants in [2usize, 3, 4] {
            let mut counts = vec![0usize; variants];
            for i in 0..population {
                counts[variant_index("balance-test", &format!("visitor-{i}"), variants)] += 1;
            }
            let expected = 1.0 / variants as f64;
            for count in counts {
                let share = count as f64 / population as f64;
                assert!(
                    (share - expected).abs() < 0.05,
                    "{variants} variants: share {share}"
                );
            }
        }
    }
}
