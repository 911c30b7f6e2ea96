// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
The evaluator (spec §4.3): walks a flag's conditions in order and resolves a
treatment. Side-effect-free - impression creation is the caller's job, and
dependency matchers recurse back into this same function through the
`MatcherContext` handed in by the caller, never through a global.
"#]

use crate::hashing;
use crate::matchers::{Attributes, MatcherContext};
use crate::models::{ConditionType, EvaluationResult, Flag, Key};

/// `evaluate(flag, key, attributes)` from spec §4.3. `flag` is `None` when
/// storage has no definition for the requested name.
pub fn evaluate(flag: Option<&Flag>, key: &Key, attributes: Option<&Attributes>, ctx: &dyn MatcherContext) -> EvaluationResult {
    let flag = match flag {
        Some(f) => f,
        None => return EvaluationResult::control("definition not found"),
    };

    if flag.killed {
        return EvaluationResult {
            treatment: flag.default_treatment.clone(),
            label: "killed".to_string(),
            change_number: flag.change_number,
            configuration: flag.configurations.as_ref().and_then(|c| c.get(&flag.default_treatment)).cloned(),
        };
    }

    for condition in &flag.conditions {
        if condition.condition_type == ConditionType::Whitelist || condition.condition_type == ConditionType::Rollout {
            if matches_all(condition, key, attributes, ctx) {
                if let Some(treatment) = select_partition(condition, key, flag) {
                    return EvaluationResult {
                        treatment: treatment.clone(),
                        label: condition.label.clone(),
                        change_number: flag.change_number,
                        configuration: flag.configurations.as_ref().and_then(|c| c.get(&treatment)).cloned(),
                    };
                }
            }
        }
    }

    EvaluationResult {
        treatment: flag.default_treatment.clone(),
        label: "default rule".to_string(),
        change_number: flag.change_number,
        configuration: flag
            .configurations
            .as_ref()
            .and_then(|c| c.get(&flag.default_treatment))
            .cloned(),
    }
}

fn matches_all(condition: &crate::models::Condition, key: &Key, attributes: Option<&Attributes>, ctx: &dyn MatcherContext) -> bool {
    // `Combiner::And` is the only combiner spec.md defines; an empty matcher
    // list is vacuously true, matching Split's ALL_KEYS-only conditions.
    condition.matchers.iter().all(|m| m.matches(key, attributes, ctx))
}

/// Walks `condition`'s partitions in order, accumulating weights until the
/// computed bucket falls within range. A 0-weight partition can never be
/// selected and is simply skipped over (spec §4.3: "tie-break when weights
/// are 0 is irrelevant").
fn select_partition<'a>(condition: &'a crate::models::Condition, key: &Key, flag: &Flag) -> Option<&'a String> {
    let bucket = hashing::bucket(&key.bucketing_key, flag.seed, flag.algo);
    let mut accumulated = 0u32;
    for partition in &condition.partitions {
        accumulated += partition.size;
        if bucket <= accumulated {
            return Some(&partition.treatment);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Combiner, Condition, ConditionType, FlagStatus, HashAlgorithm, Partition};
    use std::collections::HashMap as StdHashMap;

    struct NoopContext;
    impl MatcherContext for NoopContext {
        fn segment_contains(&self, _segment_name: &str, _matching_key: &str) -> bool {
            false
        }
        fn evaluate_flag(&self, _flag_name: &str, _key: &Key, _attributes: Option<&Attributes>) -> EvaluationResult {
            EvaluationResult::control("exception")
        }
    }

    fn rollout_flag(partitions: Vec<(&str, u32)>) -> Flag {
        Flag {
            name: "f1".to_string(),
            traffic_type_name: "user".to_string(),
            seed: 42,
            algo: HashAlgorithm::Murmur3_32,
            status: FlagStatus::Active,
            killed: false,
            default_treatment: "off".to_string(),
            change_number: 123,
            configurations: None,
            conditions: vec![Condition {
                label: "in segment all".to_string(),
                condition_type: ConditionType::Rollout,
                combiner: Combiner::And,
                matchers: vec![crate::matchers::Matcher::new(crate::matchers::MatcherKind::AllKeys)],
                partitions: partitions
                    .into_iter()
                    .map(|(t, s)| Partition { treatment: t.to_string(), size: s })
                    .collect(),
            }],
        }
    }

    #[test]
    fn null_flag_returns_control_definition_not_found() {
        let r = evaluate(None, &Key::new("u1"), None, &NoopContext);
        assert_eq!(r.treatment, "control");
        assert_eq!(r.label, "definition not found");
        assert_eq!(r.change_number, -1);
    }

    #[test]
    fn killed_flag_returns_default_treatment_with_killed_label() {
        let mut flag = rollout_flag(vec![("on", 100)]);
        flag.killed = true;
        flag.default_treatment = "control_killed".to_string();
        let r = evaluate(Some(&flag), &Key::new("u1"), None, &NoopContext);
        assert_eq!(r.treatment, "control_killed");
        assert_eq!(r.label, "killed");
        assert_eq!(r.change_number, flag.change_number);
    }

    #[test]
    fn no_condition_matches_falls_through_to_default_rule() {
        let mut flag = rollout_flag(vec![("on", 50), ("off", 50)]);
        flag.conditions[0].matchers = vec![crate::matchers::Matcher::new(crate::matchers::MatcherKind::AllKeys).negated()];
        let r = evaluate(Some(&flag), &Key::new("u1"), None, &NoopContext);
        assert_eq!(r.treatment, "off");
        assert_eq!(r.label, "default rule");
    }

    #[test]
    fn evaluation_is_stable_across_repeated_calls() {
        let flag = rollout_flag(vec![("on", 50), ("off", 50)]);
        let key = Key::new("some-user");
        let first = evaluate(Some(&flag), &key, None, &NoopContext);
        for _ in 0..100 {
            let again = evaluate(Some(&flag), &key, None, &NoopContext);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn s1_basic_rollout_ratio_within_tolerance() {
        let flag = rollout_flag(vec![("on", 50), ("off", 50)]);
        let mut on_count = 0;
        let total = 10_000;
        for i in 0..total {
            let key = Key::new(format!("user-{}", i));
            let r = evaluate(Some(&flag), &key, None, &NoopContext);
            if r.treatment == "on" {
                on_count += 1;
            }
        }
        let ratio = on_count as f64 / total as f64;
        assert!((ratio - 0.5).abs() < 0.02, "ratio {} not within 2% of 0.5", ratio);
    }

    #[test]
    fn configurations_are_attached_to_selected_treatment() {
        let mut flag = rollout_flag(vec![("on", 100)]);
        let mut configs = StdHashMap::new();
        configs.insert("on".to_string(), "{\"color\":\"red\"}".to_string());
        flag.configurations = Some(configs);
        let r = evaluate(Some(&flag), &Key::new("u1"), None, &NoopContext);
        assert_eq!(r.configuration.as_deref(), Some("{\"color\":\"red\"}"));
    }

    #[test]
    fn same_bucket_same_partition_invariant() {
        // Invariant 2: any two keys whose bucketing key hashes to the same
        // bucket must select the same rollout partition.
        let flag = rollout_flag(vec![("on", 30), ("off", 70)]);
        let mut seen: StdHashMap<u32, String> = StdHashMap::new();
        for i in 0..2000 {
            let key = Key::new(format!("k{}", i));
            let bucket = crate::hashing::bucket(&key.bucketing_key, flag.seed, flag.algo);
            let r = evaluate(Some(&flag), &key, None, &NoopContext);
            if let Some(prev) = seen.get(&bucket) {
                assert_eq!(prev, &r.treatment, "bucket {} produced two different treatments", bucket);
            } else {
                seen.insert(bucket, r.treatment);
            }
        }
    }
}
