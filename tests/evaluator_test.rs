// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! End-to-end evaluation against real storage: a segment matcher backed by
//! `SegmentStorage` and a dependency matcher that recurses into `evaluate`
//! for another stored flag, rather than the no-op context the in-module
//! evaluator tests use.

use std::collections::HashSet;
use std::sync::Arc;

use split_core::evaluator::evaluate;
use split_core::matchers::{Attributes, Matcher, MatcherContext, MatcherKind};
use split_core::models::{Combiner, Condition, ConditionType, EvaluationResult, Flag, Key, Partition};
use split_core::storage::{FlagStorage, SegmentStorage};

struct StorageContext {
    flags: Arc<FlagStorage>,
    segments: Arc<SegmentStorage>,
}

impl MatcherContext for StorageContext {
    fn segment_contains(&self, segment_name: &str, matching_key: &str) -> bool {
        self.segments.contains(segment_name, matching_key)
    }

    fn evaluate_flag(&self, flag_name: &str, key: &Key, attributes: Option<&Attributes>) -> EvaluationResult {
        evaluate(self.flags.get(flag_name).as_ref(), key, attributes, self)
    }
}

fn rule(matcher: MatcherKind, treatment: &str) -> Condition {
    Condition {
        label: "in rule".to_string(),
        condition_type: ConditionType::Rollout,
        combiner: Combiner::And,
        matchers: vec![Matcher::new(matcher)],
        partitions: vec![Partition { treatment: treatment.to_string(), size: 100 }],
    }
}

#[test]
fn in_segment_matcher_resolves_through_real_segment_storage() {
    let flags = Arc::new(FlagStorage::new());
    let segments = Arc::new(SegmentStorage::new());
    segments.update("beta_testers", &["user-1".to_string()], &[], 1);

    let mut flag = Flag::new("new_checkout", "user", "off", 1);
    flag.conditions.push(rule(MatcherKind::InSegment("beta_testers".to_string()), "on"));
    flags.put(flag);

    let ctx = StorageContext { flags: flags.clone(), segments };

    let member = evaluate(flags.get("new_checkout").as_ref(), &Key::new("user-1"), None, &ctx);
    assert_eq!(member.treatment, "on");
    assert_eq!(member.label, "in rule");

    let non_member = evaluate(flags.get("new_checkout").as_ref(), &Key::new("user-2"), None, &ctx);
    assert_eq!(non_member.treatment, "off");
    assert_eq!(non_member.label, "default rule");
}

#[test]
fn dependency_matcher_recurses_into_another_stored_flag() {
    let flags = Arc::new(FlagStorage::new());
    let segments = Arc::new(SegmentStorage::new());

    let mut gate = Flag::new("premium_gate", "user", "not_premium", 1);
    gate.conditions.push(rule(MatcherKind::Whitelist(HashSet::from(["user-1".to_string()])), "premium"));
    flags.put(gate);

    let mut dependent = Flag::new("premium_feature", "user", "off", 1);
    dependent.conditions.push(rule(
        MatcherKind::Dependency { flag_name: "premium_gate".to_string(), treatments: HashSet::from(["premium".to_string()]) },
        "on",
    ));
    flags.put(dependent);

    let ctx = StorageContext { flags: flags.clone(), segments };

    let premium_user = evaluate(flags.get("premium_feature").as_ref(), &Key::new("user-1"), None, &ctx);
    assert_eq!(premium_user.treatment, "on");

    let other_user = evaluate(flags.get("premium_feature").as_ref(), &Key::new("user-2"), None, &ctx);
    assert_eq!(other_user.treatment, "off");
}

#[test]
fn killing_a_flag_locally_overrides_evaluation_immediately() {
    let flags = Arc::new(FlagStorage::new());
    let segments = Arc::new(SegmentStorage::new());

    let mut flag = Flag::new("risky", "user", "off", 1);
    flag.conditions.push(rule(MatcherKind::AllKeys, "on"));
    flags.put(flag);
    let ctx = StorageContext { flags: flags.clone(), segments };

    assert_eq!(evaluate(flags.get("risky").as_ref(), &Key::new("any"), None, &ctx).treatment, "on");

    flags.kill_locally("risky", "off", 2);
    let killed = evaluate(flags.get("risky").as_ref(), &Key::new("any"), None, &ctx);
    assert_eq!(killed.treatment, "off");
    assert_eq!(killed.label, "killed");
}
