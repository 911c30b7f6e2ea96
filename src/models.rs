// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! The shared data model (spec §3): flags, conditions, matchers, segments,
//! keys, impressions and events. Plain value types with explicit
//! constructors - no property-descriptor magic, matchers construct directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel treatment returned when evaluation cannot proceed.
pub const CONTROL: &str = "control";

/// Which hashing algorithm a flag's rollout buckets are computed with (spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Legacy,
    Murmur3_32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    #[serde(rename = "WHITELIST")]
    Whitelist,
    #[serde(rename = "ROLLOUT")]
    Rollout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combiner {
    #[serde(rename = "AND")]
    And,
}

/// A variant name plus its rollout weight (0..=100). Weights within a
/// condition's partition list sum to 100.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub treatment: String,
    pub size: u32,
}

/// One rule within a flag. Matchers are ANDed (the only combiner spec.md
/// defines); if they all accept, a treatment is picked by bucketing.
///
/// Not `Serialize`/`Deserialize`: the wire representation nests matchers
/// under a `matcherGroup` with per-type payload shapes that don't map 1:1
/// onto `MatcherKind`. `http::wire` deserializes the backend JSON into its
/// own DTOs and converts into this type explicitly.
#[derive(Clone, Debug)]
pub struct Condition {
    pub label: String,
    pub condition_type: ConditionType,
    pub combiner: Combiner,
    pub matchers: Vec<crate::matchers::Matcher>,
    pub partitions: Vec<Partition>,
}

/// A named rule set. `change_number` must never decrease once observed -
/// synchronizers enforce this by only ever moving it forward.
#[derive(Clone, Debug)]
pub struct Flag {
    pub name: String,
    pub traffic_type_name: String,
    pub seed: i32,
    pub algo: HashAlgorithm,
    pub status: FlagStatus,
    pub killed: bool,
    pub default_treatment: String,
    pub change_number: i64,
    pub conditions: Vec<Condition>,
    /// Per-treatment JSON configuration payloads, if the flag has any.
    pub configurations: Option<HashMap<String, String>>,
}

impl Flag {
    pub fn new(
        name: impl Into<String>,
        traffic_type_name: impl Into<String>,
        default_treatment: impl Into<String>,
        change_number: i64,
    ) -> Self {
        Flag {
            name: name.into(),
            traffic_type_name: traffic_type_name.into(),
            seed: 0,
            algo: HashAlgorithm::Murmur3_32,
            status: FlagStatus::Active,
            killed: false,
            default_treatment: default_treatment.into(),
            change_number,
            conditions: Vec::new(),
            configurations: None,
        }
    }
}

/// A segment: a named set of member keys plus the change number it was last
/// synced at.
#[derive(Clone, Debug, Default)]
pub struct Segment {
    pub name: String,
    pub change_number: i64,
    pub keys: std::collections::HashSet<String>,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Segment {
            name: name.into(),
            change_number: -1,
            keys: std::collections::HashSet::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// The `(matchingKey, bucketingKey)` pair evaluation operates on. When only
/// one value is supplied both fields equal it (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub matching_key: String,
    pub bucketing_key: String,
}

impl Key {
    /// A key with identical matching and bucketing values.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Key {
            bucketing_key: key.clone(),
            matching_key: key,
        }
    }

    pub fn with_bucketing(matching_key: impl Into<String>, bucketing_key: impl Into<String>) -> Self {
        Key {
            matching_key: matching_key.into(),
            bucketing_key: bucketing_key.into(),
        }
    }
}

/// The result of `evaluate` (spec §4.3): a treatment, the label of the
/// condition that produced it, and the flag's change number at the time.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationResult {
    pub treatment: String,
    pub label: String,
    pub change_number: i64,
    pub configuration: Option<String>,
}

impl EvaluationResult {
    pub fn control(label: &str) -> Self {
        EvaluationResult {
            treatment: CONTROL.to_string(),
            label: label.to_string(),
            change_number: -1,
            configuration: None,
        }
    }
}

/// One record of an evaluation, emitted regardless of outcome (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Impression {
    pub matching_key: String,
    pub bucketing_key: String,
    pub feature: String,
    pub treatment: String,
    pub label: String,
    pub change_number: i64,
    pub timestamp: i64,
}

/// A `track()` event plus its precomputed serialized byte size (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub key: String,
    pub traffic_type: String,
    pub event_type: String,
    pub value: Option<f64>,
    pub timestamp: i64,
    pub properties: Option<HashMap<String, PropertyValue>>,
    pub size: usize,
}

/// One property value, restricted to the JSON scalar types §3 allows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}
