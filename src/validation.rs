// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Input validation for the `track`/`evaluate` boundary (spec §7
`ValidationError`, supplemented from the original Python client's
`input_validator.py`). Bad input never panics or propagates - callers get
back `None`/`false`/a trimmed value and, in a full client, a log line one
layer up.
"#]

use crate::models::{Event, PropertyValue};
use std::collections::HashMap;

pub const MAX_LENGTH: usize = 250;
pub const MAX_PROPERTIES_BYTES: usize = 32_768;
pub const MAX_PROPERTIES_COUNT: usize = 300;
/// Base byte allowance for an event with no properties, matching the
/// Python validator's "~1kb events without properties" estimate.
const PROPERTIES_BASE_SIZE: usize = 1024;

/// Outcome of validating a key or name-like field: valid input is trimmed
/// and returned, invalid input is rejected outright.
#[derive(Debug, PartialEq)]
pub enum Validated<T> {
    Valid(T),
    Invalid,
}

impl<T> Validated<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Validated::Valid(v) => Some(v),
            Validated::Invalid => None,
        }
    }
}

/// Validates a matching/bucketing key string: non-null, non-empty after
/// trimming, and no more than `MAX_LENGTH` characters.
pub fn validate_key_string(key: Option<&str>) -> Validated<String> {
    let key = match key {
        Some(k) => k,
        None => return Validated::Invalid,
    };
    if key.trim().is_empty() {
        return Validated::Invalid;
    }
    if key.chars().count() > MAX_LENGTH {
        return Validated::Invalid;
    }
    Validated::Valid(key.to_string())
}

/// Validates `feature_name`: non-empty, whitespace-trimmed (silently - the
/// caller logs the trim if it wants to).
pub fn validate_feature_name(name: Option<&str>) -> Validated<String> {
    let name = match name {
        Some(n) if !n.trim().is_empty() => n,
        _ => return Validated::Invalid,
    };
    Validated::Valid(name.trim().to_string())
}

/// Validates a list of feature names for `get_treatments`, deduplicating
/// and trimming, dropping blanks. `None` distinguishes "the list itself was
/// invalid" from `Some(empty)` which can't happen (empty filtered output
/// after a non-empty input is also treated as invalid, per the original
/// validator).
pub fn validate_feature_names(names: Option<&[String]>) -> Option<Vec<String>> {
    let names = names?;
    if names.is_empty() {
        return None;
    }
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for n in names {
        let trimmed = n.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            out.push(trimmed.to_string());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

const EVENT_TYPE_PATTERN_MAX_LEN: usize = 80;

/// Validates `event_type` against `^[a-zA-Z0-9][-_.:a-zA-Z0-9]{0,79}$`,
/// implemented directly (no regex needed for this fixed ASCII grammar).
pub fn validate_event_type(event_type: Option<&str>) -> Validated<String> {
    let event_type = match event_type {
        Some(e) if !e.is_empty() => e,
        _ => return Validated::Invalid,
    };
    let mut chars = event_type.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric());
    let rest_ok = event_type.len() <= EVENT_TYPE_PATTERN_MAX_LEN
        && event_type
            .chars()
            .skip(1)
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if first_ok && rest_ok {
        Validated::Valid(event_type.to_string())
    } else {
        Validated::Invalid
    }
}

/// Lowercases `traffic_type`, rejecting null/empty.
pub fn validate_traffic_type(traffic_type: Option<&str>) -> Validated<String> {
    let tt = match traffic_type {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Validated::Invalid,
    };
    Validated::Valid(tt.to_lowercase())
}

/// Outcome of validating `track`'s `value` field. Preserves the distinction
/// (spec §9 Open Question) between "explicitly absent" (`None`, accepted)
/// and "present but invalid" (bool or non-number, rejected).
#[derive(Debug, PartialEq)]
pub enum TrackValue {
    Absent,
    Present(f64),
    Rejected,
}

pub fn validate_track_value(value: Option<TrackInput>) -> TrackValue {
    match value {
        None => TrackValue::Absent,
        Some(TrackInput::Bool(_)) => TrackValue::Rejected,
        Some(TrackInput::Number(n)) if n.is_finite() => TrackValue::Present(n),
        Some(TrackInput::Number(_)) => TrackValue::Rejected,
    }
}

/// The raw shape a caller might hand `track` for `value`, before
/// validation collapses it to `TrackValue`.
#[derive(Debug, Clone, Copy)]
pub enum TrackInput {
    Number(f64),
    Bool(bool),
}

/// Sanitizes `properties` for a `track()` call, returning the properties to
/// store plus their serialized size in bytes, or `None` if the event must
/// be rejected outright (over the byte budget).
pub fn valid_properties(properties: Option<HashMap<String, PropertyValue>>) -> Option<(Option<HashMap<String, PropertyValue>>, usize)> {
    let properties = match properties {
        None => return Some((None, PROPERTIES_BASE_SIZE)),
        Some(p) => p,
    };

    let mut size = PROPERTIES_BASE_SIZE;
    let mut sanitized = HashMap::new();

    for (key, value) in properties {
        size += approx_size_of_str(&key);
        let value = match value {
            PropertyValue::String(_) | PropertyValue::Number(_) | PropertyValue::Bool(_) | PropertyValue::Null => value,
        };
        size += approx_size_of_value(&value);
        sanitized.insert(key, value);

        if size > MAX_PROPERTIES_BYTES {
            return None;
        }
    }

    // Exceeding 300 keys only warrants a warning upstream (trimming at
    // ingestion), not rejection - matches the Python validator.
    Some((Some(sanitized), size))
}

fn approx_size_of_str(s: &str) -> usize {
    s.len() + 1
}

fn approx_size_of_value(v: &PropertyValue) -> usize {
    match v {
        PropertyValue::String(s) => s.len() + 1,
        PropertyValue::Number(n) => format!("{}", n).len() + 1,
        PropertyValue::Bool(b) => if *b { 4 } else { 5 },
        PropertyValue::Null => 4,
    }
}

/// Builds an `Event` from already-validated fields, computing `size`.
pub fn build_event(
    key: String,
    traffic_type: String,
    event_type: String,
    value: TrackValue,
    properties: Option<HashMap<String, PropertyValue>>,
    timestamp: i64,
) -> Option<Event> {
    let value = match value {
        TrackValue::Rejected => return None,
        TrackValue::Absent => None,
        TrackValue::Present(n) => Some(n),
    };
    let (properties, props_size) = valid_properties(properties)?;
    Some(Event {
        key,
        traffic_type,
        event_type,
        value,
        timestamp,
        properties,
        size: props_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rejects_null_empty_and_overlong() {
        assert_eq!(validate_key_string(None), Validated::Invalid);
        assert_eq!(validate_key_string(Some("  ")), Validated::Invalid);
        let long = "a".repeat(MAX_LENGTH + 1);
        assert_eq!(validate_key_string(Some(&long)), Validated::Invalid);
        assert_eq!(validate_key_string(Some("ok")), Validated::Valid("ok".to_string()));
    }

    #[test]
    fn event_type_pattern() {
        assert_eq!(validate_event_type(Some("page_view")), Validated::Valid("page_view".to_string()));
        assert_eq!(validate_event_type(Some("-leading-dash")), Validated::Invalid);
        assert_eq!(validate_event_type(Some("")), Validated::Invalid);
        assert_eq!(validate_event_type(Some("has space")), Validated::Invalid);
        let too_long = "a".repeat(81);
        assert_eq!(validate_event_type(Some(&too_long)), Validated::Invalid);
    }

    #[test]
    fn traffic_type_lowercased() {
        assert_eq!(validate_traffic_type(Some("USER")), Validated::Valid("user".to_string()));
        assert_eq!(validate_traffic_type(Some("")), Validated::Invalid);
    }

    #[test]
    fn track_value_preserves_absent_vs_rejected_distinction() {
        assert_eq!(validate_track_value(None), TrackValue::Absent);
        assert_eq!(validate_track_value(Some(TrackInput::Bool(false))), TrackValue::Rejected);
        assert_eq!(validate_track_value(Some(TrackInput::Number(3.5))), TrackValue::Present(3.5));
    }

    #[test]
    fn properties_within_budget_are_kept() {
        let mut props = HashMap::new();
        props.insert("plan".to_string(), PropertyValue::String("pro".to_string()));
        let (out, size) = valid_properties(Some(props)).unwrap();
        assert!(out.is_some());
        assert!(size > PROPERTIES_BASE_SIZE);
    }

    #[test]
    fn properties_over_budget_are_rejected() {
        let mut props = HashMap::new();
        // One property whose value alone blows the 32KB budget.
        props.insert("blob".to_string(), PropertyValue::String("x".repeat(40_000)));
        assert!(valid_properties(Some(props)).is_none());
    }

    #[test]
    fn build_event_rejects_boolean_value_but_accepts_absent() {
        assert!(build_event(
            "k".to_string(),
            "user".to_string(),
            "purchase".to_string(),
            TrackValue::Rejected,
            None,
            1,
        )
        .is_none());

        let e = build_event(
            "k".to_string(),
            "user".to_string(),
            "purchase".to_string(),
            TrackValue::Absent,
            None,
            1,
        )
        .unwrap();
        assert_eq!(e.value, None);
    }

    #[test]
    fn feature_names_dedup_trim_and_drop_blanks() {
        let names = vec![" f1 ".to_string(), "f1".to_string(), "".to_string(), "f2".to_string()];
        let out = validate_feature_names(Some(&names)).unwrap();
        assert_eq!(out, vec!["f1".to_string(), "f2".to_string()]);
    }
}
