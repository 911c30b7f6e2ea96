// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Matcher primitives (spec §4.2). Each `Matcher` is a tagged variant over a
fixed, closed set of operations rather than the duck-typed matcher objects
the original client used - the evaluation `Context` carries capability
handles (segment lookup, flag lookup) instead of relying on globals, so a
matcher never reaches outside what it's handed.

A matcher that can't find its input (missing attribute, wrong type) returns
`false` - it never panics or errors. Negation is applied after the
primitive decision, uniformly for every kind.
"#]

use crate::models::{EvaluationResult, Key};
use std::collections::{HashMap, HashSet};

/// One user attribute value. `track`/`evaluate` callers build these; this
/// crate never infers a type it wasn't given.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Bool(bool),
    /// Epoch-second timestamp, used by the datetime matchers.
    DateTime(i64),
    List(Vec<String>),
}

pub type Attributes = HashMap<String, AttributeValue>;

/// Capabilities a matcher may need beyond the key/attributes it was called
/// with: segment membership and recursive flag evaluation (for dependency
/// matchers). Implemented by the evaluator's caller, not by storage itself,
/// so matchers never take a lock directly.
pub trait MatcherContext {
    fn segment_contains(&self, segment_name: &str, matching_key: &str) -> bool;
    fn evaluate_flag(&self, flag_name: &str, key: &Key, attributes: Option<&Attributes>) -> EvaluationResult;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Between {
    pub from: f64,
    pub to: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Vec<String>,
}

impl Semver {
    pub fn parse(s: &str) -> Option<Semver> {
        let (core, pre) = match s.split_once('-') {
            Some((c, p)) => (c, Some(p)),
            None => (s, None),
        };
        let core = core.split('+').next().unwrap_or(core);
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        let pre_release = match pre {
            Some(p) => p.split('+').next().unwrap_or(p).split('.').map(str::to_string).collect(),
            None => Vec::new(),
        };
        Some(Semver { major, minor, patch, pre_release })
    }
}

impl Ord for Semver {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre_release.is_empty(), other.pre_release.is_empty()) {
                (true, true) => Ordering::Equal,
                // A pre-release version has lower precedence than a normal version.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre_release.cmp(&other.pre_release),
            })
    }
}
impl PartialOrd for Semver {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Eq for Semver {}

/// The operation a matcher performs, before negation.
#[derive(Clone, Debug)]
pub enum MatcherKind {
    AllKeys,
    Whitelist(HashSet<String>),
    EqualToString(String),
    EqualToBoolean(bool),
    EqualToNumber(f64),
    GreaterThanOrEqualToNumber(f64),
    LessThanOrEqualToNumber(f64),
    BetweenNumber(Between),
    EqualToSet(HashSet<String>),
    ContainsAnyOfSet(HashSet<String>),
    ContainsAllOfSet(HashSet<String>),
    PartOfSet(HashSet<String>),
    StartsWith(Vec<String>),
    EndsWith(Vec<String>),
    ContainsString(Vec<String>),
    Regex(String),
    /// Epoch-second boundaries, already truncated to day granularity.
    EqualToDate(i64),
    BeforeDate(i64),
    AfterDate(i64),
    EqualToSemver(String),
    GreaterThanOrEqualToSemver(String),
    LessThanOrEqualToSemver(String),
    BetweenSemver { from: String, to: String },
    InListSemver(HashSet<String>),
    InSegment(String),
    /// Accepted if `flag_name` evaluates to one of `treatments` for the same key.
    Dependency { flag_name: String, treatments: HashSet<String> },
}

/// A single predicate over attributes/keys (spec §3/§4.2).
#[derive(Clone, Debug)]
pub struct Matcher {
    pub negate: bool,
    /// When `None`, the matcher operates on the matching key instead of a
    /// named attribute (spec §3 invariant).
    pub attribute: Option<String>,
    pub kind: MatcherKind,
}

impl Matcher {
    pub fn new(kind: MatcherKind) -> Self {
        Matcher { negate: false, attribute: None, kind }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn on_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Evaluates this matcher against `key`/`attributes`, applying negation
    /// last. Never panics: a missing or mistyped attribute just fails the
    /// primitive check.
    pub fn matches(&self, key: &Key, attributes: Option<&Attributes>, ctx: &dyn MatcherContext) -> bool {
        let result = self.matches_primitive(key, attributes, ctx);
        if self.negate {
            !result
        } else {
            result
        }
    }

    fn resolve(&self, key: &Key, attributes: Option<&Attributes>) -> Option<AttributeValue> {
        match &self.attribute {
            Some(name) => attributes.and_then(|a| a.get(name)).cloned(),
            None => Some(AttributeValue::String(key.matching_key.clone())),
        }
    }

    fn resolve_string(&self, key: &Key, attributes: Option<&Attributes>) -> Option<String> {
        match self.resolve(key, attributes)? {
            AttributeValue::String(s) => Some(s),
            AttributeValue::Number(n) => Some(format_number(n)),
            _ => None,
        }
    }

    fn resolve_number(&self, key: &Key, attributes: Option<&Attributes>) -> Option<f64> {
        match self.resolve(key, attributes)? {
            AttributeValue::Number(n) => Some(n),
            AttributeValue::DateTime(t) => Some(t as f64),
            _ => None,
        }
    }

    fn matches_primitive(&self, key: &Key, attributes: Option<&Attributes>, ctx: &dyn MatcherContext) -> bool {
        match &self.kind {
            MatcherKind::AllKeys => true,

            MatcherKind::InSegment(segment_name) => ctx.segment_contains(segment_name, &key.matching_key),

            MatcherKind::Dependency { flag_name, treatments } => {
                let result = ctx.evaluate_flag(flag_name, key, attributes);
                treatments.contains(&result.treatment)
            }

            MatcherKind::Whitelist(values) => match self.resolve_string(key, attributes) {
                Some(v) => values.contains(&v),
                None => false,
            },

            MatcherKind::EqualToString(expected) => {
                self.resolve_string(key, attributes).as_deref() == Some(expected.as_str())
            }

            MatcherKind::EqualToBoolean(expected) => {
                matches!(self.resolve(key, attributes), Some(AttributeValue::Bool(b)) if b == *expected)
            }

            MatcherKind::EqualToNumber(expected) => {
                matches!(self.resolve_number(key, attributes), Some(n) if n == *expected)
            }

            MatcherKind::GreaterThanOrEqualToNumber(expected) => {
                matches!(self.resolve_number(key, attributes), Some(n) if n >= *expected)
            }

            MatcherKind::LessThanOrEqualToNumber(expected) => {
                matches!(self.resolve_number(key, attributes), Some(n) if n <= *expected)
            }

            MatcherKind::BetweenNumber(range) => {
                matches!(self.resolve_number(key, attributes), Some(n) if n >= range.from && n <= range.to)
            }

            MatcherKind::EqualToSet(expected) => match self.resolve_list(key, attributes) {
                Some(values) => values.iter().collect::<HashSet<_>>() == expected.iter().collect::<HashSet<_>>(),
                None => false,
            },

            MatcherKind::ContainsAnyOfSet(expected) => match self.resolve_list(key, attributes) {
                Some(values) => values.iter().any(|v| expected.contains(v)),
                None => false,
            },

            MatcherKind::ContainsAllOfSet(expected) => match self.resolve_list(key, attributes) {
                Some(values) => expected.iter().all(|e| values.contains(e)),
                None => false,
            },

            MatcherKind::PartOfSet(expected) => match self.resolve_list(key, attributes) {
                Some(values) => !values.is_empty() && values.iter().all(|v| expected.contains(v)),
                None => false,
            },

            MatcherKind::StartsWith(prefixes) => match self.resolve_string(key, attributes) {
                Some(v) => prefixes.iter().any(|p| v.starts_with(p.as_str())),
                None => false,
            },

            MatcherKind::EndsWith(suffixes) => match self.resolve_string(key, attributes) {
                Some(v) => suffixes.iter().any(|s| v.ends_with(s.as_str())),
                None => false,
            },

            MatcherKind::ContainsString(needles) => match self.resolve_string(key, attributes) {
                Some(v) => needles.iter().any(|n| v.contains(n.as_str())),
                None => false,
            },

            MatcherKind::Regex(pattern) => match (self.resolve_string(key, attributes), regex::Regex::new(pattern)) {
                (Some(v), Ok(re)) => re.is_match(&v),
                _ => false,
            },

            MatcherKind::EqualToDate(expected) => {
                matches!(self.resolve_number(key, attributes), Some(n) if truncate_to_day(n as i64) == *expected)
            }

            MatcherKind::BeforeDate(expected) => {
                matches!(self.resolve_number(key, attributes), Some(n) if (n as i64) <= *expected)
            }

            MatcherKind::AfterDate(expected) => {
                matches!(self.resolve_number(key, attributes), Some(n) if (n as i64) >= *expected)
            }

            MatcherKind::EqualToSemver(expected) => match (self.resolve_semver(key, attributes), Semver::parse(expected)) {
                (Some(v), Some(e)) => v == e,
                _ => false,
            },

            MatcherKind::GreaterThanOrEqualToSemver(expected) => {
                match (self.resolve_semver(key, attributes), Semver::parse(expected)) {
                    (Some(v), Some(e)) => v >= e,
                    _ => false,
                }
            }

            MatcherKind::LessThanOrEqualToSemver(expected) => {
                match (self.resolve_semver(key, attributes), Semver::parse(expected)) {
                    (Some(v), Some(e)) => v <= e,
                    _ => false,
                }
            }

            MatcherKind::BetweenSemver { from, to } => {
                match (self.resolve_semver(key, attributes), Semver::parse(from), Semver::parse(to)) {
                    (Some(v), Some(from), Some(to)) => v >= from && v <= to,
                    _ => false,
                }
            }

            MatcherKind::InListSemver(expected) => match self.resolve_string(key, attributes) {
                Some(v) => expected.contains(&v),
                None => false,
            },
        }
    }

    fn resolve_list(&self, key: &Key, attributes: Option<&Attributes>) -> Option<Vec<String>> {
        match self.resolve(key, attributes)? {
            AttributeValue::List(l) => Some(l),
            AttributeValue::String(s) => Some(vec![s]),
            _ => None,
        }
    }

    fn resolve_semver(&self, key: &Key, attributes: Option<&Attributes>) -> Option<Semver> {
        Semver::parse(&self.resolve_string(key, attributes)?)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Zeros out the sub-day portion of an epoch-second timestamp (UTC), the
/// granularity the datetime matchers compare at.
fn truncate_to_day(epoch_seconds: i64) -> i64 {
    const SECONDS_PER_DAY: i64 = 86_400;
    epoch_seconds.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullContext;
    impl MatcherContext for NullContext {
        fn segment_contains(&self, _segment_name: &str, _matching_key: &str) -> bool {
            false
        }
        fn evaluate_flag(&self, _flag_name: &str, _key: &Key, _attributes: Option<&Attributes>) -> EvaluationResult {
            EvaluationResult::control("exception")
        }
    }

    #[test]
    fn all_keys_always_matches() {
        let m = Matcher::new(MatcherKind::AllKeys);
        let key = Key::new("anyone");
        assert!(m.matches(&key, None, &NullContext));
    }

    #[test]
    fn missing_attribute_is_false_not_panic() {
        let m = Matcher::new(MatcherKind::EqualToNumber(5.0)).on_attribute("age");
        let key = Key::new("u1");
        assert!(!m.matches(&key, None, &NullContext));
        let attrs: Attributes = HashMap::new();
        assert!(!m.matches(&key, Some(&attrs), &NullContext));
    }

    #[test]
    fn wrong_type_attribute_is_false() {
        let m = Matcher::new(MatcherKind::EqualToNumber(5.0)).on_attribute("age");
        let mut attrs: Attributes = HashMap::new();
        attrs.insert("age".to_string(), AttributeValue::String("not a number".to_string()));
        let key = Key::new("u1");
        assert!(!m.matches(&key, Some(&attrs), &NullContext));
    }

    #[test]
    fn negation_flips_result() {
        let m = Matcher::new(MatcherKind::AllKeys).negated();
        let key = Key::new("u1");
        assert!(!m.matches(&key, None, &NullContext));
    }

    #[test]
    fn whitelist_operates_on_matching_key_by_default() {
        let mut values = HashSet::new();
        values.insert("alice".to_string());
        let m = Matcher::new(MatcherKind::Whitelist(values));
        assert!(m.matches(&Key::new("alice"), None, &NullContext));
        assert!(!m.matches(&Key::new("bob"), None, &NullContext));
    }

    #[test]
    fn between_number_inclusive_bounds() {
        let m = Matcher::new(MatcherKind::BetweenNumber(Between { from: 10.0, to: 20.0 })).on_attribute("age");
        let mut attrs = HashMap::new();
        attrs.insert("age".to_string(), AttributeValue::Number(10.0));
        assert!(m.matches(&Key::new("u1"), Some(&attrs), &NullContext));
        attrs.insert("age".to_string(), AttributeValue::Number(20.0));
        assert!(m.matches(&Key::new("u1"), Some(&attrs), &NullContext));
        attrs.insert("age".to_string(), AttributeValue::Number(21.0));
        assert!(!m.matches(&Key::new("u1"), Some(&attrs), &NullContext));
    }

    #[test]
    fn semver_ordering() {
        let a = Semver::parse("1.2.3").unwrap();
        let b = Semver::parse("1.10.0").unwrap();
        assert!(a < b);
        let pre = Semver::parse("1.0.0-rc.1").unwrap();
        let rel = Semver::parse("1.0.0").unwrap();
        assert!(pre < rel);
    }

    #[test]
    fn regex_matcher_is_locale_independent_ascii() {
        let m = Matcher::new(MatcherKind::Regex(r"^\d{3}-\d{4}$".to_string()));
        assert!(m.matches(&Key::new("555-1234"), None, &NullContext));
        assert!(!m.matches(&Key::new("not-a-number"), None, &NullContext));
    }

    struct SegmentContext {
        members: HashSet<String>,
    }
    impl MatcherContext for SegmentContext {
        fn segment_contains(&self, _segment_name: &str, matching_key: &str) -> bool {
            self.members.contains(matching_key)
        }
        fn evaluate_flag(&self, _flag_name: &str, _key: &Key, _attributes: Option<&Attributes>) -> EvaluationResult {
            EvaluationResult::control("exception")
        }
    }

    #[test]
    fn segment_matcher_checks_matching_key_not_attribute() {
        let mut members = HashSet::new();
        members.insert("alice".to_string());
        let ctx = SegmentContext { members };
        let m = Matcher::new(MatcherKind::InSegment("beta".to_string()));
        assert!(m.matches(&Key::new("alice"), None, &ctx));
        assert!(!m.matches(&Key::new("bob"), None, &ctx));
    }

    struct DependencyContext {
        treatment: String,
    }
    impl MatcherContext for DependencyContext {
        fn segment_contains(&self, _segment_name: &str, _matching_key: &str) -> bool {
            false
        }
        fn evaluate_flag(&self, _flag_name: &str, _key: &Key, _attributes: Option<&Attributes>) -> EvaluationResult {
            EvaluationResult {
                treatment: self.treatment.clone(),
                label: "default rule".to_string(),
                change_number: 1,
                configuration: None,
            }
        }
    }

    #[test]
    fn dependency_matcher_checks_parent_treatment() {
        let ctx = DependencyContext { treatment: "on".to_string() };
        let mut treatments = HashSet::new();
        treatments.insert("on".to_string());
        let m = Matcher::new(MatcherKind::Dependency { flag_name: "parent".to_string(), treatments });
        assert!(m.matches(&Key::new("u1"), None, &ctx));
    }
}
