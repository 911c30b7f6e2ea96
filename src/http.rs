// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
The backend HTTP client (spec §6). Wraps the four REST endpoints and the
auth endpoint behind typed methods; JSON (de)serialization lives in the
private `wire` module since the backend's wire shapes - nested matcher
groups, per-type matcher payloads - don't map 1:1 onto the domain types in
`crate::models`.

Built on `reqwest` the way the rest of the pack reaches for it (see
`ConsumrBuzzy`'s submitter): one shared client, one timeout per call, JSON
in and out. Retry/backoff is the synchronizer's job, not this client's -
this module raises `SdkError::TransientBackend`/`SdkError::Auth` once and
lets the caller decide whether to retry.
"#]

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};
use crate::models::{Condition, Event, Flag, Impression};

/// Thin wrapper over a shared `reqwest::Client` plus the base URLs and
/// credentials every call needs.
pub struct HttpClient {
    client: reqwest::Client,
    sdk_url: String,
    auth_url: String,
    apikey: String,
}

impl HttpClient {
    pub fn new(sdk_url: impl Into<String>, auth_url: impl Into<String>, apikey: impl Into<String>, request_timeout: Duration) -> SdkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SdkError::Protocol(format!("failed to build http client: {}", e)))?;
        Ok(HttpClient {
            client,
            sdk_url: sdk_url.into(),
            auth_url: auth_url.into(),
            apikey: apikey.into(),
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.apikey).header("Accept", "application/json")
    }

    /// `GET /splitChanges?since=<cn>` (spec §6). Returns the applied flags
    /// plus the new change number (`till`).
    pub async fn split_changes(&self, since: i64) -> SdkResult<FlagChanges> {
        let url = format!("{}/splitChanges", self.sdk_url);
        let endpoint = "splitChanges";
        let response = self
            .authed(self.client.get(&url).query(&[("since", since)]))
            .send()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;

        let response = check_status(response, endpoint).await?;
        let dto: wire::SplitChangesResponseDto = response
            .json()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;

        let flags = dto.splits.into_iter().map(wire::flag_from_dto).collect::<Result<Vec<_>, _>>()?;
        Ok(FlagChanges { flags, since: dto.since, till: dto.till })
    }

    /// `GET /segmentChanges/<name>?since=<cn>` (spec §6).
    pub async fn segment_changes(&self, name: &str, since: i64) -> SdkResult<SegmentChanges> {
        let url = format!("{}/segmentChanges/{}", self.sdk_url, name);
        let endpoint = "segmentChanges";
        let response = self
            .authed(self.client.get(&url).query(&[("since", since)]))
            .send()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;

        let response = check_status(response, endpoint).await?;
        let dto: wire::SegmentChangesResponseDto = response
            .json()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;

        Ok(SegmentChanges {
            name: dto.name,
            added: dto.added,
            removed: dto.removed,
            since: dto.since,
            till: dto.till,
        })
    }

    /// `POST /testImpressions/bulk` (spec §6), grouped by feature name as
    /// the backend expects.
    pub async fn post_impressions(&self, impressions: &[Impression]) -> SdkResult<()> {
        let endpoint = "testImpressions/bulk";
        let payload = wire::group_impressions_by_feature(impressions);
        let url = format!("{}/testImpressions/bulk", self.sdk_url);
        let response = self
            .authed(self.client.post(&url).json(&payload))
            .send()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;
        check_status(response, endpoint).await?;
        Ok(())
    }

    /// `POST /events/bulk` (spec §6).
    pub async fn post_events(&self, events: &[Event]) -> SdkResult<()> {
        let endpoint = "events/bulk";
        let payload: Vec<wire::EventDto> = events.iter().map(wire::EventDto::from_event).collect();
        let url = format!("{}/events/bulk", self.sdk_url);
        let response = self
            .authed(self.client.post(&url).json(&payload))
            .send()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;
        check_status(response, endpoint).await?;
        Ok(())
    }

    /// `GET /auth` (spec §6): obtains the push-capable JWT plus channel
    /// list, or `pushEnabled: false` if streaming isn't authorized for this
    /// API key.
    pub async fn auth(&self) -> SdkResult<AuthResult> {
        let endpoint = "auth";
        let url = format!("{}/auth", self.auth_url);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;
        let response = check_status(response, endpoint).await?;
        let dto: wire::AuthResponseDto = response
            .json()
            .await
            .map_err(|e| SdkError::TransientBackend { endpoint: endpoint.to_string(), source: e })?;
        Ok(AuthResult {
            push_enabled: dto.push_enabled,
            token: dto.token,
            expiration: dto.expiration,
            channels: dto.channels,
        })
    }
}

/// Maps an HTTP response's status to `SdkError::Auth`/`Protocol` before the
/// caller attempts to parse a body, per spec §7's auth/protocol error split.
async fn check_status(response: reqwest::Response, endpoint: &str) -> SdkResult<reqwest::Response> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SdkError::Auth { endpoint: endpoint.to_string(), status: status.as_u16() });
    }
    if !status.is_success() {
        return Err(SdkError::Protocol(format!("{} returned HTTP {}", endpoint, status.as_u16())));
    }
    Ok(response)
}

/// Applied flag changes plus the new `since`/`till` change numbers.
pub struct FlagChanges {
    pub flags: Vec<Flag>,
    pub since: i64,
    pub till: i64,
}

/// One segment's delta against a prior change number.
pub struct SegmentChanges {
    pub name: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub since: i64,
    pub till: i64,
}

/// The result of a successful `/auth` call.
pub struct AuthResult {
    pub push_enabled: bool,
    pub token: String,
    pub expiration: i64,
    pub channels: Vec<String>,
}

/// Wire DTOs for the backend's JSON shapes, and the conversions into
/// `crate::models` types. Kept private: nothing outside `http` should need
/// to know the backend's exact field names.
mod wire {
    use super::*;
    use crate::matchers::{Between, Matcher, MatcherKind};
    use crate::models::{Combiner, ConditionType, FlagStatus, HashAlgorithm, Partition};
    use std::collections::{HashMap, HashSet};

    #[derive(Deserialize)]
    pub struct SplitChangesResponseDto {
        pub splits: Vec<SplitDto>,
        pub since: i64,
        pub till: i64,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SplitDto {
        pub name: String,
        pub traffic_type_name: String,
        pub seed: i32,
        #[serde(default)]
        pub algo: Option<u8>,
        pub status: FlagStatus,
        pub killed: bool,
        pub default_treatment: String,
        pub change_number: i64,
        #[serde(default)]
        pub conditions: Vec<ConditionDto>,
        #[serde(default)]
        pub configurations: Option<HashMap<String, String>>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ConditionDto {
        pub condition_type: ConditionType,
        #[serde(default = "default_label")]
        pub label: String,
        pub matcher_group: MatcherGroupDto,
        pub partitions: Vec<PartitionDto>,
    }

    fn default_label() -> String {
        "default rule".to_string()
    }

    #[derive(Deserialize)]
    pub struct MatcherGroupDto {
        #[serde(default)]
        pub combiner: Option<Combiner>,
        pub matchers: Vec<MatcherDto>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MatcherDto {
        #[serde(default)]
        pub negate: bool,
        #[serde(default)]
        pub key_selector: Option<KeySelectorDto>,
        pub matcher_type: String,
        #[serde(default)]
        pub whitelist_matcher_data: Option<WhitelistDto>,
        #[serde(default)]
        pub unary_string_matcher_data: Option<String>,
        #[serde(default)]
        pub unary_numeric_matcher_data: Option<f64>,
        #[serde(default)]
        pub between_matcher_data: Option<BetweenDto>,
        #[serde(default)]
        pub user_defined_segment_matcher_data: Option<SegmentRefDto>,
        #[serde(default)]
        pub dependency_matcher_data: Option<DependencyDto>,
        #[serde(default)]
        pub string_matcher_data: Option<String>,
        #[serde(default)]
        pub whitelist_string_data: Option<Vec<String>>,
    }

    #[derive(Deserialize)]
    pub struct KeySelectorDto {
        pub attribute: Option<String>,
    }

    #[derive(Deserialize)]
    pub struct WhitelistDto {
        pub whitelist: Vec<String>,
    }

    #[derive(Deserialize)]
    pub struct BetweenDto {
        pub start: f64,
        pub end: f64,
    }

    #[derive(Deserialize)]
    pub struct SegmentRefDto {
        #[serde(rename = "segmentName")]
        pub segment_name: String,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DependencyDto {
        pub split_name: String,
        pub treatments: Vec<String>,
    }

    #[derive(Deserialize)]
    pub struct PartitionDto {
        pub treatment: String,
        pub size: u32,
    }

    pub fn flag_from_dto(dto: SplitDto) -> SdkResult<Flag> {
        let algo = match dto.algo {
            Some(2) | None => HashAlgorithm::Murmur3_32,
            Some(_) => HashAlgorithm::Legacy,
        };
        let conditions = dto.conditions.into_iter().map(condition_from_dto).collect::<SdkResult<Vec<_>>>()?;
        Ok(Flag {
            name: dto.name,
            traffic_type_name: dto.traffic_type_name,
            seed: dto.seed,
            algo,
            status: dto.status,
            killed: dto.killed,
            default_treatment: dto.default_treatment,
            change_number: dto.change_number,
            conditions,
            configurations: dto.configurations,
        })
    }

    fn condition_from_dto(dto: ConditionDto) -> SdkResult<Condition> {
        let matchers = dto.matcher_group.matchers.into_iter().map(matcher_from_dto).collect::<SdkResult<Vec<_>>>()?;
        Ok(Condition {
            label: dto.label,
            condition_type: dto.condition_type,
            combiner: dto.matcher_group.combiner.unwrap_or(Combiner::And),
            matchers,
            partitions: dto.partitions.into_iter().map(|p| Partition { treatment: p.treatment, size: p.size }).collect(),
        })
    }

    /// Converts one wire matcher into `crate::matchers::Matcher`. Matcher
    /// types this crate doesn't model yet (e.g. less common set operators
    /// the backend may add) fall back to `AllKeys` negated-never, i.e. an
    /// always-false contributor, rather than failing the whole flag parse.
    fn matcher_from_dto(dto: MatcherDto) -> SdkResult<Matcher> {
        let attribute = dto.key_selector.and_then(|k| k.attribute);
        let kind = match dto.matcher_type.as_str() {
            "ALL_KEYS" => MatcherKind::AllKeys,
            "IN_SEGMENT" => {
                let seg = dto.user_defined_segment_matcher_data.ok_or_else(|| SdkError::Protocol("IN_SEGMENT matcher missing segment data".to_string()))?;
                MatcherKind::InSegment(seg.segment_name)
            }
            "WHITELIST" => {
                let wl = dto.whitelist_matcher_data.ok_or_else(|| SdkError::Protocol("WHITELIST matcher missing data".to_string()))?;
                MatcherKind::Whitelist(wl.whitelist.into_iter().collect())
            }
            "EQUAL_TO" => MatcherKind::EqualToString(dto.string_matcher_data.or(dto.unary_string_matcher_data).unwrap_or_default()),
            "EQUAL_TO_BOOLEAN" => MatcherKind::EqualToBoolean(dto.unary_string_matcher_data.as_deref() == Some("true")),
            "NUMBER_EQUAL_TO" => MatcherKind::EqualToNumber(dto.unary_numeric_matcher_data.unwrap_or_default()),
            "GREATER_THAN_OR_EQUAL_TO" => MatcherKind::GreaterThanOrEqualToNumber(dto.unary_numeric_matcher_data.unwrap_or_default()),
            "LESS_THAN_OR_EQUAL_TO" => MatcherKind::LessThanOrEqualToNumber(dto.unary_numeric_matcher_data.unwrap_or_default()),
            "BETWEEN" => {
                let b = dto.between_matcher_data.ok_or_else(|| SdkError::Protocol("BETWEEN matcher missing data".to_string()))?;
                MatcherKind::BetweenNumber(Between { from: b.start, to: b.end })
            }
            "EQUAL_TO_SET" => MatcherKind::EqualToSet(set_from(dto.whitelist_string_data)),
            "CONTAINS_ANY_OF_SET" => MatcherKind::ContainsAnyOfSet(set_from(dto.whitelist_string_data)),
            "CONTAINS_ALL_OF_SET" => MatcherKind::ContainsAllOfSet(set_from(dto.whitelist_string_data)),
            "PART_OF_SET" => MatcherKind::PartOfSet(set_from(dto.whitelist_string_data)),
            "STARTS_WITH" => MatcherKind::StartsWith(dto.whitelist_string_data.unwrap_or_default()),
            "ENDS_WITH" => MatcherKind::EndsWith(dto.whitelist_string_data.unwrap_or_default()),
            "CONTAINS_STRING" => MatcherKind::ContainsString(dto.whitelist_string_data.unwrap_or_default()),
            "MATCHES_STRING" => MatcherKind::Regex(dto.string_matcher_data.unwrap_or_default()),
            "EQUAL_TO_SEMVER" => MatcherKind::EqualToSemver(dto.string_matcher_data.unwrap_or_default()),
            "GREATER_THAN_OR_EQUAL_TO_SEMVER" => MatcherKind::GreaterThanOrEqualToSemver(dto.string_matcher_data.unwrap_or_default()),
            "LESS_THAN_OR_EQUAL_TO_SEMVER" => MatcherKind::LessThanOrEqualToSemver(dto.string_matcher_data.unwrap_or_default()),
            "IN_LIST_SEMVER" => MatcherKind::InListSemver(set_from(dto.whitelist_string_data)),
            "IN_RULE_BASED_SEGMENT" | "DEPENDENCY" if dto.dependency_matcher_data.is_some() => {
                let d = dto.dependency_matcher_data.unwrap();
                MatcherKind::Dependency { flag_name: d.split_name, treatments: d.treatments.into_iter().collect() }
            }
            _ => MatcherKind::Whitelist(HashSet::new()),
        };
        let mut matcher = Matcher::new(kind);
        if dto.negate {
            matcher = matcher.negated();
        }
        if let Some(attr) = attribute {
            matcher = matcher.on_attribute(attr);
        }
        Ok(matcher)
    }

    fn set_from(values: Option<Vec<String>>) -> HashSet<String> {
        values.unwrap_or_default().into_iter().collect()
    }

    #[derive(Deserialize)]
    pub struct SegmentChangesResponseDto {
        #[allow(dead_code)]
        pub name: String,
        pub added: Vec<String>,
        pub removed: Vec<String>,
        pub since: i64,
        pub till: i64,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AuthResponseDto {
        pub push_enabled: bool,
        pub token: String,
        pub expiration: i64,
        #[serde(default)]
        pub channels: Vec<String>,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ImpressionRecordDto {
        #[serde(rename = "keyName")]
        key_name: String,
        treatment: String,
        time: i64,
        change_number: i64,
        label: String,
        bucketing_key: String,
    }

    #[derive(Serialize)]
    pub struct ImpressionsByFeatureDto {
        #[serde(rename = "testName")]
        pub test_name: String,
        #[serde(rename = "keyImpressions")]
        pub key_impressions: Vec<ImpressionRecordDto>,
    }

    /// Groups impressions by feature name, as `/testImpressions/bulk` expects.
    pub fn group_impressions_by_feature(impressions: &[Impression]) -> Vec<ImpressionsByFeatureDto> {
        let mut by_feature: HashMap<String, Vec<ImpressionRecordDto>> = HashMap::new();
        for imp in impressions {
            by_feature.entry(imp.feature.clone()).or_default().push(ImpressionRecordDto {
                key_name: imp.matching_key.clone(),
                treatment: imp.treatment.clone(),
                time: imp.timestamp,
                change_number: imp.change_number,
                label: imp.label.clone(),
                bucketing_key: imp.bucketing_key.clone(),
            });
        }
        by_feature.into_iter().map(|(test_name, key_impressions)| ImpressionsByFeatureDto { test_name, key_impressions }).collect()
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EventDto {
        key: String,
        traffic_type_name: String,
        event_type_id: String,
        value: Option<f64>,
        timestamp: i64,
        properties: Option<HashMap<String, crate::models::PropertyValue>>,
    }

    impl EventDto {
        pub fn from_event(e: &Event) -> Self {
            EventDto {
                key: e.key.clone(),
                traffic_type_name: e.traffic_type.clone(),
                event_type_id: e.event_type.clone(),
                value: e.value,
                timestamp: e.timestamp,
                properties: e.properties.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_from_dto_converts_algo_code_2_to_murmur3() {
        let dto = wire::SplitDto {
            name: "f1".to_string(),
            traffic_type_name: "user".to_string(),
            seed: 42,
            algo: Some(2),
            status: crate::models::FlagStatus::Active,
            killed: false,
            default_treatment: "off".to_string(),
            change_number: 10,
            conditions: Vec::new(),
            configurations: None,
        };
        let flag = wire::flag_from_dto(dto).unwrap();
        assert_eq!(flag.algo, crate::models::HashAlgorithm::Murmur3_32);
        assert_eq!(flag.name, "f1");
    }

    #[test]
    fn flag_from_dto_converts_algo_code_1_to_legacy() {
        let dto = wire::SplitDto {
            name: "f1".to_string(),
            traffic_type_name: "user".to_string(),
            seed: 42,
            algo: Some(1),
            status: crate::models::FlagStatus::Active,
            killed: false,
            default_treatment: "off".to_string(),
            change_number: 10,
            conditions: Vec::new(),
            configurations: None,
        };
        let flag = wire::flag_from_dto(dto).unwrap();
        assert_eq!(flag.algo, crate::models::HashAlgorithm::Legacy);
    }

    #[test]
    fn group_impressions_by_feature_groups_correctly() {
        let impressions = vec![
            Impression {
                matching_key: "k1".to_string(),
                bucketing_key: "k1".to_string(),
                feature: "f1".to_string(),
                treatment: "on".to_string(),
                label: "default rule".to_string(),
                change_number: 1,
                timestamp: 100,
            },
            Impression {
                matching_key: "k2".to_string(),
                bucketing_key: "k2".to_string(),
                feature: "f1".to_string(),
                treatment: "off".to_string(),
                label: "default rule".to_string(),
                change_number: 1,
                timestamp: 101,
            },
            Impression {
                matching_key: "k3".to_string(),
                bucketing_key: "k3".to_string(),
                feature: "f2".to_string(),
                treatment: "on".to_string(),
                label: "default rule".to_string(),
                change_number: 1,
                timestamp: 102,
            },
        ];
        let grouped = wire::group_impressions_by_feature(&impressions);
        assert_eq!(grouped.len(), 2);
        let f1 = grouped.iter().find(|g| g.test_name == "f1").unwrap();
        assert_eq!(f1.key_impressions.len(), 2);
    }
}
