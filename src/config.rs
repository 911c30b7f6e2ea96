// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Configuration the core consumes (spec §6). Parsing flags/env vars and
//! factory glue live one layer up; this is just the settled values.

use std::time::Duration;

/// Options the evaluation/sync/push core reads. Everything else (HTTP
/// client choice, logging setup, persisted storage) is the host's job.
#[derive(Clone, Debug)]
pub struct SdkConfig {
    pub apikey: String,

    pub features_refresh_rate: Duration,
    pub segments_refresh_rate: Duration,
    pub impressions_refresh_rate: Duration,
    pub events_refresh_rate: Duration,
    pub metrics_refresh_rate: Duration,

    pub impressions_queue_size: usize,
    pub events_queue_size_bytes: usize,

    pub streaming_enabled: bool,

    /// Base URL for `splitChanges`/`segmentChanges`/`auth`/bulk posts.
    pub sdk_url: String,
    /// Base URL for the SSE stream (`<stream-base>/event-stream`).
    pub stream_url: String,
    /// Base URL for the push auth endpoint, normally the same host as `sdk_url`.
    pub auth_url: String,

    /// Bound on the segment synchronizer's fan-out worker pool (spec §5, default 10).
    pub segment_workers: usize,
    /// Max retry attempts for a synchronizer tick before surfacing "sync failed" (spec §4.5, typical 3).
    pub sync_retry_attempts: u32,
    /// Base delay for the synchronizer's exponential backoff.
    pub sync_backoff_base: Duration,
    /// Cap on the synchronizer's exponential backoff.
    pub sync_backoff_max: Duration,
    /// Cap on the SSE client's reconnection backoff (spec §7).
    pub sse_backoff_max: Duration,
    /// Per-request timeout for every HTTP call the core makes (spec §5).
    pub request_timeout: Duration,
    /// How long before a push token's expiration to proactively re-auth (spec §4.7, typical 10m).
    pub token_refresh_margin: Duration,
}

impl Default for SdkConfig {
    fn default() -> Self {
        SdkConfig {
            apikey: String::new(),
            features_refresh_rate: Duration::from_secs(60),
            segments_refresh_rate: Duration::from_secs(60),
            impressions_refresh_rate: Duration::from_secs(60),
            events_refresh_rate: Duration::from_secs(60),
            metrics_refresh_rate: Duration::from_secs(3600),
            impressions_queue_size: 30_000,
            events_queue_size_bytes: 512 * 1024,
            streaming_enabled: true,
            sdk_url: "https://sdk.split.io/api".to_string(),
            stream_url: "https://streaming.split.io".to_string(),
            auth_url: "https://auth.split.io/api".to_string(),
            segment_workers: 10,
            sync_retry_attempts: 3,
            sync_backoff_base: Duration::from_millis(500),
            sync_backoff_max: Duration::from_secs(30),
            sse_backoff_max: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            token_refresh_margin: Duration::from_secs(10 * 60),
        }
    }
}

impl SdkConfig {
    pub fn is_localhost_mode(&self) -> bool {
        self.apikey == "localhost"
    }
}
