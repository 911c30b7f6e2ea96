// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Core runtime for a feature-flag ("split") SDK.

This crate implements the pieces that have to agree bit-for-bit with every
other language's SDK: deterministic bucketing, rule evaluation, in-memory
storage with the traffic-type refcounting and bounded queues the telemetry
and impression pipelines depend on, and the synchronization runtime (polling
plus an SSE push channel with polling fallback) that keeps that storage
fresh.

It is deliberately not a full client: input-format validation beyond what
`track`/`evaluate` need at their own boundary, persisted-backend storage
adapters, telemetry export, HTTP client selection, and the public client
façade all live one layer up.
"#]

pub mod config;
pub mod error;
pub mod hashing;
pub mod matchers;
pub mod models;
pub mod evaluator;
pub mod validation;
pub mod storage;
pub mod http;
pub mod sync;
pub mod sse;
pub mod push;
pub mod coordinator;
