// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
In-memory storage (spec §3/§4.4): flags, segments, the bounded impression
and event queues, and telemetry counters/gauges/latencies. Each submodule
owns one concurrent structure; `Storages` just bundles them behind shared
references so the synchronizers, evaluator callers and push manager can
each hold their own clone of the handles they need.
"#]

pub mod flags;
pub mod queues;
pub mod segments;
pub mod telemetry;

pub use flags::FlagStorage;
pub use queues::{EventQueue, ImpressionQueue};
pub use segments::SegmentStorage;
pub use telemetry::TelemetryStorage;

use std::sync::Arc;

/// The full set of storage handles a running client shares across its
/// evaluator, synchronizers and push manager. Cloning `Storages` clones the
/// `Arc`s, not the underlying maps.
#[derive(Clone)]
pub struct Storages {
    pub flags: Arc<FlagStorage>,
    pub segments: Arc<SegmentStorage>,
    pub impressions: Arc<ImpressionQueue>,
    pub events: Arc<EventQueue>,
    pub telemetry: Arc<TelemetryStorage>,
}

impl Storages {
    pub fn new(impressions_capacity: usize, events_capacity_bytes: usize) -> Self {
        Storages {
            flags: Arc::new(FlagStorage::new()),
            segments: Arc::new(SegmentStorage::new()),
            impressions: Arc::new(ImpressionQueue::new(impressions_capacity)),
            events: Arc::new(EventQueue::new(events_capacity_bytes)),
            telemetry: Arc::new(TelemetryStorage::new()),
        }
    }
}
