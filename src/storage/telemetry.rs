// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
In-memory telemetry storage (spec §4.4): method latencies, counters and
gauges, all read destructively - the synchronizer that ships telemetry to
the backend pops a snapshot and the numbers reset to zero, so a failed
upload doesn't double-count on the next attempt.

This does not reuse a `prometheus`-style global registry: telemetry here
lives on a per-client instance and must support snapshot-and-reset reads,
which `prometheus`'s collectors aren't built for.
"#]

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Upper bounds (inclusive, milliseconds) of the 23 latency buckets the
/// telemetry pipeline reports, mirroring the bucket edges every Split SDK
/// ships identically so cross-language dashboards line up.
pub const LATENCY_BUCKET_COUNT: usize = 23;

const BUCKET_EDGES_MS: [u64; LATENCY_BUCKET_COUNT] = [
    1, 1500, 3000, 4500, 6000, 7500, 9000, 10500, 12000, 13500, 15000, 16500, 18000, 19500, 21000,
    22500, 24000, 25500, 27000, 28500, 30000, 60000, u64::MAX,
];

/// Maps a latency in milliseconds to its bucket index, clamping to the
/// first/last bucket for out-of-range values (spec §4.4).
pub fn bucket_for(latency_ms: u64) -> usize {
    BUCKET_EDGES_MS
        .iter()
        .position(|&edge| latency_ms <= edge)
        .unwrap_or(LATENCY_BUCKET_COUNT - 1)
}

/// Monotone counters, keyed by name. `increment` never decreases a value;
/// `pop_all` returns and zeroes every counter.
#[derive(Default)]
pub struct Counters {
    values: DashMap<String, AtomicU64>,
}

impl Counters {
    pub fn new() -> Self {
        Counters { values: DashMap::new() }
    }

    pub fn increment(&self, name: &str, by: u64) {
        self.values.entry(name.to_string()).or_insert_with(|| AtomicU64::new(0)).fetch_add(by, Ordering::Relaxed);
    }

    pub fn get(&self, name: &str) -> u64 {
        self.values.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn pop_all(&self) -> Vec<(String, u64)> {
        let mut out = Vec::with_capacity(self.values.len());
        for entry in self.values.iter() {
            let v = entry.value().swap(0, Ordering::Relaxed);
            if v > 0 {
                out.push((entry.key().clone(), v));
            }
        }
        out
    }
}

/// Last-writer-wins gauges, keyed by name.
#[derive(Default)]
pub struct Gauges {
    values: DashMap<String, AtomicI64>,
}

impl Gauges {
    pub fn new() -> Self {
        Gauges { values: DashMap::new() }
    }

    pub fn set(&self, name: &str, value: i64) {
        self.values.entry(name.to_string()).or_insert_with(|| AtomicI64::new(0)).store(value, Ordering::Relaxed);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).map(|g| g.load(Ordering::Relaxed))
    }

    /// Gauges represent current state, not accumulated activity, so popping
    /// returns the snapshot without clearing the entries themselves - only
    /// the next `set` moves them.
    pub fn pop_all(&self) -> Vec<(String, i64)> {
        self.values.iter().map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed))).collect()
    }
}

/// A fixed 23-bucket latency histogram per named method.
#[derive(Default)]
pub struct Latencies {
    buckets: DashMap<String, [AtomicU64; LATENCY_BUCKET_COUNT]>,
}

impl Latencies {
    pub fn new() -> Self {
        Latencies { buckets: DashMap::new() }
    }

    pub fn record(&self, method: &str, latency_ms: u64) {
        let idx = bucket_for(latency_ms);
        let entry = self
            .buckets
            .entry(method.to_string())
            .or_insert_with(|| std::array::from_fn(|_| AtomicU64::new(0)));
        entry[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns each method's 23-slot histogram and resets it to all zero.
    pub fn pop_all(&self) -> Vec<(String, [u64; LATENCY_BUCKET_COUNT])> {
        let mut out = Vec::with_capacity(self.buckets.len());
        for entry in self.buckets.iter() {
            let mut snapshot = [0u64; LATENCY_BUCKET_COUNT];
            for (i, slot) in entry.value().iter().enumerate() {
                snapshot[i] = slot.swap(0, Ordering::Relaxed);
            }
            out.push((entry.key().clone(), snapshot));
        }
        out
    }
}

/// Groups the three telemetry instruments a client instance keeps.
#[derive(Default)]
pub struct TelemetryStorage {
    pub counters: Counters,
    pub gauges: Gauges,
    pub latencies: Latencies,
}

impl TelemetryStorage {
    pub fn new() -> Self {
        TelemetryStorage::default()
    }
}
