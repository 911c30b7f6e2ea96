// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Concurrent segment storage (spec §3/§4.4): name -> (member set, change
//! number), updated by applying add/remove deltas atomically per segment.

use dashmap::DashMap;

use crate::models::Segment;

pub struct SegmentStorage {
    segments: DashMap<String, Segment>,
}

impl SegmentStorage {
    pub fn new() -> Self {
        SegmentStorage { segments: DashMap::new() }
    }

    pub fn contains(&self, name: &str, key: &str) -> bool {
        self.segments.get(name).map(|s| s.contains(key)).unwrap_or(false)
    }

    pub fn change_number(&self, name: &str) -> i64 {
        self.segments.get(name).map(|s| s.change_number).unwrap_or(-1)
    }

    pub fn names(&self) -> Vec<String> {
        self.segments.iter().map(|r| r.key().clone()).collect()
    }

    pub fn keys(&self, name: &str) -> Vec<String> {
        self.segments.get(name).map(|s| s.keys.iter().cloned().collect()).unwrap_or_default()
    }

    /// Applies `added`/`removed` deltas against the stored segment (creating
    /// it if unknown) and advances its change number. Removal always wins
    /// over addition for a key present in both lists, matching the
    /// "added then removed" ordering the backend sends deltas in.
    pub fn update(&self, name: &str, added: &[String], removed: &[String], cn: i64) {
        let mut entry = self.segments.entry(name.to_string()).or_insert_with(|| Segment::new(name));
        for key in added {
            entry.keys.insert(key.clone());
        }
        for key in removed {
            entry.keys.remove(key);
        }
        entry.change_number = cn;
    }

    /// No-op for unknown segments (spec §4.4).
    pub fn set_change_number(&self, name: &str, cn: i64) {
        if let Some(mut entry) = self.segments.get_mut(name) {
            entry.change_number = cn;
        }
    }

    pub fn remove(&self, name: &str) {
        self.segments.remove(name);
    }
}

impl Default for SegmentStorage {
    fn default() -> Self {
        Self::new()
    }
}
