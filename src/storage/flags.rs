// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Concurrent flag storage (spec §3 FlagStorage invariants, §4.4). Backed by a
`DashMap` the same way the teacher's key-value `Store` shards its tree map -
readers never block writers of unrelated keys, and `put`/`remove` for a
single name are serialized against each other by the map's own per-shard
locking.

A traffic-type refcount map rides alongside the flag map so
`is_valid_traffic_type` never has to scan every stored flag.
"#]

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::models::Flag;

/// Flag name -> `Flag`, plus a traffic-type -> refcount side table.
pub struct FlagStorage {
    flags: DashMap<String, Flag>,
    traffic_type_counts: DashMap<String, AtomicU32>,
}

impl FlagStorage {
    pub fn new() -> Self {
        FlagStorage {
            flags: DashMap::new(),
            traffic_type_counts: DashMap::new(),
        }
    }

    /// Returns the most recent `put(flag)`, or `None` if never stored or
    /// since removed (spec §3(a)).
    pub fn get(&self, name: &str) -> Option<Flag> {
        self.flags.get(name).map(|r| r.clone())
    }

    /// Returns a map containing every requested name, with `None` for
    /// misses (spec §4.4 `fetchMany`).
    pub fn fetch_many(&self, names: &[String]) -> HashMap<String, Option<Flag>> {
        names.iter().map(|n| (n.clone(), self.get(n))).collect()
    }

    pub fn get_all(&self) -> Vec<Flag> {
        self.flags.iter().map(|r| r.value().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.flags.iter().map(|r| r.key().clone()).collect()
    }

    /// Inserts or overwrites `flag`. If a flag of the same name previously
    /// existed with a different traffic type, that type's refcount is
    /// decremented before the new type's is incremented (spec §3(b)).
    pub fn put(&self, flag: Flag) {
        let previous_tt = self.flags.insert(flag.name.clone(), flag.clone()).map(|f| f.traffic_type_name);
        match previous_tt {
            Some(prev) if prev != flag.traffic_type_name => {
                self.decrement_traffic_type(&prev);
                self.increment_traffic_type(&flag.traffic_type_name);
            }
            Some(_) => {
                // Same traffic type: refcount is unaffected.
            }
            None => self.increment_traffic_type(&flag.traffic_type_name),
        }
    }

    pub fn remove(&self, name: &str) {
        if let Some((_, flag)) = self.flags.remove(name) {
            self.decrement_traffic_type(&flag.traffic_type_name);
        }
    }

    /// True iff at least one stored flag currently has traffic type `tt`
    /// (spec §3(b)).
    pub fn is_valid_traffic_type(&self, tt: &str) -> bool {
        self.traffic_type_counts
            .get(tt)
            .map(|c| c.load(Ordering::Acquire) > 0)
            .unwrap_or(false)
    }

    /// `killLocally` (spec §3(c)): a no-op unless `cn > flag.change_number`,
    /// in which case the flag is killed locally, its default treatment
    /// overwritten, and its change number bumped. Idempotent for
    /// `cn <= stored.change_number` and monotone in `cn` (spec §8 invariant 5).
    pub fn kill_locally(&self, name: &str, default_treatment: &str, cn: i64) {
        if let Some(mut entry) = self.flags.get_mut(name) {
            if cn > entry.change_number {
                entry.killed = true;
                entry.default_treatment = default_treatment.to_string();
                entry.change_number = cn;
            }
        }
    }

    pub fn change_number(&self, name: &str) -> Option<i64> {
        self.flags.get(name).map(|f| f.change_number)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    fn increment_traffic_type(&self, tt: &str) {
        self.traffic_type_counts
            .entry(tt.to_string())
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::AcqRel);
    }

    fn decrement_traffic_type(&self, tt: &str) {
        if let Some(counter) = self.traffic_type_counts.get(tt) {
            // saturating: never go below zero even under a racing double-decrement.
            let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)));
        }
    }
}

impl Default for FlagStorage {
    fn default() -> Self {
        Self::new()
    }
}
