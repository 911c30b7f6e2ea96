// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Flag synchronizer (spec §4.5): pulls `splitChanges` deltas and applies
//! them to `FlagStorage`, advancing the stored change number to the
//! response's `till` regardless of whether any flag in the page changed.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SdkResult;
use crate::http::HttpClient;
use crate::models::FlagStatus;
use crate::storage::FlagStorage;
use crate::sync::with_retry;

pub struct FlagSynchronizer {
    http: Arc<HttpClient>,
    storage: Arc<FlagStorage>,
    retry_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl FlagSynchronizer {
    pub fn new(http: Arc<HttpClient>, storage: Arc<FlagStorage>, retry_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        FlagSynchronizer { http, storage, retry_attempts, backoff_base, backoff_max }
    }

    /// One sync tick: fetches from the currently-stored change number and
    /// applies the full page. Flag storage only tracks a single global
    /// change number via the max `change_number` across stored flags, so we
    /// thread it through the caller-supplied `since` on each call.
    pub async fn synchronize(&self, since: i64) -> SdkResult<i64> {
        with_retry(self.retry_attempts, self.backoff_base, self.backoff_max, || async {
            let changes = self.http.split_changes(since).await?;
            for flag in changes.flags {
                match flag.status {
                    FlagStatus::Active => self.storage.put(flag),
                    FlagStatus::Archived => self.storage.remove(&flag.name),
                }
            }
            Ok(changes.till)
        })
        .await
    }
}
