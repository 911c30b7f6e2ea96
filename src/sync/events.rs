// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Event synchronizer (spec §4.5): mirrors `ImpressionSynchronizer` over
//! the event queue and `/events/bulk`.

use std::sync::Arc;

use crate::error::SdkResult;
use crate::http::HttpClient;
use crate::storage::EventQueue;

pub struct EventSynchronizer {
    http: Arc<HttpClient>,
    queue: Arc<EventQueue>,
    batch_size: usize,
}

impl EventSynchronizer {
    pub fn new(http: Arc<HttpClient>, queue: Arc<EventQueue>, batch_size: usize) -> Self {
        EventSynchronizer { http, queue, batch_size }
    }

    pub async fn synchronize(&self) -> SdkResult<usize> {
        let batch = self.queue.pop_many(self.batch_size);
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        self.http.post_events(&batch).await?;
        Ok(count)
    }

    pub async fn flush(&self) {
        loop {
            let batch = self.queue.pop_many(self.batch_size);
            if batch.is_empty() {
                return;
            }
            if self.http.post_events(&batch).await.is_err() {
                return;
            }
        }
    }
}
