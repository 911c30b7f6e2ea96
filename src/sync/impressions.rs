// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Impression synchronizer (spec §4.5): drains the impression queue in
//! batches and POSTs them. A batch that fails to post is dropped rather
//! than requeued - at-most-once delivery, per spec.

use std::sync::Arc;

use crate::error::SdkResult;
use crate::http::HttpClient;
use crate::storage::ImpressionQueue;

pub struct ImpressionSynchronizer {
    http: Arc<HttpClient>,
    queue: Arc<ImpressionQueue>,
    batch_size: usize,
}

impl ImpressionSynchronizer {
    pub fn new(http: Arc<HttpClient>, queue: Arc<ImpressionQueue>, batch_size: usize) -> Self {
        ImpressionSynchronizer { http, queue, batch_size }
    }

    /// Pops one batch and posts it. A post failure drops the batch rather
    /// than retrying - the next tick will simply see a fresh queue.
    pub async fn synchronize(&self) -> SdkResult<usize> {
        let batch = self.queue.pop_many(self.batch_size);
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        self.http.post_impressions(&batch).await?;
        Ok(count)
    }

    /// Best-effort final drain on shutdown (spec §5 cancellation policy):
    /// pops and posts everything currently queued, ignoring the result.
    pub async fn flush(&self) {
        loop {
            let batch = self.queue.pop_many(self.batch_size);
            if batch.is_empty() {
                return;
            }
            if self.http.post_impressions(&batch).await.is_err() {
                return;
            }
        }
    }
}
