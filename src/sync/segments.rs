// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Segment synchronizer (spec §4.5): fans out one fetch loop per segment name
over a bounded worker pool (default 10, spec §5), each loop paging
`segmentChanges` until `since == till`. Grounded in the teacher's worker
pool shape - a `tokio::sync::Semaphore` bounding concurrent fetches rather
than a fixed-size thread pool, the way `MultiTargetFetcher` bounds
concurrent per-target fetchers.
"#]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::SdkResult;
use crate::http::HttpClient;
use crate::storage::SegmentStorage;
use crate::sync::with_retry;

pub struct SegmentSynchronizer {
    http: Arc<HttpClient>,
    storage: Arc<SegmentStorage>,
    workers: Arc<Semaphore>,
    retry_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl SegmentSynchronizer {
    pub fn new(http: Arc<HttpClient>, storage: Arc<SegmentStorage>, worker_count: usize, retry_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        SegmentSynchronizer {
            http,
            storage,
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            retry_attempts,
            backoff_max,
            backoff_base,
        }
    }

    /// Syncs every segment in `names` concurrently, bounded by the worker
    /// pool. A single segment's failure doesn't prevent the others from
    /// completing; the first error encountered (if any) is returned after
    /// all segments have been attempted.
    pub async fn synchronize(&self, names: &[String]) -> SdkResult<()> {
        let mut tasks = Vec::with_capacity(names.len());
        for name in names {
            let permit = self.workers.clone().acquire_owned().await.expect("semaphore is never closed");
            let http = self.http.clone();
            let storage = self.storage.clone();
            let retry_attempts = self.retry_attempts;
            let backoff_base = self.backoff_base;
            let backoff_max = self.backoff_max;
            let name = name.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                Self::sync_one(&http, &storage, &name, retry_attempts, backoff_base, backoff_max).await
            }));
        }

        let mut first_error = None;
        for task in tasks {
            match task.await.expect("segment sync task must not panic") {
                Ok(()) => {}
                Err(e) => {
                    log::warn!("segment sync failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn sync_one(http: &HttpClient, storage: &SegmentStorage, name: &str, retry_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> SdkResult<()> {
        loop {
            let since = storage.change_number(name);
            let changes = with_retry(retry_attempts, backoff_base, backoff_max, || http.segment_changes(name, since)).await?;
            storage.update(name, &changes.added, &changes.removed, changes.till);
            if changes.since == changes.till {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_server_returning(body: &'static str) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}", server.server_addr());
        std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = tiny_http::Response::from_string(body);
                let _ = request.respond(response);
            }
        });
        url
    }

    #[tokio::test]
    async fn synchronize_pages_a_single_segment_until_since_equals_till() {
        let body = r#"{"name":"beta","added":["alice"],"removed":[],"since":-1,"till":-1}"#;
        let url = spawn_server_returning(body);
        let http = Arc::new(HttpClient::new(url.clone(), url, "apikey", Duration::from_secs(5)).unwrap());
        let storage = Arc::new(SegmentStorage::new());

        let sync = SegmentSynchronizer::new(http, storage.clone(), 4, 3, Duration::from_millis(1), Duration::from_millis(10));
        sync.synchronize(&["beta".to_string()]).await.unwrap();

        assert!(storage.contains("beta", "alice"));
        assert_eq!(storage.change_number("beta"), -1);
    }
}
