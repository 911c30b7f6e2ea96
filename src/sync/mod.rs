// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Synchronizers (spec §4.5): the periodic tasks that keep storage fresh and
drain the impression/event queues. Each exposes a `synchronize()` that
fetches, applies, and returns a `Result` - transient failures are retried
with bounded exponential backoff inside `with_retry`, then surfaced rather
than panicking the caller's task loop.
"#]

pub mod events;
pub mod flags;
pub mod impressions;
pub mod segments;

pub use events::EventSynchronizer;
pub use flags::FlagSynchronizer;
pub use impressions::ImpressionSynchronizer;
pub use segments::SegmentSynchronizer;

use std::time::Duration;

use crate::error::SdkResult;

/// Retries `attempt` up to `config.sync_retry_attempts` times with
/// exponential backoff between `config.sync_backoff_base` and
/// `config.sync_backoff_max`, stopping early for non-retriable errors
/// (spec §4.5/§7). Returns the last error if every attempt is exhausted.
pub(crate) async fn with_retry<F, Fut, T>(attempts: u32, backoff_base: Duration, backoff_max: Duration, mut attempt: F) -> SdkResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = SdkResult<T>>,
{
    let mut delay = backoff_base;
    let mut last_err = None;
    for try_number in 0..attempts.max(1) {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retriable() => return Err(e),
            Err(e) => {
                log::warn!("sync attempt {} of {} failed: {}", try_number + 1, attempts, e);
                last_err = Some(e);
            }
        }
        if try_number + 1 < attempts {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(backoff_max);
        }
    }
    Err(last_err.expect("attempts.max(1) guarantees at least one iteration ran"))
}
