// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
The synchronizer coordinator (spec §4.8): owns the periodic timers, the
push manager, and the channel that carries the push manager's
`SyncSignal`s back to the flag/segment synchronizers. Guarantees exactly
one of "periodic" or "streaming" mode is active, and turns the push
manager's `CONNECTED`/`POLLING` transitions into a cooperative pause of the
periodic flag/segment timers rather than tearing them down (spec §9).
"#]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::SdkConfig;
use crate::http::HttpClient;
use crate::matchers::MatcherKind;
use crate::push::{PushManager, PushState, SyncSignal};
use crate::storage::Storages;
use crate::sse::SseClient;
use crate::sync::{EventSynchronizer, FlagSynchronizer, ImpressionSynchronizer, SegmentSynchronizer};

/// Matches the backend's own bulk-endpoint page size for impressions.
const IMPRESSIONS_BATCH_SIZE: usize = 5000;
/// Matches the backend's own bulk-endpoint page size for events.
const EVENTS_BATCH_SIZE: usize = 5000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    Periodic,
    Streaming,
    Stopped,
}

pub struct SynchronizerCoordinator {
    storages: Storages,
    flags_sync: FlagSynchronizer,
    segments_sync: SegmentSynchronizer,
    impressions_sync: ImpressionSynchronizer,
    events_sync: EventSynchronizer,
    push: Arc<PushManager>,
    signal_rx: Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<SyncSignal>>>,

    mode: Mutex<Mode>,
    flags_since: AtomicI64,
    periodic_started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,

    features_refresh_rate: Duration,
    segments_refresh_rate: Duration,
    impressions_refresh_rate: Duration,
    events_refresh_rate: Duration,
}

impl SynchronizerCoordinator {
    pub fn new(config: &SdkConfig, http: Arc<HttpClient>, sse: Arc<SseClient>, storages: Storages) -> Arc<Self> {
        let (signal_tx, signal_rx) = tokio::sync::mpsc::unbounded_channel();
        let push = PushManager::new(
            http.clone(),
            sse,
            storages.flags.clone(),
            storages.segments.clone(),
            signal_tx,
            config.request_timeout,
            config.sync_backoff_base,
            config.sse_backoff_max,
            config.token_refresh_margin,
        );

        Arc::new(SynchronizerCoordinator {
            flags_sync: FlagSynchronizer::new(http.clone(), storages.flags.clone(), config.sync_retry_attempts, config.sync_backoff_base, config.sync_backoff_max),
            segments_sync: SegmentSynchronizer::new(http.clone(), storages.segments.clone(), config.segment_workers, config.sync_retry_attempts, config.sync_backoff_base, config.sync_backoff_max),
            impressions_sync: ImpressionSynchronizer::new(http.clone(), storages.impressions.clone(), IMPRESSIONS_BATCH_SIZE),
            events_sync: EventSynchronizer::new(http, storages.events.clone(), EVENTS_BATCH_SIZE),
            storages,
            push,
            signal_rx: Mutex::new(Some(signal_rx)),
            mode: Mutex::new(Mode::Idle),
            flags_since: AtomicI64::new(-1),
            periodic_started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            features_refresh_rate: config.features_refresh_rate,
            segments_refresh_rate: config.segments_refresh_rate,
            impressions_refresh_rate: config.impressions_refresh_rate,
            events_refresh_rate: config.events_refresh_rate,
        })
    }

    pub fn push_state(&self) -> PushState {
        self.push.state()
    }

    /// Starts periodic flag/segment/impression/event sync timers. If
    /// streaming is also running, flag/segment ticks become no-ops while
    /// the push manager reports `CONNECTED` - a pause, not a teardown.
    pub fn start_periodic(self: &Arc<Self>) {
        *self.mode.lock() = Mode::Periodic;
        self.ensure_periodic_timers();
    }

    fn ensure_periodic_timers(self: &Arc<Self>) {
        if self.periodic_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.spawn_flag_timer();
        self.spawn_segment_timer();
        self.spawn_impression_timer();
        self.spawn_event_timer();
    }

    /// Starts the push manager and the signal dispatcher that forwards its
    /// `SyncSignal`s to the flag/segment synchronizers. Periodic tasks, if
    /// already running from `start_periodic`, are left alive and simply
    /// skip their ticks while the manager reports `CONNECTED`.
    pub fn start_streaming(self: &Arc<Self>) {
        *self.mode.lock() = Mode::Streaming;

        let push = self.push.clone();
        self.tasks.lock().push(tokio::spawn(async move { push.run().await }));

        if let Some(mut rx) = self.signal_rx.lock().take() {
            let this = self.clone();
            self.tasks.lock().push(tokio::spawn(async move {
                while let Some(signal) = rx.recv().await {
                    this.handle_signal(signal).await;
                }
            }));
        }

        // The flag/segment timers must exist even in streaming mode so
        // there's something to fall back to once the push manager reports
        // POLLING; they're created once and simply skip ticks while
        // CONNECTED (spec §9's "cooperative pause, not teardown").
        self.ensure_periodic_timers();
    }

    async fn handle_signal(&self, signal: SyncSignal) {
        match signal {
            SyncSignal::SyncFlags => self.tick_flags().await,
            SyncSignal::SyncSegment(name) => {
                if let Err(e) = self.segments_sync.synchronize(&[name]).await {
                    log::warn!("push-triggered segment sync failed: {}", e);
                }
            }
        }
    }

    async fn tick_flags(&self) {
        let since = self.flags_since.load(Ordering::Acquire);
        match self.flags_sync.synchronize(since).await {
            Ok(till) => self.flags_since.store(till, Ordering::Release),
            Err(e) => log::warn!("flag sync failed: {}", e),
        }
    }

    async fn tick_segments(&self) {
        let names = referenced_segment_names(&self.storages.flags);
        if names.is_empty() {
            return;
        }
        if let Err(e) = self.segments_sync.synchronize(&names).await {
            log::warn!("segment sync failed: {}", e);
        }
    }

    fn should_run_periodic(&self) -> bool {
        match *self.mode.lock() {
            Mode::Stopped => false,
            Mode::Streaming => self.push.state() != PushState::Connected,
            Mode::Periodic | Mode::Idle => true,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.mode.lock() == Mode::Stopped
    }

    fn spawn_flag_timer(self: &Arc<Self>) {
        let this = self.clone();
        let interval = self.features_refresh_rate;
        self.tasks.lock().push(tokio::spawn(async move {
            loop {
                if this.is_stopped() {
                    return;
                }
                if this.should_run_periodic() {
                    this.tick_flags().await;
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    fn spawn_segment_timer(self: &Arc<Self>) {
        let this = self.clone();
        let interval = self.segments_refresh_rate;
        self.tasks.lock().push(tokio::spawn(async move {
            loop {
                if this.is_stopped() {
                    return;
                }
                if this.should_run_periodic() {
                    this.tick_segments().await;
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    fn spawn_impression_timer(self: &Arc<Self>) {
        let this = self.clone();
        let interval = self.impressions_refresh_rate;
        self.tasks.lock().push(tokio::spawn(async move {
            loop {
                if this.is_stopped() {
                    return;
                }
                if let Err(e) = this.impressions_sync.synchronize().await {
                    log::warn!("impression flush failed: {}", e);
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    fn spawn_event_timer(self: &Arc<Self>) {
        let this = self.clone();
        let interval = self.events_refresh_rate;
        self.tasks.lock().push(tokio::spawn(async move {
            loop {
                if this.is_stopped() {
                    return;
                }
                if let Err(e) = this.events_sync.synchronize().await {
                    log::warn!("event flush failed: {}", e);
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    /// Stops every timer and the push manager, then makes one best-effort
    /// drain of whatever impressions/events are still queued (spec §5).
    pub async fn stop(&self) {
        *self.mode.lock() = Mode::Stopped;
        self.push.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.impressions_sync.flush().await;
        self.events_sync.flush().await;
    }
}

/// Flags reference segments through `IN_SEGMENT` matchers (and, in
/// principle, through dependency matchers on flags that themselves
/// reference segments - dependencies are not followed transitively here
/// since `Dependency` names a flag, not a segment directly).
fn referenced_segment_names(flags: &crate::storage::FlagStorage) -> Vec<String> {
    let mut names = HashSet::new();
    for flag in flags.get_all() {
        for condition in &flag.conditions {
            for matcher in &condition.matchers {
                if let MatcherKind::InSegment(name) = &matcher.kind {
                    names.insert(name.clone());
                }
            }
        }
    }
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, Combiner, ConditionType, Flag, Partition};

    #[test]
    fn referenced_segment_names_collects_unique_in_segment_matchers() {
        let storage = crate::storage::FlagStorage::new();
        let mut flag = Flag::new("f1", "user", "off", 1);
        flag.conditions.push(Condition {
            label: "default rule".to_string(),
            condition_type: ConditionType::Rollout,
            combiner: Combiner::And,
            matchers: vec![
                crate::matchers::Matcher::new(MatcherKind::InSegment("beta".to_string())),
                crate::matchers::Matcher::new(MatcherKind::InSegment("beta".to_string())),
            ],
            partitions: vec![Partition { treatment: "on".to_string(), size: 100 }],
        });
        storage.put(flag);

        let names = referenced_segment_names(&storage);
        assert_eq!(names, vec!["beta".to_string()]);
    }
}
