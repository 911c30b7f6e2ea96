// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
The push manager state machine (spec §4.7): `IDLE -> AUTHENTICATING ->
CONNECTED | POLLING`, with occupancy toggling between the latter two and
token expiry looping back through `AUTHENTICATING`. `stop()` moves to
`STOPPED` from any state.

The manager owns the SSE client and the auth call; it does not own the
synchronizers (spec §9 design note on cyclic references) - instead it
emits `SyncSignal`s that the coordinator forwards to them.
"#]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

use crate::http::HttpClient;
use crate::push::SyncSignal;
use crate::sse::{ChannelSpec, SseClient, SseEvent, SseHandler};
use crate::storage::{FlagStorage, SegmentStorage};

/// States of the push manager (spec §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushState {
    Idle,
    Authenticating,
    Connected,
    Polling,
    Stopped,
}

/// The three control values a `CONTROL` message can carry (spec §9 open
/// question, resolved as three distinct variants).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ControlType {
    #[serde(rename = "STREAMING_PAUSED")]
    StreamingPaused,
    #[serde(rename = "STREAMING_RESUMED")]
    StreamingResumed,
    #[serde(rename = "STREAMING_DISABLED")]
    StreamingDisabled,
}

/// The flattened notification envelope this crate expects on `event.data`.
/// The real backend's exact double-encoding of channel/data isn't pinned
/// by the distilled contract; this shape carries everything each variant
/// needs without an extra parse step.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum Notification {
    #[serde(rename = "SPLIT_UPDATE")]
    SplitUpdate {
        #[serde(rename = "changeNumber")]
        change_number: i64,
    },
    #[serde(rename = "SPLIT_KILL")]
    SplitKill {
        #[serde(rename = "changeNumber")]
        change_number: i64,
        #[serde(rename = "splitName")]
        split_name: String,
        #[serde(rename = "defaultTreatment")]
        default_treatment: String,
    },
    #[serde(rename = "SEGMENT_UPDATE")]
    SegmentUpdate {
        #[serde(rename = "changeNumber")]
        change_number: i64,
        #[serde(rename = "segmentName")]
        segment_name: String,
    },
    #[serde(rename = "CONTROL")]
    Control {
        #[serde(rename = "controlType")]
        control_type: ControlType,
    },
    #[serde(rename = "OCCUPANCY")]
    Occupancy { channel: String, metrics: OccupancyMetrics },
}

#[derive(Deserialize)]
struct OccupancyMetrics {
    publishers: i64,
}

pub struct PushManager {
    http: Arc<HttpClient>,
    sse: Arc<SseClient>,
    flags: Arc<FlagStorage>,
    segments: Arc<SegmentStorage>,
    signal_tx: UnboundedSender<SyncSignal>,

    state: Mutex<PushState>,
    reconnect: Notify,
    monitored_channels: Mutex<Vec<String>>,
    occupancy: Mutex<std::collections::HashMap<String, i64>>,
    last_flags_cn: AtomicI64,

    first_event_timeout: Duration,
    reconnect_backoff_base: Duration,
    reconnect_backoff_max: Duration,
    token_refresh_margin: Duration,
}

impl PushManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http: Arc<HttpClient>,
        sse: Arc<SseClient>,
        flags: Arc<FlagStorage>,
        segments: Arc<SegmentStorage>,
        signal_tx: UnboundedSender<SyncSignal>,
        first_event_timeout: Duration,
        reconnect_backoff_base: Duration,
        reconnect_backoff_max: Duration,
        token_refresh_margin: Duration,
    ) -> Arc<Self> {
        Arc::new(PushManager {
            http,
            sse,
            flags,
            segments,
            signal_tx,
            state: Mutex::new(PushState::Idle),
            reconnect: Notify::new(),
            monitored_channels: Mutex::new(Vec::new()),
            occupancy: Mutex::new(std::collections::HashMap::new()),
            last_flags_cn: AtomicI64::new(-1),
            first_event_timeout,
            reconnect_backoff_base,
            reconnect_backoff_max,
            token_refresh_margin,
        })
    }

    pub fn state(&self) -> PushState {
        *self.state.lock()
    }

    /// Drives the state machine until `stop()` is called. Intended to run
    /// as its own background task, owned by the coordinator.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = self.reconnect_backoff_base;
        loop {
            if self.state() == PushState::Stopped {
                return;
            }
            *self.state.lock() = PushState::Authenticating;

            let auth = match self.http.auth().await {
                Ok(auth) => auth,
                Err(e) => {
                    log::warn!("push auth failed, falling back to polling: {}", e);
                    *self.state.lock() = PushState::Polling;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.reconnect_backoff_max);
                    continue;
                }
            };

            if !auth.push_enabled {
                log::info!("streaming not enabled for this api key; staying on polling");
                *self.state.lock() = PushState::Polling;
                return;
            }

            let channels = build_channel_specs(&auth.channels);
            *self.monitored_channels.lock() = channels.iter().filter(|c| c.with_occupancy).map(|c| c.name.clone()).collect();
            self.occupancy.lock().clear();

            let handler: Arc<dyn SseHandler> = self.clone();
            let connected = self.sse.start(&auth.token, &channels, handler, self.first_event_timeout).await;
            if !connected {
                *self.state.lock() = PushState::Polling;
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.reconnect_backoff_max);
                continue;
            }
            backoff = self.reconnect_backoff_base;
            *self.state.lock() = PushState::Connected;

            let refresh_delay = token_refresh_delay(auth.expiration, self.token_refresh_margin);
            let refresh_sse = self.sse.clone();
            let refresh_handle = tokio::spawn(async move {
                tokio::time::sleep(refresh_delay).await;
                refresh_sse.stop(false);
            });

            self.reconnect.notified().await;
            refresh_handle.abort();

            if self.state() == PushState::Stopped {
                return;
            }
        }
    }

    /// Moves to `STOPPED` from any state and tears down the SSE connection
    /// (spec §4.7 "any state -> stop -> STOPPED").
    pub fn stop(&self) {
        *self.state.lock() = PushState::Stopped;
        self.sse.stop(true);
        self.reconnect.notify_one();
    }

    fn handle_notification(&self, data: &str) {
        let notification: Notification = match serde_json::from_str(data) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("dropping malformed push notification: {}", e);
                return;
            }
        };
        match notification {
            Notification::SplitUpdate { change_number } => {
                if change_number > self.last_flags_cn.load(Ordering::Acquire) {
                    self.last_flags_cn.store(change_number, Ordering::Release);
                    let _ = self.signal_tx.send(SyncSignal::SyncFlags);
                }
            }
            Notification::SplitKill { change_number, split_name, default_treatment } => {
                self.flags.kill_locally(&split_name, &default_treatment, change_number);
                if change_number > self.last_flags_cn.load(Ordering::Acquire) {
                    self.last_flags_cn.store(change_number, Ordering::Release);
                }
                let _ = self.signal_tx.send(SyncSignal::SyncFlags);
            }
            Notification::SegmentUpdate { change_number, segment_name } => {
                if change_number > self.segments.change_number(&segment_name) {
                    let _ = self.signal_tx.send(SyncSignal::SyncSegment(segment_name));
                }
            }
            Notification::Control { control_type } => self.apply_control(control_type),
            Notification::Occupancy { channel, metrics } => self.apply_occupancy(channel, metrics.publishers),
        }
    }

    fn apply_control(&self, control_type: ControlType) {
        let mut state = self.state.lock();
        match (*state, control_type) {
            (PushState::Stopped, _) => {}
            (_, ControlType::StreamingDisabled) => {
                drop(state);
                self.stop();
            }
            (PushState::Connected, ControlType::StreamingPaused) => *state = PushState::Polling,
            (PushState::Polling, ControlType::StreamingResumed) => *state = PushState::Connected,
            _ => {}
        }
    }

    fn apply_occupancy(&self, channel: String, publishers: i64) {
        self.occupancy.lock().insert(channel, publishers);
        let monitored = self.monitored_channels.lock();
        if monitored.is_empty() {
            return;
        }
        let occupancy = self.occupancy.lock();
        let all_present = monitored.iter().all(|c| occupancy.get(c).copied().unwrap_or(1) > 0);
        drop(occupancy);
        drop(monitored);

        let mut state = self.state.lock();
        match (*state, all_present) {
            (PushState::Connected, false) => *state = PushState::Polling,
            (PushState::Polling, true) => *state = PushState::Connected,
            _ => {}
        }
    }
}

impl SseHandler for PushManager {
    fn on_connect(&self) {
        log::debug!("push stream connected");
    }

    fn on_disconnect(&self, requested: bool) {
        log::debug!("push stream disconnected (requested={})", requested);
        if !requested && self.state() != PushState::Stopped {
            *self.state.lock() = PushState::Polling;
        }
        self.reconnect.notify_one();
    }

    fn on_event(&self, event: SseEvent) {
        self.handle_notification(&event.data);
    }
}

/// `control_` channels carry occupancy metrics for their publisher count
/// (spec §4.6/§4.7); every other channel is a plain subscription.
fn build_channel_specs(channels: &[String]) -> Vec<ChannelSpec> {
    channels
        .iter()
        .map(|c| if c.starts_with("control_") { ChannelSpec::with_occupancy(c.clone()) } else { ChannelSpec::plain(c.clone()) })
        .collect()
}

fn token_refresh_delay(expiration_epoch_secs: i64, margin: Duration) -> Duration {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let expiration = Duration::from_secs(expiration_epoch_secs.max(0) as u64);
    expiration.saturating_sub(now).saturating_sub(margin)
}
