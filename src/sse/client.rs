// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
The SSE client (spec §4.6): opens one long-lived `GET` stream, parses it
line by line, and delivers events to a handler. `start` blocks (as a
future) until the first event arrives, an `error` event arrives first, or
a timeout/connection error occurs - mirroring the teacher's watch loop
shape (`tokio::select!` driving a background task) but over an HTTP byte
stream instead of a gRPC one.
"#]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::parser::{Parser, SseEvent};

/// Upper bound on how long `stop()` can take to actually end the reader
/// loop when the peer keeps the connection open without sending anything.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One channel this client subscribes to, optionally wrapped with the
/// occupancy-metrics prefix (spec §4.6).
#[derive(Clone, Debug)]
pub struct ChannelSpec {
    pub name: String,
    pub with_occupancy: bool,
}

impl ChannelSpec {
    pub fn plain(name: impl Into<String>) -> Self {
        ChannelSpec { name: name.into(), with_occupancy: false }
    }

    pub fn with_occupancy(name: impl Into<String>) -> Self {
        ChannelSpec { name: name.into(), with_occupancy: true }
    }
}

/// Encodes channels as `[?occupancy=metrics.publishers]<name>` for those
/// requesting occupancy, joined by commas (spec §4.6).
pub fn encode_channels(channels: &[ChannelSpec]) -> String {
    channels
        .iter()
        .map(|c| if c.with_occupancy { format!("[?occupancy=metrics.publishers]{}", c.name) } else { c.name.clone() })
        .collect::<Vec<_>>()
        .join(",")
}

/// Callbacks the SSE client drives. Implemented by the push manager in a
/// running client; a plain closure-backed impl is enough for tests.
pub trait SseHandler: Send + Sync {
    fn on_connect(&self);
    fn on_disconnect(&self, requested: bool);
    fn on_event(&self, event: SseEvent);
}

pub struct SseClient {
    http: reqwest::Client,
    stream_url: String,
    connected: Arc<AtomicBool>,
    terminate: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl SseClient {
    pub fn new(http: reqwest::Client, stream_url: impl Into<String>) -> Self {
        SseClient {
            http,
            stream_url: stream_url.into(),
            connected: Arc::new(AtomicBool::new(false)),
            terminate: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Opens the stream and waits for the connection to resolve one way or
    /// the other. Returns `true` iff the first delivered item was a real
    /// event (not an `error` event); `handler.on_event` is called for it
    /// before returning, and a background task keeps forwarding subsequent
    /// events until disconnect.
    pub async fn start(
        &self,
        token: &str,
        channels: &[ChannelSpec],
        handler: Arc<dyn SseHandler>,
        first_event_timeout: Duration,
    ) -> bool {
        if self.connected.load(Ordering::Acquire) {
            return false;
        }
        self.terminate.store(false, Ordering::Release);
        self.stop_requested.store(false, Ordering::Release);

        let url = format!("{}/event-stream?v=1.1&accessToken={}&channels={}", self.stream_url, token, encode_channels(channels));

        let response = match self.http.get(&url).header("Accept", "text/event-stream").send().await {
            Ok(r) if r.status().is_success() => r,
            _ => return false,
        };

        // The HTTP connection itself is up now; on_connect reflects that,
        // independent of whether the first SSE-level event turns out to be
        // an application error.
        handler.on_connect();

        let mut byte_stream = response.bytes_stream();
        let (tx, mut rx) = mpsc::unbounded_channel::<SseEvent>();
        let terminate = self.terminate.clone();
        let stop_requested = self.stop_requested.clone();
        let connected = self.connected.clone();
        let handler_bg = handler.clone();

        tokio::spawn(async move {
            let mut parser = Parser::new();
            let mut buf = String::new();
            loop {
                if terminate.load(Ordering::Acquire) {
                    break;
                }
                // A bare `byte_stream.next().await` can park for as long as
                // the peer holds the connection open without sending
                // anything; polling it through a short timeout instead
                // bounds how long `stop()` can take to actually end the
                // loop, rather than relying on the peer to close the socket.
                match tokio::time::timeout(READ_POLL_INTERVAL, byte_stream.next()).await {
                    Ok(Some(Ok(bytes))) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(idx) = buf.find('\n') {
                            let line = buf[..idx].trim_end_matches('\r').to_string();
                            buf.drain(..=idx);
                            if let Some(event) = parser.push_line(&line) {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(_) => break,
                    Err(_elapsed) => continue,
                }
            }
            connected.store(false, Ordering::Release);
            handler_bg.on_disconnect(stop_requested.load(Ordering::Acquire));
        });

        let first = tokio::time::timeout(first_event_timeout, rx.recv()).await;
        match first {
            Ok(Some(event)) if event.event.as_deref() == Some("error") => {
                self.terminate.store(true, Ordering::Release);
                false
            }
            Ok(Some(event)) => {
                self.connected.store(true, Ordering::Release);
                handler.on_event(event);
                let handler_fwd = handler.clone();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        handler_fwd.on_event(event);
                    }
                });
                true
            }
            _ => {
                self.terminate.store(true, Ordering::Release);
                false
            }
        }
    }

    /// Stops the current stream. `requested` is reported verbatim to
    /// `on_disconnect` once the read loop notices and exits (spec §4.6).
    pub fn stop(&self, requested: bool) {
        self.stop_requested.store(requested, Ordering::Release);
        self.terminate.store(true, Ordering::Release);
    }
}
