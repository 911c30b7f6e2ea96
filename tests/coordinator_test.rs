// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! The coordinator's periodic mode end to end: a mock backend serves
//! `splitChanges`, the flag timer picks it up into real storage, and
//! `stop()` drains whatever impressions/events are still queued.

use std::sync::Arc;
use std::time::Duration;

use split_core::config::SdkConfig;
use split_core::coordinator::SynchronizerCoordinator;
use split_core::http::HttpClient;
use split_core::models::{Event, Impression};
use split_core::sse::SseClient;
use split_core::storage::Storages;

fn spawn_mock_backend() -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = format!("http://{}", server.server_addr());
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let body = if request.url().starts_with("/splitChanges") {
                r#"{"splits":[{"name":"f1","trafficTypeName":"user","seed":1,"algo":2,"status":"ACTIVE","killed":false,"defaultTreatment":"off","changeNumber":5,"conditions":[]}],"since":-1,"till":5}"#
                    .to_string()
            } else {
                "{}".to_string()
            };
            let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let _ = request.respond(tiny_http::Response::from_string(body).with_header(header));
        }
    });
    addr
}

fn impression() -> Impression {
    Impression {
        matching_key: "user-1".to_string(),
        bucketing_key: "user-1".to_string(),
        feature: "f1".to_string(),
        treatment: "on".to_string(),
        label: "default rule".to_string(),
        change_number: 5,
        timestamp: 0,
    }
}

fn event() -> Event {
    Event {
        key: "user-1".to_string(),
        traffic_type: "user".to_string(),
        event_type: "purchase".to_string(),
        value: Some(1.0),
        timestamp: 0,
        properties: None,
        size: 10,
    }
}

#[tokio::test]
async fn periodic_mode_applies_flag_changes_and_stop_drains_queues() {
    let addr = spawn_mock_backend();

    let config = SdkConfig {
        sdk_url: addr.clone(),
        auth_url: addr.clone(),
        stream_url: addr.clone(),
        features_refresh_rate: Duration::from_millis(30),
        segments_refresh_rate: Duration::from_millis(30),
        impressions_refresh_rate: Duration::from_secs(60),
        events_refresh_rate: Duration::from_secs(60),
        sync_retry_attempts: 1,
        sync_backoff_base: Duration::from_millis(5),
        sync_backoff_max: Duration::from_millis(10),
        ..SdkConfig::default()
    };

    let http = Arc::new(HttpClient::new(addr.clone(), addr.clone(), "apikey", config.request_timeout).unwrap());
    let sse = Arc::new(SseClient::new(reqwest::Client::new(), addr));
    let storages = Storages::new(1000, 64 * 1024);

    let coordinator = SynchronizerCoordinator::new(&config, http, sse, storages.clone());
    coordinator.start_periodic();

    let got_flag = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if storages.flags.get("f1").is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(got_flag.is_ok(), "flag timer should have applied f1 within the timeout");

    storages.impressions.put(vec![impression()]);
    storages.events.put(vec![event()]);
    assert_eq!(storages.impressions.len(), 1);
    assert_eq!(storages.events.len(), 1);

    coordinator.stop().await;

    assert_eq!(storages.impressions.len(), 0);
    assert_eq!(storages.events.len(), 0);
}
