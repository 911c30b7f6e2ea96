// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
The push manager (spec §4.7): the state machine that decides whether
storage is kept fresh by SSE notifications or by periodic polling, and the
notification types it dispatches off the wire.
"#]

pub mod manager;

pub use manager::{ControlType, PushManager, PushState};

/// Work the push manager hands off to the coordinator rather than doing
/// itself - keeps the manager from owning the synchronizers directly
/// (spec §9 design note on cyclic references).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncSignal {
    SyncFlags,
    SyncSegment(String),
}
