// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Server-sent events transport (spec §4.6).

pub mod client;
pub mod parser;

pub use client::{encode_channels, ChannelSpec, SseClient, SseHandler};
pub use parser::SseEvent;
