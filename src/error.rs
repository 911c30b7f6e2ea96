// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Error taxonomy for the synchronization runtime (spec §7).
//!
//! Evaluation never surfaces these: bad input or missing state resolves to
//! `CONTROL`/"exception" at the evaluator boundary instead of propagating an
//! error. `QueueFullError` is deliberately absent here - the queue-full hook
//! is a signal, not a `Result` path.

use thiserror::Error;

/// Errors raised by the synchronizers, the push manager, and the SSE client.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Bad user input caught at the `track`/`evaluate` boundary. Never fatal.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Network error, 5xx, or timeout talking to the backend. Retried with
    /// backoff inside the synchronizer; this variant is only returned once
    /// the retry budget is exhausted.
    #[error("transient backend error calling {endpoint}: {source}")]
    TransientBackend {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// 401/403 from `/auth` or `/segmentChanges`.
    #[error("auth error ({status}) calling {endpoint}")]
    Auth { endpoint: String, status: u16 },

    /// Malformed JSON or an unexpected SSE event. The offending item is
    /// skipped by the caller; this variant exists for tests and logging.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Storage or the push state machine observed an impossible state.
    /// Must crash the sync worker that detected it, never evaluation.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl SdkError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, SdkError::TransientBackend { .. })
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
