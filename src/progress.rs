// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for run telemetry.
//!
//! The coordinator emits `PipelineEvent`s during a run, which flow through a
//! `tokio::sync::broadcast` channel to all subscribers (CLI reporter, logs).
//! When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of event.
    pub event: PipelineEventKind,
}

/// The specific kind of pipeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEventKind {
    /// A run has started.
    RunStarted { period: u8, sources_total: u32 },
    /// One source finished processing (any terminal state).
    SourceProcessed {
        source_code: String,
        records_new: u32,
        failed: bool,
    },
    /// A batch of new records was flushed to the sink.
    BatchFlushed { records: u32, is_final: bool },
    /// Periodic progress with an ETA estimate.
    RunProgress {
        sources_done: u32,
        sources_total: u32,
        eta_secs: u64,
    },
    /// The run completed; counters mirror the final `RunStats`.
    RunComplete {
        records_new: u32,
        records_duplicate: u32,
        sources_failed: u32,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting pipeline events.
///
/// Backed by a `tokio::sync::broadcast` channel so multiple listeners can
/// subscribe independently. When no listeners exist, `send()` returns an
/// error which we silently ignore.
pub type ProgressSender = tokio::sync::broadcast::Sender<PipelineEvent>;

/// Receiver handle for consuming pipeline events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<PipelineEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Convenience helper: emit an event, silently ignoring send errors (which
/// occur when no receivers are listening).
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: &mut u64, event: PipelineEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(PipelineEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}
