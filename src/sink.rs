//! Delivery collaborators — batch sink and error notifier.
//!
//! The coordinator hands accumulated new-record batches to a `BatchSink` at
//! each flush boundary; the scheduler reports unrecoverable run failures to
//! an `ErrorNotifier`. Both are trait objects supplied at construction, so
//! delivery mechanics stay outside the core.

use crate::models::Record;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Context handed to the sink with every flush.
#[derive(Debug, Clone)]
pub struct FlushContext {
    /// Sources processed so far in this run.
    pub sources_done: u32,
    /// Period the run covers.
    pub period: u8,
    /// Whether this is the final flush of the run.
    pub is_final: bool,
}

/// Receives batches of new records.
///
/// Delivery is at-least-once: a record already classified new may be
/// re-delivered after a crash, so sinks must tolerate repeats.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn deliver(&self, records: &[Record], ctx: &FlushContext) -> Result<()>;
}

/// Receives run-failure notifications from the scheduler.
///
/// Implementations must not propagate errors; the scheduler swallows any
/// failure here without affecting scheduling.
#[async_trait]
pub trait ErrorNotifier: Send + Sync {
    async fn notify_failure(&self, error_summary: &str, occurred_at: DateTime<Utc>);
}

/// Sink that appends records as JSON lines to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl BatchSink for JsonlSink {
    async fn deliver(&self, records: &[Record], ctx: &FlushContext) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create sink dir: {}", parent.display()))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open sink file: {}", self.path.display()))?;
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{line}")?;
        }
        tracing::info!(
            "delivered {} records (period {}, {} sources done{})",
            records.len(),
            ctx.period,
            ctx.sources_done,
            if ctx.is_final { ", final" } else { "" }
        );
        Ok(())
    }
}

/// Sink that collects everything in memory. Test double.
#[derive(Default)]
pub struct MemorySink {
    pub batches: Mutex<Vec<(Vec<Record>, FlushContext)>>,
}

impl MemorySink {
    /// All delivered records, flattened across batches.
    pub fn all_records(&self) -> Vec<Record> {
        self.batches
            .lock()
            .map(|b| b.iter().flat_map(|(r, _)| r.clone()).collect())
            .unwrap_or_default()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BatchSink for MemorySink {
    async fn deliver(&self, records: &[Record], ctx: &FlushContext) -> Result<()> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push((records.to_vec(), ctx.clone()));
        }
        Ok(())
    }
}

/// Notifier that just logs. The default when no delivery channel is wired.
pub struct LogNotifier;

#[async_trait]
impl ErrorNotifier for LogNotifier {
    async fn notify_failure(&self, error_summary: &str, occurred_at: DateTime<Utc>) {
        tracing::error!("run failed at {occurred_at}: {error_summary}");
    }
}

/// Notifier that records every notification. Test double.
#[derive(Default)]
pub struct MemoryNotifier {
    pub notifications: Mutex<Vec<(String, DateTime<Utc>)>>,
}

#[async_trait]
impl ErrorNotifier for MemoryNotifier {
    async fn notify_failure(&self, error_summary: &str, occurred_at: DateTime<Utc>) {
        if let Ok(mut n) = self.notifications.lock() {
            n.push((error_summary.to_string(), occurred_at));
        }
    }
}
