// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run coordinator — one full pass over the store directory for one period.
//!
//! Sources are processed strictly sequentially: retrieve → normalize →
//! deduplicate, with failure isolation at source granularity. Accumulated
//! new records are flushed to the batch sink every `flush_every` sources and
//! once finally; progress with an ETA estimate is reported every
//! `progress_every` sources. Cancellation is cooperative and takes effect at
//! the loop boundary, after which the pending batch is still flushed.

use crate::config::RunConfig;
use crate::dedup::DedupIndex;
use crate::directory::StoreDirectory;
use crate::models::{RunStats, Source, SourceState};
use crate::progress::{emit, PipelineEventKind, ProgressSender};
use crate::retrieval::RetrievalEngine;
use crate::sink::{BatchSink, FlushContext};
use crate::validate::Normalizer;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

/// Drives one run; invoked repeatedly by the scheduler.
pub struct RunCoordinator {
    directory: StoreDirectory,
    engine: RetrievalEngine,
    normalizer: Normalizer,
    dedup: DedupIndex,
    sink: Arc<dyn BatchSink>,
    cfg: RunConfig,
    region: Option<String>,
    progress: Option<ProgressSender>,
    cancel: Option<tokio::sync::watch::Receiver<bool>>,
}

impl RunCoordinator {
    pub fn new(
        directory: StoreDirectory,
        engine: RetrievalEngine,
        normalizer: Normalizer,
        dedup: DedupIndex,
        sink: Arc<dyn BatchSink>,
        cfg: RunConfig,
    ) -> Self {
        Self {
            directory,
            engine,
            normalizer,
            dedup,
            sink,
            cfg,
            region: None,
            progress: None,
            cancel: None,
        }
    }

    /// Restrict the run to one region.
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Attach a progress event sender.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Attach a cooperative cancellation signal.
    pub fn with_cancellation(mut self, cancel: tokio::sync::watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| *c.borrow()).unwrap_or(false)
    }

    /// Execute one full run for the given period.
    pub async fn run(&mut self, period: u8) -> Result<RunStats> {
        let mut stats = RunStats::new(period);
        let run_id = stats.run_id.clone();
        let mut seq = 0u64;
        let date = crate::period::today();
        let start = Instant::now();

        let mut sources = self.directory.get_sources(self.region.as_deref(), false).await;
        if let Some(limit) = self.cfg.source_limit {
            sources.truncate(limit);
        }
        let total = sources.len() as u32;

        // A zero interval from a config file would divide by zero below;
        // treat it as one.
        let flush_every = self.cfg.flush_every.max(1);
        let progress_every = self.cfg.progress_every.max(1);

        tracing::info!("run {run_id} started: period {period}, {total} sources");
        emit(
            &self.progress,
            &run_id,
            &mut seq,
            PipelineEventKind::RunStarted {
                period,
                sources_total: total,
            },
        );

        let mut batch = Vec::new();

        for (i, source) in sources.iter().enumerate() {
            if self.cancelled() {
                tracing::warn!("run {run_id} cancelled after {i} sources");
                break;
            }

            stats.sources_attempted += 1;
            tracing::trace!("source {} -> {:?}", source.code, SourceState::Pending);
            let new_count = match self.process_source(source, period, date, &mut stats).await {
                Ok(new) => {
                    let count = new.len() as u32;
                    batch.extend(new);
                    count
                }
                Err(e) => {
                    tracing::error!(
                        "source {} {:?}: {e:#}",
                        source.code,
                        SourceState::Failed
                    );
                    stats.record_failure(&source.code, &format!("{e:#}"));
                    0
                }
            };

            emit(
                &self.progress,
                &run_id,
                &mut seq,
                PipelineEventKind::SourceProcessed {
                    source_code: source.code.clone(),
                    records_new: new_count,
                    failed: stats.errors.last().map(|(c, _)| c == &source.code).unwrap_or(false),
                },
            );

            let done = (i + 1) as u32;

            if (i + 1) % flush_every == 0 && !batch.is_empty() {
                self.flush(&mut batch, done, period, false, &run_id, &mut seq)
                    .await?;
            }

            if (i + 1) % progress_every == 0 {
                let elapsed = start.elapsed().as_secs_f64();
                let remaining = (total - done) as f64;
                let eta_secs = (elapsed / f64::from(done) * remaining) as u64;
                tracing::info!("run {run_id}: {done}/{total} sources, eta {eta_secs}s");
                emit(
                    &self.progress,
                    &run_id,
                    &mut seq,
                    PipelineEventKind::RunProgress {
                        sources_done: done,
                        sources_total: total,
                        eta_secs,
                    },
                );
            }
        }

        // Final flush, including anything pending at cancellation.
        self.flush(
            &mut batch,
            stats.sources_attempted,
            period,
            true,
            &run_id,
            &mut seq,
        )
        .await?;

        self.dedup.persist()?;
        stats.finalize();

        emit(
            &self.progress,
            &run_id,
            &mut seq,
            PipelineEventKind::RunComplete {
                records_new: stats.records_new,
                records_duplicate: stats.records_duplicate,
                sources_failed: stats.sources_failed,
                elapsed_ms: stats.duration_ms,
            },
        );
        tracing::info!("run finished:\n{stats}");

        Ok(stats)
    }

    /// Retrieve → normalize → deduplicate for one source. An error here is
    /// contained by the caller; other sources proceed.
    async fn process_source(
        &mut self,
        source: &Source,
        period: u8,
        date: chrono::NaiveDate,
        stats: &mut RunStats,
    ) -> Result<Vec<crate::models::Record>> {
        let mut state = SourceState::Retrieving;
        tracing::trace!("source {} -> {:?}", source.code, state);
        let raw = self.engine.retrieve(source, period).await?;
        stats.records_raw += raw.len() as u32;

        state = SourceState::Normalizing;
        tracing::trace!("source {} -> {:?}", source.code, state);
        let (valid, invalid) = self.normalizer.process(&raw, source, period, date);
        stats.records_valid += valid.len() as u32;
        stats.records_invalid += invalid.len() as u32;
        for (entry, reason) in &invalid {
            tracing::debug!(
                "source {}: rejected {:?}: {reason}",
                source.code,
                entry.identifier
            );
        }

        state = SourceState::Deduplicating;
        tracing::trace!("source {} -> {:?}", source.code, state);
        let (new, duplicate) = self.dedup.classify(valid);
        stats.records_new += new.len() as u32;
        stats.records_duplicate += duplicate.len() as u32;

        state = SourceState::Done;
        tracing::debug!(
            "source {} {:?}: {} new, {} duplicate",
            source.code,
            state,
            new.len(),
            duplicate.len()
        );

        Ok(new)
    }

    async fn flush(
        &self,
        batch: &mut Vec<crate::models::Record>,
        sources_done: u32,
        period: u8,
        is_final: bool,
        run_id: &str,
        seq: &mut u64,
    ) -> Result<()> {
        let ctx = FlushContext {
            sources_done,
            period,
            is_final,
        };
        self.sink.deliver(batch, &ctx).await?;
        if !batch.is_empty() {
            emit(
                &self.progress,
                run_id,
                seq,
                PipelineEventKind::BatchFlushed {
                    records: batch.len() as u32,
                    is_final,
                },
            );
        }
        batch.clear();
        Ok(())
    }
}
