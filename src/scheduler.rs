// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scheduler — drives runs on a timer, forever.
//!
//! Two modes: fixed-interval (first run immediately, then wait the interval
//! between runs) and scheduled-time (run daily at a configured HH:MM in
//! UTC). Every error a run raises is caught at this boundary: it is logged,
//! reported to the error notifier, and the loop proceeds to the next wait as
//! if the run had completed. The loop terminates only on cancellation, which
//! interrupts waits and is checked at each loop boundary; any batch pending
//! inside a cancelled run is flushed by the coordinator before it returns.

use crate::config::{ScheduleMode, SchedulerConfig};
use crate::coordinator::RunCoordinator;
use crate::models::RunStats;
use crate::sink::ErrorNotifier;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Something the scheduler can run once per cycle. Seam for testing the
/// scheduling loop without a full pipeline.
#[async_trait]
pub trait Runner: Send {
    async fn run_period(&mut self, period: u8) -> Result<RunStats>;
}

#[async_trait]
impl Runner for RunCoordinator {
    async fn run_period(&mut self, period: u8) -> Result<RunStats> {
        self.run(period).await
    }
}

/// Outcome of one scheduling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    RunSucceeded,
    RunFailed,
}

/// The scheduling loop.
pub struct Scheduler<R: Runner> {
    runner: R,
    notifier: Arc<dyn ErrorNotifier>,
    cfg: SchedulerConfig,
    cancel: tokio::sync::watch::Receiver<bool>,
}

impl<R: Runner> Scheduler<R> {
    pub fn new(
        runner: R,
        notifier: Arc<dyn ErrorNotifier>,
        cfg: SchedulerConfig,
        cancel: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        Self {
            runner,
            notifier,
            cfg,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Loop until cancelled.
    pub async fn run_forever(&mut self) {
        tracing::info!("scheduler started: {:?}", self.cfg.mode);
        loop {
            if self.cancelled() {
                break;
            }
            match self.cfg.mode {
                ScheduleMode::FixedInterval => {
                    // No initial wait: the first cycle runs immediately.
                    self.run_once().await;
                    if self.cancelled() {
                        break;
                    }
                    if self
                        .wait_or_cancel(Duration::from_secs(self.cfg.interval_secs))
                        .await
                    {
                        break;
                    }
                }
                ScheduleMode::ScheduledTime => {
                    let next = next_occurrence(Utc::now(), self.cfg.hour, self.cfg.minute);
                    let wait = (next - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::from_secs(0));
                    tracing::info!("next run at {next} (in {}s)", wait.as_secs());
                    if self.wait_or_cancel(wait).await {
                        break;
                    }
                    self.run_once().await;
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Execute one run, absorbing any error at this boundary.
    async fn run_once(&mut self) -> CycleOutcome {
        let period = crate::period::current_period();
        match self.runner.run_period(period).await {
            Ok(stats) => {
                if stats.sources_failed > 0 {
                    tracing::warn!(
                        "run completed with {} failed sources",
                        stats.sources_failed
                    );
                }
                CycleOutcome::RunSucceeded
            }
            Err(e) => {
                let summary = format!("{e:#}");
                tracing::error!("run failed: {summary}");
                self.notifier.notify_failure(&summary, Utc::now()).await;
                CycleOutcome::RunFailed
            }
        }
    }

    /// Sleep for `dur`, returning early with `true` if cancelled.
    async fn wait_or_cancel(&mut self, dur: Duration) -> bool {
        let sleep = tokio::time::sleep(dur);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                res = self.cancel.changed() => {
                    // A dropped sender means nobody can un-cancel us; stop.
                    if res.is_err() || *self.cancel.borrow() {
                        return true;
                    }
                }
            }
        }
    }
}

/// Next occurrence of `hour:minute` UTC strictly after `now`.
///
/// If today's occurrence has already passed (or is this very instant), the
/// result is tomorrow's — so a run triggered on time always schedules the
/// following one a full day ahead.
pub fn next_occurrence(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.date_naive().and_hms_opt(0, 0, 0).expect("midnight is valid"))
        .and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
