// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration — values, not mechanism.
//!
//! Every tunable the components consume lives here: cache TTL, retry
//! ceilings, pagination bounds, validation sanity limits, batch sizes, and
//! scheduler timing. Loaded from a JSON file (`SHELFWATCH_CONFIG`, then
//! `./shelfwatch.json`, then `~/.shelfwatch/config.json`) with defaults for
//! everything.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub directory: DirectoryConfig,
    pub retrieval: RetrievalConfig,
    pub validation: ValidationConfig,
    pub run: RunConfig,
    pub scheduler: SchedulerConfig,
}

/// Store directory cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Directory API endpoint returning the source list.
    pub api_url: String,
    /// Cache time-to-live in seconds (default 24h).
    pub ttl_secs: u64,
    /// Cache file path; defaults to `~/.shelfwatch/stores.json`.
    pub cache_path: Option<PathBuf>,
    /// Location hint used when a source carries neither postal code nor
    /// city/state.
    pub default_location: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://directory.invalid/v1/stores".to_string(),
            ttl_secs: 24 * 3600,
            cache_path: None,
            default_location: "33801".to_string(),
        }
    }
}

impl DirectoryConfig {
    /// Resolve the cache file path, defaulting under the home directory.
    pub fn resolved_cache_path(&self) -> PathBuf {
        if let Some(path) = &self.cache_path {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".shelfwatch")
            .join("stores.json")
    }
}

/// Retrieval engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Base URL of the store site the endpoint candidates are built on.
    pub base_url: String,
    /// Narrow category slug tried first (highest-signal listing).
    pub category: String,
    /// Broader category slug tried when the narrow one yields nothing.
    pub broad_category: String,
    /// Search term used by the last-resort search candidates.
    pub search_term: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Retry ceiling for transient network failures.
    pub max_retries: u32,
    /// Exponential backoff base (delay doubles per attempt by default).
    pub backoff_base: f64,
    /// Backoff delay cap in seconds.
    pub max_backoff_secs: u64,
    /// How long to wait for the readiness signal on a dynamic page.
    pub readiness_timeout_ms: u64,
    /// Settle delay after each scroll step or load-more trigger.
    pub settle_ms: u64,
    /// Maximum progressive-reveal scroll rounds per page.
    pub scroll_rounds: u32,
    /// Hard ceiling on load-more pagination steps. Mandatory for
    /// termination against a misbehaving source.
    pub page_ceiling: u32,
    /// Politeness delay between detail-page fetches.
    pub request_delay_ms: u64,
    /// Skip the browser entirely and use static fetch only.
    pub static_only: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://shop.invalid".to_string(),
            category: "beverages-soda".to_string(),
            broad_category: "beverages".to_string(),
            search_term: "soda".to_string(),
            request_timeout_ms: 30_000,
            max_retries: 3,
            backoff_base: 2.0,
            max_backoff_secs: 60,
            readiness_timeout_ms: 15_000,
            settle_ms: 2_000,
            scroll_rounds: 5,
            page_ceiling: 10,
            request_delay_ms: 1_000,
            static_only: false,
        }
    }
}

/// Normalizer/validator sanity bounds and rounding precision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject prices above this ceiling.
    pub max_price: f64,
    /// Reject sizes above this ceiling (ounces).
    pub max_ounces: f64,
    /// Reject derived price-per-ounce above this ceiling.
    pub max_price_per_ounce: f64,
    /// Maximum accepted name length after cleaning.
    pub max_name_len: usize,
    /// Decimal places for the derived price-per-ounce.
    pub ppo_precision: u32,
    /// Tolerance when cross-checking a page-claimed unit price against the
    /// recomputed value.
    pub ppo_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_price: 10_000.0,
            max_ounces: 10_000.0,
            max_price_per_ounce: 10.0,
            max_name_len: 200,
            ppo_precision: 4,
            ppo_tolerance: 0.01,
        }
    }
}

/// Run coordinator batch sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Flush the accumulated new-records batch every N processed sources.
    pub flush_every: usize,
    /// Emit a progress/ETA report every N processed sources.
    pub progress_every: usize,
    /// Process only the first N sources (partial runs); `None` = all.
    pub source_limit: Option<usize>,
    /// Dedup key database path; defaults to `~/.shelfwatch/seen_keys.db`.
    pub keys_path: Option<PathBuf>,
    /// Batch sink output path; defaults to `~/.shelfwatch/records.jsonl`.
    pub output_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            flush_every: 20,
            progress_every: 500,
            source_limit: None,
            keys_path: None,
            output_path: None,
        }
    }
}

impl RunConfig {
    pub fn resolved_keys_path(&self) -> PathBuf {
        if let Some(path) = &self.keys_path {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".shelfwatch")
            .join("seen_keys.db")
    }

    pub fn resolved_output_path(&self) -> PathBuf {
        if let Some(path) = &self.output_path {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".shelfwatch")
            .join("records.jsonl")
    }
}

/// When the scheduler triggers runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Run immediately, then every `interval_secs`.
    FixedInterval,
    /// Run daily at `hour:minute` UTC.
    ScheduledTime,
}

/// Scheduler timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: ScheduleMode,
    /// Wait between runs in fixed-interval mode.
    pub interval_secs: u64,
    /// Trigger hour (UTC) in scheduled-time mode.
    pub hour: u32,
    /// Trigger minute in scheduled-time mode.
    pub minute: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::ScheduledTime,
            interval_secs: 3_600,
            hour: 6,
            minute: 0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration, resolving the file path in order: explicit
    /// argument, `SHELFWATCH_CONFIG` env var, `./shelfwatch.json`,
    /// `~/.shelfwatch/config.json`. Missing file means defaults.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let path = resolve_config_path(explicit);
        match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)
                    .with_context(|| format!("failed to read config: {}", p.display()))?;
                let cfg: Self = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse config: {}", p.display()))?;
                tracing::debug!("loaded config from {}", p.display());
                Ok(cfg)
            }
            _ => Ok(Self::default()),
        }
    }
}

fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(PathBuf::from(p));
    }
    if let Ok(p) = std::env::var("SHELFWATCH_CONFIG") {
        return Some(PathBuf::from(p));
    }
    let cwd = PathBuf::from("shelfwatch.json");
    if cwd.exists() {
        return Some(cwd);
    }
    dirs::home_dir().map(|h| h.join(".shelfwatch").join("config.json"))
}
