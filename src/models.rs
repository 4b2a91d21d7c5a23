// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data types flowing through the pipeline.
//!
//! `Source` → `RawEntry` → `Record` is the one-way data path: sources come
//! from the store directory, raw entries from retrieval, records from
//! normalization. `RunStats` aggregates one full run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One store/location endpoint to scrape.
///
/// Immutable during a run; the store directory may replace the whole set on
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Store identity code (e.g. "0423").
    pub code: String,
    /// Region the store belongs to (e.g. a state or market code).
    pub region: String,
    /// Postal code, when the directory knows it.
    pub postal_code: Option<String>,
    /// City name.
    pub city: Option<String>,
    /// State/province abbreviation.
    pub state: Option<String>,
    /// When the directory last refreshed this entry.
    pub refreshed_at: DateTime<Utc>,
}

impl Source {
    /// Location hint used for location-sensitive pricing.
    ///
    /// Prefers the postal code, falls back to "city, state", and finally to
    /// the configured default.
    pub fn location_hint(&self, default: &str) -> String {
        if let Some(zip) = self.postal_code.as_deref() {
            if !zip.is_empty() {
                return zip.to_string();
            }
        }
        if let (Some(city), Some(state)) = (self.city.as_deref(), self.state.as_deref()) {
            if !city.is_empty() && !state.is_empty() {
                return format!("{city}, {state}");
            }
        }
        default.to_string()
    }
}

/// Loosely-typed extraction result from one product page.
///
/// Ephemeral — produced and consumed within a single retrieval call; the
/// normalizer turns it into a `Record` or a rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntry {
    /// Product name text as found on the page.
    pub name: String,
    /// Description text.
    pub description: String,
    /// Internal product identifier.
    pub identifier: String,
    /// Price text (e.g. "$3.99").
    pub price_text: String,
    /// Size text (e.g. "12 - 12 fl oz cans").
    pub size_text: String,
    /// Promotion text, when present.
    pub promotion_text: Option<String>,
    /// Price-per-ounce claim made by the page itself, when present.
    pub unit_price_text: Option<String>,
}

/// A canonical, validated product-price observation.
///
/// Never mutated after validation. `price_per_ounce` is derived: when
/// `ounces > 0` it equals `price / ounces` rounded to the configured
/// precision, and recomputing it from the stored fields reproduces the
/// stored value exactly. `ounces == 0.0` means "size unspecified" and forces
/// `price_per_ounce` to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub description: String,
    pub identifier: String,
    /// Date the observation was made.
    pub observed_on: NaiveDate,
    /// Currency price, rounded to 2 decimals.
    pub price: f64,
    /// Size in ounces, rounded to 1 decimal; 0.0 means unspecified.
    pub ounces: f64,
    /// Derived price per ounce; `None` when ounces is 0.
    pub price_per_ounce: Option<f64>,
    pub promotion: Option<String>,
    /// Period designator (week-of-month, 1–4).
    pub period: u8,
    /// Code of the source the record was observed at.
    pub source_code: String,
}

/// Per-source processing state inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    Pending,
    Retrieving,
    Normalizing,
    Deduplicating,
    Done,
    Failed,
}

/// Aggregate counters for one pipeline run.
///
/// Created at run start, mutated incrementally, finalized at run end and
/// handed to the scheduler/notifier. Never persisted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// Unique run identifier.
    pub run_id: String,
    /// Period the run covered.
    pub period: u8,
    pub sources_attempted: u32,
    pub sources_failed: u32,
    pub records_raw: u32,
    pub records_valid: u32,
    pub records_invalid: u32,
    pub records_new: u32,
    pub records_duplicate: u32,
    /// (source code, error summary) for each failed source.
    pub errors: Vec<(String, String)>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration, filled in by `finalize`.
    pub duration_ms: u64,
}

impl RunStats {
    pub fn new(period: u8) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            period,
            sources_attempted: 0,
            sources_failed: 0,
            records_raw: 0,
            records_valid: 0,
            records_invalid: 0,
            records_new: 0,
            records_duplicate: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Record a per-source failure.
    pub fn record_failure(&mut self, source_code: &str, error: &str) {
        self.sources_failed += 1;
        self.errors
            .push((source_code.to_string(), error.to_string()));
    }

    /// Stamp the wall-clock duration. Call once, at run end.
    pub fn finalize(&mut self) {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        self.duration_ms = elapsed.num_milliseconds().max(0) as u64;
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "run {} (period {})", self.run_id, self.period)?;
        writeln!(
            f,
            "  sources: {} attempted, {} failed",
            self.sources_attempted, self.sources_failed
        )?;
        writeln!(
            f,
            "  records: {} raw, {} valid, {} invalid, {} new, {} duplicate",
            self.records_raw,
            self.records_valid,
            self.records_invalid,
            self.records_new,
            self.records_duplicate
        )?;
        writeln!(f, "  duration: {:.1}s", self.duration_ms as f64 / 1000.0)?;
        if !self.errors.is_empty() {
            writeln!(f, "  failures:")?;
            for (source, err) in &self.errors {
                writeln!(f, "    {source}: {err}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_source(zip: Option<&str>, city: Option<&str>, state: Option<&str>) -> Source {
        Source {
            code: "0423".to_string(),
            region: "FL".to_string(),
            postal_code: zip.map(String::from),
            city: city.map(String::from),
            state: state.map(String::from),
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn test_location_hint_prefers_postal_code() {
        let s = make_source(Some("33801"), Some("Lakeland"), Some("FL"));
        assert_eq!(s.location_hint("00000"), "33801");
    }

    #[test]
    fn test_location_hint_falls_back_to_city_state() {
        let s = make_source(None, Some("Lakeland"), Some("FL"));
        assert_eq!(s.location_hint("00000"), "Lakeland, FL");
    }

    #[test]
    fn test_location_hint_default_when_nothing_known() {
        let s = make_source(None, None, None);
        assert_eq!(s.location_hint("33801"), "33801");
    }

    #[test]
    fn test_run_stats_summary_lists_failures() {
        let mut stats = RunStats::new(2);
        stats.sources_attempted = 3;
        stats.record_failure("0423", "endpoint down");
        stats.finalize();
        let rendered = stats.to_string();
        assert!(rendered.contains("3 attempted, 1 failed"));
        assert!(rendered.contains("0423: endpoint down"));
    }
}
