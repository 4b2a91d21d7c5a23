// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Normalizer/validator — raw entries in, canonical records or rejections out.
//!
//! This component is pure and deterministic: identical input always yields
//! identical output, independent of call order. No I/O, no clock reads (the
//! observation date is passed in). Rejections carry a specific reason code;
//! nothing is silently dropped.

use crate::config::ValidationConfig;
use crate::models::{RawEntry, Record, Source};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Milliliters per fluid ounce.
const ML_PER_OZ: f64 = 29.5735;
/// Fluid ounces per liter.
const OZ_PER_LITER: f64 = 33.814;

/// Why an entry was rejected.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    #[error("name missing after cleaning")]
    MissingName,
    #[error("identifier missing after cleaning")]
    MissingIdentifier,
    #[error("name exceeds length limit")]
    NameTooLong,
    #[error("price text unparsable")]
    UnparsablePrice,
    #[error("price is negative")]
    NegativePrice,
    #[error("price above sanity ceiling")]
    PriceAboveCeiling,
    #[error("size is negative")]
    NegativeSize,
    #[error("size above sanity ceiling")]
    SizeAboveCeiling,
    #[error("derived unit price above sanity ceiling")]
    UnitPriceAboveCeiling,
    #[error("page-claimed unit price disagrees with recomputation")]
    UnitPriceMismatch,
}

/// Converts raw entries into canonical records, rejecting malformed ones.
pub struct Normalizer {
    cfg: ValidationConfig,
}

impl Normalizer {
    pub fn new(cfg: ValidationConfig) -> Self {
        Self { cfg }
    }

    /// Process a batch of raw entries for one (source, period, date).
    ///
    /// Returns the valid records in extraction order plus every rejection
    /// paired with its reason.
    pub fn process(
        &self,
        entries: &[RawEntry],
        source: &Source,
        period: u8,
        date: NaiveDate,
    ) -> (Vec<Record>, Vec<(RawEntry, RejectReason)>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();

        for entry in entries {
            match self.normalize_one(entry, source, period, date) {
                Ok(record) => valid.push(record),
                Err(reason) => invalid.push((entry.clone(), reason)),
            }
        }

        (valid, invalid)
    }

    fn normalize_one(
        &self,
        entry: &RawEntry,
        source: &Source,
        period: u8,
        date: NaiveDate,
    ) -> Result<Record, RejectReason> {
        let name = clean_text(&entry.name);
        if name.is_empty() {
            return Err(RejectReason::MissingName);
        }
        if name.len() > self.cfg.max_name_len {
            return Err(RejectReason::NameTooLong);
        }

        let identifier = clean_text(&entry.identifier).to_uppercase();
        if identifier.is_empty() {
            return Err(RejectReason::MissingIdentifier);
        }

        let price = parse_price(&entry.price_text).ok_or(RejectReason::UnparsablePrice)?;
        if price < 0.0 {
            return Err(RejectReason::NegativePrice);
        }
        if price > self.cfg.max_price {
            return Err(RejectReason::PriceAboveCeiling);
        }
        let price = round_to(price, 2);

        // Unparsable size maps to 0.0 — "unspecified" — and is not a
        // rejection.
        let ounces = round_to(parse_ounces(&entry.size_text), 1);
        if ounces < 0.0 {
            return Err(RejectReason::NegativeSize);
        }
        if ounces > self.cfg.max_ounces {
            return Err(RejectReason::SizeAboveCeiling);
        }

        let price_per_ounce = derive_unit_price(price, ounces, self.cfg.ppo_precision);
        if let Some(ppo) = price_per_ounce {
            if ppo > self.cfg.max_price_per_ounce {
                return Err(RejectReason::UnitPriceAboveCeiling);
            }
            // Cross-check a unit price the page itself claims.
            if let Some(claim_text) = &entry.unit_price_text {
                if let Some(claimed) = parse_price(claim_text) {
                    if (claimed - ppo).abs() > self.cfg.ppo_tolerance {
                        return Err(RejectReason::UnitPriceMismatch);
                    }
                }
            }
        }

        let promotion = entry
            .promotion_text
            .as_deref()
            .map(clean_text)
            .filter(|p| !p.is_empty());

        Ok(Record {
            name,
            description: clean_text(&entry.description),
            identifier,
            observed_on: date,
            price,
            ounces,
            price_per_ounce,
            promotion,
            period,
            source_code: source.code.clone(),
        })
    }
}

// ── Parsing helpers ──────────────────────────────────────────────────────────

/// Collapse whitespace and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a price string, stripping currency symbols, commas, and whitespace.
/// Preserves sign. Returns `None` if the string contains no valid number.
pub fn parse_price(text: &str) -> Option<f64> {
    let negative = text
        .trim_start()
        .trim_start_matches(['$', '\u{20AC}', '\u{00A3}', ' '])
        .starts_with('-');

    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    // Handle European format (1.234,56) vs US format (1,234.56)
    let normalized = if cleaned.contains(',') && cleaned.contains('.') {
        if cleaned.rfind(',') > cleaned.rfind('.') {
            cleaned.replace('.', "").replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else if cleaned.contains(',') {
        let after_comma = cleaned.split(',').next_back().unwrap_or("");
        if after_comma.len() <= 2 {
            cleaned.replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else {
        cleaned
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| if negative { -v } else { v })
}

/// Parse a size text into fluid ounces. Returns 0.0 ("unspecified") when no
/// recognizable size is present.
///
/// Recognized shapes, in order: multipack ("12 - 12 fl oz cans" → 144),
/// plain ounces ("64 oz"), milliliters ("750 ml"), liters ("2 L").
pub fn parse_ounces(text: &str) -> f64 {
    struct SizePatterns {
        multipack: Regex,
        ounces: Regex,
        milliliters: Regex,
        liters: Regex,
    }

    static PATTERNS: OnceLock<SizePatterns> = OnceLock::new();
    let p = PATTERNS.get_or_init(|| SizePatterns {
        multipack: Regex::new(r"(?i)(\d+)\s*[-x\u{2013}]\s*(\d+(?:\.\d+)?)\s*(?:fl\.?\s*)?oz")
            .expect("multipack regex is valid"),
        ounces: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:fl\.?\s*)?oz")
            .expect("ounces regex is valid"),
        milliliters: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*ml\b").expect("ml regex is valid"),
        liters: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*l(?:iter)?s?\b")
            .expect("liter regex is valid"),
    });

    if let Some(caps) = p.multipack.captures(text) {
        let count: f64 = caps[1].parse().unwrap_or(0.0);
        let size: f64 = caps[2].parse().unwrap_or(0.0);
        return count * size;
    }
    if let Some(caps) = p.ounces.captures(text) {
        return caps[1].parse().unwrap_or(0.0);
    }
    if let Some(caps) = p.milliliters.captures(text) {
        let ml: f64 = caps[1].parse().unwrap_or(0.0);
        return ml / ML_PER_OZ;
    }
    if let Some(caps) = p.liters.captures(text) {
        let liters: f64 = caps[1].parse().unwrap_or(0.0);
        return liters * OZ_PER_LITER;
    }
    0.0
}

/// Round to `precision` decimal places.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Derived price per ounce: `round(price / ounces, precision)` when ounces
/// is positive, `None` otherwise. Recomputing from a stored record's price
/// and ounces reproduces the stored value exactly.
pub fn derive_unit_price(price: f64, ounces: f64, precision: u32) -> Option<f64> {
    if ounces > 0.0 {
        Some(round_to(price / ounces, precision))
    } else {
        None
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_source() -> Source {
        Source {
            code: "0423".to_string(),
            region: "FL".to_string(),
            postal_code: Some("33801".to_string()),
            city: None,
            state: None,
            refreshed_at: Utc::now(),
        }
    }

    fn make_entry(price: &str, size: &str) -> RawEntry {
        RawEntry {
            name: "  Cola   Classic ".to_string(),
            description: "A  cola".to_string(),
            identifier: "sku-001".to_string(),
            price_text: price.to_string(),
            size_text: size.to_string(),
            promotion_text: None,
            unit_price_text: None,
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(ValidationConfig::default())
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[test]
    fn test_multipack_size_and_unit_price() {
        let n = normalizer();
        let (valid, invalid) = n.process(
            &[make_entry("$3.99", "12 - 12 fl oz cans")],
            &make_source(),
            2,
            date(),
        );
        assert!(invalid.is_empty());
        let r = &valid[0];
        assert_eq!(r.name, "Cola Classic");
        assert_eq!(r.identifier, "SKU-001");
        assert_eq!(r.price, 3.99);
        assert_eq!(r.ounces, 144.0);
        assert_eq!(r.price_per_ounce, Some(0.0277));
    }

    #[test]
    fn test_unit_price_recomputation_is_idempotent() {
        let n = normalizer();
        let (valid, _) = n.process(
            &[make_entry("$3.99", "12 - 12 fl oz cans")],
            &make_source(),
            2,
            date(),
        );
        let r = &valid[0];
        assert_eq!(
            derive_unit_price(r.price, r.ounces, 4),
            r.price_per_ounce
        );
    }

    #[test]
    fn test_unparsable_size_is_unspecified_not_rejected() {
        let n = normalizer();
        let (valid, invalid) =
            n.process(&[make_entry("$2.50", "per each")], &make_source(), 1, date());
        assert!(invalid.is_empty());
        assert_eq!(valid[0].ounces, 0.0);
        assert_eq!(valid[0].price_per_ounce, None);
    }

    #[test]
    fn test_ml_and_liter_sizes() {
        assert_eq!(round_to(parse_ounces("750 ml"), 1), 25.4);
        assert_eq!(round_to(parse_ounces("2 L bottle"), 1), 67.6);
        assert_eq!(parse_ounces("64 oz jug"), 64.0);
        assert_eq!(parse_ounces("6 x 7.5 fl oz"), 45.0);
    }

    #[test]
    fn test_rejections_carry_reasons() {
        let n = normalizer();
        let source = make_source();

        let mut nameless = make_entry("$1.00", "12 oz");
        nameless.name = "   ".to_string();
        let (_, invalid) = n.process(&[nameless], &source, 1, date());
        assert_eq!(invalid[0].1, RejectReason::MissingName);

        let mut no_id = make_entry("$1.00", "12 oz");
        no_id.identifier = String::new();
        let (_, invalid) = n.process(&[no_id], &source, 1, date());
        assert_eq!(invalid[0].1, RejectReason::MissingIdentifier);

        let (_, invalid) = n.process(&[make_entry("call us", "12 oz")], &source, 1, date());
        assert_eq!(invalid[0].1, RejectReason::UnparsablePrice);

        let (_, invalid) = n.process(&[make_entry("$-3.99", "12 oz")], &source, 1, date());
        assert_eq!(invalid[0].1, RejectReason::NegativePrice);

        let (_, invalid) = n.process(&[make_entry("$99999", "12 oz")], &source, 1, date());
        assert_eq!(invalid[0].1, RejectReason::PriceAboveCeiling);

        let (_, invalid) = n.process(&[make_entry("$5.00", "0.1 oz")], &source, 1, date());
        assert_eq!(invalid[0].1, RejectReason::UnitPriceAboveCeiling);
    }

    #[test]
    fn test_claimed_unit_price_cross_check() {
        let n = normalizer();
        let source = make_source();

        let mut honest = make_entry("$3.99", "12 - 12 fl oz cans");
        honest.unit_price_text = Some("$0.03/oz".to_string());
        // 0.03 vs computed 0.0277 is within the 0.01 tolerance
        let (valid, invalid) = n.process(&[honest], &source, 2, date());
        assert!(invalid.is_empty());
        assert_eq!(valid.len(), 1);

        let mut lying = make_entry("$3.99", "12 - 12 fl oz cans");
        lying.unit_price_text = Some("$0.50/oz".to_string());
        let (_, invalid) = n.process(&[lying], &source, 2, date());
        assert_eq!(invalid[0].1, RejectReason::UnitPriceMismatch);
    }

    #[test]
    fn test_process_is_deterministic() {
        let n = normalizer();
        let entries = vec![
            make_entry("$3.99", "12 - 12 fl oz cans"),
            make_entry("bad", "12 oz"),
        ];
        let first = n.process(&entries, &make_source(), 2, date());
        let second = n.process(&entries, &make_source(), 2, date());
        assert_eq!(first.0, second.0);
        assert_eq!(first.1.len(), second.1.len());
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("$3.99"), Some(3.99));
        assert_eq!(parse_price("1,234.56"), Some(1234.56));
        assert_eq!(parse_price("29,99"), Some(29.99));
        assert_eq!(parse_price("1.234,56"), Some(1234.56));
        assert_eq!(parse_price("free"), None);
    }
}
