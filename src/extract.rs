// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pure HTML extraction — CSS selectors and regex over fetched pages.
//!
//! All selector lists are ordered strategy descriptors loaded from an
//! embedded JSON file: each extraction pass walks its list and stops at the
//! first match, so higher-confidence shapes win. Nothing here does I/O; the
//! retrieval engine feeds HTML in and gets product references or a
//! `RawEntry` out.

use crate::models::RawEntry;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::OnceLock;
use url::Url;

// ── Compile-time selector configuration ──────────────────────────────────────

/// Ordered selector strategies for every extraction pass.
const SELECTORS_JSON: &str = include_str!("selectors.json");

/// A selector with a confidence tier, for diagnostics.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorStrategy {
    pub selector: String,
    pub confidence: f32,
}

/// An attribute-bearing selector (identifier extraction).
#[derive(Debug, Clone, Deserialize)]
pub struct AttrStrategy {
    pub selector: String,
    pub attr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SelectorConfig {
    #[serde(default)]
    product_links: Vec<SelectorStrategy>,
    #[serde(default)]
    readiness: Vec<String>,
    #[serde(default)]
    load_more: Vec<String>,
    #[serde(default)]
    name: Vec<String>,
    #[serde(default)]
    identifier_attrs: Vec<AttrStrategy>,
    #[serde(default)]
    price: Vec<String>,
    #[serde(default)]
    size: Vec<String>,
    #[serde(default)]
    description: Vec<String>,
    #[serde(default)]
    promotion: Vec<String>,
    #[serde(default)]
    unit_price: Vec<String>,
}

fn config() -> &'static SelectorConfig {
    static CONFIG: OnceLock<SelectorConfig> = OnceLock::new();
    CONFIG.get_or_init(|| serde_json::from_str(SELECTORS_JSON).unwrap_or_default())
}

/// Candidate selectors for the "load more" pagination affordance, in
/// priority order.
pub fn load_more_selectors() -> &'static [String] {
    &config().load_more
}

/// Selector whose appearance signals that a listing page has rendered.
pub fn readiness_selector() -> String {
    config().readiness.join(", ")
}

// ── Listing pages ────────────────────────────────────────────────────────────

/// Discover product references on a listing page.
///
/// Walks the ordered strategy list and returns the references found by the
/// first strategy that yields any, resolved against `base_url` and
/// deduplicated preserving document order.
pub fn product_refs(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    for strategy in &config().product_links {
        let Ok(sel) = Selector::parse(&strategy.selector) else {
            continue;
        };
        let mut refs = Vec::new();
        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let resolved = match &base {
                Some(b) => match b.join(href) {
                    Ok(u) => u.to_string(),
                    Err(_) => continue,
                },
                None => href.to_string(),
            };
            if !refs.contains(&resolved) {
                refs.push(resolved);
            }
        }
        if !refs.is_empty() {
            tracing::debug!(
                "product refs via {:?} (confidence {:.2}): {}",
                strategy.selector,
                strategy.confidence,
                refs.len()
            );
            return refs;
        }
    }
    Vec::new()
}

/// Whether a CSS selector matches anywhere in the document.
pub fn selector_matches(html: &str, selector: &str) -> bool {
    let Ok(sel) = Selector::parse(selector) else {
        return false;
    };
    let document = Html::parse_document(html);
    document.select(&sel).next().is_some()
}

// ── Product pages ────────────────────────────────────────────────────────────

/// Extract a raw entry from a product page.
///
/// Returns `None` only when the page yields neither a name nor an
/// identifier — everything else is left for the normalizer to judge.
pub fn extract_entry(html: &str) -> Option<RawEntry> {
    let document = Html::parse_document(html);
    let cfg = config();

    let name = first_text(&document, &cfg.name).unwrap_or_default();
    let identifier = extract_identifier(&document, &cfg.identifier_attrs).unwrap_or_default();

    if name.is_empty() && identifier.is_empty() {
        return None;
    }

    let price_text = first_text_or_content(&document, &cfg.price)
        .or_else(|| price_regex_fallback(&document))
        .unwrap_or_default();

    Some(RawEntry {
        name,
        description: first_text_or_content(&document, &cfg.description).unwrap_or_default(),
        identifier,
        price_text,
        size_text: first_text(&document, &cfg.size).unwrap_or_default(),
        promotion_text: first_text(&document, &cfg.promotion),
        unit_price_text: first_text(&document, &cfg.unit_price),
    })
}

fn extract_identifier(document: &Html, strategies: &[AttrStrategy]) -> Option<String> {
    for strategy in strategies {
        let Ok(sel) = Selector::parse(&strategy.selector) else {
            continue;
        };
        for el in document.select(&sel) {
            if let Some(val) = el.value().attr(&strategy.attr) {
                let trimmed = val.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

/// First non-empty inner text among the ordered selectors.
fn first_text(document: &Html, selectors: &[String]) -> Option<String> {
    for sel_str in selectors {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        for el in document.select(&sel) {
            let text = element_text(&el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Like `first_text`, but prefers a `content` attribute when present
/// (meta-style elements).
fn first_text_or_content(document: &Html, selectors: &[String]) -> Option<String> {
    for sel_str in selectors {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        for el in document.select(&sel) {
            if let Some(content) = el.value().attr("content") {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            let text = element_text(&el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Last-resort price discovery: currency-symbol regex over the body text.
fn price_regex_fallback(document: &Html) -> Option<String> {
    static PRICE_RE: OnceLock<Regex> = OnceLock::new();
    let re = PRICE_RE.get_or_init(|| {
        Regex::new(r"[$\u{20AC}\u{00A3}]\s*[\d,]+\.?\d*").expect("price regex is valid")
    });

    let body = Selector::parse("body").ok()?;
    let text = document.select(&body).next().map(|el| element_text(&el))?;
    re.find(&text).map(|m| m.as_str().to_string())
}

/// Collect all visible text content from an element, trimmed and whitespace-
/// collapsed.
fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="p-card"><a href="/product/cola-12pk">Cola 12pk</a></div>
          <div class="p-card"><a href="/product/rootbeer">Root Beer</a></div>
          <div class="p-card"><a href="/product/cola-12pk">Cola again</a></div>
        </body></html>
    "#;

    const PRODUCT: &str = r#"
        <html><body>
          <div data-product-id="SKU-001">
            <h1 class="product-name">Cola   Classic</h1>
            <span class="product-price">$3.99</span>
            <span class="product-size">12 - 12 fl oz cans</span>
            <span class="promo-text">Buy One Get One</span>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_product_refs_resolved_and_deduped() {
        let refs = product_refs(LISTING, "https://shop.example.com/browse");
        assert_eq!(
            refs,
            vec![
                "https://shop.example.com/product/cola-12pk".to_string(),
                "https://shop.example.com/product/rootbeer".to_string(),
            ]
        );
    }

    #[test]
    fn test_product_refs_empty_page() {
        assert!(product_refs("<html><body></body></html>", "https://x.invalid").is_empty());
    }

    #[test]
    fn test_selector_matches() {
        assert!(selector_matches(LISTING, ".p-card"));
        assert!(!selector_matches(LISTING, ".load-more"));
    }

    #[test]
    fn test_extract_entry_full_product() {
        let entry = extract_entry(PRODUCT).unwrap();
        assert_eq!(entry.name, "Cola Classic");
        assert_eq!(entry.identifier, "SKU-001");
        assert_eq!(entry.price_text, "$3.99");
        assert_eq!(entry.size_text, "12 - 12 fl oz cans");
        assert_eq!(entry.promotion_text.as_deref(), Some("Buy One Get One"));
    }

    #[test]
    fn test_extract_entry_price_regex_fallback() {
        let html = r#"<html><body><h1>Ginger Ale</h1>
            <p>Now only $2.50 this week</p></body></html>"#;
        let entry = extract_entry(html).unwrap();
        assert_eq!(entry.name, "Ginger Ale");
        assert_eq!(entry.price_text, "$2.50");
    }

    #[test]
    fn test_extract_entry_nothing_usable() {
        assert!(extract_entry("<html><body><p>nope</p></body></html>").is_none());
    }

    #[test]
    fn test_readiness_selector_nonempty() {
        assert!(readiness_selector().contains(".p-card"));
        assert!(!load_more_selectors().is_empty());
    }
}
