// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retrieval engine — raw product entries for one (source, period) pair.
//!
//! The engine walks an ordered list of candidate endpoint shapes until one
//! yields product references, then drives the page through a bounded
//! readiness wait, progressive reveal, and load-more pagination, and finally
//! fetches each unique reference for entry extraction.
//!
//! "No data found" is never an error here: the engine returns an empty list
//! and logs a soft warning. A hard renderer fault degrades the engine to
//! static fetch for the remainder of the run instead of aborting it.

use crate::config::RetrievalConfig;
use crate::error::PipelineError;
use crate::extract;
use crate::fetch::HttpClient;
use crate::models::{RawEntry, Source};
use crate::renderer::{RenderedPage, Renderer, StaticRenderer};
use anyhow::Result;
use std::time::Duration;

/// One endpoint shape to try, already resolved to a URL.
#[derive(Debug, Clone)]
pub struct EndpointCandidate {
    /// Short label for diagnostics.
    pub label: &'static str,
    /// Fully resolved URL.
    pub url: String,
}

/// Build the ordered candidate list for a source.
///
/// Six shapes, most specific first: narrow category with and without the
/// location hint, broad category with and without, then search with and
/// without. Location-qualified shapes come first because pricing is
/// location-sensitive.
pub fn endpoint_candidates(cfg: &RetrievalConfig, location: &str) -> Vec<EndpointCandidate> {
    let base = cfg.base_url.trim_end_matches('/');
    vec![
        EndpointCandidate {
            label: "category+location",
            url: format!("{base}/browse/{}?location={location}", cfg.category),
        },
        EndpointCandidate {
            label: "category",
            url: format!("{base}/browse/{}", cfg.category),
        },
        EndpointCandidate {
            label: "broad-category+location",
            url: format!("{base}/browse/{}?location={location}", cfg.broad_category),
        },
        EndpointCandidate {
            label: "broad-category",
            url: format!("{base}/browse/{}", cfg.broad_category),
        },
        EndpointCandidate {
            label: "search+location",
            url: format!("{base}/search?q={}&location={location}", cfg.search_term),
        },
        EndpointCandidate {
            label: "search",
            url: format!("{base}/search?q={}", cfg.search_term),
        },
    ]
}

/// Fetches and extracts raw product entries for one source at a time.
pub struct RetrievalEngine {
    renderer: Box<dyn Renderer>,
    /// Static fallback used after a hard renderer fault.
    fallback: Box<dyn Renderer>,
    http: HttpClient,
    cfg: RetrievalConfig,
    default_location: String,
    degraded: bool,
}

impl RetrievalEngine {
    pub fn new(
        renderer: Box<dyn Renderer>,
        http: HttpClient,
        cfg: RetrievalConfig,
        default_location: String,
    ) -> Self {
        let fallback = Box::new(StaticRenderer::new(http.clone()));
        Self {
            renderer,
            fallback,
            http,
            cfg,
            default_location,
            degraded: false,
        }
    }

    /// Replace the static fallback renderer. Seam for testing hard faults.
    pub fn with_fallback(mut self, fallback: Box<dyn Renderer>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Whether the engine has degraded to static-fetch mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Retrieve raw entries for one source.
    ///
    /// "No data" is never an error: soft failures fall through to the next
    /// candidate and ultimately to an empty result. The only hard error is
    /// `RendererUnavailable` — the fallback renderer itself faulting — which
    /// the coordinator isolates as a per-source failure.
    pub async fn retrieve(
        &mut self,
        source: &Source,
        period: u8,
    ) -> Result<Vec<RawEntry>, PipelineError> {
        let location = source.location_hint(&self.default_location);

        for candidate in endpoint_candidates(&self.cfg, &location) {
            match self.collect_refs(&candidate.url).await {
                Ok(refs) if !refs.is_empty() => {
                    tracing::info!(
                        "source {} period {}: candidate {:?} yielded {} refs",
                        source.code,
                        period,
                        candidate.label,
                        refs.len()
                    );
                    return Ok(self.fetch_entries(&refs).await);
                }
                Ok(_) => {
                    tracing::debug!(
                        "source {}: candidate {:?} yielded nothing",
                        source.code,
                        candidate.label
                    );
                }
                Err(e @ PipelineError::RendererUnavailable(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "source {}: candidate {:?} failed softly: {e}",
                        source.code,
                        candidate.label
                    );
                }
            }
        }

        let err = PipelineError::SoftRetrieval {
            store: source.code.clone(),
            reason: "no candidate endpoint yielded data".to_string(),
        };
        tracing::warn!("{err}");
        Ok(Vec::new())
    }

    /// Open a page on the active renderer, degrading on a hard fault. A
    /// fault in the fallback itself has nothing left to degrade to.
    async fn open_page(&mut self) -> Result<Box<dyn RenderedPage>, PipelineError> {
        if !self.degraded {
            match self.renderer.new_page().await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::warn!(
                        "renderer fault ({e:#}); degrading to static fetch for the rest of the run"
                    );
                    self.degraded = true;
                }
            }
        }
        self.fallback
            .new_page()
            .await
            .map_err(|e| PipelineError::RendererUnavailable(format!("{e:#}")))
    }

    fn dynamic(&self) -> bool {
        !self.degraded && self.renderer.supports_dynamic()
    }

    /// Navigate one listing candidate and collect product references,
    /// closing the page on success and failure alike — a soft-failing
    /// candidate must not leak a browser tab.
    async fn collect_refs(&mut self, url: &str) -> Result<Vec<String>, PipelineError> {
        let mut page = self.open_page().await?;
        let dynamic = self.dynamic();
        let walked = self.walk_listing(page.as_mut(), url, dynamic).await;
        if let Err(e) = page.close().await {
            tracing::debug!("{url}: page close failed: {e:#}");
        }
        walked.map_err(|e| PipelineError::TransientNetwork(format!("{url}: {e:#}")))
    }

    /// Drive one listing page through readiness wait, progressive reveal,
    /// and bounded pagination.
    async fn walk_listing(
        &self,
        page: &mut dyn RenderedPage,
        url: &str,
        dynamic: bool,
    ) -> Result<Vec<String>> {
        page.navigate(url, self.cfg.request_timeout_ms).await?;

        if dynamic {
            let ready = page
                .wait_for_selector(&extract::readiness_selector(), self.cfg.readiness_timeout_ms)
                .await?;
            if !ready {
                tracing::debug!("{url}: readiness signal never appeared");
            }
        }

        let mut refs = extract::product_refs(&page.html().await?, url);

        if dynamic {
            self.progressive_reveal(&*page, url, &mut refs).await?;
            self.paginate(&*page, url, &mut refs).await?;
        }

        Ok(refs)
    }

    /// Scroll in quarter-steps of the page extent, settling after each step
    /// and collecting newly appeared references.
    async fn progressive_reveal(
        &self,
        page: &dyn RenderedPage,
        url: &str,
        refs: &mut Vec<String>,
    ) -> Result<()> {
        for round in 1..=self.cfg.scroll_rounds {
            let fraction = (f64::from(round) * 0.25).min(1.0);
            if !page.scroll_to_fraction(fraction).await? {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(self.cfg.settle_ms)).await;
            merge_refs(refs, extract::product_refs(&page.html().await?, url));
        }
        Ok(())
    }

    /// Trigger the "load more" affordance until no new references appear or
    /// the page ceiling is reached. The ceiling guarantees termination even
    /// against a source whose affordance never disappears.
    async fn paginate(
        &self,
        page: &dyn RenderedPage,
        url: &str,
        refs: &mut Vec<String>,
    ) -> Result<()> {
        for page_num in 1..=self.cfg.page_ceiling {
            let mut clicked = false;
            for selector in extract::load_more_selectors() {
                if page.click(selector).await? {
                    clicked = true;
                    break;
                }
            }
            if !clicked {
                return Ok(());
            }

            tokio::time::sleep(Duration::from_millis(self.cfg.settle_ms)).await;
            let before = refs.len();
            merge_refs(refs, extract::product_refs(&page.html().await?, url));
            if refs.len() == before {
                tracing::debug!("{url}: pagination stopped after page {page_num}, no new refs");
                return Ok(());
            }
        }
        tracing::debug!("{url}: pagination hit the page ceiling");
        Ok(())
    }

    /// Fetch each unique product reference and extract a raw entry.
    ///
    /// Individual fetch failures are soft: the reference is skipped and the
    /// rest proceed.
    async fn fetch_entries(&self, refs: &[String]) -> Vec<RawEntry> {
        let mut entries = Vec::new();

        for (i, reference) in refs.iter().enumerate() {
            if i > 0 && self.cfg.request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.request_delay_ms)).await;
            }
            match self.http.get(reference).await {
                Ok(resp) if resp.status < 400 => {
                    if let Some(entry) = extract::extract_entry(&resp.body) {
                        entries.push(entry);
                    } else {
                        tracing::debug!("{reference}: no extractable entry");
                    }
                }
                Ok(resp) => {
                    tracing::warn!("{reference}: skipped, status {}", resp.status);
                }
                Err(e) => {
                    tracing::warn!("{reference}: skipped after retries: {e}");
                }
            }
        }

        entries
    }
}

/// Append references not already present, preserving first-seen order.
fn merge_refs(refs: &mut Vec<String>, incoming: Vec<String>) {
    for r in incoming {
        if !refs.contains(&r) {
            refs.push(r);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
