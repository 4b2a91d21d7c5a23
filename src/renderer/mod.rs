//! Renderer abstraction — dynamic browser rendering vs static fetch.
//!
//! Retrieval logic is written against the `Renderer`/`RenderedPage` traits
//! only. `ChromiumRenderer` drives a headless browser for JavaScript-rendered
//! sources; `StaticRenderer` does plain HTTP fetches and reports the dynamic
//! affordances (waiting, scrolling, clicking) as unavailable. Which one runs
//! is decided by configuration or by a runtime capability probe.

pub mod chromium;
pub mod static_http;

use anyhow::Result;
use async_trait::async_trait;

pub use chromium::ChromiumRenderer;
pub use static_http::StaticRenderer;

/// An engine that can open pages for retrieval.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new page.
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>>;
    /// Shut down the engine.
    async fn shutdown(&self) -> Result<()>;
    /// Whether this renderer executes JavaScript (scroll/click/wait work).
    fn supports_dynamic(&self) -> bool;
}

/// A single open page.
///
/// Dynamic affordances return `Ok(false)` when the renderer cannot perform
/// them, so callers degrade gracefully instead of erroring.
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;
    /// Wait until a CSS selector matches, up to the timeout. `Ok(false)`
    /// means the selector never appeared.
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<bool>;
    /// Scroll the viewport to a fraction of the page's total extent.
    async fn scroll_to_fraction(&self, fraction: f64) -> Result<bool>;
    /// Click the first element matching the selector. `Ok(false)` means no
    /// element matched (or clicking is unsupported).
    async fn click(&self, selector: &str) -> Result<bool>;
    /// Current page HTML.
    async fn html(&self) -> Result<String>;
    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Capability probe: pick the best available renderer.
///
/// Tries Chromium unless configured static-only; on any launch failure,
/// degrades to static fetch with a warning instead of failing the run.
pub async fn pick_renderer(
    cfg: &crate::config::RetrievalConfig,
    http: crate::fetch::HttpClient,
) -> Box<dyn Renderer> {
    if cfg.static_only {
        tracing::info!("static-only retrieval configured");
        return Box::new(StaticRenderer::new(http));
    }
    match ChromiumRenderer::new().await {
        Ok(r) => Box::new(r),
        Err(e) => {
            tracing::warn!("browser unavailable ({e:#}); degrading to static-fetch mode");
            Box::new(StaticRenderer::new(http))
        }
    }
}
