//! Static-fetch renderer — plain HTTP, no JavaScript.
//!
//! The reduced-capability half of the renderer abstraction. Navigation is a
//! GET; selector waits check the fetched HTML once; scrolling and clicking
//! report unavailable so retrieval degrades instead of erroring.

use super::{RenderedPage, Renderer};
use crate::extract::selector_matches;
use crate::fetch::HttpClient;
use anyhow::{bail, Result};
use async_trait::async_trait;

/// Renderer over plain HTTP fetches.
pub struct StaticRenderer {
    http: HttpClient,
}

impl StaticRenderer {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>> {
        Ok(Box::new(StaticPage {
            http: self.http.clone(),
            html: String::new(),
            url: String::new(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn supports_dynamic(&self) -> bool {
        false
    }
}

/// A "page" backed by the body of one GET response.
pub struct StaticPage {
    http: HttpClient,
    html: String,
    url: String,
}

#[async_trait]
impl RenderedPage for StaticPage {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<()> {
        let resp = self.http.get(url).await?;
        if resp.status >= 400 {
            bail!("{url} returned {}", resp.status);
        }
        self.html = resp.body;
        self.url = resp.final_url;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout_ms: u64) -> Result<bool> {
        // The HTML won't change without JS; check once.
        Ok(selector_matches(&self.html, selector))
    }

    async fn scroll_to_fraction(&self, _fraction: f64) -> Result<bool> {
        Ok(false)
    }

    async fn click(&self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn html(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_renderer() -> StaticRenderer {
        StaticRenderer::new(HttpClient::new(5_000, 0, 2.0, 1))
    }

    #[tokio::test]
    async fn test_navigate_and_selector_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<div class="p-card"><span>Soda</span></div>"#),
            )
            .mount(&server)
            .await;

        let renderer = make_renderer();
        let mut page = renderer.new_page().await.unwrap();
        page.navigate(&format!("{}/list", server.uri()), 5_000)
            .await
            .unwrap();

        assert!(page.wait_for_selector(".p-card", 1).await.unwrap());
        assert!(!page.wait_for_selector(".missing", 1).await.unwrap());
        assert!(!page.scroll_to_fraction(0.5).await.unwrap());
        assert!(!page.click(".load-more").await.unwrap());
    }

    #[tokio::test]
    async fn test_navigate_404_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let renderer = make_renderer();
        let mut page = renderer.new_page().await.unwrap();
        let err = page
            .navigate(&format!("{}/gone", server.uri()), 5_000)
            .await;
        assert!(err.is_err());
    }
}
