//! Async HTTP client wrapping reqwest.
//!
//! Not a browser — just HTTP requests. Handles redirects, timeouts,
//! retry with exponential backoff on transport errors and 5xx, and
//! retry-after backoff on 429. Exhausted retries surface as
//! `PipelineError::TransientNetwork`, which callers demote to a soft
//! retrieval failure.

use crate::error::PipelineError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// HTTP client for the retrieval engine and the store directory.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for sites that reject HTTP/2.
    h1_client: reqwest::Client,
    timeout_ms: u64,
    max_retries: u32,
    backoff_base: f64,
    max_backoff: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with a standard Chrome user-agent.
    pub fn new(timeout_ms: u64, max_retries: u32, backoff_base: f64, max_backoff_secs: u64) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        let h1_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .http1_only()
            .build()
            .unwrap_or_default();

        Self {
            client,
            h1_client,
            timeout_ms,
            max_retries,
            backoff_base,
            max_backoff: Duration::from_secs(max_backoff_secs),
        }
    }

    /// Build a client from the retrieval config.
    pub fn from_config(cfg: &crate::config::RetrievalConfig) -> Self {
        Self::new(
            cfg.request_timeout_ms,
            cfg.max_retries,
            cfg.backoff_base,
            cfg.max_backoff_secs,
        )
    }

    /// Backoff delay before retry attempt `n` (1-based), capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let millis = 500.0 * self.backoff_base.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }

    /// Perform a GET request with retry on transport errors and 5xx, and
    /// backoff on 429.
    ///
    /// Falls back to HTTP/1.1 on protocol errors (some CDNs reject HTTP/2).
    pub async fn get(&self, url: &str) -> Result<HttpResponse, PipelineError> {
        match self.get_inner(&self.client, url).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                let err_str = format!("{e}");
                if err_str.contains("http2")
                    || err_str.contains("protocol")
                    || err_str.contains("connection closed")
                {
                    self.get_inner(&self.h1_client, url).await
                } else {
                    Err(e)
                }
            }
        }
    }

    /// GET a URL and deserialize its JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PipelineError> {
        let resp = self.get(url).await?;
        if resp.status >= 400 {
            return Err(PipelineError::TransientNetwork(format!(
                "{url} returned {}",
                resp.status
            )));
        }
        Ok(serde_json::from_str(&resp.body)?)
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
    ) -> Result<HttpResponse, PipelineError> {
        let mut retries = 0u32;

        loop {
            let resp = client
                .get(url)
                .timeout(Duration::from_millis(self.timeout_ms))
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();
                    let final_url = r.url().to_string();

                    // Retry on 5xx
                    if status >= 500 && retries < self.max_retries {
                        retries += 1;
                        let delay = self.backoff_delay(retries);
                        tracing::debug!("{url} returned {status}, retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Backoff on 429, honoring retry-after
                    if status == 429 && retries < self.max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        let delay = Duration::from_secs(retry_after.min(10));
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if status >= 500 {
                        return Err(PipelineError::TransientNetwork(format!(
                            "{url} returned {status} after {retries} retries"
                        )));
                    }

                    let body = r.text().await.unwrap_or_default();

                    return Ok(HttpResponse {
                        url: url.to_string(),
                        final_url,
                        status,
                        body,
                    });
                }
                Err(e) => {
                    if retries < self.max_retries {
                        retries += 1;
                        let delay = self.backoff_delay(retries);
                        tracing::debug!("{url} failed ({e}), retry {retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(PipelineError::TransientNetwork(format!(
                        "{url} failed after {retries} retries: {e}"
                    )));
                }
            }
        }
    }
}
