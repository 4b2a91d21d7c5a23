//! Store directory — the set of sources to iterate, cached with a TTL.
//!
//! ## Fallback ladder
//!
//! Fresh cache → cached list. Expired or forced → fetch from the directory
//! API and persist. Fetch failure → last good cache, even if expired.
//! No cache at all → empty list with a warning; the caller continues with
//! zero sources rather than crashing.

use crate::error::PipelineError;
use crate::fetch::HttpClient;
use crate::models::Source;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// External directory API — the only collaborator that knows where sources
/// come from.
///
/// Always yields the complete list; region filtering happens locally so the
/// cache never holds a narrowed view.
#[async_trait]
pub trait DirectoryFetch: Send + Sync {
    /// Fetch the complete current source list.
    async fn fetch_sources(&self) -> Result<Vec<Source>, PipelineError>;
}

/// Directory fetch over HTTP, returning JSON.
pub struct HttpDirectoryFetch {
    http: HttpClient,
    api_url: String,
}

impl HttpDirectoryFetch {
    pub fn new(http: HttpClient, api_url: String) -> Self {
        Self { http, api_url }
    }
}

#[async_trait]
impl DirectoryFetch for HttpDirectoryFetch {
    async fn fetch_sources(&self) -> Result<Vec<Source>, PipelineError> {
        self.http.get_json(&self.api_url).await
    }
}

/// On-disk cache payload.
#[derive(Debug, Serialize, Deserialize)]
struct CachedDirectory {
    cached_at: DateTime<Utc>,
    sources: Vec<Source>,
}

impl CachedDirectory {
    fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age.to_std().map(|a| a > ttl).unwrap_or(true)
    }
}

/// TTL-cached view over the directory API.
pub struct StoreDirectory {
    fetcher: Box<dyn DirectoryFetch>,
    cache_path: PathBuf,
    ttl: Duration,
    force: bool,
}

impl StoreDirectory {
    pub fn new(fetcher: Box<dyn DirectoryFetch>, cache_path: PathBuf, ttl: Duration) -> Self {
        Self {
            fetcher,
            cache_path,
            ttl,
            force: false,
        }
    }

    /// Always bypass the cache on the next fetch (e.g. `--fresh-directory`).
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Get the sources for a region, honoring the cache contract.
    ///
    /// Never errors toward the caller: the worst case is an empty list.
    pub async fn get_sources(&self, region: Option<&str>, force: bool) -> Vec<Source> {
        let force = force || self.force;
        let cached = self.load_cache();

        if !force {
            if let Some(ref c) = cached {
                if !c.is_expired(self.ttl) {
                    tracing::debug!("directory cache hit ({} sources)", c.sources.len());
                    return filter_region(c.sources.clone(), region);
                }
            }
        }

        match self.fetcher.fetch_sources().await {
            Ok(sources) => {
                if let Err(e) = self.persist_cache(&sources) {
                    tracing::warn!("failed to persist directory cache: {e:#}");
                }
                tracing::info!("directory refreshed: {} sources", sources.len());
                filter_region(sources, region)
            }
            Err(e) => match cached {
                Some(c) => {
                    tracing::warn!(
                        "directory fetch failed ({e}); falling back to stale cache of {} sources",
                        c.sources.len()
                    );
                    filter_region(c.sources, region)
                }
                None => {
                    tracing::warn!("directory unavailable and no cache exists: {e}");
                    Vec::new()
                }
            },
        }
    }

    fn load_cache(&self) -> Option<CachedDirectory> {
        let raw = std::fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(
                    "discarding unreadable directory cache {}: {e}",
                    self.cache_path.display()
                );
                None
            }
        }
    }

    fn persist_cache(&self, sources: &[Source]) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache dir: {}", parent.display()))?;
        }
        let payload = CachedDirectory {
            cached_at: Utc::now(),
            sources: sources.to_vec(),
        };
        let raw = serde_json::to_string_pretty(&payload)?;
        std::fs::write(&self.cache_path, raw)
            .with_context(|| format!("failed to write cache: {}", self.cache_path.display()))?;
        Ok(())
    }
}

fn filter_region(sources: Vec<Source>, region: Option<&str>) -> Vec<Source> {
    match region {
        Some(r) => sources.into_iter().filter(|s| s.region == r).collect(),
        None => sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn make_source(code: &str, region: &str) -> Source {
        Source {
            code: code.to_string(),
            region: region.to_string(),
            postal_code: Some("33801".to_string()),
            city: None,
            state: None,
            refreshed_at: Utc::now(),
        }
    }

    /// Fetcher stub that counts calls and can be told to fail.
    struct StubFetch {
        sources: Vec<Source>,
        fail: bool,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DirectoryFetch for StubFetch {
        async fn fetch_sources(&self) -> Result<Vec<Source>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::DirectoryUnavailable("stub down".into()))
            } else {
                Ok(self.sources.clone())
            }
        }
    }

    fn make_directory(
        sources: Vec<Source>,
        fail: bool,
        cache_path: PathBuf,
        ttl: Duration,
    ) -> (StoreDirectory, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = StubFetch {
            sources,
            fail,
            calls: Arc::clone(&calls),
        };
        (
            StoreDirectory::new(Box::new(fetch), cache_path, ttl),
            calls,
        )
    }

    #[tokio::test]
    async fn test_fetch_persists_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("stores.json");
        let (directory, calls) = make_directory(
            vec![make_source("0423", "FL")],
            false,
            cache.clone(),
            Duration::from_secs(3600),
        );

        let sources = directory.get_sources(None, false).await;
        assert_eq!(sources.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.exists());
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("stores.json");
        let (warm, _) = make_directory(
            vec![make_source("0423", "FL")],
            false,
            cache.clone(),
            Duration::from_secs(3600),
        );
        warm.get_sources(None, false).await;

        // Second directory instance with a failing fetcher: cache must serve.
        let (directory, calls) =
            make_directory(Vec::new(), true, cache, Duration::from_secs(3600));
        let sources = directory.get_sources(None, false).await;
        assert_eq!(sources.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_fallback_on_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("stores.json");
        let (warm, _) = make_directory(
            vec![make_source("0423", "FL")],
            false,
            cache.clone(),
            Duration::from_secs(3600),
        );
        warm.get_sources(None, false).await;

        // Zero TTL: cache is expired, fetch fails, stale data still served.
        let (directory, calls) = make_directory(Vec::new(), true, cache, Duration::from_secs(0));
        let sources = directory.get_sources(None, false).await;
        assert_eq!(sources.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_cache_and_failure_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("missing.json");
        let (directory, _) = make_directory(Vec::new(), true, cache, Duration::from_secs(3600));
        let sources = directory.get_sources(None, false).await;
        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn test_filtered_call_still_caches_the_full_list() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("stores.json");
        let (warm, _) = make_directory(
            vec![make_source("0423", "FL"), make_source("0911", "GA")],
            false,
            cache.clone(),
            Duration::from_secs(3600),
        );
        let ga = warm.get_sources(Some("GA"), false).await;
        assert_eq!(ga.len(), 1);

        // Fresh instance with a failing fetcher: an unfiltered call within
        // the TTL must see every source, not just the region the cache was
        // warmed through.
        let (directory, calls) =
            make_directory(Vec::new(), true, cache, Duration::from_secs(3600));
        let all = directory.get_sources(None, false).await;
        assert_eq!(all.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_region_filter() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("stores.json");
        let (directory, _) = make_directory(
            vec![make_source("0423", "FL"), make_source("0911", "GA")],
            false,
            cache,
            Duration::from_secs(3600),
        );
        let sources = directory.get_sources(Some("GA"), false).await;
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].code, "0911");
    }
}
