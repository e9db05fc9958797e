//! Conditional-fetch response cache keyed by URL.
//!
//! Stores the last ETag and body seen per URL and revalidates with
//! `If-None-Match` on repeat fetches, returning the cached body on a 304.
//! The cache is an explicit object with a bounded capacity (least recently
//! used entries are evicted) and an explicit `clear`; nothing is shared
//! behind the caller's back.

use anyhow::{bail, Context, Result};
use lru::LruCache;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    etag: String,
    body: String,
}

pub struct EtagCache {
    client: reqwest::Client,
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl EtagCache {
    /// Create a cache holding at most `capacity` URL entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            client: reqwest::Client::new(),
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch `url`, revalidating against the cached ETag when one is known.
    ///
    /// A 304 response yields the cached body unchanged; a 200 with an ETag
    /// header replaces the entry. Responses without an ETag are returned but
    /// not cached.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let cached = self.entries.lock().unwrap().get(url).cloned();

        let mut request = self.client.get(url);
        if let Some(entry) = &cached {
            request = request.header(IF_NONE_MATCH, entry.etag.clone());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            match cached {
                Some(entry) => {
                    debug!("Revalidated {} from cache", url);
                    return Ok(entry.body);
                }
                // A 304 can only answer a conditional request.
                None => bail!("Server returned 304 for {} without a cached entry", url),
            }
        }

        let response = response
            .error_for_status()
            .with_context(|| format!("Request to {} failed", url))?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {}", url))?;

        if let Some(etag) = etag {
            self.entries
                .lock()
                .unwrap()
                .put(url.to_string(), CacheEntry { etag, body: body.clone() });
        }

        Ok(body)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ==================== Revalidation Tests ====================

    #[tokio::test]
    async fn test_fetch_then_revalidate_304() {
        let server = MockServer::start().await;

        // First request has no validator and gets the full body once.
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"v1\"")
                    .set_body_string("{\"hello\":\"world\"}"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // Revalidation must carry the stored ETag.
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let cache = EtagCache::new(8);
        let url = format!("{}/data", server.uri());

        let first = cache.fetch(&url).await.expect("first fetch");
        assert_eq!(first, "{\"hello\":\"world\"}");
        assert_eq!(cache.len(), 1);

        let second = cache.fetch(&url).await.expect("revalidated fetch");
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_changed_etag_replaces_entry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"v1\"")
                    .set_body_string("old"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // The server re-sends a full response with a new tag instead of a 304.
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"v2\"")
                    .set_body_string("new"),
            )
            .mount(&server)
            .await;

        let cache = EtagCache::new(8);
        let url = format!("{}/data", server.uri());

        assert_eq!(cache.fetch(&url).await.expect("first"), "old");
        assert_eq!(cache.fetch(&url).await.expect("second"), "new");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_response_without_etag_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("no tag"))
            .mount(&server)
            .await;

        let cache = EtagCache::new(8);
        let url = format!("{}/plain", server.uri());

        assert_eq!(cache.fetch(&url).await.expect("fetch"), "no tag");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = EtagCache::new(8);
        let url = format!("{}/missing", server.uri());

        assert!(cache.fetch(&url).await.is_err());
        assert!(cache.is_empty());
    }

    // ==================== Capacity & Clear Tests ====================

    #[tokio::test]
    async fn test_capacity_bound_evicts_oldest() {
        let server = MockServer::start().await;

        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{}", name)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("etag", format!("\"{}\"", name).as_str())
                        .set_body_string(name),
                )
                .mount(&server)
                .await;
        }

        let cache = EtagCache::new(2);
        for name in ["a", "b", "c"] {
            cache
                .fetch(&format!("{}/{}", server.uri(), name))
                .await
                .expect("fetch");
        }

        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_empties_cache() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"v1\"")
                    .set_body_string("body"),
            )
            .mount(&server)
            .await;

        let cache = EtagCache::new(8);
        let url = format!("{}/data", server.uri());
        cache.fetch(&url).await.expect("fetch");
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let cache = EtagCache::new(0);
        assert!(cache.is_empty());
    }
}
