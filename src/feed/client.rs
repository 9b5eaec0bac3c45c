use crate::feed::types::{PageEnvelope, SortOrder};
use futures::StreamExt;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

const MAX_PAGE_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Default upstream revalidation window (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_CAPACITY: usize = 64;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors produced while fetching a page from the upstream source.
///
/// Every variant is a transport-level failure from the caller's point of
/// view: the request can be retried as-is.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Upstream answered with a non-2xx status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Body was not a valid page envelope
    #[error("Invalid response body: {0}")]
    Decode(String),
    #[error("Response too large")]
    ResponseTooLarge,
}

impl TransportError {
    /// Upstream HTTP status, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::HttpStatus(code) => Some(*code),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a caller-side retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout(_) => true,
            TransportError::HttpStatus(code) => *code == 429 || *code >= 500,
            TransportError::Decode(_) | TransportError::ResponseTooLarge => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PageKey {
    page: u32,
    page_size: u32,
    sort: SortOrder,
}

struct CachedPage {
    fetched_at: Instant,
    envelope: PageEnvelope,
}

/// Client for the paginated upstream article source.
///
/// Cloning is cheap: the HTTP connection pool and the page cache are shared
/// between clones. The client never retries on its own; see
/// [`fetch_with_retry`](crate::feed::fetch_with_retry) for the caller-side
/// policy.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    cache_ttl: Duration,
    cache: Arc<Mutex<LruCache<PageKey, CachedPage>>>,
}

impl FeedClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serve repeated requests from memory for up to `ttl`. A zero TTL
    /// disables caching entirely.
    pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache_ttl = ttl;
        self.cache = Arc::new(Mutex::new(LruCache::new(
            NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
        )));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Drop every cached page.
    pub fn invalidate(&self) {
        self.lock_cache().clear();
    }

    /// Fetch one page of articles.
    ///
    /// `page` and `page_size` are 1-based positive integers; zero is clamped
    /// to 1. Results younger than the cache TTL are served without a request.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Network`] - connection or TLS failure
    /// - [`TransportError::Timeout`] - request exceeded the configured timeout
    /// - [`TransportError::HttpStatus`] - non-2xx upstream response
    /// - [`TransportError::Decode`] - body is not a consistent page envelope
    /// - [`TransportError::ResponseTooLarge`] - body exceeded 10MB
    pub async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        sort: SortOrder,
    ) -> Result<PageEnvelope, TransportError> {
        let key = PageKey {
            page: page.max(1),
            page_size: page_size.max(1),
            sort,
        };

        if let Some(envelope) = self.cached(&key) {
            tracing::trace!(page = key.page, page_size = key.page_size, sort = %sort, "Page served from cache");
            return Ok(envelope);
        }

        let envelope = self.fetch_uncached(&key).await?;

        if !self.cache_ttl.is_zero() {
            self.lock_cache().put(
                key,
                CachedPage {
                    fetched_at: Instant::now(),
                    envelope: envelope.clone(),
                },
            );
        }

        Ok(envelope)
    }

    fn cached(&self, key: &PageKey) -> Option<PageEnvelope> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        let mut cache = self.lock_cache();
        match cache.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < self.cache_ttl => {
                Some(entry.envelope.clone())
            }
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<PageKey, CachedPage>> {
        // A poisoned cache only holds plain data, so keep using it.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn page_url(&self, key: &PageKey) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("pagination[page]", &key.page.to_string())
            .append_pair("pagination[pageSize]", &key.page_size.to_string())
            .append_pair("sort", key.sort.as_query());
        url
    }

    async fn fetch_uncached(&self, key: &PageKey) -> Result<PageEnvelope, TransportError> {
        let url = self.page_url(key);
        tracing::debug!(url = %url, "Fetching page");

        let request = self
            .http
            .get(url.as_str())
            .header("Accept", "application/json");

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(TransportError::Network)?;

        if !response.status().is_success() {
            tracing::warn!(
                page = key.page,
                status = %response.status(),
                "Upstream returned non-success status"
            );
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_PAGE_BYTES).await?;
        let envelope: PageEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?;

        if !envelope.is_consistent() {
            return Err(TransportError::Decode(format!(
                "page holds {} items but page size is {}",
                envelope.data.len(),
                envelope.pagination.page_size
            )));
        }

        tracing::debug!(
            page = envelope.pagination.page,
            items = envelope.data.len(),
            page_count = envelope.pagination.page_count,
            "Fetched page"
        );
        Ok(envelope)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(TransportError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(TransportError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{envelope, mount_page};
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> FeedClient {
        let base = Url::parse(&format!("{}/api/geekdailies", server.uri())).unwrap();
        FeedClient::new(reqwest::Client::new(), base)
    }

    #[tokio::test]
    async fn test_fetch_page_sends_pagination_params() {
        let server = MockServer::start().await;
        mount_page(&server, 2, 3, SortOrder::Asc, envelope(&[4, 5, 6], 2, 3, 9)).await;

        let page = client_for(&server)
            .fetch_page(2, 3, SortOrder::Asc)
            .await
            .unwrap();

        let ids: Vec<i64> = page.data.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(page.pagination.page, 2);
        assert_eq!(page.pagination.page_count, 3);
    }

    #[tokio::test]
    async fn test_zero_page_is_clamped_to_first() {
        let server = MockServer::start().await;
        mount_page(&server, 1, 1, SortOrder::Desc, envelope(&[9], 1, 1, 9)).await;

        let page = client_for(&server)
            .fetch_page(0, 0, SortOrder::Desc)
            .await
            .unwrap();
        assert_eq!(page.data[0].id, 9);
    }

    #[tokio::test]
    async fn test_non_success_status_carries_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_page(1, 25, SortOrder::Desc)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::HttpStatus(502)));
        assert_eq!(err.status(), Some(502));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_page(1, 25, SortOrder::Desc).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_page(1, 25, SortOrder::Desc)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_oversized_page_rejected() {
        let server = MockServer::start().await;
        // Upstream claims page size 2 but sends three items
        mount_page(&server, 1, 2, SortOrder::Desc, envelope(&[3, 2, 1], 1, 2, 3)).await;

        let err = client_for(&server)
            .fetch_page(1, 2, SortOrder::Desc)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("pagination[page]", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[2, 1], 1, 25, 2)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.fetch_page(1, 25, SortOrder::Desc).await.unwrap();
        let second = client.fetch_page(1, 25, SortOrder::Desc).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cache_keys_include_sort_order() {
        let server = MockServer::start().await;
        mount_page(&server, 1, 2, SortOrder::Desc, envelope(&[2, 1], 1, 2, 2)).await;
        mount_page(&server, 1, 2, SortOrder::Asc, envelope(&[1, 2], 1, 2, 2)).await;

        let client = client_for(&server);
        let desc = client.fetch_page(1, 2, SortOrder::Desc).await.unwrap();
        let asc = client.fetch_page(1, 2, SortOrder::Asc).await.unwrap();
        assert_eq!(desc.data[0].id, 2);
        assert_eq!(asc.data[0].id, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_and_invalidate_bypass_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[1], 1, 1, 1)))
            .expect(4)
            .mount(&server)
            .await;

        let uncached = client_for(&server).with_cache(Duration::ZERO, 8);
        uncached.fetch_page(1, 25, SortOrder::Desc).await.unwrap();
        uncached.fetch_page(1, 25, SortOrder::Desc).await.unwrap();

        let cached = client_for(&server);
        cached.fetch_page(1, 25, SortOrder::Desc).await.unwrap();
        cached.invalidate();
        cached.fetch_page(1, 25, SortOrder::Desc).await.unwrap();
    }
}
