use crate::feed::client::{FeedClient, TransportError};
use crate::feed::types::{Article, PageEnvelope, SortOrder};
use futures::future::join_all;
use std::time::Duration;

/// Caller-side retry policy for page fetches.
///
/// Delays double on each attempt: `base_delay`, `2 * base_delay`, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1), // 1s, 2s, 4s
        }
    }
}

/// Fetch a page, retrying transient failures with exponential backoff.
///
/// 4xx responses (other than 429) and malformed bodies fail immediately.
pub async fn fetch_with_retry(
    client: &FeedClient,
    page: u32,
    page_size: u32,
    sort: SortOrder,
    policy: RetryPolicy,
) -> Result<PageEnvelope, TransportError> {
    let mut retry_count = 0;

    loop {
        match client.fetch_page(page, page_size, sort).await {
            Ok(envelope) => return Ok(envelope),
            Err(e) if e.is_retryable() && retry_count < policy.max_retries => {
                let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
                let delay = policy.base_delay.saturating_mul(factor);
                tracing::warn!(
                    page = page,
                    error = %e,
                    retry = retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Page fetch failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch page 1, then pages `2..=min(page_count, max_pages)` concurrently,
/// returning every article in page order.
///
/// Unlike the bookmark scan this is strict: any failed page fails the whole
/// call.
pub async fn fetch_pages(
    client: &FeedClient,
    page_size: u32,
    sort: SortOrder,
    max_pages: Option<u32>,
) -> Result<Vec<Article>, TransportError> {
    let first = client.fetch_page(1, page_size, sort).await?;
    let page_count = first.pagination.page_count;
    let last_page = max_pages.map_or(page_count, |cap| page_count.min(cap));

    let mut articles = first.data;
    if last_page <= 1 {
        return Ok(articles);
    }

    let rest = join_all((2..=last_page).map(|page| client.fetch_page(page, page_size, sort))).await;
    for result in rest {
        articles.extend(result?.data);
    }

    tracing::debug!(
        pages = last_page,
        articles = articles.len(),
        "Fetched page range"
    );
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{envelope, mount_page};
    use url::Url;
    use wiremock::matchers::{any, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
        }
    }

    fn client_for(server: &MockServer) -> FeedClient {
        let base = Url::parse(&server.uri()).unwrap();
        FeedClient::new(reqwest::Client::new(), base).with_cache(Duration::ZERO, 1)
    }

    #[tokio::test]
    async fn test_retry_503_then_success() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[3, 2, 1], 1, 25, 3)))
            .mount(&server)
            .await;

        let page = fetch_with_retry(&client_for(&server), 1, 25, SortOrder::Desc, fast_policy())
            .await
            .unwrap();
        assert_eq!(page.data.len(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&server)
            .await;

        let err = fetch_with_retry(&client_for(&server), 1, 25, SortOrder::Desc, fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_large_max_retries_does_not_overflow_backoff() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .expect(41)
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            max_retries: 40,
            base_delay: Duration::ZERO,
        };
        let err = fetch_with_retry(&client_for(&server), 1, 25, SortOrder::Desc, policy)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_404_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_with_retry(&client_for(&server), 1, 25, SortOrder::Desc, fast_policy())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_fetch_pages_respects_cap_and_order() {
        let server = MockServer::start().await;
        mount_page(&server, 1, 2, SortOrder::Desc, envelope(&[10, 9], 1, 2, 10)).await;
        mount_page(&server, 2, 2, SortOrder::Desc, envelope(&[8, 7], 2, 2, 10)).await;
        mount_page(&server, 3, 2, SortOrder::Desc, envelope(&[6, 5], 3, 2, 10)).await;
        Mock::given(query_param("pagination[page]", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[4, 3], 4, 2, 10)))
            .expect(0)
            .mount(&server)
            .await;

        let articles = fetch_pages(&client_for(&server), 2, SortOrder::Desc, Some(3))
            .await
            .unwrap();
        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![10, 9, 8, 7, 6, 5]);
    }

    #[tokio::test]
    async fn test_fetch_pages_fails_on_any_page_error() {
        let server = MockServer::start().await;
        mount_page(&server, 1, 2, SortOrder::Desc, envelope(&[4, 3], 1, 2, 4)).await;
        Mock::given(query_param("pagination[page]", "2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = fetch_pages(&client_for(&server), 2, SortOrder::Desc, None).await;
        assert!(result.is_err());
    }
}
