//! Remote feed client for the paginated upstream article source.
//!
//! - [`client`] - single-page fetches, transport error normalization and a
//!   short-lived page cache
//! - [`retry`] - caller-side retry policy and strict multi-page fetches
//! - [`types`] - articles, page envelopes and sort order, including the
//!   upstream wire shape
//!
//! # Example
//!
//! ```ignore
//! use geekdaily::feed::{FeedClient, SortOrder};
//!
//! let client = FeedClient::new(reqwest::Client::new(), base_url);
//! let page = client.fetch_page(1, 25, SortOrder::Desc).await?;
//! ```

mod client;
mod retry;
mod types;

pub use client::{
    FeedClient, TransportError, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use retry::{fetch_pages, fetch_with_retry, RetryPolicy};
pub use types::{Article, PageEnvelope, Pagination, SortOrder};

#[cfg(test)]
pub(crate) mod testing {
    use super::{Article, PageEnvelope, Pagination, SortOrder};
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn article(id: i64, title: &str) -> Article {
        Article {
            id,
            episode: format!("Issue #{}", id),
            title: title.to_string(),
            author: "geek".to_string(),
            url: format!("https://example.com/articles/{}", id),
            time: "2024-01-01T00:00:00.000Z".to_string(),
            introduce: String::new(),
        }
    }

    pub(crate) fn envelope(ids: &[i64], page: u32, page_size: u32, total: u64) -> PageEnvelope {
        PageEnvelope {
            data: ids
                .iter()
                .map(|&id| article(id, &format!("Article {}", id)))
                .collect(),
            pagination: Pagination {
                page,
                page_size,
                page_count: total.div_ceil(u64::from(page_size.max(1))) as u32,
                total,
            },
        }
    }

    pub(crate) async fn mount_page(
        server: &MockServer,
        page: u32,
        page_size: u32,
        sort: SortOrder,
        body: PageEnvelope,
    ) {
        Mock::given(method("GET"))
            .and(query_param("pagination[page]", page.to_string()))
            .and(query_param("pagination[pageSize]", page_size.to_string()))
            .and(query_param("sort", sort.as_query()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}
