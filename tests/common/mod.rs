//! Shared fixtures for integration tests: a mock upstream and page builders.
#![allow(dead_code)]

use std::time::Duration;

use geekdaily::feed::{FeedClient, SortOrder};
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One article in upstream's nested wire shape.
pub fn wire_article(id: i64, title: &str, author: &str) -> Value {
    json!({
        "id": id,
        "attributes": {
            "episode": format!("Issue #{}", id),
            "title": title,
            "author": author,
            "url": format!("https://example.com/articles/{}", id),
            "time": "2024-01-01T00:00:00.000Z",
            "introduce": "",
        }
    })
}

/// A page body with the given articles.
pub fn wire_page(articles: Vec<Value>, page: u32, page_size: u32, total: u64) -> Value {
    let page_count = total.div_ceil(u64::from(page_size.max(1)));
    json!({
        "data": articles,
        "meta": {
            "pagination": {
                "page": page,
                "pageSize": page_size,
                "pageCount": page_count,
                "total": total,
            }
        }
    })
}

/// A page body whose articles are titled "Article {id}".
pub fn wire_page_of(ids: &[i64], page: u32, page_size: u32, total: u64) -> Value {
    let articles = ids
        .iter()
        .map(|&id| wire_article(id, &format!("Article {}", id), "geek"))
        .collect();
    wire_page(articles, page, page_size, total)
}

pub async fn mount_page(
    server: &MockServer,
    page: u32,
    page_size: u32,
    sort: SortOrder,
    body: Value,
) {
    Mock::given(method("GET"))
        .and(query_param("pagination[page]", page.to_string()))
        .and(query_param("pagination[pageSize]", page_size.to_string()))
        .and(query_param("sort", sort.as_query()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Client pointed at `server` with caching disabled.
pub fn client_for(server: &MockServer) -> FeedClient {
    let base = Url::parse(&server.uri()).unwrap();
    FeedClient::new(reqwest::Client::new(), base).with_cache(Duration::ZERO, 1)
}
