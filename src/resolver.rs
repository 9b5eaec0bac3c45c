//! Bookmark resolution by bounded page scanning.
//!
//! Upstream has no lookup-by-id endpoint, so bookmarked ids are hydrated by
//! fetching a fixed window of large pages concurrently and keeping the
//! articles whose id is bookmarked. A page that fails to load contributes
//! nothing; ids beyond the window are reported as missing rather than as an
//! error.

use std::collections::HashMap;

use futures::future::join_all;

use crate::bookmarks::BookmarkSet;
use crate::feed::{Article, FeedClient, PageEnvelope, SortOrder};
use crate::view::SearchQuery;

/// Default page size used while scanning.
pub const DEFAULT_SCAN_PAGE_SIZE: u32 = 100;
/// Default number of pages scanned.
pub const DEFAULT_SCAN_MAX_PAGES: u32 = 5;

/// How much of the upstream collection a scan may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ScanWindow {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_SCAN_PAGE_SIZE,
            max_pages: DEFAULT_SCAN_MAX_PAGES,
        }
    }
}

/// Result of resolving a bookmark set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved articles in bookmark order.
    pub items: Vec<Article>,
    /// Bookmarked ids not found inside the scan window, in bookmark order.
    pub missing: Vec<i64>,
    /// Number of bookmarked ids that were asked for.
    pub requested: usize,
}

impl Resolution {
    pub fn resolved(&self) -> usize {
        self.items.len()
    }

    /// Fewer items were resolved than bookmarked.
    pub fn is_partial(&self) -> bool {
        self.resolved() < self.requested
    }
}

/// Hydrate `bookmarks` into full articles, ordered by bookmark position.
///
/// An empty set returns immediately without touching the network.
pub async fn resolve(client: &FeedClient, bookmarks: &BookmarkSet, window: ScanWindow) -> Resolution {
    if bookmarks.is_empty() {
        return Resolution {
            items: Vec::new(),
            missing: Vec::new(),
            requested: 0,
        };
    }

    let pages = scan(client, window).await;

    let mut found: HashMap<i64, Article> = HashMap::with_capacity(bookmarks.len());
    for envelope in pages.into_iter().flatten() {
        for article in envelope.data {
            if bookmarks.contains(article.id) {
                // Upstream may shift between page fetches; first copy wins.
                found.entry(article.id).or_insert(article);
            }
        }
    }

    let mut items = Vec::with_capacity(found.len());
    let mut missing = Vec::new();
    for &id in bookmarks.as_slice() {
        match found.remove(&id) {
            Some(article) => items.push(article),
            None => missing.push(id),
        }
    }

    if !missing.is_empty() {
        tracing::info!(
            resolved = items.len(),
            requested = bookmarks.len(),
            max_pages = window.max_pages,
            "Some bookmarks lie outside the scan window"
        );
    }

    Resolution {
        items,
        missing,
        requested: bookmarks.len(),
    }
}

/// Matches from a bounded multi-page search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSearch {
    pub items: Vec<Article>,
    /// Pages that loaded successfully and were searched.
    pub pages_scanned: usize,
}

/// Search the whole scan window instead of the page on screen.
///
/// Opt-in counterpart to client-filtered view mode: same matcher, same
/// failure-tolerant fan-out as [`resolve`]. Matches keep upstream order.
pub async fn search_window(
    client: &FeedClient,
    query: &SearchQuery,
    window: ScanWindow,
    sort: SortOrder,
) -> WindowSearch {
    let pages = scan_sorted(client, window, sort).await;
    let pages_scanned = pages.iter().filter(|p| p.is_some()).count();

    let mut seen = std::collections::HashSet::new();
    let items = pages
        .into_iter()
        .flatten()
        .flat_map(|envelope| envelope.data)
        .filter(|a| query.matches(a) && seen.insert(a.id))
        .collect();

    WindowSearch {
        items,
        pages_scanned,
    }
}

async fn scan(client: &FeedClient, window: ScanWindow) -> Vec<Option<PageEnvelope>> {
    scan_sorted(client, window, SortOrder::Desc).await
}

/// Fetch pages `1..=max_pages` concurrently. Failed pages come back as `None`.
async fn scan_sorted(
    client: &FeedClient,
    window: ScanWindow,
    sort: SortOrder,
) -> Vec<Option<PageEnvelope>> {
    let fetches = (1..=window.max_pages).map(|page| async move {
        match client.fetch_page(page, window.page_size, sort).await {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!(page = page, error = %e, "Scan page failed, treating as empty");
                None
            }
        }
    });
    join_all(fetches).await
}
