use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Sort Order
// ============================================================================

/// Upstream ordering over article id. Ids are unique, so the order is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Value of the upstream `sort` query parameter.
    pub fn as_query(self) -> &'static str {
        match self {
            SortOrder::Asc => "id:asc",
            SortOrder::Desc => "id:desc",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "id:asc" => Ok(SortOrder::Asc),
            "desc" | "id:desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}' (expected asc or desc)", other)),
        }
    }
}

// ============================================================================
// Article
// ============================================================================

/// One aggregated content item.
///
/// Upstream nests everything except `id` under an `attributes` object; the
/// wire shape is handled by [`ArticleWire`] so the rest of the crate works
/// with a flat record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "ArticleWire", into = "ArticleWire")]
pub struct Article {
    pub id: i64,
    pub episode: String,
    pub title: String,
    pub author: String,
    pub url: String,
    /// Publication timestamp as sent by upstream (ISO-8601).
    pub time: String,
    /// Introductory summary.
    pub introduce: String,
}

impl Article {
    /// Parse the publication timestamp.
    ///
    /// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (taken as
    /// midnight UTC). Returns `None` for anything else.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.time.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// Fields searched by the client-side filter, in match priority order.
    pub(crate) fn searchable_fields(&self) -> [&str; 4] {
        [&self.title, &self.author, &self.introduce, &self.episode]
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
struct AttributesWire {
    episode: String,
    title: String,
    author: String,
    url: String,
    time: String,
    introduce: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ArticleWire {
    id: i64,
    #[serde(default)]
    attributes: AttributesWire,
}

impl From<ArticleWire> for Article {
    fn from(wire: ArticleWire) -> Self {
        let a = wire.attributes;
        Self {
            id: wire.id,
            episode: a.episode,
            title: a.title,
            author: a.author,
            url: a.url,
            time: a.time,
            introduce: a.introduce,
        }
    }
}

impl From<Article> for ArticleWire {
    fn from(article: Article) -> Self {
        Self {
            id: article.id,
            attributes: AttributesWire {
                episode: article.episode,
                title: article.title,
                author: article.author,
                url: article.url,
                time: article.time,
                introduce: article.introduce,
            },
        }
    }
}

// ============================================================================
// Page Envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub total: u64,
}

/// One page of articles plus pagination metadata, exactly as upstream
/// reported it for a single (page, page size, sort) request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "EnvelopeWire", into = "EnvelopeWire")]
pub struct PageEnvelope {
    pub data: Vec<Article>,
    pub pagination: Pagination,
}

impl PageEnvelope {
    /// `len(data) <= page_size`
    pub fn is_consistent(&self) -> bool {
        self.data.len() <= self.pagination.page_size as usize
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct MetaWire {
    pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct EnvelopeWire {
    #[serde(default)]
    data: Vec<Article>,
    meta: MetaWire,
}

impl From<EnvelopeWire> for PageEnvelope {
    fn from(wire: EnvelopeWire) -> Self {
        Self {
            data: wire.data,
            pagination: wire.meta.pagination,
        }
    }
}

impl From<PageEnvelope> for EnvelopeWire {
    fn from(envelope: PageEnvelope) -> Self {
        Self {
            data: envelope.data,
            meta: MetaWire {
                pagination: envelope.pagination,
            },
        }
    }
}
