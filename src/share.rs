//! Share destinations and bookmark export.
//!
//! Each [`ShareTarget`] knows how to turn [`ShareData`] into the URL of its
//! share page. Opening that URL (browser, clipboard) is the front-end's job.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::feed::Article;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Invalid share URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Article has no URL to share")]
    MissingUrl,
}

/// What gets shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareData {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub author: Option<String>,
}

impl From<&Article> for ShareData {
    fn from(article: &Article) -> Self {
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        Self {
            title: article.title.clone(),
            url: article.url.clone(),
            description: non_empty(&article.introduce),
            author: non_empty(&article.author),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareTarget {
    /// QR code image the user scans from the WeChat app
    WeChat,
    Weibo,
    QQ,
    Twitter,
    LinkedIn,
    Facebook,
}

impl ShareTarget {
    pub const ALL: [ShareTarget; 6] = [
        ShareTarget::WeChat,
        ShareTarget::Weibo,
        ShareTarget::QQ,
        ShareTarget::Twitter,
        ShareTarget::LinkedIn,
        ShareTarget::Facebook,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShareTarget::WeChat => "wechat",
            ShareTarget::Weibo => "weibo",
            ShareTarget::QQ => "qq",
            ShareTarget::Twitter => "twitter",
            ShareTarget::LinkedIn => "linkedin",
            ShareTarget::Facebook => "facebook",
        }
    }

    /// Build the destination URL for `data`.
    pub fn build(self, data: &ShareData) -> Result<Url, ShareError> {
        if data.url.trim().is_empty() {
            return Err(ShareError::MissingUrl);
        }
        let description = data.description.as_deref().unwrap_or("");

        let url = match self {
            ShareTarget::WeChat => Url::parse_with_params(
                "https://api.qrserver.com/v1/create-qr-code/",
                &[("size", "200x200"), ("data", data.url.as_str())],
            )?,
            ShareTarget::Weibo => {
                let text = format!("{} - {} {}", data.title, description, data.url);
                Url::parse_with_params(
                    "https://service.weibo.com/share/share.php",
                    &[("url", data.url.as_str()), ("title", text.as_str())],
                )?
            }
            ShareTarget::QQ => Url::parse_with_params(
                "https://connect.qq.com/widget/shareqq/index.html",
                &[
                    ("url", data.url.as_str()),
                    ("title", data.title.as_str()),
                    ("summary", description),
                ],
            )?,
            ShareTarget::Twitter => {
                let text = match &data.author {
                    Some(author) => format!("{} by {}", data.title, author),
                    None => data.title.clone(),
                };
                Url::parse_with_params(
                    "https://twitter.com/intent/tweet",
                    &[("text", text.as_str()), ("url", data.url.as_str())],
                )?
            }
            ShareTarget::LinkedIn => Url::parse_with_params(
                "https://www.linkedin.com/sharing/share-offsite/",
                &[("url", data.url.as_str())],
            )?,
            ShareTarget::Facebook => Url::parse_with_params(
                "https://www.facebook.com/sharer/sharer.php",
                &[("u", data.url.as_str())],
            )?,
        };
        Ok(url)
    }
}

impl fmt::Display for ShareTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShareTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ShareTarget::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = ShareTarget::ALL.iter().map(|t| t.name()).collect();
                format!("unknown share target '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

// ============================================================================
// Batch export
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `1. Title - url`, entries separated by a blank line
    Text,
    /// Numbered Markdown links under a heading
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(format!("unknown export format '{}' (expected text or markdown)", other)),
        }
    }
}

const MARKDOWN_HEADING: &str = "# My bookmarked Geek Daily articles";

/// Render a list of (usually bookmarked) articles for sharing in bulk.
pub fn export(items: &[Article], format: ExportFormat) -> String {
    match format {
        ExportFormat::Text => items
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{}. {} - {}", i + 1, a.title, a.url))
            .collect::<Vec<_>>()
            .join("\n\n"),
        ExportFormat::Markdown => {
            let lines: Vec<String> = items
                .iter()
                .enumerate()
                .map(|(i, a)| format!("{}. [{}]({}) - by {}", i + 1, a.title, a.url, a.author))
                .collect();
            format!("{}\n\n{}", MARKDOWN_HEADING, lines.join("\n"))
        }
    }
}

/// One-line teaser naming up to three titles, for social posts.
pub fn summary(items: &[Article], site_url: &str) -> String {
    let titles: Vec<&str> = items.iter().take(3).map(|a| a.title.as_str()).collect();
    let more = if items.len() > 3 { " and more" } else { "" };
    format!(
        "I bookmarked {} great tech articles on Geek Daily, including: {}{}. Take a look! {}",
        items.len(),
        titles.join(", "),
        more,
        site_url
    )
    .trim_end()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::article;
    use pretty_assertions::assert_eq;

    fn sample() -> ShareData {
        ShareData {
            title: "Rust & WebAssembly".to_string(),
            url: "https://example.com/a?b=1".to_string(),
            description: Some("A tour".to_string()),
            author: Some("ferris".to_string()),
        }
    }

    fn param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_every_target_builds_and_carries_url() {
        let data = sample();
        for target in ShareTarget::ALL {
            let url = target.build(&data).unwrap();
            assert!(url.as_str().contains("example.com%2Fa%3Fb%3D1"), "{}: {}", target, url);
        }
    }

    #[test]
    fn test_twitter_text_includes_author() {
        let url = ShareTarget::Twitter.build(&sample()).unwrap();
        assert_eq!(param(&url, "text").as_deref(), Some("Rust & WebAssembly by ferris"));
        assert_eq!(url.host_str(), Some("twitter.com"));

        let mut anonymous = sample();
        anonymous.author = None;
        let url = ShareTarget::Twitter.build(&anonymous).unwrap();
        assert_eq!(param(&url, "text").as_deref(), Some("Rust & WebAssembly"));
    }

    #[test]
    fn test_weibo_title_combines_fields() {
        let url = ShareTarget::Weibo.build(&sample()).unwrap();
        assert_eq!(
            param(&url, "title").as_deref(),
            Some("Rust & WebAssembly - A tour https://example.com/a?b=1")
        );
    }

    #[test]
    fn test_qq_summary_defaults_to_empty() {
        let mut data = sample();
        data.description = None;
        let url = ShareTarget::QQ.build(&data).unwrap();
        assert_eq!(param(&url, "summary").as_deref(), Some(""));
    }

    #[test]
    fn test_wechat_builds_qr_code() {
        let url = ShareTarget::WeChat.build(&sample()).unwrap();
        assert_eq!(url.host_str(), Some("api.qrserver.com"));
        assert_eq!(param(&url, "size").as_deref(), Some("200x200"));
    }

    #[test]
    fn test_missing_url_rejected() {
        let mut data = sample();
        data.url = " ".to_string();
        assert!(matches!(
            ShareTarget::Facebook.build(&data),
            Err(ShareError::MissingUrl)
        ));
    }

    #[test]
    fn test_target_from_str() {
        assert_eq!("LinkedIn".parse::<ShareTarget>().unwrap(), ShareTarget::LinkedIn);
        assert!("myspace".parse::<ShareTarget>().is_err());
    }

    #[test]
    fn test_share_data_from_article_drops_blank_fields() {
        let a = article(3, "Title");
        let data = ShareData::from(&a);
        assert_eq!(data.description, None);
        assert_eq!(data.author.as_deref(), Some("geek"));
    }

    #[test]
    fn test_export_text_and_markdown() {
        let items = vec![article(1, "One"), article(2, "Two")];

        assert_eq!(
            export(&items, ExportFormat::Text),
            "1. One - https://example.com/articles/1\n\n2. Two - https://example.com/articles/2"
        );

        let md = export(&items, ExportFormat::Markdown);
        assert!(md.starts_with(MARKDOWN_HEADING));
        assert!(md.ends_with("2. [Two](https://example.com/articles/2) - by geek"));
    }

    #[test]
    fn test_summary_lists_three_titles() {
        let items: Vec<Article> = (1..=4).map(|i| article(i, &format!("T{}", i))).collect();
        let text = summary(&items, "https://geekdaily.example");
        assert!(text.starts_with("I bookmarked 4 great tech articles"));
        assert!(text.contains("T1, T2, T3 and more."));
        assert!(!text.contains("T4"));
        assert!(text.ends_with("https://geekdaily.example"));
    }
}
