//! Client for the Geek Daily article feed.
//!
//! - [`feed`] - paginated upstream client, cache and retry policy
//! - [`view`] - pagination, sort and search reconciliation
//! - [`bookmarks`] - persisted bookmark list
//! - [`resolver`] - hydrating bookmarked ids into articles
//! - [`share`] - share links and bookmark export
//! - [`storage`] - SQLite-backed durable slots
//! - [`config`] - optional TOML configuration

pub mod bookmarks;
pub mod config;
pub mod feed;
pub mod resolver;
pub mod share;
pub mod storage;
pub mod util;
pub mod view;
