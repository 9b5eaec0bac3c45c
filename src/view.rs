//! View reconciliation: which items to show and how many pages there are.
//!
//! Two modes are derived from the search query on every call:
//!
//! - **Server-paginated** (blank query): the loaded page envelope is shown
//!   as-is and upstream's page count is used.
//! - **Client-filtered** (non-blank query): the *loaded* envelope is filtered
//!   and re-paginated locally. Search never triggers a fetch once a page is
//!   loaded.
//!
//! [`reconcile`] is the pure derivation. [`ViewEngine`] tracks the inputs,
//! decides when a fetch is needed and discards responses for superseded
//! inputs via a generation counter.

use crate::feed::{Article, FeedClient, PageEnvelope, SortOrder, TransportError};

// ============================================================================
// Search Query
// ============================================================================

/// A non-blank search query, trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    needle: String,
}

impl SearchQuery {
    /// Returns `None` for empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            needle: trimmed.to_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.needle
    }

    /// Case-insensitive substring match against title, author, summary and
    /// episode label.
    pub fn matches(&self, article: &Article) -> bool {
        article
            .searchable_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&self.needle))
    }

    /// Keep matching articles, preserving order.
    pub fn filter<'a>(&self, articles: impl IntoIterator<Item = &'a Article>) -> Vec<Article> {
        articles
            .into_iter()
            .filter(|a| self.matches(a))
            .cloned()
            .collect()
    }
}

// ============================================================================
// Pure reconciliation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ServerPaginated,
    ClientFiltered,
}

/// What to render for one combination of inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub mode: Mode,
    pub items: Vec<Article>,
    pub total_pages: u32,
    /// Items matching the query (client mode) or items on the page (server mode).
    pub filtered_count: usize,
    /// Upstream total across all pages, when an envelope is loaded.
    pub total: u64,
}

/// Derive the display slice and effective page count.
///
/// `page` is only consulted in client-filtered mode; in server-paginated mode
/// the envelope already is the requested page.
pub fn reconcile(
    envelope: Option<&PageEnvelope>,
    page: u32,
    page_size: u32,
    query: &str,
) -> DisplayState {
    let data: &[Article] = envelope.map_or(&[], |e| e.data.as_slice());
    let total = envelope.map_or(0, |e| e.pagination.total);

    let Some(query) = SearchQuery::parse(query) else {
        return DisplayState {
            mode: Mode::ServerPaginated,
            items: data.to_vec(),
            total_pages: envelope.map_or(0, |e| e.pagination.page_count),
            filtered_count: data.len(),
            total,
        };
    };

    let filtered = query.filter(data);
    let size = page_size.max(1) as usize;
    let start = (page.max(1) as usize - 1).saturating_mul(size);
    let items = filtered.iter().skip(start).take(size).cloned().collect();

    DisplayState {
        mode: Mode::ClientFiltered,
        items,
        total_pages: filtered.len().div_ceil(size) as u32,
        filtered_count: filtered.len(),
        total,
    }
}

// ============================================================================
// ViewEngine
// ============================================================================

/// Identifies one upstream page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub page: u32,
    pub page_size: u32,
    pub sort: SortOrder,
}

/// A fetch the caller must perform and hand back through
/// [`ViewEngine::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub key: PageKey,
}

impl FetchTicket {
    pub async fn fetch(&self, client: &FeedClient) -> Result<PageEnvelope, TransportError> {
        client
            .fetch_page(self.key.page, self.key.page_size, self.key.sort)
            .await
    }
}

/// A fetch failure as remembered by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchNotice {
    pub message: String,
    pub status: Option<u16>,
}

impl From<&TransportError> for FetchNotice {
    fn from(e: &TransportError) -> Self {
        Self {
            message: e.to_string(),
            status: e.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    /// Nothing loaded yet and no failure recorded.
    Loading,
    Ready,
    /// The first load failed: there is no data to fall back to.
    Failed(FetchNotice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The ticket was superseded by newer inputs; the result was dropped.
    Stale,
    /// The fetch failed. `blocking` is true only when no data was loaded yet.
    Failed { blocking: bool },
}

/// Stateful wrapper around [`reconcile`].
///
/// Input changes return `Some(FetchTicket)` when a new page must be fetched.
/// While a ticket is outstanding the previously loaded envelope keeps being
/// displayed.
#[derive(Debug, Clone)]
pub struct ViewEngine {
    page: u32,
    page_size: u32,
    sort: SortOrder,
    query: String,
    loaded: Option<(PageKey, PageEnvelope)>,
    generation: u64,
    in_flight: Option<FetchTicket>,
    notice: Option<FetchNotice>,
}

impl ViewEngine {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            sort: SortOrder::default(),
            query: String::new(),
            loaded: None,
            generation: 0,
            in_flight: None,
            notice: None,
        }
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> Mode {
        if SearchQuery::parse(&self.query).is_some() {
            Mode::ClientFiltered
        } else {
            Mode::ServerPaginated
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Envelope currently on screen.
    pub fn envelope(&self) -> Option<&PageEnvelope> {
        self.loaded.as_ref().map(|(_, envelope)| envelope)
    }

    /// Last non-blocking fetch failure, cleared by the next successful load.
    pub fn notice(&self) -> Option<&FetchNotice> {
        match self.loaded {
            Some(_) => self.notice.as_ref(),
            None => None,
        }
    }

    pub fn status(&self) -> ViewStatus {
        match (&self.loaded, &self.notice) {
            (Some(_), _) => ViewStatus::Ready,
            (None, Some(notice)) => ViewStatus::Failed(notice.clone()),
            (None, None) => ViewStatus::Loading,
        }
    }

    /// Ticket for the first load. In client-filtered mode this is upstream
    /// page 1, whatever local page is selected.
    pub fn initial_ticket(&mut self) -> Option<FetchTicket> {
        self.request(self.fetch_key())
    }

    /// Move to `page` (1-based).
    ///
    /// In client-filtered mode this only changes the local slice.
    pub fn set_page(&mut self, page: u32) -> Option<FetchTicket> {
        self.page = page.max(1);
        match self.mode() {
            Mode::ClientFiltered => None,
            Mode::ServerPaginated => self.request(self.server_key()),
        }
    }

    /// Flip the sort order. Always returns to page 1 and issues a fresh
    /// fetch, even when flipping back to the order already on screen, since a
    /// different order changes which items occupy which page.
    pub fn toggle_sort(&mut self) -> Option<FetchTicket> {
        self.sort = self.sort.toggled();
        self.page = 1;
        Some(self.issue(self.server_key()))
    }

    /// Change the search query and return to page 1.
    ///
    /// Entering or staying in client-filtered mode does not fetch while a
    /// page is loaded; a fetch in flight for any other page is superseded so
    /// the filter keeps operating on the page on screen. Clearing the query
    /// fetches only if page 1 in the current order is not already loaded.
    pub fn set_query(&mut self, query: &str) -> Option<FetchTicket> {
        self.query = query.to_string();
        self.page = 1;
        match self.mode() {
            Mode::ClientFiltered => match self.in_flight {
                Some(ticket) if ticket.key != self.fetch_key() => self.request(self.fetch_key()),
                _ => None,
            },
            Mode::ServerPaginated => self.request(self.server_key()),
        }
    }

    /// Re-issue the fetch for the current key, e.g. after a failed first load.
    pub fn retry(&mut self) -> FetchTicket {
        self.issue(self.fetch_key())
    }

    /// Hand back the result for `ticket`.
    pub fn apply(
        &mut self,
        ticket: FetchTicket,
        result: Result<PageEnvelope, TransportError>,
    ) -> ApplyOutcome {
        if self.in_flight.map(|t| t.generation) != Some(ticket.generation) {
            tracing::debug!(
                generation = ticket.generation,
                current = self.generation,
                page = ticket.key.page,
                "Discarding response for superseded request"
            );
            return ApplyOutcome::Stale;
        }
        self.in_flight = None;

        match result {
            Ok(envelope) => {
                self.loaded = Some((ticket.key, envelope));
                self.notice = None;
                ApplyOutcome::Applied
            }
            Err(e) => {
                let blocking = self.loaded.is_none();
                tracing::warn!(
                    page = ticket.key.page,
                    error = %e,
                    blocking = blocking,
                    "Page fetch failed"
                );
                self.notice = Some(FetchNotice::from(&e));
                ApplyOutcome::Failed { blocking }
            }
        }
    }

    /// Perform the outstanding fetch, if any, and apply its result.
    pub async fn sync(&mut self, client: &FeedClient) -> Option<ApplyOutcome> {
        let ticket = self.in_flight?;
        let result = ticket.fetch(client).await;
        Some(self.apply(ticket, result))
    }

    /// Refetch the current key even if it is already loaded. The client's
    /// page cache still applies.
    pub async fn refresh(&mut self, client: &FeedClient) -> ApplyOutcome {
        let ticket = self.retry();
        let result = ticket.fetch(client).await;
        self.apply(ticket, result)
    }

    /// Current display state, from the last stable envelope.
    pub fn display(&self) -> DisplayState {
        reconcile(self.envelope(), self.page, self.page_size, &self.query)
    }

    fn server_key(&self) -> PageKey {
        PageKey {
            page: self.page,
            page_size: self.page_size,
            sort: self.sort,
        }
    }

    /// Key a retry should fetch: the page on screen in client mode (its
    /// filter operates on that envelope), otherwise the current page.
    fn fetch_key(&self) -> PageKey {
        match (self.mode(), &self.loaded) {
            (Mode::ClientFiltered, Some((key, _))) if key.sort == self.sort => *key,
            (Mode::ClientFiltered, _) => PageKey {
                page: 1,
                ..self.server_key()
            },
            (Mode::ServerPaginated, _) => self.server_key(),
        }
    }

    fn request(&mut self, key: PageKey) -> Option<FetchTicket> {
        if let Some(ticket) = self.in_flight {
            if ticket.key == key {
                return None;
            }
        }

        if self.loaded.as_ref().is_some_and(|(loaded, _)| *loaded == key) {
            // Back on the page already shown: anything in flight is now stale.
            if self.in_flight.take().is_some() {
                self.generation += 1;
            }
            return None;
        }

        Some(self.issue(key))
    }

    fn issue(&mut self, key: PageKey) -> FetchTicket {
        self.generation += 1;
        let ticket = FetchTicket {
            generation: self.generation,
            key,
        };
        self.in_flight = Some(ticket);
        ticket
    }
}
