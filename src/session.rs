//! Session module holding per-chat navigation state.
//!
//! A session moves through `Idle → AwaitingQuery → Searching → Browsing` and
//! back to `Idle`. Everything here is synchronous and side-effect free; the
//! [`crate::session_manager`] drives it and talks to the outside world.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::PaginationLimits;
use crate::ledger::FavoriteEntry;
use crate::product::ProductRecord;

/// Sessions are keyed by Telegram chat id
pub type SessionId = i64;

/// Price ordering of the sorted search mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Unsorted,
    Ascending,
    Descending,
}

/// How many results a search yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// One record picked at random from the first page
    Single,
    /// Everything the deepest page returns
    Maximal,
    /// First results, optionally ordered by price
    Sorted(SortOrder),
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Sorted(SortOrder::Unsorted)
    }
}

impl SearchMode {
    /// Catalog page requested for this mode
    pub fn page(&self) -> u32 {
        match self {
            SearchMode::Single => 1,
            SearchMode::Sorted(_) => 2,
            SearchMode::Maximal => 3,
        }
    }

    pub fn tag(&self) -> MethodTag {
        match self {
            SearchMode::Single => MethodTag::Single,
            SearchMode::Maximal => MethodTag::Maximal,
            SearchMode::Sorted(SortOrder::Ascending) => MethodTag::Ascending,
            SearchMode::Sorted(SortOrder::Descending) => MethodTag::Descending,
            SearchMode::Sorted(SortOrder::Unsorted) => MethodTag::Unsorted,
        }
    }
}

/// Search mode as persisted in the history table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodTag {
    Ascending,
    Descending,
    Unsorted,
    Single,
    Maximal,
}

impl MethodTag {
    pub const ALL: [MethodTag; 5] = [
        MethodTag::Ascending,
        MethodTag::Descending,
        MethodTag::Unsorted,
        MethodTag::Single,
        MethodTag::Maximal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodTag::Ascending => "up",
            MethodTag::Descending => "down",
            MethodTag::Unsorted => "def",
            MethodTag::Single => "one",
            MethodTag::Maximal => "max",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == raw)
    }

    /// Marker shown on history buttons
    pub fn glyph(&self) -> &'static str {
        match self {
            MethodTag::Ascending => "📈",
            MethodTag::Descending => "📉",
            MethodTag::Unsorted => "📊",
            MethodTag::Single => "🔎",
            MethodTag::Maximal => "🔍",
        }
    }

    pub fn mode(&self) -> SearchMode {
        match self {
            MethodTag::Ascending => SearchMode::Sorted(SortOrder::Ascending),
            MethodTag::Descending => SearchMode::Sorted(SortOrder::Descending),
            MethodTag::Unsorted => SearchMode::Sorted(SortOrder::Unsorted),
            MethodTag::Single => SearchMode::Single,
            MethodTag::Maximal => SearchMode::Maximal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ChoosingSort,
    AwaitingQuery,
    Searching,
    Browsing,
    BrowsingFavorites,
}

/// Outcome of the query validation gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryCheck {
    Accepted(String),
    /// Starts with `/`, belongs to the command dispatcher
    Command,
    Rejected,
}

/// Validate free text typed at the query prompt.
///
/// Text longer than `max_chars` is only accepted when it is purely numeric
/// (article numbers, barcodes).
pub fn check_query(text: &str, max_chars: usize) -> QueryCheck {
    let trimmed = text.trim();
    if trimmed.starts_with('/') {
        return QueryCheck::Command;
    }
    if trimmed.is_empty() {
        return QueryCheck::Rejected;
    }
    let numeric = trimmed.chars().all(|c| c.is_ascii_digit());
    if trimmed.chars().count() > max_chars && !numeric {
        return QueryCheck::Rejected;
    }
    QueryCheck::Accepted(trimmed.to_string())
}

/// Apply a search mode to a freshly resolved result set
pub fn shape_results<R: Rng + ?Sized>(
    mode: SearchMode,
    mut records: Vec<ProductRecord>,
    limits: &PaginationLimits,
    rng: &mut R,
) -> Vec<ProductRecord> {
    match mode {
        SearchMode::Single => records.choose(rng).cloned().into_iter().collect(),
        SearchMode::Maximal => records,
        SearchMode::Sorted(order) => {
            match order {
                SortOrder::Ascending => records.sort_by(|a, b| a.price().total_cmp(&b.price())),
                SortOrder::Descending => records.sort_by(|a, b| b.price().total_cmp(&a.price())),
                SortOrder::Unsorted => {}
            }
            records.truncate(limits.sorted_results);
            records
        }
    }
}

/// Per-chat state
///
/// `page_index` is always a valid index into `results` (or 0 when empty), and
/// `saved_index` into `saved`.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    phase: Phase,
    mode: SearchMode,
    results: Vec<ProductRecord>,
    page_index: usize,
    favorite_urls: HashSet<String>,
    saved: Vec<FavoriteEntry>,
    saved_index: usize,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn results(&self) -> &[ProductRecord] {
        &self.results
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn current(&self) -> Option<&ProductRecord> {
        self.results.get(self.page_index)
    }

    pub fn begin_sort_choice(&mut self) {
        self.phase = Phase::ChoosingSort;
    }

    /// Remember the mode and wait for the query text
    pub fn select_mode(&mut self, mode: SearchMode) {
        self.mode = mode;
        self.phase = Phase::AwaitingQuery;
    }

    pub fn begin_search(&mut self) {
        self.phase = Phase::Searching;
    }

    /// Replace the result list and show its first item.
    ///
    /// An empty list sends the session back to the query prompt and returns
    /// `false`.
    pub fn load_results(&mut self, records: Vec<ProductRecord>) -> bool {
        self.results = records;
        self.page_index = 0;
        if self.results.is_empty() {
            self.phase = Phase::AwaitingQuery;
            false
        } else {
            self.phase = Phase::Browsing;
            true
        }
    }

    pub fn has_next(&self) -> bool {
        self.page_index + 1 < self.results.len()
    }

    pub fn has_prev(&self) -> bool {
        self.page_index > 0 && !self.results.is_empty()
    }

    /// Move forward; a no-op on the last item
    pub fn next(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.page_index += 1;
        self.phase = Phase::Browsing;
        true
    }

    /// Move back; a no-op on the first item
    pub fn back(&mut self) -> bool {
        if !self.has_prev() {
            return false;
        }
        self.page_index -= 1;
        self.phase = Phase::Browsing;
        true
    }

    pub fn return_to_main(&mut self) {
        self.phase = Phase::Idle;
        self.page_index = 0;
        self.saved_index = 0;
    }

    /// Replace the favorites membership cache
    pub fn set_favorites<I>(&mut self, urls: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.favorite_urls = urls.into_iter().collect();
    }

    pub fn is_favorite(&self, offer_url: &str) -> bool {
        self.favorite_urls.contains(offer_url)
    }

    /// `true` when the URL was not cached yet
    pub fn mark_favorite(&mut self, offer_url: &str) -> bool {
        self.favorite_urls.insert(offer_url.to_string())
    }

    /// `true` when the URL was cached
    pub fn unmark_favorite(&mut self, offer_url: &str) -> bool {
        self.favorite_urls.remove(offer_url)
    }

    /// Start browsing saved favorites; `false` when there are none
    pub fn open_saved(&mut self, entries: Vec<FavoriteEntry>) -> bool {
        self.set_favorites(entries.iter().map(|entry| entry.offer_url.clone()));
        self.saved = entries;
        self.saved_index = 0;
        if self.saved.is_empty() {
            self.phase = Phase::Idle;
            false
        } else {
            self.phase = Phase::BrowsingFavorites;
            true
        }
    }

    pub fn saved(&self) -> &[FavoriteEntry] {
        &self.saved
    }

    pub fn saved_index(&self) -> usize {
        self.saved_index
    }

    pub fn current_saved(&self) -> Option<&FavoriteEntry> {
        self.saved.get(self.saved_index)
    }

    pub fn saved_has_next(&self) -> bool {
        self.saved_index + 1 < self.saved.len()
    }

    pub fn saved_has_prev(&self) -> bool {
        self.saved_index > 0 && !self.saved.is_empty()
    }

    pub fn next_saved(&mut self) -> bool {
        if !self.saved_has_next() {
            return false;
        }
        self.saved_index += 1;
        true
    }

    pub fn back_saved(&mut self) -> bool {
        if !self.saved_has_prev() {
            return false;
        }
        self.saved_index -= 1;
        true
    }
}

/// Storage of session state by chat id
///
/// `entry` hands out a per-session lock: concurrent events of one chat are
/// serialized while different chats proceed independently.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Lockable handle to a session, created empty on first access
    async fn entry(&self, id: SessionId) -> Arc<Mutex<SessionState>>;

    /// Snapshot of a session
    async fn get(&self, id: SessionId) -> Option<SessionState>;

    /// Replace a session
    async fn put(&self, id: SessionId, state: SessionState);
}

/// Process-lifetime session storage
#[derive(Default)]
pub struct InMemSessionStore {
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
}

impl InMemSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemSessionStore {
    async fn entry(&self, id: SessionId) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(sessions.entry(id).or_default())
    }

    async fn get(&self, id: SessionId) -> Option<SessionState> {
        let handle = self.sessions.lock().await.get(&id).cloned()?;
        let state = handle.lock().await.clone();
        Some(state)
    }

    async fn put(&self, id: SessionId, state: SessionState) {
        let handle = self.entry(id).await;
        *handle.lock().await = state;
    }
}
