//! Per-user search history and favorites.
//!
//! Both collections are bounded: on every read only the newest `cap` rows are
//! returned and anything older is evicted.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::session::MethodTag;

/// Telegram identity of the owner of ledger rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub telegram_id: i64,
    pub name: String,
    pub profile_link: String,
}

impl UserProfile {
    pub fn new(telegram_id: i64, name: impl Into<String>, username: Option<&str>) -> Self {
        let profile_link = match username {
            Some(username) => format!("https://t.me/{username}"),
            None => format!("tg://user?id={telegram_id}"),
        };
        Self {
            telegram_id,
            name: name.into(),
            profile_link,
        }
    }
}

/// Ledger rows carry the owner's Telegram id in every backend
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub telegram_id: i64,
    pub query: String,
    pub method_tag: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Unknown tags written by older versions are skipped by callers
    pub fn tag(&self) -> Option<MethodTag> {
        MethodTag::parse(&self.method_tag)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FavoriteEntry {
    pub id: i64,
    pub telegram_id: i64,
    pub photo_link: String,
    pub caption: String,
    pub offer_url: String,
    pub created_at: DateTime<Utc>,
}

/// Item being saved to favorites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFavorite {
    pub photo_link: String,
    pub caption: String,
    pub offer_url: String,
}

/// Durable store behind history and favorites
///
/// Writes create the owning user row when it does not exist yet.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record_history(&self, user: &UserProfile, query: &str, tag: MethodTag) -> Result<()>;

    /// Newest first, at most the history cap
    async fn history(&self, telegram_id: i64) -> Result<Vec<HistoryEntry>>;

    /// Saving an offer URL that is already saved does nothing
    async fn add_favorite(&self, user: &UserProfile, favorite: NewFavorite) -> Result<()>;

    /// `true` when a row was deleted
    async fn remove_favorite(&self, telegram_id: i64, offer_url: &str) -> Result<bool>;

    /// Newest first, at most the favorites cap
    async fn favorites(&self, telegram_id: i64) -> Result<Vec<FavoriteEntry>>;
}

/// Split newest-first rows into the kept head and the evicted tail
pub fn retain_newest<T>(mut rows: Vec<T>, cap: usize) -> (Vec<T>, Vec<T>) {
    if rows.len() <= cap {
        return (rows, Vec::new());
    }
    let evicted = rows.split_off(cap);
    (rows, evicted)
}

#[derive(Default)]
struct InMemTables {
    next_id: i64,
    users: HashMap<i64, UserProfile>,
    history: Vec<HistoryEntry>,
    favorites: Vec<FavoriteEntry>,
}

impl InMemTables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_user(&mut self, user: &UserProfile) {
        if !self.users.contains_key(&user.telegram_id) {
            tracing::info!(user_id = user.telegram_id, "New user registered");
            self.users.insert(user.telegram_id, user.clone());
        }
    }
}

/// Process-local ledger with the same cap policy as [`crate::db::PgLedger`]
pub struct InMemLedger {
    tables: Mutex<InMemTables>,
    history_cap: usize,
    favorites_cap: usize,
}

impl InMemLedger {
    pub fn new(history_cap: usize, favorites_cap: usize) -> Self {
        Self {
            tables: Mutex::new(InMemTables::default()),
            history_cap,
            favorites_cap,
        }
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }
}

#[async_trait]
impl Ledger for InMemLedger {
    async fn record_history(&self, user: &UserProfile, query: &str, tag: MethodTag) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.ensure_user(user);
        let id = tables.next_id();
        tables.history.push(HistoryEntry {
            id,
            telegram_id: user.telegram_id,
            query: query.to_string(),
            method_tag: tag.as_str().to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn history(&self, telegram_id: i64) -> Result<Vec<HistoryEntry>> {
        let mut tables = self.tables.lock().await;
        let rows: Vec<HistoryEntry> = tables
            .history
            .iter()
            .rev()
            .filter(|entry| entry.telegram_id == telegram_id)
            .cloned()
            .collect();
        let (kept, evicted) = retain_newest(rows, self.history_cap);
        tables
            .history
            .retain(|entry| !evicted.iter().any(|old| old.id == entry.id));
        Ok(kept)
    }

    async fn add_favorite(&self, user: &UserProfile, favorite: NewFavorite) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.ensure_user(user);
        let exists = tables
            .favorites
            .iter()
            .any(|f| f.telegram_id == user.telegram_id && f.offer_url == favorite.offer_url);
        if exists {
            return Ok(());
        }
        let id = tables.next_id();
        tables.favorites.push(FavoriteEntry {
            id,
            telegram_id: user.telegram_id,
            photo_link: favorite.photo_link,
            caption: favorite.caption,
            offer_url: favorite.offer_url,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn remove_favorite(&self, telegram_id: i64, offer_url: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.favorites.len();
        tables
            .favorites
            .retain(|f| !(f.telegram_id == telegram_id && f.offer_url == offer_url));
        Ok(tables.favorites.len() < before)
    }

    async fn favorites(&self, telegram_id: i64) -> Result<Vec<FavoriteEntry>> {
        let mut tables = self.tables.lock().await;
        let rows: Vec<FavoriteEntry> = tables
            .favorites
            .iter()
            .rev()
            .filter(|f| f.telegram_id == telegram_id)
            .cloned()
            .collect();
        let (kept, evicted) = retain_newest(rows, self.favorites_cap);
        tables
            .favorites
            .retain(|f| !evicted.iter().any(|old| old.id == f.id));
        Ok(kept)
    }
}
