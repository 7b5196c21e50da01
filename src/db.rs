//! PostgreSQL storage for users, search history and favorites.
//!
//! Every logical write (get-or-create the owner, then insert or delete the
//! child row) runs in one transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::config::PaginationLimits;
use crate::ledger::{retain_newest, FavoriteEntry, HistoryEntry, Ledger, NewFavorite, UserProfile};
use crate::session::MethodTag;

/// Represents a user row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub name: String,
    pub profile_link: String,
    pub created_at: DateTime<Utc>,
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            profile_link TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS search_history (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            query TEXT NOT NULL,
            method_tag TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create search_history table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS favorites (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            photo_link TEXT NOT NULL,
            caption TEXT NOT NULL,
            offer_url TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create favorites table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS search_history_user_idx ON search_history (user_id, id DESC)")
        .execute(pool)
        .await
        .context("Failed to create search_history index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS favorites_user_idx ON favorites (user_id, offer_url)")
        .execute(pool)
        .await
        .context("Failed to create favorites index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Id of the user row for a Telegram account, inserting it when missing
async fn ensure_user(tx: &mut Transaction<'_, Postgres>, user: &UserProfile) -> Result<i64> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO users (telegram_id, name, profile_link) VALUES ($1, $2, $3)
         ON CONFLICT (telegram_id) DO NOTHING
         RETURNING id",
    )
    .bind(user.telegram_id)
    .bind(&user.name)
    .bind(&user.profile_link)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to insert user")?;

    if let Some(id) = inserted {
        info!(user_id = user.telegram_id, name = %user.name, "New user registered");
        return Ok(id);
    }

    sqlx::query_scalar("SELECT id FROM users WHERE telegram_id = $1")
        .bind(user.telegram_id)
        .fetch_one(&mut **tx)
        .await
        .context("Failed to read user id")
}

/// Get or create a user
pub async fn get_or_create_user(pool: &PgPool, user: &UserProfile) -> Result<User> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let id = ensure_user(&mut tx, user).await?;
    let row = sqlx::query_as::<_, User>(
        "SELECT id, telegram_id, name, profile_link, created_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to read user")?;
    tx.commit().await.context("Failed to commit user")?;
    Ok(row)
}

/// Find a user by Telegram id
pub async fn get_user_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "SELECT id, telegram_id, name, profile_link, created_at FROM users WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read user by telegram id")
}

/// [`Ledger`] backed by PostgreSQL
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    history_cap: usize,
    favorites_cap: usize,
}

impl PgLedger {
    pub fn new(pool: PgPool, limits: &PaginationLimits) -> Self {
        Self {
            pool,
            history_cap: limits.history_cap,
            favorites_cap: limits.favorites_cap,
        }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn record_history(&self, user: &UserProfile, query: &str, tag: MethodTag) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let user_id = ensure_user(&mut tx, user).await?;
        sqlx::query("INSERT INTO search_history (user_id, query, method_tag) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(query)
            .bind(tag.as_str())
            .execute(&mut *tx)
            .await
            .context("Failed to insert history entry")?;
        tx.commit().await.context("Failed to commit history entry")?;
        debug!(user_id = user.telegram_id, query, tag = tag.as_str(), "Recorded search history");
        Ok(())
    }

    async fn history(&self, telegram_id: i64) -> Result<Vec<HistoryEntry>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let rows = sqlx::query_as::<_, HistoryEntry>(
            "SELECT h.id, u.telegram_id, h.query, h.method_tag, h.created_at
             FROM search_history h JOIN users u ON u.id = h.user_id
             WHERE u.telegram_id = $1
             ORDER BY h.id DESC",
        )
        .bind(telegram_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to read history")?;

        let (kept, evicted) = retain_newest(rows, self.history_cap);
        if !evicted.is_empty() {
            let ids: Vec<i64> = evicted.iter().map(|entry| entry.id).collect();
            sqlx::query("DELETE FROM search_history WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await
                .context("Failed to evict history entries")?;
            debug!(user_id = telegram_id, evicted = ids.len(), "Evicted old history entries");
        }
        tx.commit().await.context("Failed to commit history read")?;
        Ok(kept)
    }

    async fn add_favorite(&self, user: &UserProfile, favorite: NewFavorite) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let user_id = ensure_user(&mut tx, user).await?;
        sqlx::query(
            "INSERT INTO favorites (user_id, photo_link, caption, offer_url)
             SELECT $1, $2, $3, $4
             WHERE NOT EXISTS (SELECT 1 FROM favorites WHERE user_id = $1 AND offer_url = $4)",
        )
        .bind(user_id)
        .bind(&favorite.photo_link)
        .bind(&favorite.caption)
        .bind(&favorite.offer_url)
        .execute(&mut *tx)
        .await
        .context("Failed to insert favorite")?;
        tx.commit().await.context("Failed to commit favorite")?;
        Ok(())
    }

    async fn remove_favorite(&self, telegram_id: i64, offer_url: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let result = sqlx::query(
            "DELETE FROM favorites f USING users u
             WHERE f.user_id = u.id AND u.telegram_id = $1 AND f.offer_url = $2",
        )
        .bind(telegram_id)
        .bind(offer_url)
        .execute(&mut *tx)
        .await
        .context("Failed to delete favorite")?;
        tx.commit().await.context("Failed to commit favorite removal")?;
        Ok(result.rows_affected() > 0)
    }

    async fn favorites(&self, telegram_id: i64) -> Result<Vec<FavoriteEntry>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let rows = sqlx::query_as::<_, FavoriteEntry>(
            "SELECT f.id, u.telegram_id, f.photo_link, f.caption, f.offer_url, f.created_at
             FROM favorites f JOIN users u ON u.id = f.user_id
             WHERE u.telegram_id = $1
             ORDER BY f.id DESC",
        )
        .bind(telegram_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to read favorites")?;

        let (kept, evicted) = retain_newest(rows, self.favorites_cap);
        if !evicted.is_empty() {
            let ids: Vec<i64> = evicted.iter().map(|entry| entry.id).collect();
            sqlx::query("DELETE FROM favorites WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await
                .context("Failed to evict favorites")?;
            debug!(user_id = telegram_id, evicted = ids.len(), "Evicted old favorites");
        }
        tx.commit().await.context("Failed to commit favorites read")?;
        Ok(kept)
    }
}
