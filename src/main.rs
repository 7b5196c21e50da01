use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use products::bot;
use products::cache_janitor::CacheJanitor;
use products::config::{BotConfig, PaginationLimits};
use products::db::{init_database_schema, PgLedger};
use products::fetcher::{FetchOrchestrator, HttpSearchBackend, SearchBackend};
use products::localization::init_localization;
use products::photo_cache::PhotoCache;
use products::response_cache::ResponseCache;
use products::session::{InMemSessionStore, SessionStore};
use products::session_manager::SessionManager;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting product search bot");

    let config = BotConfig::from_env()?;
    init_localization().context("Failed to load localization resources")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    init_database_schema(&pool).await?;

    let cache = Arc::new(
        ResponseCache::open(&config.cache.dir).context("Failed to open response cache")?,
    );
    info!(dir = %cache.dir().display(), max_files = config.cache.max_files, "Response cache ready");

    // Sweep once before serving, then periodically in the background
    let janitor = CacheJanitor::new(Arc::clone(&cache), &config.cache);
    janitor.sweep();
    let sweep_interval = config.cache.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tokio::task::block_in_place(|| janitor.sweep());
        }
    });

    let limits = PaginationLimits::default();
    let retry = config.search.retry.clone();
    let backend: Arc<dyn SearchBackend> = Arc::new(HttpSearchBackend::new(config.search.clone()));
    let fetcher = Arc::new(FetchOrchestrator::new(cache, backend, retry));
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemSessionStore::new());
    let ledger = Arc::new(PgLedger::new(pool, &limits));
    let manager = Arc::new(SessionManager::new(fetcher, sessions, ledger, limits));
    let photos = Arc::new(PhotoCache::new(config.photo_cache_capacity));

    let bot = Bot::new(config.telegram_token);

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_handler))
        .branch(Update::filter_callback_query().endpoint(bot::callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![manager, photos])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
