//! # Configuration Module
//!
//! This module defines configuration structures for the product search bot,
//! including the search API endpoint, retry settings, cache limits and the
//! pagination limits used by the session engine.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

// Constants for search configuration
pub const DEFAULT_API_BASE_URL: &str = "https://real-time-product-search.p.rapidapi.com";
pub const DEFAULT_COUNTRY: &str = "ru";
pub const DEFAULT_LANGUAGE: &str = "ru";
pub const DEFAULT_CACHE_DIR: &str = "./cache/requests";
pub const DEFAULT_MAX_CACHE_FILES: usize = 1000;
pub const CACHE_RETAIN_RATIO: f64 = 0.6;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_PHOTO_CACHE_CAPACITY: usize = 256;

/// Retry and fail-fast configuration for the search API
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of request attempts (first try included)
    pub max_attempts: u32,
    /// Unit multiplied by the attempt number to get the wait before a retry
    pub backoff_unit: Duration,
    /// Consecutive exhausted resolves before the circuit opens
    pub circuit_breaker_threshold: u32,
    /// Time before an open circuit lets requests through again, in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_unit: Duration::from_secs(1),
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Search API endpoint configuration
#[derive(Debug, Clone)]
pub struct SearchApiConfig {
    /// Base URL, `/search` is appended per request
    pub base_url: String,
    /// Value of the `X-RapidAPI-Key` header
    pub api_key: String,
    /// Value of the `X-RapidAPI-Host` header
    pub api_host: String,
    /// `country` query parameter
    pub country: String,
    /// `language` query parameter
    pub language: String,
    pub retry: RetryConfig,
}

impl Default for SearchApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            api_host: String::new(),
            country: DEFAULT_COUNTRY.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding one JSON artifact per fingerprint
    pub dir: PathBuf,
    /// Artifact count that triggers eviction
    pub max_files: usize,
    /// Share of `max_files` kept after an eviction pass
    pub retain_ratio: f64,
    /// Period of the background sweep
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_files: DEFAULT_MAX_CACHE_FILES,
            retain_ratio: CACHE_RETAIN_RATIO,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

/// Limits applied by the session engine and the ledgers
#[derive(Debug, Clone)]
pub struct PaginationLimits {
    /// Result count kept for the sorted search mode
    pub sorted_results: usize,
    /// History rows kept per user
    pub history_cap: usize,
    /// Favorite rows kept per user
    pub favorites_cap: usize,
    /// Longest accepted non-numeric query, in characters
    pub max_query_chars: usize,
    /// Longest rendered product description, in characters
    pub caption_budget: usize,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            sorted_results: 15,
            history_cap: 10,
            favorites_cap: 100,
            max_query_chars: 30,
            caption_budget: 900,
        }
    }
}

/// Process-level configuration assembled from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub database_url: String,
    pub search: SearchApiConfig,
    pub cache: CacheConfig,
    pub photo_cache_capacity: usize,
}

impl BotConfig {
    /// Read the configuration from environment variables.
    ///
    /// Call `dotenv::dotenv()` first to pick up a local `.env` file.
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let api_key = env::var("RAPIDAPI_KEY").context("RAPIDAPI_KEY must be set")?;
        let api_host = env::var("RAPIDAPI_HOST").context("RAPIDAPI_HOST must be set")?;

        let search = SearchApiConfig {
            base_url: env_or("SEARCH_API_BASE_URL", DEFAULT_API_BASE_URL),
            api_key,
            api_host,
            country: env_or("SEARCH_COUNTRY", DEFAULT_COUNTRY),
            language: env_or("SEARCH_LANGUAGE", DEFAULT_LANGUAGE),
            retry: RetryConfig::default(),
        };

        let cache = CacheConfig {
            dir: PathBuf::from(env_or("CACHE_DIR", DEFAULT_CACHE_DIR)),
            max_files: parse_env("CACHE_MAX_FILES", DEFAULT_MAX_CACHE_FILES)?,
            retain_ratio: CACHE_RETAIN_RATIO,
            sweep_interval: Duration::from_secs(parse_env(
                "CACHE_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?),
        };

        Ok(Self {
            telegram_token,
            database_url,
            search,
            cache,
            photo_cache_capacity: parse_env("PHOTO_CACHE_CAPACITY", DEFAULT_PHOTO_CACHE_CAPACITY)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
