//! # Product Search Telegram Bot
//!
//! A Telegram bot that searches an online product catalog, caches the
//! catalog's answers on disk, lets users page through results one item at a
//! time and keeps their search history and favorites in PostgreSQL.

pub mod bot;
pub mod cache_janitor;
pub mod circuit_breaker;
pub mod commands;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod ledger;
pub mod localization;
pub mod photo_cache;
pub mod product;
pub mod response_cache;
pub mod search_errors;
pub mod session;
pub mod session_manager;
