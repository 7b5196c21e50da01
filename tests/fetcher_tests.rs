//! # Fetcher Tests
//!
//! Cache-first resolution, retry exhaustion and the circuit breaker, driven
//! through an in-memory search backend.

mod common;

use anyhow::Result;
use products::config::RetryConfig;
use products::fetcher::{FetchOrchestrator, SearchBackend, SearchRequest};
use products::response_cache::ResponseCache;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use common::{catalog_body, CountingBackend};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        backoff_unit: Duration::from_millis(1),
        ..RetryConfig::default()
    }
}

fn orchestrator(dir: &TempDir, backend: Arc<CountingBackend>, retry: RetryConfig) -> Result<FetchOrchestrator> {
    let cache = Arc::new(ResponseCache::open(dir.path())?);
    let backend: Arc<dyn SearchBackend> = backend;
    Ok(FetchOrchestrator::new(cache, backend, retry))
}

#[tokio::test]
async fn test_second_resolve_is_served_from_cache() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::ok(catalog_body(&[500, 100, 300])));
    let fetcher = orchestrator(&dir, Arc::clone(&backend), fast_retry())?;

    let request = SearchRequest::search("Смартфон", 2);
    let first = fetcher.resolve(&request).await;
    let second = fetcher.resolve(&request).await;

    assert_eq!(backend.calls(), 1);
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(first[1].price(), 100.0);
    Ok(())
}

#[tokio::test]
async fn test_cache_key_ignores_case() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::ok(catalog_body(&[10])));
    let fetcher = orchestrator(&dir, Arc::clone(&backend), fast_retry())?;

    fetcher.resolve(&SearchRequest::search("НОУТБУК", 1)).await;
    fetcher.resolve(&SearchRequest::search("ноутбук", 1)).await;

    assert_eq!(backend.calls(), 1);
    assert_eq!(backend.requests()[0].query, "НОУТБУК");
    Ok(())
}

#[tokio::test]
async fn test_retry_exhaustion_yields_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::with_status(500, String::new()));
    let fetcher = orchestrator(&dir, Arc::clone(&backend), fast_retry())?;

    let records = fetcher.resolve(&SearchRequest::search("phone", 1)).await;

    assert!(records.is_empty());
    assert_eq!(backend.calls(), 2);
    // Nothing was cached, so the next call goes to the network again
    fetcher.resolve(&SearchRequest::search("phone", 1)).await;
    assert_eq!(backend.calls(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_only_between_attempts() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::with_status(503, String::new()));
    let retry = RetryConfig {
        backoff_unit: Duration::from_secs(3),
        ..RetryConfig::default()
    };
    let fetcher = orchestrator(&dir, Arc::clone(&backend), retry)?;

    let started = tokio::time::Instant::now();
    fetcher.resolve(&SearchRequest::search("phone", 1)).await;

    assert_eq!(backend.calls(), 2);
    // attempt 1 * 2 units before the retry, nothing after the last attempt
    assert_eq!(started.elapsed(), Duration::from_secs(6));
    Ok(())
}

#[tokio::test]
async fn test_queries_differing_in_separators_do_not_share_results() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::ok(catalog_body(&[10, 20])));
    let fetcher = orchestrator(&dir, Arc::clone(&backend), fast_retry())?;

    fetcher.resolve(&SearchRequest::search("usb/c", 2)).await;
    fetcher.resolve(&SearchRequest::search("usb_c", 2)).await;

    assert_eq!(backend.calls(), 2);
    assert_eq!(backend.requests()[1].query, "usb_c");
    Ok(())
}

#[tokio::test]
async fn test_long_numeric_query_is_cached() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::ok(catalog_body(&[10, 20])));
    let fetcher = orchestrator(&dir, Arc::clone(&backend), fast_retry())?;

    let request = SearchRequest::search("4".repeat(300), 2);
    let first = fetcher.resolve(&request).await;
    let second = fetcher.resolve(&request).await;

    assert_eq!(backend.calls(), 1);
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_malformed_batch_yields_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let body = r#"{"data": [{"product_id": "1", "product_title": "no price"}]}"#.to_string();
    let backend = Arc::new(CountingBackend::ok(body));
    let fetcher = orchestrator(&dir, Arc::clone(&backend), fast_retry())?;

    assert!(fetcher.resolve(&SearchRequest::search("broken", 1)).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_body_without_data_is_not_cached() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::ok(r#"{"status": "ERROR"}"#.to_string()));
    let fetcher = orchestrator(&dir, Arc::clone(&backend), fast_retry())?;

    assert!(fetcher.resolve(&SearchRequest::search("x", 1)).await.is_empty());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_open_breaker_skips_network() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = Arc::new(CountingBackend::with_status(503, String::new()));
    let retry = RetryConfig {
        circuit_breaker_threshold: 1,
        ..fast_retry()
    };
    let fetcher = orchestrator(&dir, Arc::clone(&backend), retry)?;

    fetcher.resolve(&SearchRequest::search("a", 1)).await;
    assert_eq!(backend.calls(), 2);
    fetcher.resolve(&SearchRequest::search("b", 1)).await;
    assert_eq!(backend.calls(), 2);
    Ok(())
}
