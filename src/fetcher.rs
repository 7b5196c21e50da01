//! # Fetcher Module
//!
//! Resolves a search request into product records. The response cache is
//! always consulted first; on a miss the search API is called with a bounded
//! retry, the raw body is stored, and the records are read back through the
//! cache so a single code path builds every [`ProductRecord`].
//!
//! Failures never reach the caller: they are logged and resolve to an empty
//! result.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{RetryConfig, SearchApiConfig};
use crate::product::ProductRecord;
use crate::response_cache::{fingerprint, ResponseCache};
use crate::search_errors::SearchError;

/// Name of the catalog search method of the API
pub const SEARCH_METHOD: &str = "search";

/// One search API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub method: String,
    pub query: String,
    pub page: u32,
}

impl SearchRequest {
    pub fn search(query: impl Into<String>, page: u32) -> Self {
        Self {
            method: SEARCH_METHOD.to_string(),
            query: query.into(),
            page,
        }
    }

    /// Cache key of the request; the page number is part of the method
    /// component so different result depths never share an artifact.
    pub fn fingerprint(&self) -> String {
        fingerprint(&format!("{}_p{}", self.method, self.page), &self.query)
    }
}

/// Status and body of an API answer
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Transport to the external catalog
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Issue one request, without retrying
    async fn fetch(&self, request: &SearchRequest) -> Result<RawResponse, SearchError>;

    /// URL and parameters of a request, for logs
    fn describe(&self, request: &SearchRequest) -> String;
}

/// Search API over HTTPS
pub struct HttpSearchBackend {
    client: reqwest::Client,
    config: SearchApiConfig,
}

impl HttpSearchBackend {
    pub fn new(config: SearchApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, request: &SearchRequest) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            request.method
        )
    }

    fn params(&self, request: &SearchRequest) -> Vec<(&'static str, String)> {
        vec![
            ("q", request.query.to_lowercase()),
            ("country", self.config.country.clone()),
            ("language", self.config.language.clone()),
            ("page", request.page.to_string()),
        ]
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn fetch(&self, request: &SearchRequest) -> Result<RawResponse, SearchError> {
        let response = self
            .client
            .get(self.url(request))
            .header("X-RapidAPI-Key", &self.config.api_key)
            .header("X-RapidAPI-Host", &self.config.api_host)
            .query(&self.params(request))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }

    fn describe(&self, request: &SearchRequest) -> String {
        format!("{} {:?}", self.url(request), self.params(request))
    }
}

/// Cache-first resolution of search requests
pub struct FetchOrchestrator {
    cache: Arc<ResponseCache>,
    backend: Arc<dyn SearchBackend>,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl FetchOrchestrator {
    pub fn new(cache: Arc<ResponseCache>, backend: Arc<dyn SearchBackend>, retry: RetryConfig) -> Self {
        let breaker = CircuitBreaker::new(&retry);
        Self {
            cache,
            backend,
            retry,
            breaker,
        }
    }

    /// Records for a request; empty when nothing usable could be obtained.
    ///
    /// Once a request has been fetched successfully, repeating it is served
    /// from the cache without touching the network.
    pub async fn resolve(&self, request: &SearchRequest) -> Vec<ProductRecord> {
        let started = Instant::now();
        let key = request.fingerprint();

        if let Some(records) = self.lookup(&key).await {
            info!(fingerprint = %key, records = records.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Resolved from cache");
            return records;
        }

        if self.breaker.is_open() {
            warn!(fingerprint = %key, error = %SearchError::CircuitOpen, "Skipping search request");
            return Vec::new();
        }

        let records = match self.fetch_and_store(request, &key).await {
            Ok(records) => {
                self.breaker.record_success();
                records
            }
            Err(e) => {
                if matches!(e, SearchError::Timeout(_) | SearchError::Transport(_)) {
                    self.breaker.record_failure();
                }
                error!(
                    request = %self.backend.describe(request),
                    error = %e,
                    "Search request failed"
                );
                Vec::new()
            }
        };

        info!(fingerprint = %key, records = records.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Resolved from search API");
        records
    }

    async fn fetch_and_store(
        &self,
        request: &SearchRequest,
        key: &str,
    ) -> Result<Vec<ProductRecord>, SearchError> {
        let body = self.fetch_with_retry(request).await?;
        let parsed: Value = serde_json::from_str(&body)?;
        if !parsed.get("data").is_some_and(Value::is_array) {
            return Err(SearchError::Transport(
                "response body has no data array".to_string(),
            ));
        }

        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || cache.store(&owned_key, &parsed))
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))??;

        Ok(self.lookup(key).await.unwrap_or_default())
    }

    async fn fetch_with_retry(&self, request: &SearchRequest) -> Result<String, SearchError> {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.backend.fetch(request).await {
                Ok(response) if response.status == 200 => return Ok(response.body),
                Ok(response) => {
                    debug!(error = %SearchError::Status(response.status), attempt, "Search attempt failed");
                }
                Err(e) => {
                    debug!(error = %e, attempt, "Search API request failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry.backoff_unit * attempt * 2).await;
            }
        }
        Err(SearchError::Timeout(format!(
            "no successful response after {attempts} attempts"
        )))
    }

    async fn lookup(&self, key: &str) -> Option<Vec<ProductRecord>> {
        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();
        match tokio::task::spawn_blocking(move || cache.lookup(&owned_key)).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Cache lookup task failed");
                None
            }
        }
    }
}
