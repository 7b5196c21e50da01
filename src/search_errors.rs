//! # Search Error Types Module
//!
//! This module defines the error types used by the catalog pipeline: the
//! entity layer, the search API client and the cache janitor.

/// Errors raised while building a [`crate::product::ProductRecord`]
#[derive(Debug, Clone, PartialEq)]
pub enum EntityError {
    /// Required field absent both at the top level and under `offer`
    MissingField(String),
    /// Price text with no parsable number
    InvalidPrice(String),
    /// Field present with an unusable JSON type
    InvalidField(String),
}

impl std::fmt::Display for EntityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityError::MissingField(name) => write!(f, "Missing required field: {name}"),
            EntityError::InvalidPrice(raw) => write!(f, "Invalid price: {raw:?}"),
            EntityError::InvalidField(name) => write!(f, "Invalid field type: {name}"),
        }
    }
}

impl std::error::Error for EntityError {}

/// Errors raised while talking to the search API or the response cache
#[derive(Debug)]
pub enum SearchError {
    /// The request could not be sent or the body could not be read
    Transport(String),
    /// The API answered with a non-200 status
    Status(u16),
    /// Every attempt failed
    Timeout(String),
    /// The circuit breaker is open and the request was not attempted
    CircuitOpen,
    /// Cache artifact I/O failed
    Io(std::io::Error),
    /// Cache artifact or response body is not valid JSON
    Json(serde_json::Error),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::Transport(msg) => write!(f, "Transport error: {msg}"),
            SearchError::Status(code) => write!(f, "Unexpected status: {code}"),
            SearchError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            SearchError::CircuitOpen => write!(f, "Circuit breaker is open"),
            SearchError::Io(err) => write!(f, "Cache I/O error: {err}"),
            SearchError::Json(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SearchError::Io(err) => Some(err),
            SearchError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Io(err)
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Json(err)
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Transport(err.to_string())
    }
}

/// A janitor pass that stopped on a failed deletion
///
/// Files removed before the failure stay removed.
#[derive(Debug)]
pub struct EvictionError {
    pub deleted: usize,
    pub path: std::path::PathBuf,
    pub source: std::io::Error,
}

impl std::fmt::Display for EvictionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Eviction stopped at {} after {} deletions: {}",
            self.path.display(),
            self.deleted,
            self.source
        )
    }
}

impl std::error::Error for EvictionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
