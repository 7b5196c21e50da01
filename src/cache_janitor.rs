//! # Cache Janitor Module
//!
//! Keeps the response cache directory under a hard file-count cap. Once the
//! cap is reached, the least-recently-accessed artifacts are deleted until
//! only `floor(max_files * retain_ratio)` remain.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};

use crate::config::CacheConfig;
use crate::response_cache::ResponseCache;
use crate::search_errors::EvictionError;

pub struct CacheJanitor {
    cache: Arc<ResponseCache>,
    max_files: usize,
    retain_ratio: f64,
}

impl CacheJanitor {
    pub fn new(cache: Arc<ResponseCache>, config: &CacheConfig) -> Self {
        Self {
            cache,
            max_files: config.max_files,
            retain_ratio: config.retain_ratio,
        }
    }

    /// Number of artifacts left after an eviction pass
    pub fn cutoff(&self) -> usize {
        (self.max_files as f64 * self.retain_ratio).floor() as usize
    }

    /// Evict the least-recently-accessed artifacts when the cap is reached.
    ///
    /// Returns how many files were deleted. A failed deletion stops the pass;
    /// files already deleted stay deleted.
    pub fn enforce_limit(&self) -> Result<usize, EvictionError> {
        let _exclusive = self.cache.exclusive();

        let artifacts = self.cache.artifacts().map_err(|source| EvictionError {
            deleted: 0,
            path: self.cache.dir().to_path_buf(),
            source,
        })?;
        if artifacts.len() < self.max_files {
            return Ok(0);
        }

        let victims = eviction_order(artifacts).into_iter().skip(self.cutoff());
        remove_in_order(victims)
    }

    /// Run one pass and log its outcome
    pub fn sweep(&self) {
        match self.enforce_limit() {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, dir = %self.cache.dir().display(), "Evicted cached responses"),
            Err(e) => error!(deleted = e.deleted, error = %e, "Cache eviction stopped early"),
        }
    }
}

/// Delete files until one fails; earlier deletions are kept
fn remove_in_order(victims: impl IntoIterator<Item = PathBuf>) -> Result<usize, EvictionError> {
    let mut deleted = 0;
    for path in victims {
        if let Err(source) = fs::remove_file(&path) {
            return Err(EvictionError {
                deleted,
                path,
                source,
            });
        }
        deleted += 1;
    }
    Ok(deleted)
}

/// Most recently accessed first
///
/// Each file is ordered by its own access time; unreadable metadata sorts as
/// the oldest.
fn eviction_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut stamped: Vec<(SystemTime, PathBuf)> = paths
        .into_iter()
        .map(|path| {
            let accessed = fs::metadata(&path)
                .and_then(|meta| meta.accessed())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (accessed, path)
        })
        .collect();
    stamped.sort_by(|a, b| b.0.cmp(&a.0));
    stamped.into_iter().map(|(_, path)| path).collect()
}
