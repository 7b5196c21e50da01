//! # Response Cache Module
//!
//! File-backed cache of search API responses. Each `(method, query)` pair maps
//! to one pretty-printed JSON artifact `{"data": [...]}` holding the upstream
//! body verbatim. Artifacts are trusted until the janitor evicts them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::product::{try_materialize, ProductRecord};
use crate::search_errors::SearchError;

const ARTIFACT_EXTENSION: &str = "json";

/// On-disk shape of a cached response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedResponse {
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Derive the cache key of a request.
///
/// The same `(method, query)` pair always yields the same key, whatever its
/// letter case.
pub fn fingerprint(method: &str, query: &str) -> String {
    format!("{method}_{query}").to_lowercase()
}

/// File-backed response cache
///
/// Writers share the directory guard; the janitor takes it exclusively so an
/// eviction pass never interleaves with a half-written artifact.
#[derive(Debug)]
pub struct ResponseCache {
    dir: PathBuf,
    guard: RwLock<()>,
}

impl ResponseCache {
    /// Open the cache, creating the directory when missing
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            guard: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact path for a fingerprint
    ///
    /// The file is named by the SHA-256 digest of the fingerprint: distinct
    /// fingerprints never share a file and the name length is fixed whatever
    /// the query.
    pub fn artifact_path(&self, fingerprint: &str) -> PathBuf {
        let digest = Sha256::digest(fingerprint.as_bytes());
        self.dir
            .join(format!("{}.{ARTIFACT_EXTENSION}", hex::encode(digest)))
    }

    /// Typed records for a fingerprint, or `None` on a miss.
    ///
    /// An unreadable artifact or a batch the entity layer rejects also counts
    /// as a miss so the caller refills it.
    pub fn lookup(&self, fingerprint: &str) -> Option<Vec<ProductRecord>> {
        let _shared = self.shared();
        let path = self.artifact_path(fingerprint);
        if !path.exists() {
            debug!(fingerprint, "Response cache miss");
            return None;
        }

        let artifact = match read_artifact(&path) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cache artifact treated as miss");
                return None;
            }
        };

        match try_materialize(&artifact.data) {
            Ok(records) => {
                touch(&path);
                debug!(fingerprint, records = records.len(), "Response cache hit");
                Some(records)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cached page rejected by entity layer");
                None
            }
        }
    }

    /// Persist a raw response body for a fingerprint, replacing any previous one.
    pub fn store(&self, fingerprint: &str, body: &Value) -> Result<PathBuf, SearchError> {
        let _shared = self.shared();
        let path = self.artifact_path(fingerprint);
        let pretty = serde_json::to_string_pretty(body)?;
        fs::write(&path, pretty)?;
        debug!(path = %path.display(), "Stored cache artifact");
        Ok(path)
    }

    /// All artifact files currently in the directory
    pub fn artifacts(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION)
            {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.guard.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Exclusive access to the directory, used by the janitor
    pub(crate) fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.guard.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_artifact(path: &Path) -> Result<CachedResponse, SearchError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Record a read in the artifact's access time; mounts with `relatime` or
/// `noatime` do not do it for us.
fn touch(path: &Path) {
    let result = File::options()
        .append(true)
        .open(path)
        .and_then(|file| file.set_times(FileTimes::new().set_accessed(SystemTime::now())));
    if let Err(e) = result {
        debug!(path = %path.display(), error = %e, "Could not refresh access time");
    }
}
