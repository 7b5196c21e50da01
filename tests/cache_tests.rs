//! # Cache Tests
//!
//! Response cache artifacts on disk and janitor eviction at full capacity.

use anyhow::Result;
use products::cache_janitor::CacheJanitor;
use products::config::CacheConfig;
use products::response_cache::ResponseCache;
use serde_json::json;
use std::fs::{self, File, FileTimes};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn artifact_with_atime(cache: &ResponseCache, index: u64) -> Result<PathBuf> {
    let path = cache.store(&format!("search_p1_query{index}"), &json!({"data": []}))?;
    let accessed = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + index);
    File::options()
        .append(true)
        .open(&path)?
        .set_times(FileTimes::new().set_accessed(accessed))?;
    Ok(path)
}

#[test]
fn test_full_cache_evicts_least_recently_accessed_forty_percent() -> Result<()> {
    let dir = TempDir::new()?;
    let cache = Arc::new(ResponseCache::open(dir.path())?);
    let paths = (0..1000)
        .map(|i| artifact_with_atime(&cache, i))
        .collect::<Result<Vec<_>>>()?;

    let janitor = CacheJanitor::new(Arc::clone(&cache), &CacheConfig::default());
    assert_eq!(janitor.enforce_limit()?, 400);

    assert_eq!(cache.artifacts()?.len(), 600);
    assert!(paths[..400].iter().all(|p| !p.exists()));
    assert!(paths[400..].iter().all(|p| p.exists()));
    Ok(())
}

#[test]
fn test_artifact_is_upstream_body_verbatim() -> Result<()> {
    let dir = TempDir::new()?;
    let cache = ResponseCache::open(dir.path())?;
    let body = json!({"status": "OK", "request_id": "abc", "data": []});
    let path = cache.store("search_p2_phone", &body)?;

    assert_eq!(path, cache.artifact_path("search_p2_phone"));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));
    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(on_disk, body);
    Ok(())
}

#[test]
fn test_cache_hit_refreshes_access_time() -> Result<()> {
    let dir = TempDir::new()?;
    let cache = ResponseCache::open(dir.path())?;
    let path = artifact_with_atime(&cache, 0)?;
    let before = fs::metadata(&path)?.accessed()?;

    assert!(cache.lookup("search_p1_query0").is_some());
    let after = fs::metadata(&path)?.accessed()?;
    assert!(after > before);
    Ok(())
}
