//! Bounded cache of downloaded product photos.
//!
//! Entries are keyed by the rendered caption: browsing back to an item whose
//! caption did not change reuses the bytes instead of downloading again.

use anyhow::{bail, Context, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
struct Entries {
    photos: HashMap<String, Arc<Vec<u8>>>,
    /// Least recently used first
    order: VecDeque<String>,
}

impl Entries {
    fn promote(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

pub struct PhotoCache {
    entries: Mutex<Entries>,
    capacity: usize,
    client: reqwest::Client,
}

impl PhotoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
            client: reqwest::Client::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let mut entries = self.lock();
        let bytes = entries.photos.get(key).cloned()?;
        entries.promote(key);
        Some(bytes)
    }

    /// Insert, evicting the least recently used entry when full
    pub fn insert(&self, key: &str, bytes: Vec<u8>) -> Arc<Vec<u8>> {
        let bytes = Arc::new(bytes);
        let mut entries = self.lock();
        if entries.photos.insert(key.to_string(), Arc::clone(&bytes)).is_some() {
            entries.promote(key);
            return bytes;
        }
        entries.order.push_back(key.to_string());
        while entries.photos.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.photos.remove(&oldest);
                }
                None => break,
            }
        }
        bytes
    }

    /// Cached bytes for `key`, downloading `url` on a miss
    pub async fn get_or_download(&self, key: &str, url: &str) -> Result<Arc<Vec<u8>>> {
        if let Some(bytes) = self.get(key) {
            debug!(url, "Photo served from cache");
            return Ok(bytes);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download photo {url}"))?;
        if !response.status().is_success() {
            bail!("Photo download {url} answered {}", response.status());
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read photo body {url}"))?;
        debug!(url, size = bytes.len(), "Photo downloaded");
        Ok(self.insert(key, bytes.to_vec()))
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
