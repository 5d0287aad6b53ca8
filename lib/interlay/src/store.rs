//! In-process cache store.

use std::collections::HashMap;
use std::future::{Future, ready};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use interlay_core::{CacheEntry, CacheStore, StoreError};

/// [`CacheStore`] backed by a mutex-guarded map.
///
/// Expired entries are dropped when they are read. Suitable for a single
/// process; share it between pipelines through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored entries, expired ones included until read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop the entry at `key`, returning it.
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.lock().remove(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl CacheStore for MemoryStore {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<CacheEntry>, StoreError>> + Send {
        let mut entries = self.lock();
        let now = Utc::now();
        if entries.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
            entries.remove(key);
        }
        ready(Ok(entries.get(key).cloned()))
    }

    fn put(
        &self,
        key: &str,
        entry: CacheEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.lock().insert(key.to_string(), entry);
        ready(Ok(()))
    }
}
