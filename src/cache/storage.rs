//! In-memory key/entry store with TTL metadata and hit/miss counters.
//!
//! The store never judges freshness itself: `get` returns whatever is stored
//! and the caller compares the entry's timestamp against its TTL. Nothing is
//! persisted; a new process starts with an empty store.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::traits::{CacheEntry, CacheStats};

/// Shared store for one payload type.
///
/// Writers replace whole entries under the write lock, so a reader sees
/// either the previous entry or the new one, never a mix.
pub struct CacheStore<T> {
  entries: RwLock<HashMap<String, CacheEntry<T>>>,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl<T> Default for CacheStore<T> {
  fn default() -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    }
  }
}

impl<T> CacheStore<T> {
  pub fn new() -> Self {
    Self::default()
  }

  // Entries are immutable snapshots, so a map left behind by a panicking
  // writer is still consistent.
  fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<T>>> {
    self
      .entries
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<T>>> {
    self
      .entries
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Get the entry for `key`, fresh or not.
  pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
    self.read().get(key).cloned()
  }

  /// Store `data` under `key` stamped with the current time.
  pub fn set(&self, key: &str, data: T) -> CacheEntry<T> {
    let entry = CacheEntry {
      key: key.to_string(),
      data: Arc::new(data),
      timestamp: Utc::now(),
    };
    self.write().insert(key.to_string(), entry.clone());
    entry
  }

  /// Swap the payload of an existing entry, keeping its timestamp.
  ///
  /// `update` sees the current payload and returns the replacement, or `None`
  /// to leave the entry alone. Absent keys are never created. Returns whether
  /// the entry was replaced.
  pub fn replace_data<F>(&self, key: &str, update: F) -> bool
  where
    F: FnOnce(&T) -> Option<T>,
  {
    let mut entries = self.write();
    let Some(entry) = entries.get_mut(key) else {
      return false;
    };
    match update(&entry.data) {
      Some(data) => {
        entry.data = Arc::new(data);
        true
      }
      None => false,
    }
  }

  /// Remove one entry. Returns whether it existed.
  pub fn invalidate(&self, key: &str) -> bool {
    let removed = self.write().remove(key).is_some();
    if removed {
      debug!(key, "Invalidated cache entry");
    }
    removed
  }

  /// Remove every entry whose key starts with `prefix`. Returns how many were removed.
  pub fn invalidate_prefix(&self, prefix: &str) -> usize {
    let mut entries = self.write();
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    let removed = before - entries.len();
    debug!(prefix, removed, "Invalidated cache prefix");
    removed
  }

  /// Keys currently stored under `prefix`.
  pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
    let mut keys: Vec<String> = self
      .read()
      .keys()
      .filter(|key| key.starts_with(prefix))
      .cloned()
      .collect();
    keys.sort();
    keys
  }

  /// Drop all entries. Counters are kept.
  pub fn clear(&self) {
    self.write().clear();
  }

  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  pub fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_get_returns_what_was_set() {
    let store = CacheStore::new();
    store.set("project:1:work_items:a", vec![1, 2, 3]);

    let entry = store.get("project:1:work_items:a").unwrap();
    assert_eq!(*entry.data, vec![1, 2, 3]);
    assert!(store.get("project:2:work_items:a").is_none());
  }

  #[test]
  fn test_stale_entries_stay_retrievable() {
    let store = CacheStore::new();
    let entry = store.set("k", "v");
    let ttl = Duration::minutes(5);

    let later = entry.timestamp + Duration::minutes(6);
    let stored = store.get("k").unwrap();
    assert!(!stored.is_fresh_at(later, ttl));
    assert_eq!(*stored.data, "v");
  }

  #[test]
  fn test_set_replaces_data_and_timestamp() {
    let store = CacheStore::new();
    let first = store.set("k", 1);
    let second = store.set("k", 2);

    let stored = store.get("k").unwrap();
    assert_eq!(*stored.data, 2);
    assert!(stored.timestamp >= first.timestamp);
    assert_eq!(stored.timestamp, second.timestamp);
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn test_replace_data_keeps_timestamp_and_never_creates() {
    let store = CacheStore::new();
    let original = store.set("k", 1);

    assert!(store.replace_data("k", |n| Some(n + 1)));
    let stored = store.get("k").unwrap();
    assert_eq!(*stored.data, 2);
    assert_eq!(stored.timestamp, original.timestamp);

    assert!(!store.replace_data("k", |_| None));
    assert!(!store.replace_data("missing", |n: &i32| Some(n + 1)));
    assert!(store.get("missing").is_none());
  }

  #[test]
  fn test_invalidate_and_prefix() {
    let store = CacheStore::new();
    store.set("project:1:work_items:a", 1);
    store.set("project:1:work_items:b", 2);
    store.set("project:10:work_items:a", 3);
    store.set("project:2:work_items:a", 4);

    assert!(store.invalidate("project:2:work_items:a"));
    assert!(!store.invalidate("project:2:work_items:a"));

    assert_eq!(store.invalidate_prefix("project:1:"), 2);
    assert_eq!(store.keys_with_prefix("project:"), vec!["project:10:work_items:a"]);
  }

  #[test]
  fn test_counters_only_move_when_recorded() {
    let store = CacheStore::new();
    store.set("k", 1);
    store.get("k");
    store.get("missing");
    assert_eq!(store.stats(), CacheStats::default());

    store.record_hit();
    store.record_hit();
    store.record_miss();
    assert_eq!(store.stats(), CacheStats { hits: 2, misses: 1 });

    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.stats().hits, 2);
  }
}
