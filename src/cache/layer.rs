//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStore;
use super::traits::{CacheEntry, CacheResult, CacheStats, Patchable};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client. It never
/// serves stale data on its own; callers opt into that with
/// [`CacheCoordinator::fetch_or_stale`].
pub struct CacheCoordinator<T> {
  store: Arc<CacheStore<T>>,
  /// How long before cached data is considered stale
  ttl: Duration,
}

impl<T> CacheCoordinator<T> {
  /// Create a new coordinator over a shared store.
  pub fn new(store: Arc<CacheStore<T>>) -> Self {
    Self {
      store,
      ttl: Duration::minutes(5),
    }
  }

  /// Set the freshness window for cached data.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn store(&self) -> &Arc<CacheStore<T>> {
    &self.store
  }

  pub fn stats(&self) -> CacheStats {
    self.store.stats()
  }

  fn fresh_entry(&self, key: &str) -> Option<CacheEntry<T>> {
    self.store.get(key).filter(|entry| entry.is_fresh(self.ttl))
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Unless `force_refresh`, a fresh entry is returned without calling `fetcher`
  /// 2. Otherwise `fetcher` runs and its result replaces the entry
  /// 3. A fetch error is returned as-is and the cache is left untouched
  pub async fn fetch_with_cache<E, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
    force_refresh: bool,
  ) -> Result<CacheResult<Arc<T>>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if !force_refresh {
      if let Some(entry) = self.fresh_entry(key) {
        self.store.record_hit();
        debug!(key, "Cache hit");
        return Ok(CacheResult::from_cache(entry.data, entry.timestamp, false));
      }
    }

    let data = fetcher().await?;
    let entry = self.store.set(key, data);
    self.store.record_miss();
    debug!(key, force_refresh, "Cache miss, stored fresh data");
    Ok(CacheResult::from_network(entry.data, entry.timestamp))
  }

  /// Like [`fetch_with_cache`](Self::fetch_with_cache), but when the fetch
  /// fails and any entry exists for `key`, that entry is served as stale.
  pub async fn fetch_or_stale<E, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
    force_refresh: bool,
  ) -> Result<CacheResult<Arc<T>>, E>
  where
    E: std::fmt::Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    match self.fetch_with_cache(key, fetcher, force_refresh).await {
      Ok(result) => Ok(result),
      Err(e) => match self.store.get(key) {
        Some(entry) => {
          warn!(key, error = %e, "Fetch failed, serving stale cache");
          Ok(CacheResult::from_cache(entry.data, entry.timestamp, true))
        }
        None => Err(e),
      },
    }
  }

  /// Fold a locally known update into every cached entry under `prefix`.
  ///
  /// Entries whose payload has no place for `item` are left alone, and no
  /// entry is ever created, so a key never holds a partial view. Patched
  /// entries keep their original timestamp. Returns how many entries changed.
  pub fn apply_local_update<I>(&self, prefix: &str, item: &I) -> usize
  where
    T: Patchable<I>,
  {
    let patched = self
      .store
      .keys_with_prefix(prefix)
      .iter()
      .filter(|key| self.store.replace_data(key, |data| data.patch(item)))
      .count();
    debug!(prefix, patched, "Applied local update");
    patched
  }

  pub fn invalidate(&self, key: &str) -> bool {
    self.store.invalidate(key)
  }

  pub fn invalidate_prefix(&self, prefix: &str) -> usize {
    self.store.invalidate_prefix(prefix)
  }
}

impl<T> Clone for CacheCoordinator<T> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      ttl: self.ttl,
    }
  }
}
