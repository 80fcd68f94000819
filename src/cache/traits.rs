//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Cached payloads that can absorb one locally known update without a refetch.
///
/// `patch` returns the updated payload, or `None` when the payload has no
/// place for `item` (in which case the cache is left untouched).
pub trait Patchable<I>: Sized {
  fn patch(&self, item: &I) -> Option<Self>;
}

/// A cached result for one logical query.
///
/// `data` and `timestamp` are only ever replaced together.
#[derive(Debug)]
pub struct CacheEntry<T> {
  pub key: String,
  pub data: Arc<T>,
  /// When the data was fetched
  pub timestamp: DateTime<Utc>,
}

impl<T> Clone for CacheEntry<T> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      data: Arc::clone(&self.data),
      timestamp: self.timestamp,
    }
  }
}

impl<T> CacheEntry<T> {
  /// Fresh iff `now - timestamp < ttl`.
  pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - self.timestamp < ttl
  }

  pub fn is_fresh(&self, ttl: Duration) -> bool {
    self.is_fresh_at(Utc::now(), ttl)
  }

  pub fn age(&self) -> Duration {
    Utc::now() - self.timestamp
  }
}

/// Access counters, bumped by the caller at the point of decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
}

impl CacheStats {
  pub fn hit_ratio(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched from the network
  pub cached_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at,
    }
  }

  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::CacheStale
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Stale data served because the caller chose it as a fallback after a failed fetch
  CacheStale,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_freshness_boundary() {
    let entry = CacheEntry {
      key: "k".to_string(),
      data: Arc::new(1),
      timestamp: Utc::now(),
    };
    let ttl = Duration::minutes(5);

    assert!(entry.is_fresh_at(entry.timestamp, ttl));
    assert!(entry.is_fresh_at(entry.timestamp + Duration::seconds(299), ttl));
    assert!(!entry.is_fresh_at(entry.timestamp + ttl, ttl));
    assert!(!entry.is_fresh_at(entry.timestamp + Duration::hours(1), ttl));
  }

  #[test]
  fn test_hit_ratio() {
    assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    let stats = CacheStats { hits: 3, misses: 1 };
    assert_eq!(stats.hit_ratio(), 0.75);
  }
}
