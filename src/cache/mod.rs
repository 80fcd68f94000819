//! Generic caching layer for hierarchical data.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Stores immutable snapshots per query key with a fetch timestamp
//! - Leaves freshness decisions (and the hit/miss accounting) to the caller
//! - Supports exact and prefix invalidation
//! - Patches cached payloads in place of a refetch, without ever creating entries

mod layer;
mod storage;
mod traits;

pub use layer::CacheCoordinator;
pub use storage::CacheStore;
pub use traits::{CacheEntry, CacheResult, CacheSource, CacheStats, Patchable};
