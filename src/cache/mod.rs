//! # Cache Module
//!
//! Bounded in-memory cache for platform lookups.
//!
//! Resolving a playlist or a search hits a remote API (or spawns `yt-dlp`),
//! so [`SourceManager`](crate::sources::SourceManager) keeps the normalized
//! [`Resolved`] result keyed by platform, request kind, limit and target.
//!
//! - **LRU Eviction**: the least recently read entry leaves first
//! - **TTL Support**: entries expire after `cache_ttl_secs`
//! - **Thread Safety**: backed by `DashMap`, clones share storage
//! - **Metrics**: hit/miss/eviction counters
//!
//! ```env
//! CACHE_SIZE=500     # Maximum number of entries
//! CACHE_TTL_SECS=1800
//! ```

pub mod lru_cache;

pub use lru_cache::{CacheMetrics, LRUCache};

use crate::sources::Resolved;

/// Cache de búsquedas y resoluciones de URLs
pub type MusicCache = LRUCache<String, Resolved>;
