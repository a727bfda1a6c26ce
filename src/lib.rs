#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  GenCache::set / get / has_get / stop_set                            │
//! │        │                                                             │
//! │        ▼  router(key) % N                                            │
//! │  ┌───────────┐ ┌───────────┐       ┌───────────┐                     │
//! │  │ Bucket 0  │ │ Bucket 1  │  ...  │ Bucket N-1│   one Mutex each    │
//! │  │ index     │ │ index     │       │ index     │   fingerprint ──▶   │
//! │  │ chunk ring│ │ chunk ring│       │ chunk ring│     Locator         │
//! │  └─────┬─────┘ └─────┬─────┘       └─────┬─────┘                     │
//! │        └─────────────┴───────┬───────────┘                           │
//! │                              ▼                                       │
//! │                    ChunkAllocator (free list)                        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Cost | Lock held |
//! |-----------|------|-----------|
//! | `set` | O(entry size) | owning bucket |
//! | `get` / `has_get` | O(value size) copy | owning bucket |
//! | `get_with` | O(1) + caller closure | owning bucket |
//! | eviction | O(1), whole chunk | owning bucket, then allocator |
//! | `update_stats` | O(buckets) | each bucket in turn |
//!
//! Per-entry overhead is one index slot (fingerprint + packed locator, 16
//! bytes) plus a 4-byte header inside the chunk. Chunk memory never exceeds
//! the configured capacity.
//!
//! ## Quick Start
//!
//! ```rust
//! use gencache::GenCache;
//! use gencache::config::CacheConfig;
//!
//! let config = CacheConfig::new(8 * 1024 * 1024).with_buckets(64);
//! let cache: GenCache = GenCache::init(config, None).unwrap();
//!
//! cache.set(b"b563feb7b2b84b6test", br#"{"order_uid":"b563feb7b2b84b6test"}"#);
//! assert!(cache.has(b"b563feb7b2b84b6test"));
//!
//! let stats = cache.stats();
//! assert_eq!(stats.set_calls, 1);
//! ```
//!
//! ## Modules
//!
//! - [`chunk`]: chunk buffers and the shared chunk allocator
//! - [`entry`]: entry header layout and packed locators
//! - [`config`]: cache sizing configuration
//! - [`metrics`]: statistics snapshot and metrics reporting
//! - [`warmup`]: bulk warm-up from a ranked backing store
//! - [`error`]: construction errors

/// Fixed-size chunk buffers and their allocator.
///
/// Provides `Chunk`, the `ChunkAllocator` trait the cache consumes, and the
/// heap-backed slab allocator used by default.
pub mod chunk;

/// Entry header and locator encoding.
pub mod entry;

/// Cache configuration.
///
/// Provides `CacheConfig`, which splits the byte budget into buckets and chunks.
pub mod config;

/// Construction errors.
pub mod error;

/// Cache metrics system.
///
/// Provides the `Stats` snapshot and the `CacheMetrics` reporting trait.
pub mod metrics;

/// Per-bucket chunk ring, index and generational eviction.
///
/// Internal: buckets are only reachable through `GenCache`.
pub(crate) mod bucket;

/// The sharded cache.
pub mod cache;

/// Bulk warm-up from a backing store, newest records first.
pub mod warmup;

pub use cache::GenCache;
pub use chunk::{AllocatorStats, Chunk, ChunkAllocator, HeapChunkAllocator};
pub use config::CacheConfig;
pub use error::CacheError;
pub use metrics::{CacheMetrics, Stats};
pub use warmup::{HaltPolicy, RankedRecord, RecordSource, WarmUp, WarmUpError, WarmUpReport};
