//! Cache Configuration
//!
//! [`CacheConfig`] describes how a [`GenCache`](crate::GenCache) carves its
//! byte budget into buckets and chunks.
//!
//! # Sizing
//!
//! ```text
//! chunks per bucket = floor(max_bytes / buckets / chunk_size)
//! resident bytes   <= buckets * chunks per bucket * chunk_size <= max_bytes
//! ```
//!
//! The per-bucket chunk count is rounded **down**, so the cache never holds
//! more than `max_bytes` of chunk memory. Construction fails when a bucket
//! would not get a single chunk.
//!
//! The largest storable entry is `chunk_size` bytes including its 4-byte
//! header; larger entries are silently dropped by the cache.
//!
//! # Examples
//!
//! ```
//! use gencache::config::CacheConfig;
//!
//! // 32 MiB across 512 buckets of 64 KiB chunks
//! let config = CacheConfig::new(32 * 1024 * 1024).with_buckets(512);
//! assert_eq!(config.chunks_per_bucket(), 1);
//!
//! // Tiny rings for tests
//! let config = CacheConfig::new(128).with_buckets(1).with_chunk_size(64);
//! assert_eq!(config.chunks_per_bucket(), 2);
//! ```

use crate::chunk::DEFAULT_SLAB_CHUNKS;
use crate::entry::{HEADER_SIZE, MAX_RING_BYTES};
use crate::error::{CacheError, Result};
use core::fmt;

/// Default chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: usize = 16;

/// Returns the default number of buckets based on available parallelism.
///
/// Four buckets per hardware thread, rounded up to a power of two and clamped
/// to `16..=512`.
pub fn default_bucket_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(16)
        .saturating_mul(4)
        .next_power_of_two()
        .clamp(16, 512)
}

/// Configuration for a [`GenCache`](crate::GenCache).
///
/// # Required Parameters
///
/// - `max_bytes`: total chunk memory the cache may hold (set in constructor)
///
/// # Optional Parameters (Builder Methods)
///
/// - `chunk_size`: bytes per chunk, a power of two (default: 64 KiB)
/// - `buckets`: number of independently locked buckets (default: based on CPU count)
/// - `slab_chunks`: chunks the default allocator allocates at once (default: 16)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    max_bytes: usize,
    chunk_size: usize,
    buckets: usize,
    slab_chunks: usize,
}

impl CacheConfig {
    /// Creates a configuration for a cache holding at most `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            chunk_size: DEFAULT_CHUNK_SIZE,
            buckets: default_bucket_count(),
            slab_chunks: DEFAULT_SLAB_CHUNKS,
        }
    }

    /// Sets the chunk size in bytes.
    ///
    /// Keys and values are still limited to 65 535 bytes each by the entry
    /// header, so chunks above 64 KiB do not admit longer fields.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the number of buckets.
    ///
    /// A power of two at or above the number of concurrent callers keeps lock
    /// contention low.
    #[must_use]
    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    /// Sets how many chunks the default allocator allocates per slab.
    #[must_use]
    pub fn with_slab_chunks(mut self, slab_chunks: usize) -> Self {
        self.slab_chunks = slab_chunks;
        self
    }

    /// Returns the total byte budget.
    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the chunk size in bytes.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the number of buckets.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Returns the slab size of the default allocator.
    #[inline]
    pub fn slab_chunks(&self) -> usize {
        self.slab_chunks
    }

    /// Returns the byte budget of a single bucket.
    #[inline]
    pub fn bucket_bytes(&self) -> usize {
        self.max_bytes / self.buckets.max(1)
    }

    /// Returns the number of chunk slots in each bucket ring.
    #[inline]
    pub fn chunks_per_bucket(&self) -> usize {
        self.bucket_bytes() / self.chunk_size.max(1)
    }

    /// Returns the smallest capacity that gives every bucket one chunk.
    #[inline]
    pub fn min_bytes(&self) -> usize {
        self.buckets.saturating_mul(self.chunk_size)
    }

    /// Returns the largest value that can be stored under `key_len`-byte keys.
    #[inline]
    pub fn max_value_len(&self, key_len: usize) -> usize {
        self.chunk_size.saturating_sub(HEADER_SIZE + key_len)
    }

    /// Checks that a cache can be built from this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.buckets == 0 {
            return Err(CacheError::InvalidBucketCount);
        }
        if !self.chunk_size.is_power_of_two() || self.chunk_size < MIN_CHUNK_SIZE {
            return Err(CacheError::InvalidChunkSize(self.chunk_size));
        }
        if self.chunks_per_bucket() == 0 {
            return Err(CacheError::CapacityTooSmall {
                max_bytes: self.max_bytes,
                min_bytes: self.min_bytes(),
            });
        }
        let ring_bytes = (self.chunks_per_bucket() as u64) * (self.chunk_size as u64);
        if ring_bytes > MAX_RING_BYTES {
            return Err(CacheError::BucketTooLarge {
                bucket_bytes: ring_bytes,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("max_bytes", &self.max_bytes)
            .field("chunk_size", &self.chunk_size)
            .field("buckets", &self.buckets)
            .field("slab_chunks", &self.slab_chunks)
            .finish()
    }
}
