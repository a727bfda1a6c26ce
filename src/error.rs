//! Construction errors.
//!
//! The cache only fails when it is built with a configuration it cannot
//! honor. Oversized entries, misses and fingerprint collisions are normal
//! outcomes of the key/value operations and are never reported as errors.

use thiserror::Error;

/// Result type for cache construction.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Invalid cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The capacity cannot give every bucket at least one chunk.
    #[error("max_bytes={max_bytes} is too small; at least {min_bytes} bytes are required")]
    CapacityTooSmall {
        /// Requested capacity.
        max_bytes: usize,
        /// Smallest capacity giving one chunk per bucket.
        min_bytes: usize,
    },

    /// The chunk size is not a power of two or cannot hold a minimal entry.
    #[error("chunk size {0} must be a power of two and at least {min}", min = crate::config::MIN_CHUNK_SIZE)]
    InvalidChunkSize(usize),

    /// The bucket count is zero.
    #[error("bucket count must be greater than zero")]
    InvalidBucketCount,

    /// A bucket ring is larger than a locator can address.
    #[error("bucket of {bucket_bytes} bytes exceeds the addressable ring size of {max} bytes", max = crate::entry::MAX_RING_BYTES)]
    BucketTooLarge {
        /// Bytes that would be assigned to each bucket.
        bucket_bytes: u64,
    },

    /// The supplied allocator hands out chunks of another size.
    #[error("allocator chunk size {allocator} does not match configured chunk size {configured}")]
    ChunkSizeMismatch {
        /// Chunk size from the configuration.
        configured: usize,
        /// Chunk size reported by the allocator.
        allocator: usize,
    },
}
