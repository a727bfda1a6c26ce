//! Generational Chunk Cache
//!
//! [`GenCache`] is a fixed array of independently locked buckets. Every key is
//! routed to one bucket by a hash of its bytes; the bucket indexes the key by a
//! second, independent fingerprint hash.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             GenCache                                 │
//! │                                                                      │
//! │  router(key) % N  ──▶  Bucket Selection                              │
//! │                                                                      │
//! │  ┌──────────────┐ ┌──────────────┐     ┌──────────────┐              │
//! │  │  Bucket 0    │ │  Bucket 1    │ ... │  Bucket N-1  │              │
//! │  │  [Mutex]     │ │  [Mutex]     │     │  [Mutex]     │              │
//! │  │  ring+index  │ │  ring+index  │     │  ring+index  │              │
//! │  └──────┬───────┘ └──────┬───────┘     └──────┬───────┘              │
//! │         └────────────────┴────────┬───────────┘                      │
//! │                                   ▼                                  │
//! │                       shared ChunkAllocator                          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Semantics
//!
//! - Writes never fail. Entries larger than one chunk are silently dropped;
//!   the cache is an accelerator, never the source of truth.
//! - A lookup returns nothing when the key is absent, its entry was evicted
//!   by generation advance, or its fingerprint now belongs to another key.
//!   Callers cannot tell these apart and handle all of them by consulting
//!   the backing store.
//! - Eviction is per bucket and per chunk: once a bucket's ring wraps, the
//!   oldest chunk is reclaimed as a whole. Recency of reads is not tracked.
//!
//! # Thread Safety
//!
//! `GenCache` is `Send + Sync`. Each operation holds one bucket lock for a
//! short, allocation-free critical section and never performs I/O under it.
//!
//! # Example
//!
//! ```
//! use gencache::GenCache;
//! use gencache::config::CacheConfig;
//!
//! let config = CacheConfig::new(1 << 20).with_buckets(16).with_chunk_size(4096);
//! let cache: GenCache = GenCache::init(config, None).unwrap();
//!
//! cache.set(b"order-1", br#"{"order_uid":"order-1"}"#);
//!
//! let mut buf = Vec::with_capacity(64);
//! assert!(cache.has_get(&mut buf, b"order-1"));
//! assert_eq!(&buf[..], br#"{"order_uid":"order-1"}"#);
//! assert!(!cache.has(b"order-2"));
//! ```

use crate::bucket::Bucket;
use crate::chunk::{ChunkAllocator, HeapChunkAllocator};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::metrics::{CacheMetrics, Stats};
use core::hash::BuildHasher;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "hashbrown")]
use hashbrown::DefaultHashBuilder;

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::RandomState as DefaultHashBuilder;

/// A fixed-capacity, sharded byte cache with generational eviction.
///
/// # Type Parameters
///
/// - `S`: Hash builder used for both bucket routing and key fingerprints.
///   Two independently seeded instances are kept, so the two hashes are
///   unrelated. Defaults to `DefaultHashBuilder`.
pub struct GenCache<S = DefaultHashBuilder> {
    buckets: Box<[Mutex<Bucket>]>,
    router: S,
    fingerprinter: S,
    allocator: Arc<dyn ChunkAllocator>,
    config: CacheConfig,
}

impl GenCache<DefaultHashBuilder> {
    /// Creates a cache holding at most `max_bytes` of chunk memory, with the
    /// default chunk size and bucket count.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::CapacityTooSmall`] when `max_bytes` cannot give
    /// every bucket at least one chunk.
    pub fn new(max_bytes: usize) -> Result<Self> {
        Self::init(CacheConfig::new(max_bytes), None)
    }

    /// Creates a cache from a configuration with an optional allocator.
    ///
    /// When `allocator` is `None`, a [`HeapChunkAllocator`] sized from the
    /// configuration is created and owned by the cache.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the allocator's
    /// chunk size differs from the configured one.
    pub fn init(config: CacheConfig, allocator: Option<Arc<dyn ChunkAllocator>>) -> Result<Self> {
        Self::init_with_hashers(
            config,
            allocator,
            DefaultHashBuilder::default(),
            DefaultHashBuilder::default(),
        )
    }
}

impl<S: BuildHasher> GenCache<S> {
    /// Creates a cache with explicit routing and fingerprint hashers.
    ///
    /// Use this for deterministic hashing, or to force fingerprint collisions
    /// in tests.
    ///
    /// # Errors
    ///
    /// Same as [`GenCache::init`].
    pub fn init_with_hashers(
        config: CacheConfig,
        allocator: Option<Arc<dyn ChunkAllocator>>,
        router: S,
        fingerprinter: S,
    ) -> Result<Self> {
        config.validate()?;

        let allocator: Arc<dyn ChunkAllocator> = match allocator {
            Some(allocator) => {
                if allocator.chunk_size() != config.chunk_size() {
                    return Err(CacheError::ChunkSizeMismatch {
                        configured: config.chunk_size(),
                        allocator: allocator.chunk_size(),
                    });
                }
                allocator
            }
            None => Arc::new(HeapChunkAllocator::with_slab_chunks(
                config.chunk_size(),
                config.slab_chunks(),
            )),
        };

        let slots = config.chunks_per_bucket();
        let buckets: Vec<_> = (0..config.buckets())
            .map(|_| Mutex::new(Bucket::new(slots, Arc::clone(&allocator))))
            .collect();

        debug!(
            max_bytes = config.max_bytes(),
            buckets = config.buckets(),
            chunk_size = config.chunk_size(),
            chunks_per_bucket = slots,
            "created cache"
        );

        Ok(Self {
            buckets: buckets.into_boxed_slice(),
            router,
            fingerprinter,
            allocator,
            config,
        })
    }

    /// Returns the index of the bucket owning `key`.
    ///
    /// Stable for the lifetime of the cache.
    #[inline]
    pub fn bucket_index(&self, key: &[u8]) -> usize {
        (self.router.hash_one(key) as usize) % self.buckets.len()
    }

    #[inline]
    fn fingerprint(&self, key: &[u8]) -> u64 {
        self.fingerprinter.hash_one(key)
    }

    /// Stores `value` under `key`.
    ///
    /// Entries larger than one chunk (header included) are dropped without
    /// any state change. Only the owning bucket is locked.
    pub fn set(&self, key: &[u8], value: &[u8]) {
        let fingerprint = self.fingerprint(key);
        self.buckets[self.bucket_index(key)]
            .lock()
            .set(key, value, fingerprint);
    }

    /// Stores `value` under `key` unless that would evict older data.
    ///
    /// Intended for bulk warm-up from the backing store, newest records
    /// first. Returns `true` as soon as the owning bucket would have to
    /// reclaim a chunk; in that case nothing is written and the caller should
    /// stop loading into that bucket. Returns `false` when the entry was
    /// stored, or dropped as oversized.
    pub fn stop_set(&self, key: &[u8], value: &[u8]) -> bool {
        let fingerprint = self.fingerprint(key);
        self.buckets[self.bucket_index(key)]
            .lock()
            .stop_set(key, value, fingerprint)
    }

    /// Looks up `key` and applies `f` to the value while the bucket lock is
    /// held.
    ///
    /// This is the zero-copy read path: the borrowed value cannot outlive the
    /// call. Keep `f` short; it blocks every other caller of the same bucket.
    pub fn get_with<F, R>(&self, key: &[u8], f: F) -> Option<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let fingerprint = self.fingerprint(key);
        self.buckets[self.bucket_index(key)]
            .lock()
            .get_with(key, fingerprint, f)
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get_with(key, <[u8]>::to_vec)
    }

    /// Appends the value stored under `key` to `dst`.
    ///
    /// Returns `false`, leaving `dst` untouched, on a miss. `dst` only grows
    /// when its spare capacity is too small for the value.
    pub fn has_get(&self, dst: &mut Vec<u8>, key: &[u8]) -> bool {
        self.get_with(key, |value| dst.extend_from_slice(value))
            .is_some()
    }

    /// Returns `true` when a lookup of `key` would hit.
    pub fn has(&self, key: &[u8]) -> bool {
        self.get_with(key, |_| ()).is_some()
    }

    /// Read-through lookup: appends the cached value to `dst`, or loads it.
    ///
    /// On a miss `load` is called without any lock held. A loaded value is
    /// written back into the cache and appended to `dst`. Returns whether a
    /// value was produced; loader errors are returned unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::GenCache;
    /// use gencache::config::CacheConfig;
    ///
    /// let cache: GenCache = GenCache::init(
    ///     CacheConfig::new(1 << 16).with_buckets(4).with_chunk_size(1024),
    ///     None,
    /// ).unwrap();
    ///
    /// let mut buf = Vec::new();
    /// let found = cache
    ///     .get_or_load(&mut buf, b"k", || Ok::<_, std::io::Error>(Some(b"v".to_vec())))
    ///     .unwrap();
    /// assert!(found);
    /// assert_eq!(cache.get(b"k"), Some(b"v".to_vec()));
    /// ```
    pub fn get_or_load<F, E>(
        &self,
        dst: &mut Vec<u8>,
        key: &[u8],
        load: F,
    ) -> core::result::Result<bool, E>
    where
        F: FnOnce() -> core::result::Result<Option<Vec<u8>>, E>,
    {
        if self.has_get(dst, key) {
            return Ok(true);
        }
        match load()? {
            Some(value) => {
                self.set(key, &value);
                dst.extend_from_slice(&value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Empties every bucket and returns all chunks to the allocator.
    ///
    /// Buckets are reset one at a time; concurrent writers may repopulate
    /// already reset buckets while the flush is in progress.
    pub fn reset(&self) {
        for bucket in self.buckets.iter() {
            bucket.lock().reset();
        }
        debug!(buckets = self.buckets.len(), "reset cache");
    }

    /// Adds the counters of every bucket to `stats`.
    ///
    /// Buckets are locked briefly one after another, so the result is not an
    /// atomic snapshot across buckets.
    pub fn update_stats(&self, stats: &mut Stats) {
        for bucket in self.buckets.iter() {
            bucket.lock().update_stats(stats);
        }
    }

    /// Returns a fresh statistics snapshot.
    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        self.update_stats(&mut stats);
        stats
    }

    /// Returns the current generation of every bucket.
    pub fn generations(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.lock().generation()).collect()
    }

    /// Returns the number of buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the chunk size in bytes.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size()
    }

    /// Returns the configured byte budget.
    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes()
    }

    /// Returns the configuration the cache was built from.
    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the shared chunk allocator.
    #[inline]
    pub fn allocator(&self) -> &Arc<dyn ChunkAllocator> {
        &self.allocator
    }
}

impl<S: BuildHasher> CacheMetrics for GenCache<S> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.stats().to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "GenerationalChunk"
    }
}

impl<S: BuildHasher> core::fmt::Debug for GenCache<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GenCache")
            .field("config", &self.config)
            .field("bucket_count", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::entry::HEADER_SIZE;
    use core::hash::{BuildHasherDefault, Hasher};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_cache(max_bytes: usize, buckets: usize, chunk_size: usize) -> GenCache {
        let config = CacheConfig::new(max_bytes)
            .with_buckets(buckets)
            .with_chunk_size(chunk_size);
        GenCache::init(config, None).unwrap()
    }

    /// Hasher mapping every key to the same value.
    #[derive(Default)]
    struct ConstHasher;

    impl Hasher for ConstHasher {
        fn finish(&self) -> u64 {
            7
        }
        fn write(&mut self, _bytes: &[u8]) {}
    }

    /// Allocator that counts calls and delegates to a heap allocator.
    struct CountingAllocator {
        inner: HeapChunkAllocator,
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    impl CountingAllocator {
        fn new(chunk_size: usize) -> Self {
            Self {
                inner: HeapChunkAllocator::with_slab_chunks(chunk_size, 1),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }
        }
    }

    impl ChunkAllocator for CountingAllocator {
        fn chunk_size(&self) -> usize {
            self.inner.chunk_size()
        }
        fn acquire(&self) -> Chunk {
            self.acquired.fetch_add(1, Ordering::Relaxed);
            self.inner.acquire()
        }
        fn release(&self, chunk: Chunk) {
            self.released.fetch_add(1, Ordering::Relaxed);
            self.inner.release(chunk);
        }
    }

    #[test]
    fn test_basic_operations() {
        let cache = make_cache(1 << 16, 4, 1024);

        cache.set(b"a", b"1");
        cache.set(b"b", b"2");

        assert_eq!(cache.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(cache.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(cache.get(b"c"), None);
        assert!(cache.has(b"a"));
        assert!(!cache.has(b"c"));
    }

    #[test]
    fn test_new_rejects_tiny_capacity() {
        let err = GenCache::new(1).unwrap_err();
        assert!(matches!(err, CacheError::CapacityTooSmall { .. }));
    }

    #[test]
    fn test_new_with_large_capacity() {
        let cache = GenCache::new(64 * 1024 * 1024).unwrap();
        cache.set(b"key", b"value");
        assert_eq!(cache.get(b"key"), Some(b"value".to_vec()));
    }

    #[test]
    fn test_has_get_appends_into_dst() {
        let cache = make_cache(1 << 16, 4, 1024);
        cache.set(b"k", b"world");

        let mut dst = b"hello ".to_vec();
        assert!(cache.has_get(&mut dst, b"k"));
        assert_eq!(dst, b"hello world");

        let mut untouched = b"x".to_vec();
        assert!(!cache.has_get(&mut untouched, b"missing"));
        assert_eq!(untouched, b"x");
    }

    #[test]
    fn test_get_with() {
        let cache = make_cache(1 << 16, 4, 1024);
        cache.set(b"k", b"12345");
        assert_eq!(cache.get_with(b"k", |v| v.len()), Some(5));
        assert_eq!(cache.get_with(b"missing", |v| v.len()), None);
    }

    #[test]
    fn test_oversized_entry_not_cached() {
        let cache = make_cache(1 << 16, 4, 1024);
        let value = vec![0u8; 1024];
        cache.set(b"k", &value);
        assert_eq!(cache.get(b"k"), None);

        let stats = cache.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.bytes_size, 0);
    }

    #[test]
    fn test_large_chunks_keep_field_limit() {
        let cache = make_cache(1 << 18, 1, 1 << 18);
        let too_long = vec![1u8; 70_000];
        cache.set(b"long", &too_long);
        assert_eq!(cache.get(b"long"), None);

        let fits = vec![2u8; 60_000];
        cache.set(b"short", &fits);
        assert_eq!(cache.get_with(b"short", |v| v.len()), Some(60_000));
        assert_eq!(cache.stats().dropped, 1);
    }

    #[test]
    fn test_routing_is_deterministic() {
        let cache = make_cache(1 << 16, 16, 1024);
        for i in 0..100u32 {
            let key = i.to_be_bytes();
            let first = cache.bucket_index(&key);
            for _ in 0..5 {
                assert_eq!(cache.bucket_index(&key), first);
            }
            assert!(first < cache.bucket_count());
        }
    }

    #[test]
    fn test_collision_never_returns_foreign_value() {
        let config = CacheConfig::new(1 << 16).with_buckets(4).with_chunk_size(1024);
        let cache: GenCache<BuildHasherDefault<ConstHasher>> = GenCache::init_with_hashers(
            config,
            None,
            BuildHasherDefault::default(),
            BuildHasherDefault::default(),
        )
        .unwrap();

        cache.set(b"alpha", b"A");
        cache.set(b"beta", b"B");

        assert_eq!(cache.get(b"alpha"), None);
        assert_eq!(cache.get(b"beta"), Some(b"B".to_vec()));
        assert_eq!(cache.stats().collisions, 1);
    }

    #[test]
    fn test_custom_allocator_is_used() {
        let allocator = Arc::new(CountingAllocator::new(64));
        let config = CacheConfig::new(128).with_buckets(1).with_chunk_size(64);
        let shared: Arc<dyn ChunkAllocator> = allocator.clone();
        let cache = GenCache::init(config, Some(shared)).unwrap();

        let value = vec![0u8; 64 - HEADER_SIZE - 1];
        cache.set(b"a", &value);
        cache.set(b"b", &value);
        cache.set(b"c", &value);

        assert_eq!(allocator.acquired.load(Ordering::Relaxed), 3);
        assert_eq!(allocator.released.load(Ordering::Relaxed), 1);

        cache.reset();
        assert_eq!(allocator.released.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_allocator_chunk_size_mismatch() {
        let allocator: Arc<dyn ChunkAllocator> = Arc::new(HeapChunkAllocator::new(128));
        let config = CacheConfig::new(1024).with_buckets(1).with_chunk_size(64);
        let err = GenCache::init(config, Some(allocator)).unwrap_err();
        assert_eq!(
            err,
            CacheError::ChunkSizeMismatch {
                configured: 64,
                allocator: 128,
            }
        );
    }

    #[test]
    fn test_get_or_load_writes_back() {
        let cache = make_cache(1 << 16, 4, 1024);
        let mut calls = 0;

        let mut buf = Vec::new();
        let found = cache
            .get_or_load(&mut buf, b"k", || {
                calls += 1;
                Ok::<_, ()>(Some(b"loaded".to_vec()))
            })
            .unwrap();
        assert!(found);
        assert_eq!(buf, b"loaded");

        let mut buf = Vec::new();
        let found = cache
            .get_or_load(&mut buf, b"k", || {
                calls += 1;
                Ok::<_, ()>(None)
            })
            .unwrap();
        assert!(found);
        assert_eq!(buf, b"loaded");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_get_or_load_propagates_errors() {
        let cache = make_cache(1 << 16, 4, 1024);
        let mut buf = Vec::new();
        let result = cache.get_or_load(&mut buf, b"k", || Err::<Option<Vec<u8>>, _>("db down"));
        assert_eq!(result, Err("db down"));
        assert!(buf.is_empty());
        assert!(!cache.has(b"k"));
    }

    #[test]
    fn test_get_or_load_absent_everywhere() {
        let cache = make_cache(1 << 16, 4, 1024);
        let mut buf = Vec::new();
        let found = cache.get_or_load(&mut buf, b"k", || Ok::<_, ()>(None)).unwrap();
        assert!(!found);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reset() {
        let cache = make_cache(1 << 16, 4, 1024);
        for i in 0..50u32 {
            cache.set(&i.to_be_bytes(), b"value");
        }
        assert!(cache.stats().entries_count > 0);

        cache.reset();
        let stats = cache.stats();
        assert_eq!(stats.entries_count, 0);
        assert_eq!(stats.bytes_size, 0);
        assert_eq!(cache.get(&1u32.to_be_bytes()), None);
        assert!(cache.generations().iter().all(|&g| g == 0));
    }

    #[test]
    fn test_stats_counts() {
        let cache = make_cache(1 << 16, 4, 1024);
        cache.set(b"a", b"1");
        cache.set(b"b", b"2");
        let _ = cache.get(b"a");
        let _ = cache.get(b"zzz");

        let stats = cache.stats();
        assert_eq!(stats.set_calls, 2);
        assert_eq!(stats.get_calls, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries_count, 2);
        assert_eq!(stats.max_bytes_size, 1 << 16);
        assert!(stats.bytes_size >= 1024);
    }

    #[test]
    fn test_update_stats_accumulates() {
        let cache = make_cache(1 << 16, 4, 1024);
        cache.set(b"a", b"1");

        let mut stats = Stats::default();
        cache.update_stats(&mut stats);
        cache.update_stats(&mut stats);
        assert_eq!(stats.set_calls, 2);
    }

    #[test]
    fn test_metrics() {
        let cache = make_cache(1 << 16, 4, 1024);
        cache.set(b"a", b"1");
        let metrics = cache.metrics();
        assert_eq!(metrics.get("set_calls"), Some(&1.0));
        assert_eq!(cache.algorithm_name(), "GenerationalChunk");
    }

    #[test]
    fn test_concurrent_access() {
        let cache = make_cache(1 << 20, 16, 4096);
        let mut pool = scoped_threadpool::Pool::new(8);

        pool.scoped(|scope| {
            for t in 0..8u32 {
                let cache = &cache;
                scope.execute(move || {
                    for i in 0..500u32 {
                        let key = std::format!("thread_{}_key_{}", t, i);
                        let value = (t * 1000 + i).to_be_bytes();
                        cache.set(key.as_bytes(), &value);
                        if let Some(found) = cache.get(key.as_bytes()) {
                            assert_eq!(found, value);
                        }
                    }
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.set_calls, 4000);
        assert_eq!(stats.get_calls, 4000);
        assert!(stats.bytes_size <= stats.max_bytes_size);
    }
}
