//! Concurrent Cache Correctness Tests
//!
//! These tests validate that the cache keeps its guarantees while being
//! accessed from multiple threads.
//!
//! ## Test Strategy
//!
//! Unlike the stress tests, which focus on throughput and lack of panics,
//! these tests:
//! - Use values that encode their own key, so a torn or foreign read is
//!   detectable
//! - Check the capacity bound and generation order after concurrent writes
//! - Verify that warm-up and regular traffic can share a cache
//!
//! ## Segments
//!
//! 1. **Read Integrity**: every hit returns exactly the value written
//! 2. **Invariants**: capacity, generations and counters after contention

use gencache::config::CacheConfig;
use gencache::{GenCache, HeapChunkAllocator, RankedRecord, RecordSource, WarmUp};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn make_cache(max_bytes: usize, buckets: usize, chunk_size: usize) -> Arc<GenCache> {
    let config = CacheConfig::new(max_bytes)
        .with_buckets(buckets)
        .with_chunk_size(chunk_size);
    Arc::new(GenCache::init(config, None).unwrap())
}

/// Value derived from the key and a version: `key|version|padding`.
fn encode_value(key: &[u8], version: u32, len: usize) -> Vec<u8> {
    let mut value = Vec::with_capacity(len.max(key.len() + 5));
    value.extend_from_slice(key);
    value.push(b'|');
    value.extend_from_slice(&version.to_be_bytes());
    while value.len() < len {
        value.push((value.len() % 251) as u8);
    }
    value
}

/// Checks that `value` was produced by `encode_value` for `key`.
fn check_value(key: &[u8], value: &[u8]) {
    assert!(value.len() >= key.len() + 5, "value too short");
    assert_eq!(&value[..key.len()], key, "value belongs to another key");
    assert_eq!(value[key.len()], b'|');
    let version = u32::from_be_bytes(value[key.len() + 1..key.len() + 5].try_into().unwrap());
    let expected = encode_value(key, version, value.len());
    assert_eq!(value, &expected[..], "torn value");
}

// ============================================================================
// SEGMENT 1: READ INTEGRITY
// ============================================================================

#[test]
fn test_concurrent_readers_and_writers_see_whole_values() {
    let cache = make_cache(256 * 1024, 8, 4096);
    let num_threads = 8;
    let hits = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let hits = Arc::clone(&hits);
            thread::spawn(move || {
                // Every thread shares the same key space to force contention.
                for i in 0..5_000u32 {
                    let key = format!("order-{}", (i * 7 + t) % 512).into_bytes();
                    if i % 3 == 0 {
                        let len = 16 + ((i as usize * 13) % 1500);
                        cache.set(&key, &encode_value(&key, i, len));
                    } else if let Some(value) = cache.get(&key) {
                        check_value(&key, &value);
                        hits.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(hits.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_concurrent_has_get_appends_exact_value() {
    let cache = make_cache(1 << 20, 16, 4096);
    for i in 0..256u32 {
        let key = i.to_be_bytes();
        cache.set(&key, &encode_value(&key, 0, 100));
    }

    let mut pool = scoped_threadpool::Pool::new(4);
    pool.scoped(|scope| {
        for _ in 0..4 {
            let cache = &cache;
            scope.execute(move || {
                let mut buf = Vec::with_capacity(256);
                for round in 0..20 {
                    for i in 0..256u32 {
                        let key = i.to_be_bytes();
                        buf.clear();
                        buf.extend_from_slice(b"prefix");
                        assert!(cache.has_get(&mut buf, &key), "round {round} key {i} missing");
                        assert_eq!(&buf[..6], b"prefix");
                        check_value(&key, &buf[6..]);
                    }
                }
            });
        }
    });
}

// ============================================================================
// SEGMENT 2: INVARIANTS UNDER CONTENTION
// ============================================================================

#[test]
fn test_capacity_bound_under_concurrent_writes() {
    let max_bytes = 64 * 1024;
    let cache = make_cache(max_bytes, 4, 1024);

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    let key = (t * 100_000 + i).to_be_bytes();
                    let len = (i as usize * 17) % 700;
                    cache.set(&key, &vec![t as u8; len]);
                }
            })
        })
        .collect();

    let observer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for _ in 0..200 {
                let stats = cache.stats();
                assert!(stats.bytes_size <= max_bytes as u64);
                thread::yield_now();
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    observer.join().unwrap();

    let stats = cache.stats();
    assert_eq!(stats.set_calls, 80_000);
    assert!(stats.bytes_size <= max_bytes as u64);
    assert!(stats.evictions > 0);
}

#[test]
fn test_generations_only_move_forward_under_contention() {
    let cache = make_cache(8 * 1024, 4, 256);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..20_000u32 {
                    cache.set(&(t ^ (i << 2)).to_le_bytes(), &[0u8; 100]);
                }
            })
        })
        .collect();

    let watcher = {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut last = cache.generations();
            while !stop.load(Ordering::Relaxed) {
                let now = cache.generations();
                for (before, after) in last.iter().zip(&now) {
                    assert!(after >= before, "generation went backwards");
                }
                last = now;
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    watcher.join().unwrap();

    assert!(cache.generations().iter().all(|&g| g > 0));
}

#[test]
fn test_counters_add_up_across_threads() {
    let cache = make_cache(1 << 20, 16, 4096);
    let num_threads = 6;
    let ops = 2_000;

    let mut pool = scoped_threadpool::Pool::new(num_threads);
    pool.scoped(|scope| {
        for t in 0..num_threads {
            let cache = &cache;
            scope.execute(move || {
                for i in 0..ops {
                    let key = format!("t{t}-{i}");
                    cache.set(key.as_bytes(), b"v");
                    let _ = cache.get(key.as_bytes());
                    let _ = cache.get(b"never-written");
                }
            });
        }
    });

    let stats = cache.stats();
    let total = u64::from(num_threads) * ops;
    assert_eq!(stats.set_calls, total);
    assert_eq!(stats.get_calls, 2 * total);
    assert!(stats.misses >= total);
    assert_eq!(stats.hits(), stats.get_calls - stats.misses);
}

#[test]
fn test_shared_allocator_recycles_between_caches() {
    let allocator = Arc::new(HeapChunkAllocator::new(1024));
    let make = || {
        let config = CacheConfig::new(16 * 1024).with_buckets(4).with_chunk_size(1024);
        let shared: Arc<dyn gencache::ChunkAllocator> = allocator.clone();
        Arc::new(GenCache::init(config, Some(shared)).unwrap())
    };
    let first = make();
    let second = make();

    let handles: Vec<_> = [Arc::clone(&first), Arc::clone(&second)]
        .into_iter()
        .map(|cache| {
            thread::spawn(move || {
                for i in 0..5_000u32 {
                    cache.set(&i.to_be_bytes(), &[1u8; 300]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = allocator.stats();
    assert!(stats.in_use() <= 32);
    assert!(stats.released > 0);

    first.reset();
    second.reset();
    assert_eq!(allocator.stats().in_use(), 0);
}

// ============================================================================
// WARM-UP ALONGSIDE TRAFFIC
// ============================================================================

struct MemoryStore {
    records: Vec<RankedRecord>,
}

impl RecordSource for MemoryStore {
    type Error = std::io::Error;

    fn fetch_page(
        &mut self,
        before: Option<u64>,
        limit: usize,
    ) -> Result<Vec<RankedRecord>, Self::Error> {
        Ok(self
            .records
            .iter()
            .filter(|r| before.map_or(true, |b| r.rank < b))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[test]
fn test_warm_up_while_serving_reads() {
    let cache = make_cache(128 * 1024, 8, 4096);
    let mut store = MemoryStore {
        records: (0..5_000u64)
            .rev()
            .map(|rank| {
                let key = format!("order-{rank}").into_bytes();
                let value = encode_value(&key, rank as u32, 200);
                RankedRecord::new(key, value, rank)
            })
            .collect(),
    };

    let reader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for i in 0..20_000u64 {
                let key = format!("order-{}", 4_999 - (i % 500)).into_bytes();
                if let Some(value) = cache.get(&key) {
                    check_value(&key, &value);
                }
            }
        })
    };

    let report = WarmUp::new(256).run(&cache, &mut store).unwrap();
    reader.join().unwrap();

    assert!(report.loaded > 0);
    assert!(report.halted);
    assert_eq!(cache.stats().evictions, 0);
    assert!(cache.has(b"order-4999"));
}
