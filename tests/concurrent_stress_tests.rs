//! Stress Tests for the Concurrent Cache
//!
//! These tests verify thread safety under high contention: many threads, few
//! buckets, small chunks, so rollovers and reclaims happen constantly.

use gencache::config::CacheConfig;
use gencache::GenCache;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const NUM_THREADS: usize = 16;
const OPS_PER_THREAD: usize = 10_000;

fn make_cache(max_bytes: usize, buckets: usize, chunk_size: usize) -> Arc<GenCache> {
    let config = CacheConfig::new(max_bytes)
        .with_buckets(buckets)
        .with_chunk_size(chunk_size);
    Arc::new(GenCache::init(config, None).unwrap())
}

#[test]
fn test_stress_mixed_operations() {
    let cache = make_cache(64 * 1024, 4, 512);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let hits = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let hits = Arc::clone(&hits);
            thread::spawn(move || {
                barrier.wait();
                let mut buf = Vec::with_capacity(512);
                for i in 0..OPS_PER_THREAD {
                    let key = ((t * OPS_PER_THREAD + i) % 2_000).to_le_bytes();
                    match i % 5 {
                        0 | 1 => cache.set(&key, &key.repeat(1 + i % 50)),
                        2 => {
                            if let Some(value) = cache.get(&key) {
                                assert_eq!(value.len() % key.len(), 0);
                                assert!(value.chunks(key.len()).all(|c| c == &key[..]));
                                hits.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        3 => {
                            buf.clear();
                            let _ = cache.has_get(&mut buf, &key);
                        }
                        _ => {
                            let _ = cache.stop_set(&key, &key);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(
        stats.set_calls,
        (NUM_THREADS * OPS_PER_THREAD * 3 / 5) as u64
    );
    assert!(stats.bytes_size <= stats.max_bytes_size);
    assert!(hits.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_stress_single_bucket_contention() {
    let cache = make_cache(4 * 256, 1, 256);

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let key = [t as u8, (i % 64) as u8];
                    cache.set(&key, &[t as u8; 60]);
                    if let Some(value) = cache.get(&key) {
                        assert_eq!(value, vec![t as u8; 60]);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.set_calls, (NUM_THREADS * OPS_PER_THREAD) as u64);
    assert_eq!(stats.bytes_size, 4 * 256);
    assert!(stats.generations > 0);
}

#[test]
fn test_stress_reset_during_traffic() {
    let cache = make_cache(32 * 1024, 8, 1024);

    let writers: Vec<_> = (0..NUM_THREADS / 2)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let key = (t * OPS_PER_THREAD + i).to_be_bytes();
                    cache.set(&key, &key);
                    if let Some(value) = cache.get(&key) {
                        assert_eq!(value, key);
                    }
                }
            })
        })
        .collect();

    for _ in 0..50 {
        cache.reset();
        thread::yield_now();
    }
    for writer in writers {
        writer.join().unwrap();
    }

    cache.reset();
    let stats = cache.stats();
    assert_eq!(stats.bytes_size, 0);
    assert_eq!(stats.entries_count, 0);
}
