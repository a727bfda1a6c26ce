//! Simulation runner for the order-storage workload
//!
//! A run goes through the phases an order-storage service goes through:
//!
//! 1. **Seed**: generate `orders` synthetic orders into the backing store
//! 2. **Warm-up**: load the newest of them into an empty cache
//! 3. **Traffic**: reader threads look orders up through the cache, falling
//!    back to the store on a miss; writer threads ingest new orders and
//!    write them through to the cache
//!
//! Readers favour recent orders: with probability `recent_bias` the rank is
//! drawn from the newest `recent_window` orders, otherwise uniformly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use gencache::config::CacheConfig;
use gencache::{GenCache, HaltPolicy, Stats, WarmUp, WarmUpReport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::orders::OrderGenerator;
use crate::store::OrderStore;

/// Settings for one simulation run
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Orders seeded into the store before warm-up
    pub orders: usize,
    /// Reader threads
    pub threads: usize,
    /// Lookups per reader thread
    pub reads_per_thread: usize,
    /// Writer threads ingesting new orders during traffic
    pub writers: usize,
    /// Orders ingested per writer thread
    pub writes_per_thread: usize,
    /// Cache capacity in MiB
    pub capacity_mb: usize,
    /// Bucket count, or the library default
    pub buckets: Option<usize>,
    /// Chunk size in bytes, or the library default
    pub chunk_size: Option<usize>,
    /// Warm-up page size
    pub page_size: usize,
    /// Warm-up halt policy
    pub policy: HaltPolicy,
    /// Line items per order; drives document size
    pub items_per_order: usize,
    /// Probability that a lookup targets a recent order
    pub recent_bias: f64,
    /// Size of the "recent" window in orders
    pub recent_window: usize,
    /// RNG seed
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            orders: 100_000,
            threads: 4,
            reads_per_thread: 50_000,
            writers: 1,
            writes_per_thread: 5_000,
            capacity_mb: 32,
            buckets: None,
            chunk_size: None,
            page_size: gencache::warmup::DEFAULT_PAGE_SIZE,
            policy: HaltPolicy::default(),
            items_per_order: 2,
            recent_bias: 0.8,
            recent_window: 10_000,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new(self.capacity_mb * 1024 * 1024);
        if let Some(buckets) = self.buckets {
            config = config.with_buckets(buckets);
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        config
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub config: SimulationConfig,
    /// Buckets the cache was built with
    pub buckets: usize,
    pub warm_up: WarmUpReport,
    pub warm_up_time: Duration,
    pub traffic_time: Duration,
    /// Lookups issued by readers
    pub reads: u64,
    /// Lookups answered by the cache
    pub cache_hits: u64,
    /// Lookups answered by neither cache nor store
    pub not_found: u64,
    /// Orders ingested during traffic
    pub ingested: u64,
    /// Lookups that reached the backing store
    pub store_lookups: u64,
    /// Cache counters after the run
    pub stats: Stats,
    /// Average serialized order size
    pub avg_order_bytes: usize,
}

impl SimulationResult {
    /// Fraction of reader lookups served from the cache
    pub fn cache_hit_rate(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.reads as f64
        }
    }

    /// Reader lookups per second during the traffic phase
    pub fn reads_per_sec(&self) -> f64 {
        let secs = self.traffic_time.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.reads as f64 / secs
        }
    }
}

fn seed_store(store: &OrderStore, config: &SimulationConfig) -> Result<usize> {
    let mut generator = OrderGenerator::new(config.seed, config.items_per_order);
    let mut total_bytes = 0usize;
    for _ in 0..config.orders {
        let order = generator
            .order_box(store.next_rank())
            .context("failed to serialize order")?;
        total_bytes += order.data.len();
        store.insert(&order);
    }
    Ok(total_bytes / config.orders.max(1))
}

/// Pick a rank, favouring recent orders
fn pick_rank(rng: &mut StdRng, newest: u64, config: &SimulationConfig) -> u64 {
    let window = (config.recent_window as u64).min(newest + 1).max(1);
    if rng.gen_bool(config.recent_bias.clamp(0.0, 1.0)) {
        newest - rng.gen_range(0..window)
    } else {
        rng.gen_range(0..=newest)
    }
}

/// Run one simulation
pub fn run(config: SimulationConfig) -> Result<SimulationResult> {
    let cache: GenCache = GenCache::init(config.cache_config(), None)
        .context("invalid cache configuration")?;
    info!(
        capacity_mb = config.capacity_mb,
        buckets = cache.bucket_count(),
        chunk_size = cache.chunk_size(),
        "cache created"
    );

    let store = OrderStore::new();
    let avg_order_bytes = seed_store(&store, &config)?;
    info!(orders = store.len(), avg_order_bytes, "store seeded");

    let started = Instant::now();
    let warm_up = WarmUp::new(config.page_size)
        .with_policy(config.policy)
        .run(&cache, &mut store.pager())
        .context("warm-up failed")?;
    let warm_up_time = started.elapsed();

    let reads = AtomicU64::new(0);
    let cache_hits = AtomicU64::new(0);
    let not_found = AtomicU64::new(0);
    let ingested = AtomicU64::new(0);
    let lookups_before = store.lookups();

    let started = Instant::now();
    std::thread::scope(|scope| {
        for w in 0..config.writers {
            let (cache, store, ingested, config) = (&cache, &store, &ingested, &config);
            scope.spawn(move || {
                let seed = config.seed ^ (0x5752_4954 + w as u64);
                let mut generator = OrderGenerator::new(seed, config.items_per_order);
                for _ in 0..config.writes_per_thread {
                    let Ok(order) = generator.order_box(store.next_rank()) else {
                        continue;
                    };
                    // Write-through after the store accepts the order.
                    if store.insert(&order) {
                        cache.set(order.uid.as_bytes(), &order.data);
                        ingested.fetch_add(1, Ordering::Relaxed);
                    }
                }
                debug!(writer = w, "writer finished");
            });
        }

        for r in 0..config.threads {
            let (cache, store, config) = (&cache, &store, &config);
            let (reads, cache_hits, not_found) = (&reads, &cache_hits, &not_found);
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(r as u64 + 1));
                let mut buf = Vec::with_capacity(4096);
                let (mut local_reads, mut local_hits, mut local_missing) = (0u64, 0u64, 0u64);

                for _ in 0..config.reads_per_thread {
                    let Some(newest) = store.newest_rank() else {
                        break;
                    };
                    let Some(uid) = store.uid_at(pick_rank(&mut rng, newest, config)) else {
                        // Rank reserved by a writer but not inserted yet.
                        continue;
                    };

                    buf.clear();
                    local_reads += 1;
                    let mut loaded = false;
                    let found = cache
                        .get_or_load(&mut buf, uid.as_bytes(), || {
                            loaded = true;
                            Ok::<_, std::convert::Infallible>(store.order(&uid))
                        })
                        .unwrap_or(false);
                    match (found, loaded) {
                        (true, false) => local_hits += 1,
                        (false, _) => local_missing += 1,
                        (true, true) => {}
                    }
                }

                reads.fetch_add(local_reads, Ordering::Relaxed);
                cache_hits.fetch_add(local_hits, Ordering::Relaxed);
                not_found.fetch_add(local_missing, Ordering::Relaxed);
                debug!(reader = r, reads = local_reads, hits = local_hits, "reader finished");
            });
        }
    });
    let traffic_time = started.elapsed();

    Ok(SimulationResult {
        buckets: cache.bucket_count(),
        warm_up,
        warm_up_time,
        traffic_time,
        reads: reads.into_inner(),
        cache_hits: cache_hits.into_inner(),
        not_found: not_found.into_inner(),
        ingested: ingested.into_inner(),
        store_lookups: store.lookups() - lookups_before,
        stats: cache.stats(),
        avg_order_bytes,
        config,
    })
}
