//! Cache warm-up from a ranked backing store.
//!
//! At startup the cache is empty. [`WarmUp`] streams existing records from a
//! [`RecordSource`] newest first and feeds them through
//! [`GenCache::stop_set`](crate::GenCache::stop_set). As soon as a bucket
//! reports that the next write would reclaim a chunk, that bucket is full of
//! records newer than anything still to come, and loading into it stops.
//!
//! ```text
//!  source (rank desc)        WarmUp                     GenCache
//! ┌────────────────┐   page  ┌──────────────┐  stop_set ┌───────────┐
//! │ rank 900..801  │────────▶│ route record │──────────▶│ bucket k  │
//! │ rank 800..701  │         │ skip closed  │◀──────────│ evict? ── │
//! │ ...            │         │   buckets    │   bool    │           │
//! └────────────────┘         └──────────────┘           └───────────┘
//! ```
//!
//! Pages are fetched iteratively; each request asks for records ranked
//! strictly below the last rank seen. Records sharing a rank are loaded
//! together when they arrive in the same page; tied records cut off by a
//! page boundary are not requested again.
//!
//! # Halt policy
//!
//! [`HaltPolicy::PerBucket`] (the default) closes only the bucket that
//! reported eviction and keeps loading the others until all are closed or the
//! source is exhausted. [`HaltPolicy::Abort`] ends the whole pass at the first
//! report, which leaves other buckets partly empty but reads fewer pages.

use crate::cache::GenCache;
use core::hash::BuildHasher;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// A record as stored by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRecord {
    /// Record identifier, used as the cache key.
    pub key: Vec<u8>,
    /// Serialized record, stored opaquely.
    pub value: Vec<u8>,
    /// Monotonic rank; larger is newer.
    pub rank: u64,
}

impl RankedRecord {
    /// Creates a record.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, rank: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            rank,
        }
    }
}

/// Paged access to the backing store, newest records first.
pub trait RecordSource {
    /// Error returned by the store.
    type Error;

    /// Returns up to `limit` records ordered by rank descending, all ranked
    /// strictly below `before` when it is set.
    fn fetch_page(
        &mut self,
        before: Option<u64>,
        limit: usize,
    ) -> Result<Vec<RankedRecord>, Self::Error>;
}

/// What to do once a bucket reports that it would evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HaltPolicy {
    /// Stop loading into the reporting bucket only.
    #[default]
    PerBucket,
    /// Stop the whole warm-up.
    Abort,
}

/// Outcome of a warm-up pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmUpReport {
    /// Records handed to the cache (stored or dropped as oversized).
    pub loaded: u64,
    /// Records skipped because their bucket was already closed.
    pub skipped: u64,
    /// Pages fetched from the source.
    pub pages: u64,
    /// Buckets closed by an eviction report.
    pub halted_buckets: usize,
    /// The pass ended because of an eviction report rather than because the
    /// source ran out.
    pub halted: bool,
}

/// Warm-up failure.
#[derive(Debug, Error)]
pub enum WarmUpError<E>
where
    E: std::error::Error + 'static,
{
    /// The record source returned an error.
    #[error("record source failed after {loaded} records")]
    Source {
        /// Records loaded before the failure.
        loaded: u64,
        /// Error returned by the source.
        #[source]
        source: E,
    },
}

/// Paging warm-up driver.
#[derive(Debug, Clone, Copy)]
pub struct WarmUp {
    page_size: usize,
    policy: HaltPolicy,
}

impl Default for WarmUp {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl WarmUp {
    /// Creates a driver requesting `page_size` records per page.
    ///
    /// A page size of zero is treated as one.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            policy: HaltPolicy::default(),
        }
    }

    /// Sets the halt policy.
    #[must_use]
    pub fn with_policy(mut self, policy: HaltPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the halt policy.
    pub fn policy(&self) -> HaltPolicy {
        self.policy
    }

    /// Loads records from `source` into `cache` until the source is exhausted
    /// or the halt policy ends the pass.
    ///
    /// # Errors
    ///
    /// Returns [`WarmUpError::Source`] when the source fails; records loaded
    /// before the failure stay in the cache.
    pub fn run<S, R>(
        &self,
        cache: &GenCache<S>,
        source: &mut R,
    ) -> Result<WarmUpReport, WarmUpError<R::Error>>
    where
        S: BuildHasher,
        R: RecordSource,
        R::Error: std::error::Error + 'static,
    {
        let started = Instant::now();
        let mut report = WarmUpReport::default();
        let mut closed = vec![false; cache.bucket_count()];
        let mut cursor: Option<u64> = None;

        'pages: loop {
            let page = source
                .fetch_page(cursor, self.page_size)
                .map_err(|source| WarmUpError::Source {
                    loaded: report.loaded,
                    source,
                })?;
            report.pages += 1;
            let page_len = page.len();
            let bound = cursor;

            for record in page {
                // Ties within a page are fine; anything at or above the
                // requested bound, or rising within the page, is not.
                if bound.is_some_and(|b| record.rank >= b)
                    || cursor.is_some_and(|c| record.rank > c)
                {
                    debug!(rank = record.rank, "source returned out-of-order rank");
                    break 'pages;
                }
                cursor = Some(record.rank);

                let bucket = cache.bucket_index(&record.key);
                if closed[bucket] {
                    report.skipped += 1;
                    continue;
                }
                if cache.stop_set(&record.key, &record.value) {
                    closed[bucket] = true;
                    report.halted_buckets += 1;
                    debug!(bucket, rank = record.rank, "bucket full, closing");
                    let all_closed = report.halted_buckets == closed.len();
                    if self.policy == HaltPolicy::Abort || all_closed {
                        report.halted = true;
                        break 'pages;
                    }
                    continue;
                }
                report.loaded += 1;
            }

            if page_len < self.page_size {
                break;
            }
        }

        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            pages = report.pages,
            halted_buckets = report.halted_buckets,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache warm-up finished"
        );
        Ok(report)
    }
}
