// In-memory backing store standing in for the orders table
//
// Orders are kept by uid and by rank. Lookups through the store are counted
// so the simulator can report how much traffic the cache absorbed.

use crate::orders::OrderBox;
use gencache::{RankedRecord, RecordSource};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Tables {
    by_uid: HashMap<String, u64>,
    by_rank: BTreeMap<u64, (String, Vec<u8>)>,
}

/// Thread-safe ranked order store
#[derive(Default)]
pub struct OrderStore {
    tables: RwLock<Tables>,
    next_rank: AtomicU64,
    lookups: AtomicU64,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next insertion rank
    pub fn next_rank(&self) -> u64 {
        self.next_rank.fetch_add(1, Ordering::Relaxed)
    }

    /// Highest rank handed out so far, if any
    pub fn newest_rank(&self) -> Option<u64> {
        self.next_rank.load(Ordering::Relaxed).checked_sub(1)
    }

    /// Insert an order; returns false when the uid already exists
    pub fn insert(&self, order: &OrderBox) -> bool {
        let mut tables = self.tables.write();
        if tables.by_uid.contains_key(&order.uid) {
            return false;
        }
        tables.by_uid.insert(order.uid.clone(), order.rank);
        tables
            .by_rank
            .insert(order.rank, (order.uid.clone(), order.data.clone()));
        true
    }

    /// Fetch an order document by uid
    pub fn order(&self, uid: &str) -> Option<Vec<u8>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let tables = self.tables.read();
        let rank = tables.by_uid.get(uid)?;
        tables.by_rank.get(rank).map(|(_, data)| data.clone())
    }

    /// Uid of the order stored at `rank`
    pub fn uid_at(&self, rank: u64) -> Option<String> {
        self.tables
            .read()
            .by_rank
            .get(&rank)
            .map(|(uid, _)| uid.clone())
    }

    /// Number of lookups that reached the store
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_rank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pager over the store, newest orders first
    pub fn pager(&self) -> StorePager<'_> {
        StorePager { store: self }
    }
}

/// Pages through an [`OrderStore`] by descending rank
pub struct StorePager<'a> {
    store: &'a OrderStore,
}

impl RecordSource for StorePager<'_> {
    type Error = Infallible;

    fn fetch_page(
        &mut self,
        before: Option<u64>,
        limit: usize,
    ) -> Result<Vec<RankedRecord>, Self::Error> {
        let tables = self.store.tables.read();
        let upper = before.unwrap_or(u64::MAX);
        Ok(tables
            .by_rank
            .range(..upper)
            .rev()
            .take(limit)
            .map(|(&rank, (uid, data))| RankedRecord::new(uid.as_bytes(), data.clone(), rank))
            .collect())
    }
}
