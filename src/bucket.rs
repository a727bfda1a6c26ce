//! Bucket: one independently locked shard of the cache.
//!
//! A bucket owns a ring of chunk slots, a write cursor, a generation counter
//! and an index from key fingerprint to [`Locator`].
//!
//! ```text
//!            write cursor (chunk 1, offset 23)
//!                        │
//!   slot 0          slot 1▼         slot 2          slot 3
//! ┌──────────────┬──────────────┬──────────────┬──────────────┐
//! │ gen g        │ gen g   ░░░░ │ gen g-1      │ gen g-1      │
//! └──────────────┴──────────────┴──────────────┴──────────────┘
//!   live            live  free     live (not yet reclaimed)
//! ```
//!
//! Writes append at the cursor. When an entry does not fit in the rest of the
//! current chunk the cursor moves to the next slot; moving past the last slot
//! wraps to slot 0 and advances the generation. Entering a slot that still
//! holds a chunk from the previous lap releases it to the allocator and takes
//! a fresh one, which evicts every entry that lived there in O(1).
//!
//! Nothing is ever deleted per key. A locator is live when
//!
//! - it carries the current generation and points below the cursor, or
//! - it carries the previous generation and points into a slot beyond the
//!   cursor's chunk (that slot has not been reclaimed in this lap).
//!
//! Anything older is a miss. Stale locators stay in the index until a write
//! for the same fingerprint overwrites them or a lookup finds them stale.

use crate::chunk::{Chunk, ChunkAllocator};
use crate::entry::{generation_tag, EntryHeader, Locator, HEADER_SIZE};
use crate::metrics::Stats;
use std::sync::Arc;
use tracing::trace;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

/// Where the next entry of a given size will be written.
#[derive(Debug, Clone, Copy)]
struct WritePlan {
    chunk: usize,
    offset: usize,
    /// The cursor moves into a new slot.
    rollover: bool,
    /// The ring wraps to slot 0.
    wrap: bool,
    /// The target slot holds a chunk from an earlier lap.
    reclaim: bool,
}

/// One shard of the cache: chunk ring, index and eviction state.
///
/// A bucket is not synchronized itself; the cache wraps each bucket in its
/// own mutex and holds it for exactly one operation.
pub(crate) struct Bucket {
    chunks: Box<[Option<Chunk>]>,
    chunk_size: usize,
    chunk_shift: u32,
    write_chunk: usize,
    write_offset: usize,
    generation: u64,
    index: HashMap<u64, Locator>,
    allocator: Arc<dyn ChunkAllocator>,

    get_calls: u64,
    set_calls: u64,
    misses: u64,
    collisions: u64,
    evictions: u64,
    dropped: u64,
}

impl Bucket {
    /// Creates an empty bucket with `slots` chunk slots.
    ///
    /// No chunk is acquired until the first write.
    pub(crate) fn new(slots: usize, allocator: Arc<dyn ChunkAllocator>) -> Self {
        let chunk_size = allocator.chunk_size();
        debug_assert!(chunk_size.is_power_of_two());
        debug_assert!(slots > 0);
        Self {
            chunks: (0..slots).map(|_| None).collect(),
            chunk_size,
            chunk_shift: chunk_size.trailing_zeros(),
            write_chunk: 0,
            write_offset: 0,
            generation: 0,
            index: HashMap::new(),
            allocator,
            get_calls: 0,
            set_calls: 0,
            misses: 0,
            collisions: 0,
            evictions: 0,
            dropped: 0,
        }
    }

    /// Current generation.
    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of chunk slots in the ring.
    #[inline]
    pub(crate) fn slots(&self) -> usize {
        self.chunks.len()
    }

    /// Number of slots currently holding a chunk.
    pub(crate) fn chunks_held(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    /// Number of index entries, stale ones included.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Stores an entry, overwriting any locator for the same fingerprint.
    ///
    /// Entries that do not fit in a single chunk are dropped without touching
    /// the ring or the index.
    pub(crate) fn set(&mut self, key: &[u8], value: &[u8], fingerprint: u64) {
        self.set_calls += 1;
        let Some(header) = self.admit(key, value) else {
            return;
        };
        let plan = self.plan(header.entry_len());
        self.write(plan, header, key, value, fingerprint);
    }

    /// Stores an entry unless doing so would reclaim a chunk holding older
    /// data.
    ///
    /// Returns `true`, and writes nothing, when the write would evict. Returns
    /// `false` when the entry was stored or dropped as oversized.
    pub(crate) fn stop_set(&mut self, key: &[u8], value: &[u8], fingerprint: u64) -> bool {
        self.set_calls += 1;
        let Some(header) = self.admit(key, value) else {
            return false;
        };
        let plan = self.plan(header.entry_len());
        if plan.reclaim {
            return true;
        }
        self.write(plan, header, key, value, fingerprint);
        false
    }

    /// Looks up `key` and passes its value to `f` while the bucket is borrowed.
    ///
    /// Returns `None` on any miss: absent, stale generation, or a fingerprint
    /// shared with a different key.
    pub(crate) fn get_with<R>(
        &mut self,
        key: &[u8],
        fingerprint: u64,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Option<R> {
        self.get_calls += 1;

        let Some(&locator) = self.index.get(&fingerprint) else {
            self.misses += 1;
            return None;
        };
        if !self.is_live(locator) {
            self.index.remove(&fingerprint);
            self.misses += 1;
            return None;
        }

        let chunk_index = locator.chunk_index(self.chunk_shift);
        let offset = locator.offset(self.chunk_shift);
        let Some(value) = self.read(chunk_index, offset, key) else {
            self.misses += 1;
            return None;
        };
        Some(f(value))
    }

    /// Drops the index, returns every chunk to the allocator and rewinds the
    /// cursor and generation. Counters are kept.
    pub(crate) fn reset(&mut self) {
        self.index.clear();
        for slot in self.chunks.iter_mut() {
            if let Some(chunk) = slot.take() {
                self.allocator.release(chunk);
            }
        }
        self.write_chunk = 0;
        self.write_offset = 0;
        self.generation = 0;
    }

    /// Adds this bucket's counters and sizes to `stats`.
    pub(crate) fn update_stats(&self, stats: &mut Stats) {
        stats.get_calls += self.get_calls;
        stats.set_calls += self.set_calls;
        stats.misses += self.misses;
        stats.collisions += self.collisions;
        stats.evictions += self.evictions;
        stats.dropped += self.dropped;
        stats.entries_count += self.index.len() as u64;
        stats.bytes_size += (self.chunks_held() * self.chunk_size) as u64;
        stats.max_bytes_size += (self.slots() * self.chunk_size) as u64;
        stats.generations += self.generation;
    }

    /// Builds the header if the entry fits in one chunk.
    fn admit(&mut self, key: &[u8], value: &[u8]) -> Option<EntryHeader> {
        match EntryHeader::for_entry(key, value) {
            Some(header) if header.entry_len() <= self.chunk_size => Some(header),
            _ => {
                self.dropped += 1;
                None
            }
        }
    }

    fn plan(&self, entry_len: usize) -> WritePlan {
        let current_missing = self.chunks[self.write_chunk].is_none();
        if current_missing || self.write_offset + entry_len <= self.chunk_size {
            return WritePlan {
                chunk: self.write_chunk,
                offset: self.write_offset,
                rollover: false,
                wrap: false,
                reclaim: false,
            };
        }

        let next = self.write_chunk + 1;
        let wrap = next == self.chunks.len();
        let chunk = if wrap { 0 } else { next };
        WritePlan {
            chunk,
            offset: 0,
            rollover: true,
            wrap,
            reclaim: self.chunks[chunk].is_some(),
        }
    }

    fn write(
        &mut self,
        plan: WritePlan,
        header: EntryHeader,
        key: &[u8],
        value: &[u8],
        fingerprint: u64,
    ) {
        if plan.wrap {
            self.generation += 1;
            trace!(generation = self.generation, "bucket ring wrapped");
        }
        if plan.reclaim {
            if let Some(old) = self.chunks[plan.chunk].take() {
                self.allocator.release(old);
                self.evictions += 1;
                trace!(
                    chunk = plan.chunk,
                    generation = self.generation,
                    "reclaimed chunk"
                );
            }
        }

        let allocator = &self.allocator;
        let chunk = self.chunks[plan.chunk].get_or_insert_with(|| allocator.acquire());

        let start = plan.offset;
        let key_start = start + HEADER_SIZE;
        let value_start = key_start + key.len();
        let end = value_start + value.len();
        let buf = chunk.as_mut_slice();
        buf[start..key_start].copy_from_slice(&header.to_bytes());
        buf[key_start..value_start].copy_from_slice(key);
        buf[value_start..end].copy_from_slice(value);

        debug_assert!(plan.rollover || plan.chunk == self.write_chunk);
        self.write_chunk = plan.chunk;
        self.write_offset = end;

        let locator =
            Locator::from_parts(self.generation, plan.chunk, plan.offset, self.chunk_shift);
        self.index.insert(fingerprint, locator);
    }

    fn is_live(&self, locator: Locator) -> bool {
        let chunk = locator.chunk_index(self.chunk_shift);
        let offset = locator.offset(self.chunk_shift);
        let tag = locator.generation_tag();

        if tag == generation_tag(self.generation) {
            chunk < self.write_chunk || (chunk == self.write_chunk && offset < self.write_offset)
        } else if self.generation > 0 && tag == generation_tag(self.generation - 1) {
            chunk > self.write_chunk && chunk < self.chunks.len()
        } else {
            false
        }
    }

    /// Bounds-checks the entry at `offset` and verifies its stored key.
    fn read(&mut self, chunk_index: usize, offset: usize, key: &[u8]) -> Option<&[u8]> {
        let chunk = self.chunks.get(chunk_index)?.as_ref()?;
        let buf = chunk.as_slice();
        let header = EntryHeader::parse(buf.get(offset..)?)?;

        let key_start = offset + HEADER_SIZE;
        let value_start = key_start + header.key_len();
        let end = value_start + header.value_len();
        if end > buf.len() {
            return None;
        }
        if &buf[key_start..value_start] != key {
            self.collisions += 1;
            return None;
        }
        Some(&buf[value_start..end])
    }
}

impl core::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bucket")
            .field("slots", &self.chunks.len())
            .field("chunk_size", &self.chunk_size)
            .field("write_chunk", &self.write_chunk)
            .field("write_offset", &self.write_offset)
            .field("generation", &self.generation)
            .field("entries", &self.index.len())
            .finish()
    }
}
