//! Chunk Allocator
//!
//! Every byte stored by the cache lives in a [`Chunk`]: a fixed-size, heap
//! allocated buffer that is owned by exactly one bucket at a time. Buckets
//! never free chunks; they hand them back to a shared [`ChunkAllocator`] which
//! keeps them on a free list for the next bucket that needs one.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     HeapChunkAllocator                        │
//! │                                                               │
//! │   acquire() ──▶ free list non-empty? ──Yes──▶ pop             │
//! │                        │                                      │
//! │                        No                                     │
//! │                        ▼                                      │
//! │               allocate slab of N chunks                       │
//! │               keep N-1 on free list, return 1                 │
//! │                                                               │
//! │   release(chunk) ──▶ push on free list (contents untouched)   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Released chunks are not zeroed. Readers never scan chunk memory; they only
//! look at byte ranges recorded in a bucket index, so stale bytes are harmless.
//!
//! The free list has its own lock, independent of the bucket locks, so buckets
//! holding their own lock can acquire and release concurrently.
//!
//! Allocation failure is not reported as an error: running out of memory for
//! the configured capacity is a process-level condition and follows the
//! standard allocation-failure behavior.

use core::fmt;
use parking_lot::Mutex;
use tracing::{trace, warn};

/// Default number of chunks allocated together when the free list is empty.
pub const DEFAULT_SLAB_CHUNKS: usize = 16;

/// A fixed-size byte buffer used as the unit of storage and recycling.
///
/// A chunk carries no metadata of its own. Its length never changes after
/// allocation.
pub struct Chunk {
    data: Box<[u8]>,
}

impl Chunk {
    /// Allocates a zero-filled chunk of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Returns the size of the chunk in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-sized chunk.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the chunk contents.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the chunk contents mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk").field("len", &self.data.len()).finish()
    }
}

/// Source and sink of chunks shared by all buckets of a cache.
///
/// Implementations must be safe to call from several bucket locks at once.
/// The cache receives its allocator at construction, so tests can plug in an
/// instrumented or deterministic implementation.
pub trait ChunkAllocator: Send + Sync {
    /// Size in bytes of every chunk this allocator hands out.
    fn chunk_size(&self) -> usize;

    /// Returns a chunk of exactly [`chunk_size`](Self::chunk_size) bytes.
    ///
    /// The contents are unspecified.
    fn acquire(&self) -> Chunk;

    /// Takes a chunk back for later reuse.
    fn release(&self, chunk: Chunk);
}

/// Counters describing the allocator's lifetime activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Chunks ever allocated from the heap.
    pub allocated: usize,
    /// Chunks currently waiting on the free list.
    pub free: usize,
    /// Total `acquire` calls served.
    pub acquired: u64,
    /// Total `release` calls accepted.
    pub released: u64,
}

impl AllocatorStats {
    /// Chunks currently handed out to buckets.
    pub fn in_use(&self) -> usize {
        self.allocated.saturating_sub(self.free)
    }
}

struct FreeList {
    chunks: Vec<Chunk>,
    allocated: usize,
    acquired: u64,
    released: u64,
}

/// Heap-backed slab allocator with a shared free list.
///
/// When the free list runs dry, `slab_chunks` chunks are allocated together
/// (outside the lock) to amortize allocation cost under heavy insert load.
/// Memory is only returned to the system when the allocator itself is dropped.
pub struct HeapChunkAllocator {
    chunk_size: usize,
    slab_chunks: usize,
    free: Mutex<FreeList>,
}

impl HeapChunkAllocator {
    /// Creates an allocator for chunks of `chunk_size` bytes using the default
    /// slab size.
    pub fn new(chunk_size: usize) -> Self {
        Self::with_slab_chunks(chunk_size, DEFAULT_SLAB_CHUNKS)
    }

    /// Creates an allocator that allocates `slab_chunks` chunks at a time.
    ///
    /// A slab size of zero is treated as one.
    pub fn with_slab_chunks(chunk_size: usize, slab_chunks: usize) -> Self {
        Self {
            chunk_size,
            slab_chunks: slab_chunks.max(1),
            free: Mutex::new(FreeList {
                chunks: Vec::new(),
                allocated: 0,
                acquired: 0,
                released: 0,
            }),
        }
    }

    /// Returns the number of chunks allocated per slab.
    pub fn slab_chunks(&self) -> usize {
        self.slab_chunks
    }

    /// Returns a snapshot of the allocator counters.
    pub fn stats(&self) -> AllocatorStats {
        let free = self.free.lock();
        AllocatorStats {
            allocated: free.allocated,
            free: free.chunks.len(),
            acquired: free.acquired,
            released: free.released,
        }
    }
}

impl ChunkAllocator for HeapChunkAllocator {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn acquire(&self) -> Chunk {
        {
            let mut free = self.free.lock();
            free.acquired += 1;
            if let Some(chunk) = free.chunks.pop() {
                return chunk;
            }
        }

        let mut slab: Vec<Chunk> = (0..self.slab_chunks)
            .map(|_| Chunk::new(self.chunk_size))
            .collect();
        let chunk = slab.pop().unwrap_or_else(|| Chunk::new(self.chunk_size));
        trace!(
            chunk_size = self.chunk_size,
            chunks = self.slab_chunks,
            "allocated chunk slab"
        );

        let mut free = self.free.lock();
        free.allocated += self.slab_chunks;
        free.chunks.append(&mut slab);
        chunk
    }

    fn release(&self, chunk: Chunk) {
        if chunk.len() != self.chunk_size {
            warn!(
                expected = self.chunk_size,
                actual = chunk.len(),
                "dropping released chunk of foreign size"
            );
            return;
        }
        let mut free = self.free.lock();
        free.released += 1;
        if free.chunks.len() >= free.allocated {
            // Every chunk we allocated is already free, so this one is adopted.
            free.allocated += 1;
        }
        free.chunks.push(chunk);
    }
}

impl fmt::Debug for HeapChunkAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapChunkAllocator")
            .field("chunk_size", &self.chunk_size)
            .field("slab_chunks", &self.slab_chunks)
            .field("stats", &self.stats())
            .finish()
    }
}
