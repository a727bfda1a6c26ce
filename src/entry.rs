//! Entry layout and locators.
//!
//! An entry is written contiguously into a single chunk:
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────────┬─────────────────┐
//! │ key_len (BE) │ val_len (BE) │   key bytes   │   value bytes   │
//! │   2 bytes    │   2 bytes    │   key_len     │   val_len       │
//! └──────────────┴──────────────┴───────────────┴─────────────────┘
//! ```
//!
//! The verbatim key is stored so that a lookup can reject fingerprint
//! collisions by comparing it with the requested key.
//!
//! A [`Locator`] records where an entry lives inside a bucket's chunk ring,
//! packed into a single `u64`:
//!
//! ```text
//!  63            40 39                                           0
//! ┌────────────────┬──────────────────────────────────────────────┐
//! │ generation tag │ ring position = chunk_index * chunk_size     │
//! │    24 bits     │                 + offset         (40 bits)   │
//! └────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Chunk sizes are powers of two, so the chunk index and in-chunk offset are
//! recovered from the ring position by shift and mask.

/// Size in bytes of the length-prefix header in front of every entry.
pub const HEADER_SIZE: usize = 4;

/// Largest key or value length representable in the header.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Number of bits of a locator holding the ring position.
pub const POSITION_BITS: u32 = 40;

/// Number of bits of a locator holding the generation tag.
pub const GENERATION_BITS: u32 = 64 - POSITION_BITS;

const POSITION_MASK: u64 = (1 << POSITION_BITS) - 1;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Largest ring (in bytes) a single bucket may address.
pub const MAX_RING_BYTES: u64 = 1 << POSITION_BITS;

/// Length prefix of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    key_len: u16,
    value_len: u16,
}

impl EntryHeader {
    /// Builds the header for a key and value, or `None` when either does not
    /// fit the 16-bit length fields.
    pub fn for_entry(key: &[u8], value: &[u8]) -> Option<Self> {
        Some(Self {
            key_len: u16::try_from(key.len()).ok()?,
            value_len: u16::try_from(value.len()).ok()?,
        })
    }

    /// Length of the key in bytes.
    #[inline]
    pub fn key_len(&self) -> usize {
        usize::from(self.key_len)
    }

    /// Length of the value in bytes.
    #[inline]
    pub fn value_len(&self) -> usize {
        usize::from(self.value_len)
    }

    /// Total bytes the entry occupies in a chunk, header included.
    #[inline]
    pub fn entry_len(&self) -> usize {
        HEADER_SIZE + self.key_len() + self.value_len()
    }

    /// Serializes the header.
    #[inline]
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let k = self.key_len.to_be_bytes();
        let v = self.value_len.to_be_bytes();
        [k[0], k[1], v[0], v[1]]
    }

    /// Parses a header from the start of `bytes`.
    #[inline]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..HEADER_SIZE)?;
        Some(Self {
            key_len: u16::from_be_bytes([raw[0], raw[1]]),
            value_len: u16::from_be_bytes([raw[2], raw[3]]),
        })
    }
}

/// Packed `(generation, chunk index, offset)` position of an entry.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Locator(u64);

impl Locator {
    /// Packs a generation and a ring position.
    ///
    /// Only the low 24 bits of the generation are kept. The position must be
    /// below [`MAX_RING_BYTES`]; buckets are validated against that bound at
    /// construction.
    #[inline]
    pub fn new(generation: u64, position: u64) -> Self {
        debug_assert!(position <= POSITION_MASK);
        Self((generation_tag(generation) << POSITION_BITS) | (position & POSITION_MASK))
    }

    /// Packs a generation, chunk index and in-chunk offset.
    #[inline]
    pub fn from_parts(generation: u64, chunk_index: usize, offset: usize, chunk_shift: u32) -> Self {
        let position = ((chunk_index as u64) << chunk_shift) | offset as u64;
        Self::new(generation, position)
    }

    /// The 24-bit generation tag.
    #[inline]
    pub fn generation_tag(&self) -> u64 {
        self.0 >> POSITION_BITS
    }

    /// Byte position within the bucket's ring.
    #[inline]
    pub fn position(&self) -> u64 {
        self.0 & POSITION_MASK
    }

    /// Index of the chunk holding the entry.
    #[inline]
    pub fn chunk_index(&self, chunk_shift: u32) -> usize {
        (self.position() >> chunk_shift) as usize
    }

    /// Offset of the entry's header inside its chunk.
    #[inline]
    pub fn offset(&self, chunk_shift: u32) -> usize {
        (self.position() & ((1u64 << chunk_shift) - 1)) as usize
    }

    /// Raw packed value.
    #[inline]
    pub fn into_raw(self) -> u64 {
        self.0
    }
}

impl core::fmt::Debug for Locator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Locator")
            .field("generation_tag", &self.generation_tag())
            .field("position", &self.position())
            .finish()
    }
}

/// Truncates a bucket generation to the width stored in a locator.
#[inline]
pub fn generation_tag(generation: u64) -> u64 {
    generation & GENERATION_MASK
}
