//! On-disk format structures and the shared error taxonomy.
//!
//! A constant database is a single immutable file with three regions:
//!
//! # On-disk layout
//!
//! ```text
//! [HEADER: 256 × (table_position_le, slot_count_le)]          2048 bytes
//! [RECORD: key_len_le | value_len_le | key | value] × N       no padding
//! [BUCKET TABLE 0: (hash_le, record_position_le) × slots₀]
//! [BUCKET TABLE 1: ...]
//! ...
//! [BUCKET TABLE 255: ...]
//! ```
//!
//! - **Header** — one [`TablePointer`] per bucket, fixed 2048 bytes. The
//!   position field of slot 0 doubles as the end-of-data offset (`eod`),
//!   because bucket 0's table is written first, directly after the last
//!   record. There is no other end marker.
//! - **Records** — back-to-back [`RecordHeader`]-prefixed key/value pairs in
//!   insertion order, starting at offset 2048.
//! - **Bucket tables** — 256 open-addressed hash tables of [`IndexSlot`]
//!   pairs, in bucket order. A table has twice as many slots as entries,
//!   bounding expected probe length at a 50% load factor.
//!
//! All integers are little-endian `u32`. Every structure here implements
//! [`Encode`]/[`Decode`] from [`crate::encoding`] so the byte layout lives
//! in exactly one place.


use std::io;

use thiserror::Error;

use crate::encoding::{Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Number of bucket tables, and of [`TablePointer`] slots in the header.
pub const NUM_BUCKETS: usize = 256;

/// Size of the fixed header region in bytes (256 × 8).
pub const HEADER_SIZE: u32 = 2048;

/// Encoded size of one [`TablePointer`].
pub const TABLE_POINTER_SIZE: u32 = 8;

/// Encoded size of one [`IndexSlot`].
pub const INDEX_SLOT_SIZE: u32 = 8;

/// Encoded size of one [`RecordHeader`].
pub const RECORD_HEADER_SIZE: u32 = 8;

/// Maximum length accepted for a single key or value.
///
/// Leaves headroom against `u32` overflow when record offsets and lengths
/// are combined during arithmetic (u32::MAX / 10, the reference bound).
pub const MAX_FIELD_LEN: u32 = 429_496_720;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by constant-database operations (build, lookup, iterate).
#[derive(Debug, Error)]
pub enum CdbError {
    /// Underlying I/O error from the byte source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A key or value exceeds the configured maximum length.
    #[error("{what} length {len} exceeds maximum {max}")]
    Capacity {
        /// Which field overflowed ("key", "value", or "file").
        what: &'static str,
        /// The offending length.
        len: u64,
        /// The configured maximum.
        max: u64,
    },

    /// Data read from a presumed-valid file violates a structural invariant.
    ///
    /// Always distinct from "not found", which is a normal lookup outcome.
    #[error("corrupt database: {0}")]
    Corrupt(String),

    /// An accessor was called outside its valid lookup state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl CdbError {
    /// Maps a read error to the format taxonomy: a short read means the
    /// file ended where a full field was expected, which is corruption,
    /// not an I/O failure.
    pub(crate) fn from_read(err: io::Error, context: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            CdbError::Corrupt(format!("truncated file: {context}"))
        } else {
            CdbError::Io(err)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Format structures
// ------------------------------------------------------------------------------------------------

/// One header slot: where bucket `i`'s hash table lives and how big it is.
///
/// An empty bucket is encoded as `slot_count == 0`; its position is still
/// the running offset, so slot 0's position always equals `eod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TablePointer {
    /// Absolute byte offset of the bucket's table.
    pub position: u32,

    /// Number of [`IndexSlot`] entries in the table. Always even.
    pub slot_count: u32,
}

/// One cell of a bucket's open-addressed hash table.
///
/// A slot with both fields zero is empty and terminates a probe chain.
/// Record position 0 can never be valid (records start at 2048), so the
/// encoding is unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSlot {
    /// Full 32-bit hash of the key stored at `record_position`.
    pub hash: u32,

    /// Absolute byte offset of the record, or 0 if the slot is empty.
    pub record_position: u32,
}

impl IndexSlot {
    /// Returns `true` if this slot terminates a probe chain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hash == 0 && self.record_position == 0
    }
}

/// Length prefix of one record: `(key_len, value_len)`, followed on disk by
/// exactly that many key bytes and value bytes, with no padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Key length in bytes.
    pub key_len: u32,

    /// Value length in bytes.
    pub value_len: u32,
}

// ------------------------------------------------------------------------------------------------
// Encoding implementations
// ------------------------------------------------------------------------------------------------

impl Encode for TablePointer {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.position.encode_to(buf);
        self.slot_count.encode_to(buf);
    }
}

impl Decode for TablePointer {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (position, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (slot_count, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                position,
                slot_count,
            },
            off,
        ))
    }
}

impl Encode for IndexSlot {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.hash.encode_to(buf);
        self.record_position.encode_to(buf);
    }
}

impl Decode for IndexSlot {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (hash, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (record_position, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                hash,
                record_position,
            },
            off,
        ))
    }
}

impl Encode for RecordHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.key_len.encode_to(buf);
        self.value_len.encode_to(buf);
    }
}

impl Decode for RecordHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (key_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (value_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { key_len, value_len }, off))
    }
}
