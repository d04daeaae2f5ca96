//! Database builder — produces a complete constant-database file image
//! from a stream of key/value pairs in a single pass.
//!
//! ## Design Overview
//!
//! Building happens in two phases. While records arrive via
//! [`CdbWriter::add`], they are appended to the sink directly after the
//! 2048-byte header placeholder, and a small in-memory append log records
//! `(hash, position, bucket)` for each. Nothing else is buffered: a build
//! holds 12 bytes of state per record regardless of key and value sizes.
//!
//! [`CdbWriter::finalize`] then turns the append log into the index region:
//! each of the 256 buckets gets an open-addressed table with **twice** as
//! many slots as entries, entries are partitioned per bucket **preserving
//! insertion order**, placed by linear probing from `(hash >> 8) % slots`,
//! and the tables are appended in bucket order. Finally the writer seeks
//! back to offset 0 and overwrites the placeholder with the real header.
//!
//! Insertion order within a bucket is load-bearing: lookup returns the
//! first matching slot in probe order, so placement order defines which
//! value a repeated key yields first.
//!
//! # Failure
//!
//! There is no partial finalize. If any write or seek fails, the sink is
//! left in an unspecified state and must be discarded; callers that need
//! atomic publication build into a temporary path and rename on success
//! (see [`Cdb::build`](crate::Cdb::build)).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::io::{Seek, SeekFrom, Write};

use tracing::debug;

use crate::encoding::{Encode, encode_to_vec};
use crate::format::{
    CdbError, HEADER_SIZE, INDEX_SLOT_SIZE, IndexSlot, MAX_FIELD_LEN, NUM_BUCKETS,
    RECORD_HEADER_SIZE, RecordHeader, TablePointer,
};
use crate::hash::{bucket_of, cdb_hash, probe_start};

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Build-time limits for a [`CdbWriter`].
///
/// All fields have sensible defaults via [`CdbConfig::default()`]. The
/// configuration is validated when passed to [`CdbWriter::new`].
#[derive(Debug, Clone, Copy)]
pub struct CdbConfig {
    /// Maximum accepted key length in bytes.
    ///
    /// Default: [`MAX_FIELD_LEN`] (the format's hard ceiling, which leaves
    /// headroom against `u32` offset arithmetic). Must be in
    /// `1..=MAX_FIELD_LEN`.
    pub max_key_len: u32,

    /// Maximum accepted value length in bytes.
    ///
    /// Default: [`MAX_FIELD_LEN`]. Must be in `1..=MAX_FIELD_LEN`.
    pub max_value_len: u32,
}

impl Default for CdbConfig {
    fn default() -> Self {
        Self {
            max_key_len: MAX_FIELD_LEN,
            max_value_len: MAX_FIELD_LEN,
        }
    }
}

impl CdbConfig {
    /// Validates all configuration parameters.
    pub(crate) fn validate(&self) -> Result<(), CdbError> {
        if self.max_key_len == 0 || self.max_key_len > MAX_FIELD_LEN {
            return Err(CdbError::InvalidConfig(format!(
                "max_key_len must be in 1..={MAX_FIELD_LEN}"
            )));
        }
        if self.max_value_len == 0 || self.max_value_len > MAX_FIELD_LEN {
            return Err(CdbError::InvalidConfig(format!(
                "max_value_len must be in 1..={MAX_FIELD_LEN}"
            )));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Append log entry
// ------------------------------------------------------------------------------------------------

/// One accumulated record: everything finalize needs to index it.
#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    /// Full hash of the record's key.
    hash: u32,

    /// Absolute byte offset of the record header in the sink.
    position: u32,
}

// ------------------------------------------------------------------------------------------------
// CdbWriter
// ------------------------------------------------------------------------------------------------

/// Single-use builder bound to a seekable output sink.
///
/// Construct with [`CdbWriter::new`], feed records with [`CdbWriter::add`],
/// and consume with [`CdbWriter::finalize`] — the only point at which the
/// header and index region are computed and written.
///
/// A `CdbWriter` is not safe for concurrent use; it owns its sink
/// exclusively for the duration of the build.
#[derive(Debug)]
pub struct CdbWriter<W: Write + Seek> {
    sink: W,
    config: CdbConfig,

    /// Next record offset; starts directly after the header.
    cursor: u32,

    /// Append log, in insertion order across all buckets.
    entries: Vec<PendingEntry>,

    /// Records accumulated per bucket, used to size the tables.
    bucket_counts: [u32; NUM_BUCKETS],
}

impl<W: Write + Seek> CdbWriter<W> {
    /// Binds a builder to `sink` and reserves the header region.
    ///
    /// Writes 2048 zero bytes as a placeholder; the real header is written
    /// by [`finalize`](Self::finalize) via a seek back to offset 0.
    ///
    /// # Errors
    ///
    /// [`CdbError::InvalidConfig`] for out-of-range limits, or
    /// [`CdbError::Io`] if the placeholder write fails.
    pub fn new(mut sink: W, config: CdbConfig) -> Result<Self, CdbError> {
        config.validate()?;
        sink.write_all(&[0u8; HEADER_SIZE as usize])?;
        Ok(Self {
            sink,
            config,
            cursor: HEADER_SIZE,
            entries: Vec::new(),
            bucket_counts: [0; NUM_BUCKETS],
        })
    }

    /// Number of records accumulated so far.
    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    /// Appends one record and logs it for indexing at finalize.
    ///
    /// Repeated keys are allowed; lookups will return their values in
    /// insertion order.
    ///
    /// # Errors
    ///
    /// [`CdbError::Capacity`] if `key` or `value` exceeds the configured
    /// maximum, or if the record would push the file past the 32-bit
    /// offset space. [`CdbError::Io`] if the append fails.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), CdbError> {
        let key_len = field_len("key", key, self.config.max_key_len)?;
        let value_len = field_len("value", value, self.config.max_value_len)?;

        // The record plus its eventual index slot must stay addressable
        // with u32 offsets. The index region adds 16 bytes per record
        // (two slots at 50% load), accounted for here so finalize cannot
        // fail on offset overflow.
        let record_size = u64::from(RECORD_HEADER_SIZE) + u64::from(key_len) + u64::from(value_len);
        let projected = u64::from(self.cursor)
            + record_size
            + (self.entries.len() as u64 + 1) * 2 * u64::from(INDEX_SLOT_SIZE);
        if projected > u64::from(u32::MAX) {
            return Err(CdbError::Capacity {
                what: "file",
                len: projected,
                max: u64::from(u32::MAX),
            });
        }

        let header = RecordHeader { key_len, value_len };
        self.sink.write_all(&encode_to_vec(&header))?;
        self.sink.write_all(key)?;
        self.sink.write_all(value)?;

        let hash = cdb_hash(key);
        self.entries.push(PendingEntry {
            hash,
            position: self.cursor,
        });
        self.bucket_counts[bucket_of(hash) as usize] += 1;
        self.cursor += record_size as u32;
        Ok(())
    }

    /// Computes and writes the index region and header, consuming the
    /// builder. Returns the total file length in bytes.
    ///
    /// A database built with zero records is valid: 2048 bytes, every
    /// table pointer `(2048, 0)`.
    ///
    /// # Errors
    ///
    /// [`CdbError::Io`] if any write or seek fails; the sink is then
    /// unusable.
    pub fn finalize(mut self) -> Result<u32, CdbError> {
        let eod = self.cursor;

        // Header slot i: table position as a running sum of table sizes
        // starting at eod, slot count fixed at twice the entry count.
        let mut header = [TablePointer::default(); NUM_BUCKETS];
        let mut position = eod;
        for (bucket, pointer) in header.iter_mut().enumerate() {
            let slot_count = self.bucket_counts[bucket] * 2;
            *pointer = TablePointer {
                position,
                slot_count,
            };
            position += slot_count * INDEX_SLOT_SIZE;
        }
        let file_size = position;

        // Stable partition of the append log by bucket. Relative order of
        // entries within a bucket must match insertion order exactly.
        let mut by_bucket: Vec<Vec<PendingEntry>> = vec![Vec::new(); NUM_BUCKETS];
        for entry in &self.entries {
            by_bucket[bucket_of(entry.hash) as usize].push(*entry);
        }

        // Populate and append each bucket table in bucket-index order.
        let mut table_buf = Vec::new();
        for (bucket, entries) in by_bucket.iter().enumerate() {
            let slot_count = header[bucket].slot_count;
            if slot_count == 0 {
                continue;
            }

            let mut table = vec![IndexSlot::default(); slot_count as usize];
            for entry in entries {
                let mut slot = probe_start(entry.hash, slot_count) as usize;
                // Load factor is 50%, so an empty slot exists before the
                // scan wraps all the way around.
                while !table[slot].is_empty() {
                    slot = (slot + 1) % slot_count as usize;
                }
                table[slot] = IndexSlot {
                    hash: entry.hash,
                    record_position: entry.position,
                };
            }

            table_buf.clear();
            for slot in &table {
                slot.encode_to(&mut table_buf);
            }
            self.sink.write_all(&table_buf)?;
        }

        // Overwrite the placeholder with the finished header.
        let mut header_buf = Vec::with_capacity(HEADER_SIZE as usize);
        for pointer in &header {
            pointer.encode_to(&mut header_buf);
        }
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.write_all(&header_buf)?;
        self.sink.flush()?;

        debug!(
            records = self.entries.len(),
            eod,
            file_size,
            "database finalized"
        );
        Ok(file_size)
    }
}

/// Checks one field length against its configured maximum.
fn field_len(what: &'static str, bytes: &[u8], max: u32) -> Result<u32, CdbError> {
    match u32::try_from(bytes.len()) {
        Ok(len) if len <= max => Ok(len),
        _ => Err(CdbError::Capacity {
            what,
            len: bytes.len() as u64,
            max: u64::from(max),
        }),
    }
}
