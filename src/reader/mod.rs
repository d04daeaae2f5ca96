//! Lookup engine — point queries against a finished database file.
//!
//! ## Design Overview
//!
//! A record is located without reconstructing any in-memory index. The
//! key's hash selects one of 256 bucket tables via the fixed 2048-byte
//! header; the hash's upper bits select a starting slot; probing advances
//! one slot at a time (wrapping) until a slot carrying the full hash points
//! at a record whose key matches byte-for-byte, or an empty slot ends the
//! chain.
//!
//! Repeated keys are first-class: [`CdbReader::find_next`] resumes probing
//! from the slot after the previous hit, so successive calls walk through
//! every stored value for a key in insertion order.
//!
//! # Lookup state machine
//!
//! ```text
//! Idle ──find_next──▶ Searching ──▶ Found ──find_next──▶ Found | Exhausted
//!   ▲                     │
//!   └─────find_start──────┴──▶ Exhausted
//! ```
//!
//! Position/length accessors are valid only in `Found`; calling them in
//! any other state is a programmer error reported as
//! [`CdbError::InvalidState`].
//!
//! # Concurrency model
//!
//! The file is immutable, so any number of readers may run against the
//! same source from different threads; each reader's cursor state is
//! private. A single `CdbReader` is not meant to be shared mid-search.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod iterator;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use tracing::trace;

use crate::encoding::decode_from_slice;
use crate::format::{
    CdbError, INDEX_SLOT_SIZE, IndexSlot, RECORD_HEADER_SIZE, RecordHeader, TABLE_POINTER_SIZE,
    TablePointer,
};
use crate::hash::{bucket_of, cdb_hash, probe_start};
use crate::source::ReadAt;

// ------------------------------------------------------------------------------------------------
// Lookup state
// ------------------------------------------------------------------------------------------------

/// Probe cursor for one in-progress search.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Full hash of the query key.
    hash: u32,

    /// Header slot for the key's bucket.
    table: TablePointer,

    /// Slot index to probe next.
    next_slot: u32,

    /// Probes consumed so far; capped at `table.slot_count`.
    probed: u32,
}

/// Byte positions of the most recent hit.
#[derive(Debug, Clone, Copy)]
struct Hit {
    key_position: u32,
    key_len: u32,
    value_position: u32,
    value_len: u32,
}

/// Searching is transient — a `find_next` call always runs its probe loop
/// to completion, so between calls the reader is idle, sitting on a hit,
/// or exhausted.
#[derive(Debug, Clone, Copy)]
enum LookupState {
    /// No search in progress.
    Idle,

    /// Last `find_next` returned a match; accessors are valid.
    Found(Cursor, Hit),

    /// Probe chain ended; further `find_next` calls return "not found".
    Exhausted,
}

// ------------------------------------------------------------------------------------------------
// CdbReader
// ------------------------------------------------------------------------------------------------

/// Point-lookup engine over any [`ReadAt`] byte source.
///
/// The reader owns no buffers and reconstructs nothing at open time; each
/// lookup costs one header-slot read plus an expected O(1) number of slot
/// probes.
pub struct CdbReader<S: ReadAt> {
    source: S,
    state: LookupState,
}

impl<S: ReadAt> CdbReader<S> {
    /// Binds a reader to a byte source containing a finished database.
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: LookupState::Idle,
        }
    }

    /// Consumes the reader, returning the underlying source.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Resets the lookup cursor, abandoning any search in progress.
    pub fn find_start(&mut self) {
        self.state = LookupState::Idle;
    }

    /// Advances to the next record matching `key`.
    ///
    /// The first call after [`find_start`](Self::find_start) begins a fresh
    /// probe; subsequent calls **with the same key** resume after the
    /// previous hit, yielding repeated-key values in insertion order.
    /// Returns `Ok(false)` once the probe chain is exhausted — a normal
    /// outcome, never an error.
    ///
    /// # Errors
    ///
    /// [`CdbError::Corrupt`] if the file ends where a field was expected,
    /// [`CdbError::Io`] for any other read failure.
    pub fn find_next(&mut self, key: &[u8]) -> Result<bool, CdbError> {
        let mut cursor = match self.state {
            LookupState::Exhausted => return Ok(false),
            LookupState::Found(cursor, _) => cursor,
            LookupState::Idle => {
                let hash = cdb_hash(key);
                let table = self.read_table_pointer(bucket_of(hash))?;
                trace!(
                    hash,
                    bucket = bucket_of(hash),
                    slots = table.slot_count,
                    "lookup start"
                );
                if table.slot_count == 0 {
                    self.state = LookupState::Exhausted;
                    return Ok(false);
                }
                Cursor {
                    hash,
                    table,
                    next_slot: probe_start(hash, table.slot_count),
                    probed: 0,
                }
            }
        };

        // Probe until a match, an empty slot, or (corrupt file guard) a
        // full lap around the table.
        while cursor.probed < cursor.table.slot_count {
            let offset = cursor.table.position as u64
                + u64::from(cursor.next_slot) * u64::from(INDEX_SLOT_SIZE);
            let slot: IndexSlot = self.read_struct(offset, "index slot")?;

            cursor.probed += 1;
            cursor.next_slot = (cursor.next_slot + 1) % cursor.table.slot_count;

            if slot.is_empty() {
                self.state = LookupState::Exhausted;
                return Ok(false);
            }

            if slot.hash == cursor.hash {
                let header: RecordHeader =
                    self.read_struct(u64::from(slot.record_position), "record header")?;

                // All positions in the format are u32. A record whose
                // claimed extent leaves that space is corrupt, and the
                // check keeps the position arithmetic below from wrapping.
                let key_position =
                    u64::from(slot.record_position) + u64::from(RECORD_HEADER_SIZE);
                let value_position = key_position + u64::from(header.key_len);
                let record_end = value_position + u64::from(header.value_len);
                if record_end > u64::from(u32::MAX) {
                    return Err(CdbError::Corrupt(format!(
                        "record at {} extends past the 32-bit offset space",
                        slot.record_position
                    )));
                }

                if header.key_len as usize == key.len()
                    && self.key_matches(slot.record_position, key)?
                {
                    let hit = Hit {
                        key_position: key_position as u32,
                        key_len: header.key_len,
                        value_position: value_position as u32,
                        value_len: header.value_len,
                    };
                    self.state = LookupState::Found(cursor, hit);
                    return Ok(true);
                }
            }
        }

        self.state = LookupState::Exhausted;
        Ok(false)
    }

    // --------------------------------------------------------------------------------------------
    // Found-state accessors
    // --------------------------------------------------------------------------------------------

    /// Absolute byte offset of the matched record's key.
    pub fn key_position(&self) -> Result<u32, CdbError> {
        self.hit().map(|hit| hit.key_position)
    }

    /// Length of the matched record's key.
    pub fn key_length(&self) -> Result<u32, CdbError> {
        self.hit().map(|hit| hit.key_len)
    }

    /// Absolute byte offset of the matched record's value.
    pub fn data_position(&self) -> Result<u32, CdbError> {
        self.hit().map(|hit| hit.value_position)
    }

    /// Length of the matched record's value.
    pub fn data_length(&self) -> Result<u32, CdbError> {
        self.hit().map(|hit| hit.value_len)
    }

    /// Reads and returns the matched record's value bytes.
    pub fn read_value(&self) -> Result<Vec<u8>, CdbError> {
        let hit = self.hit()?;
        let mut value = vec![0u8; hit.value_len as usize];
        self.source
            .read_exact_at(&mut value, u64::from(hit.value_position))
            .map_err(|e| CdbError::from_read(e, "record value"))?;
        Ok(value)
    }

    // --------------------------------------------------------------------------------------------
    // Conveniences
    // --------------------------------------------------------------------------------------------

    /// Looks up the first value stored under `key`.
    ///
    /// Resets the cursor, so interleaving with a repeated-key walk restarts
    /// that walk.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, CdbError> {
        self.find_start();
        if self.find_next(key)? {
            Ok(Some(self.read_value()?))
        } else {
            Ok(None)
        }
    }

    /// Collects every value stored under `key`, in insertion order.
    pub fn find_all(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>, CdbError> {
        self.find_start();
        let mut values = Vec::new();
        while self.find_next(key)? {
            values.push(self.read_value()?);
        }
        Ok(values)
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    fn hit(&self) -> Result<Hit, CdbError> {
        match self.state {
            LookupState::Found(_, hit) => Ok(hit),
            _ => Err(CdbError::InvalidState(
                "accessor called outside the Found lookup state",
            )),
        }
    }

    /// Reads the header slot for `bucket`.
    fn read_table_pointer(&self, bucket: u32) -> Result<TablePointer, CdbError> {
        self.read_struct(
            u64::from(bucket) * u64::from(TABLE_POINTER_SIZE),
            "header slot",
        )
    }

    /// Reads one fixed-size (8-byte) format structure at `offset`.
    fn read_struct<T: crate::encoding::Decode>(
        &self,
        offset: u64,
        context: &str,
    ) -> Result<T, CdbError> {
        let mut buf = [0u8; 8];
        self.source
            .read_exact_at(&mut buf, offset)
            .map_err(|e| CdbError::from_read(e, context))?;
        let (value, _) = decode_from_slice::<T>(&buf)?;
        Ok(value)
    }

    /// Compares the stored key at `record_position` against the query key.
    ///
    /// Reads in fixed 32-byte chunks so a pathological key length does not
    /// force a matching allocation just to reject a collision.
    fn key_matches(&self, record_position: u32, key: &[u8]) -> Result<bool, CdbError> {
        let mut position = u64::from(record_position) + u64::from(RECORD_HEADER_SIZE);
        let mut remaining = key;
        let mut buf = [0u8; 32];
        while !remaining.is_empty() {
            let n = remaining.len().min(buf.len());
            self.source
                .read_exact_at(&mut buf[..n], position)
                .map_err(|e| CdbError::from_read(e, "record key"))?;
            if buf[..n] != remaining[..n] {
                return Ok(false);
            }
            position += n as u64;
            remaining = &remaining[n..];
        }
        Ok(true)
    }
}
