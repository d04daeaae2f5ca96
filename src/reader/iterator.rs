//! Sequential record iterator — walks the data region in physical order.
//!
//! Iteration ignores the hash index entirely. Records are stored
//! back-to-back between offset 2048 and `eod` (the position field of
//! header slot 0), so a full dump is a single forward scan: read a record
//! header, read the key and value, advance past them, repeat until the
//! cursor reaches `eod`.
//!
//! Physical order **is** insertion order. Nothing about this walk is
//! key-sorted; the successor operation built on top of it (see
//! [`Cdb::successor`](crate::Cdb::successor)) deliberately keeps that
//! insertion-order semantic.
//!
//! Corruption is reported, never skipped: a record header or body that
//! extends past `eod`, or an `eod` before the header region, yields
//! [`CdbError::Corrupt`] rather than a silent early stop.

use crate::encoding::decode_from_slice;
use crate::format::{CdbError, HEADER_SIZE, RECORD_HEADER_SIZE, RecordHeader};
use crate::source::ReadAt;

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// One fully-read record from the data region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The key bytes.
    pub key: Vec<u8>,

    /// The value bytes.
    pub value: Vec<u8>,

    /// Absolute byte offset of the key.
    pub key_position: u32,

    /// Absolute byte offset of the value.
    pub value_position: u32,
}

// ------------------------------------------------------------------------------------------------
// RecordIter
// ------------------------------------------------------------------------------------------------

/// Forward scanner over the data region of a finished database.
///
/// Depends only on the record codec and the `eod` marker; the hash index
/// is never touched, so iteration works even when the index would not
/// (useful for integrity checks and dumps).
#[derive(Debug)]
pub struct RecordIter<'a, S: ReadAt + ?Sized> {
    source: &'a S,
    eod: u32,
    cursor: u32,
}

impl<'a, S: ReadAt + ?Sized> RecordIter<'a, S> {
    /// Positions a fresh iterator at the first record.
    ///
    /// Reads `eod` from header slot 0 at offset 0.
    ///
    /// # Errors
    ///
    /// [`CdbError::Corrupt`] if `eod` lies inside the header region or the
    /// file is shorter than one header slot.
    pub fn new(source: &'a S) -> Result<Self, CdbError> {
        let mut buf = [0u8; 4];
        source
            .read_exact_at(&mut buf, 0)
            .map_err(|e| CdbError::from_read(e, "end-of-data marker"))?;
        let (eod, _) = decode_from_slice::<u32>(&buf)?;
        if eod < HEADER_SIZE {
            return Err(CdbError::Corrupt(format!(
                "end-of-data marker {eod} lies inside the header region"
            )));
        }
        Ok(Self {
            source,
            eod,
            cursor: HEADER_SIZE,
        })
    }

    /// Positions an iterator mid-stream; used by the successor walk, where
    /// `cursor` comes from a lookup hit and `eod` was already validated.
    pub(crate) fn from_position(source: &'a S, eod: u32, cursor: u32) -> Self {
        Self {
            source,
            eod,
            cursor,
        }
    }

    /// Byte offset where the record region ends.
    pub fn eod(&self) -> u32 {
        self.eod
    }

    /// Reads the record at the cursor and advances past it.
    ///
    /// Returns `Ok(None)` at end of data — clean termination, not an
    /// error.
    ///
    /// # Errors
    ///
    /// [`CdbError::Corrupt`] if the record header or body would extend
    /// past `eod` (all offset arithmetic is done in `u64`, so a crafted
    /// length pair cannot wrap the cursor backwards), or if the underlying
    /// file is physically shorter than `eod` claims.
    pub fn next_record(&mut self) -> Result<Option<Record>, CdbError> {
        if self.cursor >= self.eod {
            return Ok(None);
        }
        if self.eod - self.cursor < RECORD_HEADER_SIZE {
            return Err(CdbError::Corrupt(format!(
                "record header at {} overruns end of data {}",
                self.cursor, self.eod
            )));
        }

        let mut buf = [0u8; RECORD_HEADER_SIZE as usize];
        self.source
            .read_exact_at(&mut buf, u64::from(self.cursor))
            .map_err(|e| CdbError::from_read(e, "record header"))?;
        let (header, _) = decode_from_slice::<RecordHeader>(&buf)?;

        let key_position = self.cursor + RECORD_HEADER_SIZE;
        let value_position = u64::from(key_position) + u64::from(header.key_len);
        let record_end = value_position + u64::from(header.value_len);
        if record_end > u64::from(self.eod) {
            return Err(CdbError::Corrupt(format!(
                "record at {} extends past end of data {}",
                self.cursor, self.eod
            )));
        }

        let mut key = vec![0u8; header.key_len as usize];
        self.source
            .read_exact_at(&mut key, u64::from(key_position))
            .map_err(|e| CdbError::from_read(e, "record key"))?;
        let mut value = vec![0u8; header.value_len as usize];
        self.source
            .read_exact_at(&mut value, value_position)
            .map_err(|e| CdbError::from_read(e, "record value"))?;

        let record = Record {
            key,
            value,
            key_position,
            // record_end ≤ eod ≤ u32::MAX, so these casts cannot truncate.
            value_position: value_position as u32,
        };
        self.cursor = record_end as u32;
        Ok(Some(record))
    }
}

/// Fallible iteration; the stream ends after the first error.
impl<'a, S: ReadAt + ?Sized> Iterator for RecordIter<'a, S> {
    type Item = Result<Record, CdbError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.cursor = self.eod;
                Some(Err(e))
            }
        }
    }
}
