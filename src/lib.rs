//! # constdb
//!
//! An immutable, disk-based constant database: build a key-value file
//! once, then serve point lookups forever with **O(1)** disk access and
//! zero in-memory index. The on-disk format is a 256-bucket open-addressed
//! hash directory in a fixed 2048-byte header, followed by the record data
//! and the bucket tables.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use constdb::{Cdb, CdbConfig};
//!
//! // Build (single pass, atomically published on success).
//! let entries: Vec<(&[u8], &[u8])> = vec![
//!     (b"@7/tcp", b"echo"),
//!     (b"echo/tcp", b"7"),
//! ];
//! Cdb::build("/var/db/services.cdb", CdbConfig::default(), entries).unwrap();
//!
//! // Query (memory-mapped, shared-readable).
//! let db = Cdb::open("/var/db/services.cdb").unwrap();
//! assert_eq!(db.get(b"@7/tcp").unwrap(), Some(b"echo".to_vec()));
//! assert_eq!(db.get(b"@13/tcp").unwrap(), None);
//!
//! // Full scan, in insertion order.
//! for record in db.iter() {
//!     let record = record.unwrap();
//!     println!("{:?} -> {:?}", record.key, record.value);
//! }
//! ```
//!
//! ## Features
//!
//! - **Single-pass builds** — records stream to disk as they arrive; the
//!   index is computed once at finalize.
//! - **O(1) lookups** — one header read plus an expected constant number
//!   of slot probes, never more than one bucket table.
//! - **Repeated keys** — a key may be stored many times; lookups walk its
//!   values in insertion order.
//! - **Structural corruption detection** — truncated or inconsistent files
//!   surface as errors, never as silent misses.
//! - **Textual interchange** — the [`dump`] module reads and writes the
//!   `+klen,dlen:key->value` line format for external tooling.

pub(crate) mod builder;
pub mod dump;
pub(crate) mod encoding;
pub(crate) mod format;
pub(crate) mod hash;
pub(crate) mod reader;
pub(crate) mod source;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, info};

pub use builder::{CdbConfig, CdbWriter};
pub use format::CdbError;
pub use hash::cdb_hash;
pub use reader::CdbReader;
pub use reader::iterator::{Record, RecordIter};
pub use source::ReadAt;

use encoding::decode_from_slice;
use format::{HEADER_SIZE, INDEX_SLOT_SIZE, NUM_BUCKETS, TABLE_POINTER_SIZE, TablePointer};

// ------------------------------------------------------------------------------------------------
// Cdb
// ------------------------------------------------------------------------------------------------

/// Read handle over a finished database file.
///
/// The file is memory-mapped at open and validated structurally (header
/// geometry and table bounds); after that every operation is read-only.
/// A `Cdb` is `Send + Sync` — lookups carry no shared cursor state, so one
/// handle may serve any number of threads.
#[derive(Debug)]
pub struct Cdb {
    map: Mmap,

    /// End of the data region, from header slot 0. Validated at open.
    eod: u32,

    /// Stored record count, derived from the index geometry.
    record_count: u32,
}

impl Cdb {
    /// Opens and validates a database file.
    ///
    /// # Errors
    ///
    /// [`CdbError::Corrupt`] if the file is shorter than its fixed header,
    /// the end-of-data marker is out of range, or any bucket table extends
    /// past the end of the file. [`CdbError::Io`] if the open or map fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CdbError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < u64::from(HEADER_SIZE) {
            return Err(CdbError::Corrupt(format!(
                "file is {file_len} bytes, shorter than the {HEADER_SIZE}-byte header"
            )));
        }

        // Safety: the format is immutable by contract; mutating a mapped
        // database file while readers exist is outside the supported use.
        let map = unsafe { Mmap::map(&file)? };

        let mut eod = 0u32;
        let mut total_slots = 0u64;
        for bucket in 0..NUM_BUCKETS {
            let offset = bucket * TABLE_POINTER_SIZE as usize;
            let (pointer, _) = decode_from_slice::<TablePointer>(&map[offset..])?;
            if bucket == 0 {
                eod = pointer.position;
                if eod < HEADER_SIZE || u64::from(eod) > file_len {
                    return Err(CdbError::Corrupt(format!(
                        "end-of-data marker {eod} out of range for a {file_len}-byte file"
                    )));
                }
            }
            let table_end = u64::from(pointer.position)
                + u64::from(pointer.slot_count) * u64::from(INDEX_SLOT_SIZE);
            if pointer.position < eod || table_end > file_len {
                return Err(CdbError::Corrupt(format!(
                    "bucket {bucket} table at {} ({} slots) exceeds file bounds",
                    pointer.position, pointer.slot_count
                )));
            }
            total_slots += u64::from(pointer.slot_count);
        }

        // Tables hold two slots per record.
        let record_count = (total_slots / 2) as u32;
        info!(path = %path.display(), records = record_count, file_len, "opened database");

        Ok(Self {
            map,
            eod,
            record_count,
        })
    }

    /// Number of records stored, repeated keys counted individually.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Whether the database stores no records at all.
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Looks up the first value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CdbError> {
        self.reader().find(key)
    }

    /// Collects every value stored under `key`, in insertion order.
    pub fn get_all(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, CdbError> {
        self.reader().find_all(key)
    }

    /// Starts a fresh lookup engine over this database.
    ///
    /// Use this for explicit repeated-key walks
    /// ([`find_next`](CdbReader::find_next)) or position/length access
    /// without copying values out.
    pub fn reader(&self) -> CdbReader<&Mmap> {
        CdbReader::new(&self.map)
    }

    /// Iterates every record in physical (insertion) order.
    pub fn iter(&self) -> RecordIter<'_, Mmap> {
        RecordIter::from_position(&self.map, self.eod, HEADER_SIZE)
    }

    /// Returns the record physically following the one a lookup of `key`
    /// lands on, or the first record when `key` is absent. `None` when the
    /// located record is the last one.
    ///
    /// This is a positional successor in insertion order. It coincides
    /// with a key-sorted successor only if the database was built from
    /// key-sorted input, which nothing here enforces.
    pub fn successor(&self, key: &[u8]) -> Result<Option<Record>, CdbError> {
        let mut reader = self.reader();
        let start = if reader.find_next(key)? {
            reader.data_position()? + reader.data_length()?
        } else {
            HEADER_SIZE
        };
        RecordIter::from_position(&self.map, self.eod, start).next_record()
    }

    /// Writes every record to `out` in the textual interchange format,
    /// terminator included.
    pub fn dump_to(&self, out: &mut impl Write) -> Result<(), CdbError> {
        for record in self.iter() {
            let record = record?;
            dump::write_record(out, &record.key, &record.value)?;
        }
        dump::write_terminator(out)?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Building
    // --------------------------------------------------------------------------------------------

    /// Builds a database file from `entries` in one pass.
    ///
    /// The build streams into `<path>.tmp` and renames over `path` only
    /// after a successful finalize and fsync, so a crashed or failed build
    /// never leaves a partial database at the destination. Returns the
    /// file size in bytes.
    ///
    /// # Errors
    ///
    /// Everything [`CdbWriter`] can report, plus [`CdbError::Io`] for
    /// temp-file handling and the final rename. On error the temporary
    /// file is removed (best effort) and `path` is untouched.
    pub fn build<I, K, V>(
        path: impl AsRef<Path>,
        config: CdbConfig,
        entries: I,
    ) -> Result<u32, CdbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let path = path.as_ref();
        let tmp_path = tmp_sibling(path)?;

        let result = build_into(&tmp_path, config, entries)
            .and_then(|file_size| match fs::rename(&tmp_path, path) {
                Ok(()) => Ok(file_size),
                Err(e) => Err(e.into()),
            });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        } else {
            debug!(path = %path.display(), "database published");
        }
        result
    }
}

/// `<file>.tmp` next to the destination, so the final rename never crosses
/// a filesystem boundary.
fn tmp_sibling(path: &Path) -> Result<std::path::PathBuf, CdbError> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "destination path has no file name")
        })?
        .to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

fn build_into<I, K, V>(tmp_path: &Path, config: CdbConfig, entries: I) -> Result<u32, CdbError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let mut file = File::create(tmp_path)?;
    let mut writer = CdbWriter::new(BufWriter::new(&mut file), config)?;
    for (key, value) in entries {
        writer.add(key.as_ref(), value.as_ref())?;
    }
    let file_size = writer.finalize()?;
    file.sync_all()?;
    Ok(file_size)
}
