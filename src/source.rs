//! Positioned-read abstraction for database byte sources.
//!
//! Readers and iterators never hold a seek position in the underlying
//! source; every access is an absolute-offset read. That keeps concurrent
//! readers over one immutable file trivially safe and lets the same lookup
//! code run against a memory map, an open file, or an in-memory buffer
//! (handy in tests).
//!
//! Short reads surface as `ErrorKind::UnexpectedEof`; the reader layer maps
//! those to [`CdbError::Corrupt`](crate::format::CdbError), since a file
//! that ends where a field was expected is structurally invalid rather than
//! transiently unreadable.

use std::fs::File;
use std::io;

use memmap2::Mmap;

/// A byte source supporting exact reads at absolute offsets.
///
/// Implementations must be side-effect free with respect to any internal
/// cursor: two concurrent `read_exact_at` calls on the same source must not
/// interfere.
pub trait ReadAt {
    /// Fills `buf` from `offset`, failing with `UnexpectedEof` if the
    /// source ends before `buf` is full.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

impl ReadAt for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "offset out of range"))?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of buffer"))?;
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

impl ReadAt for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_exact_at(buf, offset)
    }
}

impl ReadAt for Mmap {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self[..].read_exact_at(buf, offset)
    }
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    #[cfg(not(unix))]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut clone = self.try_clone()?;
        clone.seek(SeekFrom::Start(offset))?;
        clone.read_exact(buf)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }
}
