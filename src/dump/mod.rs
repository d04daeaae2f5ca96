//! Textual record interchange — the `+klen,dlen:key->value` line format.
//!
//! This is the stream format external tooling uses to feed a builder and
//! to render dump output. One record per line:
//!
//! ```text
//! +<key length>,<value length>:<key bytes>-><value bytes>\n
//! ```
//!
//! followed by a single bare `\n` terminating the stream. Lengths are
//! explicit decimal, so keys and values may contain **any** bytes —
//! embedded newlines, `->` sequences, NULs — and still round-trip exactly.
//! Lines starting with `#` are comments and are skipped.
//!
//! The module is pure stream plumbing: [`DumpParser`] turns a byte stream
//! into `(key, value)` pairs, [`write_record`]/[`write_terminator`] go the
//! other way. Wiring these to an actual database file is the caller's
//! business (see [`Cdb::build`](crate::Cdb::build) and
//! [`Cdb::iter`](crate::Cdb::iter)).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::format::MAX_FIELD_LEN;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned while parsing the interchange format.
#[derive(Debug, Error)]
pub enum DumpError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input violates the line grammar.
    #[error("syntax error at byte {offset}: {reason}")]
    Syntax {
        /// Byte offset of the offending input.
        offset: u64,
        /// What was expected or found.
        reason: String,
    },
}

// ------------------------------------------------------------------------------------------------
// Emitters
// ------------------------------------------------------------------------------------------------

/// Writes one record line: `+klen,dlen:key->value\n`.
pub fn write_record(out: &mut impl Write, key: &[u8], value: &[u8]) -> io::Result<()> {
    write!(out, "+{},{}:", key.len(), value.len())?;
    out.write_all(key)?;
    out.write_all(b"->")?;
    out.write_all(value)?;
    out.write_all(b"\n")
}

/// Writes the bare-newline stream terminator.
pub fn write_terminator(out: &mut impl Write) -> io::Result<()> {
    out.write_all(b"\n")
}

/// Writes a full stream: every record, then the terminator.
pub fn write_stream<'a>(
    out: &mut impl Write,
    records: impl Iterator<Item = (&'a [u8], &'a [u8])>,
) -> io::Result<()> {
    for (key, value) in records {
        write_record(out, key, value)?;
    }
    write_terminator(out)
}

// ------------------------------------------------------------------------------------------------
// DumpParser
// ------------------------------------------------------------------------------------------------

/// Streaming parser for the interchange format.
///
/// Reads byte-at-a-time from a buffered input; lengths are parsed first,
/// then exactly that many raw bytes are consumed, which is what makes
/// binary-unsafe keys and values round-trip.
pub struct DumpParser<R: BufRead> {
    input: R,

    /// Bytes consumed so far, for error reporting.
    offset: u64,
}

impl<R: BufRead> DumpParser<R> {
    /// Wraps a buffered input stream.
    pub fn new(input: R) -> Self {
        Self { input, offset: 0 }
    }

    /// Parses the next record.
    ///
    /// Returns `Ok(None)` on the bare-newline terminator or clean
    /// end-of-input. Comment lines (`#…`) are skipped transparently.
    pub fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, DumpError> {
        loop {
            match self.read_byte()? {
                None | Some(b'\n') => return Ok(None),
                Some(b'#') => self.skip_comment()?,
                Some(b'+') => return self.parse_record().map(Some),
                Some(other) => {
                    return Err(self.syntax(format!(
                        "expected '+', '#', or terminating newline, found 0x{other:02X}"
                    )));
                }
            }
        }
    }

    /// Drains the parser into a vector of records.
    pub fn collect_records(mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, DumpError> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    /// Body of a record line, after the leading `+`.
    fn parse_record(&mut self) -> Result<(Vec<u8>, Vec<u8>), DumpError> {
        let key_len = self.parse_length(b',')?;
        let value_len = self.parse_length(b':')?;

        let key = self.read_exact_vec(key_len, "key bytes")?;
        self.expect(b'-')?;
        self.expect(b'>')?;
        let value = self.read_exact_vec(value_len, "value bytes")?;
        self.expect(b'\n')?;

        Ok((key, value))
    }

    /// Parses a decimal length up to and including its delimiter.
    ///
    /// Lengths above [`MAX_FIELD_LEN`] are rejected here, before any
    /// allocation, so a crafted stream cannot trigger an allocation bomb.
    fn parse_length(&mut self, delimiter: u8) -> Result<u32, DumpError> {
        let mut len: u64 = 0;
        let mut digits = 0u32;
        loop {
            match self.read_byte()? {
                Some(c) if c.is_ascii_digit() => {
                    digits += 1;
                    len = len * 10 + u64::from(c - b'0');
                    if len > u64::from(MAX_FIELD_LEN) {
                        return Err(self.syntax(format!(
                            "length {len} exceeds maximum {MAX_FIELD_LEN}"
                        )));
                    }
                }
                Some(c) if c == delimiter => {
                    if digits == 0 {
                        return Err(self.syntax(format!(
                            "expected at least one digit before '{}'",
                            delimiter as char
                        )));
                    }
                    return Ok(len as u32);
                }
                Some(other) => {
                    return Err(self.syntax(format!(
                        "expected digit or '{}', found 0x{other:02X}",
                        delimiter as char
                    )));
                }
                None => return Err(self.syntax("unexpected end of input in length".into())),
            }
        }
    }

    /// Consumes the rest of a comment line, including its newline. A
    /// comment cut short by end-of-input is tolerated.
    fn skip_comment(&mut self) -> Result<(), DumpError> {
        while let Some(c) = self.read_byte()? {
            if c == b'\n' {
                break;
            }
        }
        Ok(())
    }

    fn expect(&mut self, expected: u8) -> Result<(), DumpError> {
        match self.read_byte()? {
            Some(c) if c == expected => Ok(()),
            Some(other) => Err(self.syntax(format!(
                "expected 0x{expected:02X} ('{}'), found 0x{other:02X}",
                expected as char
            ))),
            None => Err(self.syntax(format!(
                "unexpected end of input, expected 0x{expected:02X}"
            ))),
        }
    }

    fn read_exact_vec(&mut self, len: u32, what: &str) -> Result<Vec<u8>, DumpError> {
        let mut bytes = vec![0u8; len as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            let n = self.input.read(&mut bytes[filled..])?;
            if n == 0 {
                return Err(self.syntax(format!("unexpected end of input in {what}")));
            }
            filled += n;
            self.offset += n as u64;
        }
        Ok(bytes)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, DumpError> {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.offset += 1;
                    return Ok(Some(buf[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn syntax(&self, reason: String) -> DumpError {
        DumpError::Syntax {
            offset: self.offset,
            reason,
        }
    }
}
