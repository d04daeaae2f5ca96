//! Interchange stream tests — emit, parse, and reject malformed input.
//!
//! Coverage:
//! - Exact emitted bytes for representative records
//! - Emit-then-parse round-trips, including binary-hostile fields
//! - Comment skipping and terminator handling
//! - Syntax errors with meaningful offsets
//! - Length ceiling enforcement before allocation

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::dump::{DumpError, DumpParser, write_record, write_stream, write_terminator};

    fn parse_all(input: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, DumpError> {
        DumpParser::new(Cursor::new(input)).collect_records()
    }

    /// # Scenario
    /// Emit two records and the terminator.
    ///
    /// # Expected behavior
    /// Byte-exact `+klen,dlen:key->value` lines followed by a bare newline.
    #[test]
    fn emits_exact_line_format() {
        let mut out = Vec::new();
        write_record(&mut out, b"@7/tcp", b"echo").unwrap();
        write_record(&mut out, b"", b"").unwrap();
        write_terminator(&mut out).unwrap();

        assert_eq!(out, b"+6,4:@7/tcp->echo\n+0,0:->\n\n");
    }

    /// # Scenario
    /// Round-trip records whose keys and values contain newlines, `->`
    /// sequences, `#`, `+`, and NUL bytes.
    ///
    /// # Expected behavior
    /// Explicit lengths make the fields opaque; everything round-trips
    /// byte-for-byte and nothing is mistaken for syntax.
    #[test]
    fn hostile_bytes_round_trip() {
        let records: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"line\nbreak".to_vec(), b"value\nwith\nnewlines".to_vec()),
            (b"arrow->key".to_vec(), b"->".to_vec()),
            (b"#not-a-comment".to_vec(), b"+1,1:x->y".to_vec()),
            (b"\x00\xFF".to_vec(), b"\x00".to_vec()),
            (Vec::new(), b"empty key".to_vec()),
        ];

        let mut out = Vec::new();
        write_stream(
            &mut out,
            records.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
        )
        .unwrap();

        assert_eq!(parse_all(&out).unwrap(), records);
    }

    /// # Scenario
    /// Parse a stream with comment lines between and before records.
    ///
    /// # Expected behavior
    /// Comments vanish; the records parse as if the comments were absent.
    #[test]
    fn comments_are_skipped() {
        let input = b"# services database\n+1,1:a->1\n# interlude\n+1,1:b->2\n\n";
        let records = parse_all(input).unwrap();
        assert_eq!(
            records,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
            ]
        );
    }

    /// # Scenario
    /// Streams ending with the bare-newline terminator and streams simply
    /// running out of input at a record boundary.
    ///
    /// # Expected behavior
    /// Both terminate cleanly. Anything after the terminator is ignored.
    #[test]
    fn termination_variants() {
        assert_eq!(parse_all(b"+1,1:a->1\n\n+1,1:b->2\n").unwrap().len(), 1);
        assert_eq!(parse_all(b"+1,1:a->1\n").unwrap().len(), 1);
        assert_eq!(parse_all(b"").unwrap().len(), 0);
        assert_eq!(parse_all(b"\n").unwrap().len(), 0);
        assert_eq!(parse_all(b"# only a comment").unwrap().len(), 0);
    }

    /// # Scenario
    /// Feed structurally broken lines: a bad leading byte, a missing digit,
    /// a wrong separator, a truncated body, and a missing record newline.
    ///
    /// # Expected behavior
    /// Each fails with `DumpError::Syntax` carrying a byte offset no
    /// earlier than the offending region.
    #[test]
    fn malformed_input_is_rejected() {
        let cases: &[(&[u8], u64)] = &[
            (b"?1,1:a->1\n", 1),
            (b"+,1:a->1\n", 2),
            (b"+1;1:a->1\n", 2),
            (b"+1,1:a", 6),
            (b"+1,1:a->", 8),
            (b"+1,1:a->1X", 10),
            (b"+1x,1:a->1\n", 3),
        ];

        for (input, min_offset) in cases {
            match parse_all(input) {
                Err(DumpError::Syntax { offset, .. }) => {
                    assert!(
                        offset >= *min_offset,
                        "input {input:?}: offset {offset} < {min_offset}"
                    );
                }
                other => panic!("input {input:?}: expected syntax error, got {other:?}"),
            }
        }
    }

    /// # Scenario
    /// A record line declares a multi-gigabyte value length.
    ///
    /// # Expected behavior
    /// Rejected while parsing the length digits, before any buffer for the
    /// field is allocated.
    #[test]
    fn oversized_length_rejected_before_allocation() {
        let err = parse_all(b"+3,4294967295:abc->wxyz\n").unwrap_err();
        match err {
            DumpError::Syntax { reason, .. } => {
                assert!(reason.contains("exceeds maximum"), "{reason}");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
