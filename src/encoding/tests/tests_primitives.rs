//! Primitive codec tests — `u32` round-trips and truncation handling.

#[cfg(test)]
mod tests {
    use crate::encoding::{Decode, EncodingError, decode_from_slice, encode_to_vec};

    /// # Scenario
    /// Encode a handful of representative `u32` values and decode them back.
    ///
    /// # Expected behavior
    /// Every value round-trips exactly and consumes 4 bytes.
    #[test]
    fn u32_round_trip() {
        for value in [0u32, 1, 0x1505, 2048, 429_496_720, u32::MAX] {
            let bytes = encode_to_vec(&value);
            assert_eq!(bytes.len(), 4);
            let (decoded, consumed) = decode_from_slice::<u32>(&bytes).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, 4);
        }
    }

    /// # Scenario
    /// Verify the byte order is little-endian, which the on-disk format
    /// requires for compatibility with files produced by other writers.
    #[test]
    fn u32_is_little_endian() {
        let bytes = encode_to_vec(&0x0403_0201u32);
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04]);
    }

    /// # Scenario
    /// Decode from buffers shorter than 4 bytes.
    ///
    /// # Expected behavior
    /// `EncodingError::UnexpectedEof` reporting how many bytes were needed
    /// and how many were available.
    #[test]
    fn u32_short_buffer_fails() {
        for len in 0..4usize {
            let buf = vec![0u8; len];
            let err = u32::decode_from(&buf).unwrap_err();
            match err {
                EncodingError::UnexpectedEof { needed, available } => {
                    assert_eq!(needed, 4);
                    assert_eq!(available, len);
                }
            }
        }
    }

    /// # Scenario
    /// Decode a `u32` from a buffer with trailing bytes.
    ///
    /// # Expected behavior
    /// Only the first 4 bytes are consumed; the reported offset lets the
    /// caller continue decoding the remainder.
    #[test]
    fn u32_ignores_trailing_bytes() {
        let mut buf = encode_to_vec(&7u32);
        buf.extend_from_slice(&[0xAA, 0xBB]);
        let (decoded, consumed) = decode_from_slice::<u32>(&buf).unwrap();
        assert_eq!(decoded, 7);
        assert_eq!(consumed, 4);
    }
}
