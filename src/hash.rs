//! The constant-database hash function.
//!
//! The function is load-bearing: it defines binary compatibility with every
//! database file ever written in this format, so the exact arithmetic is
//! fixed forever. Starting from seed `5381`, each input byte `c` updates the
//! state as `h = (h * 33) ^ c`, with all arithmetic modulo 2³².
//!
//! The low 8 bits of the hash select one of the 256 bucket tables; the
//! remaining bits select the starting probe slot within that table. Keeping
//! the two derivations here, next to the hash itself, ensures the builder
//! and the reader can never disagree about them.

use crate::format::NUM_BUCKETS;

/// Hash seed. Never change this.
pub const HASH_SEED: u32 = 5381;

/// Hashes `bytes` with the format's fixed function.
///
/// Pure and deterministic; identical input always produces identical output
/// on every platform.
#[inline]
pub fn cdb_hash(bytes: &[u8]) -> u32 {
    let mut h = HASH_SEED;
    for &c in bytes {
        h = (h << 5).wrapping_add(h) ^ u32::from(c);
    }
    h
}

/// Bucket table index for a hash: the hash modulo 256.
#[inline]
pub fn bucket_of(hash: u32) -> u32 {
    hash % NUM_BUCKETS as u32
}

/// Starting probe slot within a bucket table of `slot_count` slots.
///
/// The hash divided by 256, modulo the table length. `slot_count` must be
/// non-zero; callers check the table pointer before probing.
#[inline]
pub fn probe_start(hash: u32, slot_count: u32) -> u32 {
    (hash / NUM_BUCKETS as u32) % slot_count
}
