//! CRC32 checksums for on-disk frames.
//!
//! Every frame read back from disk is verified before use; a mismatch
//! surfaces as `CASK_ERROR_CHECKSUM_FAIL` and is never ignored.

use crc32fast::Hasher;

/// Computes a CRC32 checksum over `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies that `data` hashes to `expected`.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}
