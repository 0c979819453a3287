//! Open-option flags for [`Store::open`](crate::Store::open).
//!
//! Flags are a 64-bit set. The low byte holds simple booleans; three
//! packed fields above it carry the custom read-buffer configuration,
//! the custom B+tree node sizing, and the periodic-sync interval. The
//! core preserves the whole set and forwards it to the engine; each
//! engine decides which fields it honors.
//!
//! Field encodings:
//!
//! ```text
//! bits  0..8   CREATE | RDONLY | LEGACY_CRC | UNBUFFERED
//! bits  8..16  custom buffer:   high nibble capacity exp, low nibble count exp
//! bits 16..24  custom nodesize: high nibble intermediate KB, low nibble leaf KB
//! bits 24..29  periodic sync:   power-of-two KB interval, 5 bits
//! ```
//!
//! Exponent fields decode as `1KB << (N-1)` (capacity, sync interval) and
//! `8 << (N-1)` (buffer count); an all-zero field selects the engine
//! default.

use std::ops::{BitOr, BitOrAssign};

use crate::errors::{ErrorKind, StoreError, StoreResult};

/// Default B+tree node size when `WITH_CUSTOM_NODESIZE` is absent.
pub const DEFAULT_NODE_SIZE: usize = 1279;

/// Default read-buffer capacity in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Default read-buffer count.
pub const DEFAULT_BUFFER_COUNT: usize = 8;

const BUFFER_SHIFT: u32 = 8;
const NODESIZE_SHIFT: u32 = 16;
const SYNC_SHIFT: u32 = 24;
const FIELD_MASK: u64 = 0xff;
const SYNC_MASK: u64 = 0x1f;

/// Open-option bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u64);

impl OpenFlags {
    /// No options.
    pub const NONE: OpenFlags = OpenFlags(0);
    /// Create the file if it does not exist.
    pub const CREATE: OpenFlags = OpenFlags(1);
    /// Open read-only; mutations are rejected.
    pub const RDONLY: OpenFlags = OpenFlags(1 << 1);
    /// Force the legacy checksum disk version for new files and require
    /// it for existing ones.
    pub const LEGACY_CRC: OpenFlags = OpenFlags(1 << 2);
    /// Bypass the buffering layer. Degrades throughput; intended for
    /// testing.
    pub const UNBUFFERED: OpenFlags = OpenFlags(1 << 3);

    /// Returns the raw bit pattern.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Reconstructs a flag set from a raw bit pattern.
    pub fn from_bits(bits: u64) -> Self {
        OpenFlags(bits)
    }

    /// Returns whether every bit of `other` is set in `self`.
    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the custom read-buffer field.
    ///
    /// `capacity_exp` selects a capacity of `1KB << (N-1)`; `count_exp`
    /// selects a count of `8 << (N-1)`. Zero selects the default for
    /// that piece. Each exponent must fit in a nibble.
    pub fn with_custom_buffer(self, capacity_exp: u8, count_exp: u8) -> StoreResult<Self> {
        if capacity_exp > 0xf || count_exp > 0xf {
            return Err(StoreError::with_message(
                ErrorKind::InvalidArguments,
                "buffer exponents must fit in 4 bits",
            ));
        }
        let field = (((capacity_exp as u64) << 4) | count_exp as u64) << BUFFER_SHIFT;
        Ok(OpenFlags((self.0 & !(FIELD_MASK << BUFFER_SHIFT)) | field))
    }

    /// Sets the custom B+tree node-size field, in whole KB per node
    /// class. Zero selects the 1279-byte default for that class.
    pub fn with_custom_node_size(self, intermediate_kb: u8, leaf_kb: u8) -> StoreResult<Self> {
        if intermediate_kb > 0xf || leaf_kb > 0xf {
            return Err(StoreError::with_message(
                ErrorKind::InvalidArguments,
                "node sizes must fit in 4 bits of KB",
            ));
        }
        let field = (((intermediate_kb as u64) << 4) | leaf_kb as u64) << NODESIZE_SHIFT;
        Ok(OpenFlags((self.0 & !(FIELD_MASK << NODESIZE_SHIFT)) | field))
    }

    /// Sets the periodic-sync interval to `kb` kilobytes written.
    ///
    /// `kb` must be zero (disabled) or a power of two between 1KB and
    /// 1TB.
    pub fn with_periodic_sync_kb(self, kb: u64) -> StoreResult<Self> {
        let cleared = self.0 & !(SYNC_MASK << SYNC_SHIFT);
        if kb == 0 {
            return Ok(OpenFlags(cleared));
        }
        if !kb.is_power_of_two() || kb > 1 << 30 {
            return Err(StoreError::with_message(
                ErrorKind::InvalidArguments,
                "periodic sync interval must be a power of two between 1KB and 1TB",
            ));
        }
        let exp = (kb.trailing_zeros() + 1) as u64;
        Ok(OpenFlags(cleared | (exp << SYNC_SHIFT)))
    }

    /// Decodes the custom read-buffer field. `None` means the engine
    /// default.
    pub fn buffer_config(self) -> Option<BufferConfig> {
        let field = (self.0 >> BUFFER_SHIFT) & FIELD_MASK;
        if field == 0 {
            return None;
        }
        let capacity_exp = (field >> 4) as u32;
        let count_exp = (field & 0xf) as u32;
        Some(BufferConfig {
            capacity: if capacity_exp == 0 {
                DEFAULT_BUFFER_CAPACITY
            } else {
                1024 << (capacity_exp - 1)
            },
            count: if count_exp == 0 {
                DEFAULT_BUFFER_COUNT
            } else {
                8 << (count_exp - 1)
            },
        })
    }

    /// Decodes the custom node-size field. `None` means the 1279-byte
    /// default for both node classes.
    pub fn node_size(self) -> Option<NodeSize> {
        let field = (self.0 >> NODESIZE_SHIFT) & FIELD_MASK;
        if field == 0 {
            return None;
        }
        let intermediate_kb = (field >> 4) as usize;
        let leaf_kb = (field & 0xf) as usize;
        Some(NodeSize {
            intermediate: if intermediate_kb == 0 {
                DEFAULT_NODE_SIZE
            } else {
                intermediate_kb * 1024
            },
            leaf: if leaf_kb == 0 {
                DEFAULT_NODE_SIZE
            } else {
                leaf_kb * 1024
            },
        })
    }

    /// Decodes the periodic-sync interval in bytes. `None` means
    /// disabled.
    pub fn periodic_sync_bytes(self) -> Option<u64> {
        let exp = (self.0 >> SYNC_SHIFT) & SYNC_MASK;
        if exp == 0 {
            None
        } else {
            Some(1024 << (exp - 1))
        }
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

/// Decoded custom read-buffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    /// Capacity of one read buffer, in bytes.
    pub capacity: usize,
    /// Number of read buffers.
    pub count: usize,
}

/// Decoded B+tree node sizing, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSize {
    /// Intermediate (key-pointer) node size.
    pub intermediate: usize,
    /// Leaf (key-value) node size.
    pub leaf: usize,
}
