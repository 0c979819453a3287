//! Commit header codec.
//!
//! A commit header is the durability point of the file: everything up to
//! and including the last valid header survives reopen, anything after
//! it is discarded. The header records the disk version and the
//! aggregate bookkeeping as of the commit.
//!
//! Payload layout (within a [`FRAME_TAG_HEADER`] frame):
//!
//! ```text
//! | Magic (8B) | Disk Version (u32 LE) | Last Seq (u64 LE) |
//! | Doc Count (u64 LE) | Deleted Count (u64 LE) | Space Used (u64 LE) |
//! ```
//!
//! Disk versions: 12 is current; 11 is the legacy-checksum version that
//! `LEGACY_CRC` pins. Any other version fails
//! `CASK_ERROR_HEADER_VERSION`.

use super::record::{encode_frame, FRAME_TAG_HEADER, MIN_FRAME_SIZE};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::SeqNum;

/// Magic bytes opening every commit header payload.
pub const HEADER_MAGIC: &[u8; 8] = b"CASKHDR\0";

/// Current disk version for new files.
pub const DISK_VERSION_LATEST: u32 = 12;

/// Legacy disk version pinned by the `LEGACY_CRC` open flag.
pub const DISK_VERSION_LEGACY: u32 = 11;

const PAYLOAD_LEN: usize = 8 + 4 + 8 + 8 + 8 + 8;

/// Size of an encoded commit header frame.
pub const HEADER_FRAME_LEN: usize = MIN_FRAME_SIZE + PAYLOAD_LEN;

/// A decoded commit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitHeader {
    /// Disk version of the file.
    pub disk_version: u32,
    /// Last assigned sequence number at commit time.
    pub last_seq: SeqNum,
    /// Live key count at commit time.
    pub doc_count: u64,
    /// Tombstoned key count at commit time.
    pub deleted_count: u64,
    /// Bytes of current revisions and bookkeeping at commit time.
    pub space_used: u64,
}

impl CommitHeader {
    /// Serializes the header into a complete frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.extend_from_slice(HEADER_MAGIC);
        payload.extend_from_slice(&self.disk_version.to_le_bytes());
        payload.extend_from_slice(&self.last_seq.to_le_bytes());
        payload.extend_from_slice(&self.doc_count.to_le_bytes());
        payload.extend_from_slice(&self.deleted_count.to_le_bytes());
        payload.extend_from_slice(&self.space_used.to_le_bytes());
        encode_frame(FRAME_TAG_HEADER, &payload)
    }

    /// Parses a commit header from a frame payload.
    pub fn decode_payload(payload: &[u8]) -> StoreResult<Self> {
        if payload.len() != PAYLOAD_LEN {
            return Err(StoreError::with_message(
                ErrorKind::Corrupt,
                format!("commit header payload is {} bytes", payload.len()),
            ));
        }
        if &payload[..8] != HEADER_MAGIC {
            return Err(StoreError::with_message(
                ErrorKind::Corrupt,
                "commit header magic mismatch",
            ));
        }
        let disk_version = u32::from_le_bytes(payload[8..12].try_into().expect("4-byte slice"));
        if disk_version != DISK_VERSION_LATEST && disk_version != DISK_VERSION_LEGACY {
            return Err(StoreError::with_message(
                ErrorKind::HeaderVersion,
                format!("unsupported disk version {}", disk_version),
            ));
        }
        let u64_at = |offset: usize| {
            u64::from_le_bytes(payload[offset..offset + 8].try_into().expect("8-byte slice"))
        };
        Ok(Self {
            disk_version,
            last_seq: u64_at(12),
            doc_count: u64_at(20),
            deleted_count: u64_at(28),
            space_used: u64_at(36),
        })
    }
}
