//! On-disk frame and document record codec.
//!
//! The file engine stores a flat sequence of frames:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, total including this field and the CRC)
//! +------------------+
//! | Tag              | (u8: 0x01 document record, 0x02 commit header)
//! +------------------+
//! | Payload          | (tag-specific)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over everything before it)
//! +------------------+
//! ```
//!
//! A document record payload is:
//!
//! ```text
//! | Sequence (u64 LE) | Flags (u8, bit 0 = tombstone) |
//! | Key (length-prefixed) | Metadata (length-prefixed) | Body (length-prefixed) |
//! ```
//!
//! Structural damage decodes as `CASK_ERROR_CORRUPT`; a checksum
//! mismatch decodes as `CASK_ERROR_CHECKSUM_FAIL`.

use super::checksum::{compute_checksum, verify_checksum};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::SeqNum;

/// Frame tag for a document record.
pub const FRAME_TAG_DOCUMENT: u8 = 0x01;
/// Frame tag for a commit header.
pub const FRAME_TAG_HEADER: u8 = 0x02;

/// Smallest possible frame: length, tag, empty payload, checksum.
pub const MIN_FRAME_SIZE: usize = 4 + 1 + 4;

const FLAG_TOMBSTONE: u8 = 0x01;

/// Wraps a tag and payload into a checksummed frame.
pub fn encode_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let frame_len = MIN_FRAME_SIZE + payload.len();
    let mut frame = Vec::with_capacity(frame_len);
    frame.extend_from_slice(&(frame_len as u32).to_le_bytes());
    frame.push(tag);
    frame.extend_from_slice(payload);
    let crc = compute_checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Decodes one frame from the front of `data`.
///
/// Returns the tag, the payload slice, and the number of bytes
/// consumed.
pub fn decode_frame(data: &[u8]) -> StoreResult<(u8, &[u8], usize)> {
    if data.len() < MIN_FRAME_SIZE {
        return Err(StoreError::with_message(
            ErrorKind::Corrupt,
            "frame shorter than minimum",
        ));
    }

    let frame_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if frame_len < MIN_FRAME_SIZE {
        return Err(StoreError::with_message(
            ErrorKind::Corrupt,
            format!("invalid frame length {}", frame_len),
        ));
    }
    if data.len() < frame_len {
        return Err(StoreError::with_message(
            ErrorKind::Corrupt,
            format!(
                "truncated frame: need {} bytes, have {}",
                frame_len,
                data.len()
            ),
        ));
    }

    let crc_offset = frame_len - 4;
    let stored_crc = u32::from_le_bytes([
        data[crc_offset],
        data[crc_offset + 1],
        data[crc_offset + 2],
        data[crc_offset + 3],
    ]);
    if !verify_checksum(&data[..crc_offset], stored_crc) {
        return Err(StoreError::with_message(
            ErrorKind::ChecksumFail,
            "frame checksum mismatch",
        ));
    }

    Ok((data[4], &data[5..crc_offset], frame_len))
}

/// One document revision as laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Sequence number assigned to this revision.
    pub seq: SeqNum,
    /// Tombstone flag.
    pub deleted: bool,
    /// Document key.
    pub key: Vec<u8>,
    /// Opaque revision metadata.
    pub metadata: Vec<u8>,
    /// Document body. Empty for tombstones.
    pub body: Vec<u8>,
}

impl DocumentRecord {
    /// Serializes the record into a complete frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload =
            Vec::with_capacity(8 + 1 + 12 + self.key.len() + self.metadata.len() + self.body.len());
        payload.extend_from_slice(&self.seq.to_le_bytes());
        payload.push(if self.deleted { FLAG_TOMBSTONE } else { 0 });
        put_bytes(&mut payload, &self.key);
        put_bytes(&mut payload, &self.metadata);
        put_bytes(&mut payload, &self.body);
        encode_frame(FRAME_TAG_DOCUMENT, &payload)
    }

    /// Size of the encoded frame in bytes.
    pub fn encoded_len(&self) -> usize {
        MIN_FRAME_SIZE + 8 + 1 + 12 + self.key.len() + self.metadata.len() + self.body.len()
    }

    /// Parses a document record from a frame payload.
    pub fn decode_payload(payload: &[u8]) -> StoreResult<Self> {
        let mut input = payload;
        let seq = take_u64(&mut input)?;
        let flags = take_u8(&mut input)?;
        let key = take_bytes(&mut input)?;
        let metadata = take_bytes(&mut input)?;
        let body = take_bytes(&mut input)?;
        if !input.is_empty() {
            return Err(StoreError::with_message(
                ErrorKind::Corrupt,
                format!("{} stray bytes after document record", input.len()),
            ));
        }
        if key.is_empty() {
            return Err(StoreError::with_message(
                ErrorKind::Corrupt,
                "document record with empty key",
            ));
        }
        Ok(Self {
            seq,
            deleted: flags & FLAG_TOMBSTONE != 0,
            key,
            metadata,
            body,
        })
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn take_u8(input: &mut &[u8]) -> StoreResult<u8> {
    let (&byte, rest) = input
        .split_first()
        .ok_or_else(|| StoreError::with_message(ErrorKind::Corrupt, "record payload truncated"))?;
    *input = rest;
    Ok(byte)
}

fn take_u64(input: &mut &[u8]) -> StoreResult<u64> {
    if input.len() < 8 {
        return Err(StoreError::with_message(
            ErrorKind::Corrupt,
            "record payload truncated",
        ));
    }
    let (head, rest) = input.split_at(8);
    *input = rest;
    Ok(u64::from_le_bytes(head.try_into().expect("8-byte split")))
}

fn take_bytes(input: &mut &[u8]) -> StoreResult<Vec<u8>> {
    if input.len() < 4 {
        return Err(StoreError::with_message(
            ErrorKind::Corrupt,
            "record payload truncated",
        ));
    }
    let (head, rest) = input.split_at(4);
    let len = u32::from_le_bytes(head.try_into().expect("4-byte split")) as usize;
    if rest.len() < len {
        return Err(StoreError::with_message(
            ErrorKind::Corrupt,
            format!("length prefix {} exceeds payload", len),
        ));
    }
    let (bytes, rest) = rest.split_at(len);
    *input = rest;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DocumentRecord {
        DocumentRecord {
            seq: 42,
            deleted: false,
            key: b"user/7".to_vec(),
            metadata: b"rev-1".to_vec(),
            body: b"{\"name\":\"alice\"}".to_vec(),
        }
    }

    #[test]
    fn document_frame_roundtrip() {
        let record = sample_record();
        let frame = record.encode();
        assert_eq!(frame.len(), record.encoded_len());

        let (tag, payload, consumed) = decode_frame(&frame).unwrap();
        assert_eq!(tag, FRAME_TAG_DOCUMENT);
        assert_eq!(consumed, frame.len());
        assert_eq!(DocumentRecord::decode_payload(payload).unwrap(), record);
    }

    #[test]
    fn tombstone_roundtrip() {
        let record = DocumentRecord {
            seq: 7,
            deleted: true,
            key: b"gone".to_vec(),
            metadata: b"rev-9".to_vec(),
            body: Vec::new(),
        };
        let frame = record.encode();
        let (_, payload, _) = decode_frame(&frame).unwrap();
        let decoded = DocumentRecord::decode_payload(payload).unwrap();
        assert!(decoded.deleted);
        assert!(decoded.body.is_empty());
        assert_eq!(decoded.metadata, b"rev-9");
    }

    #[test]
    fn empty_metadata_and_body_roundtrip() {
        let record = DocumentRecord {
            seq: 1,
            deleted: false,
            key: b"k".to_vec(),
            metadata: Vec::new(),
            body: Vec::new(),
        };
        let frame = record.encode();
        let (_, payload, _) = decode_frame(&frame).unwrap();
        assert_eq!(DocumentRecord::decode_payload(payload).unwrap(), record);
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(sample_record().encode(), sample_record().encode());
    }

    #[test]
    fn bit_flip_fails_checksum() {
        let mut frame = sample_record().encode();
        let mid = frame.len() / 2;
        frame[mid] ^= 0xff;
        let err = decode_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumFail);
    }

    #[test]
    fn truncated_frame_is_corrupt() {
        let frame = sample_record().encode();
        let err = decode_frame(&frame[..frame.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn undersized_length_prefix_is_corrupt() {
        let mut frame = encode_frame(FRAME_TAG_DOCUMENT, b"x");
        frame[0..4].copy_from_slice(&3u32.to_le_bytes());
        let err = decode_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn stray_payload_bytes_are_corrupt() {
        let record = sample_record();
        let frame = record.encode();
        let (_, payload, _) = decode_frame(&frame).unwrap();
        let mut padded = payload.to_vec();
        padded.push(0);
        let err = DocumentRecord::decode_payload(&padded).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn frame_layer_passes_unknown_tags_through() {
        let frame = encode_frame(0x7f, b"future");
        let (tag, payload, _) = decode_frame(&frame).unwrap();
        assert_eq!(tag, 0x7f);
        assert_eq!(payload, b"future");
    }
}
