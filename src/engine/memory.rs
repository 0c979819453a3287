//! Heap-backed engine for tests and embedding.
//!
//! Holds every revision in a `HashMap` and observes the same contract
//! as the file engine: latest revision wins, tombstones occupy key
//! slots without being found, sequence numbers only grow. Flushing is
//! a no-op (there is no durability to provide), but compaction writes a
//! real store file that [`FileEngine`](super::FileEngine) can open.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use super::header::{CommitHeader, DISK_VERSION_LATEST, HEADER_FRAME_LEN};
use super::record::DocumentRecord;
use super::{Engine, EngineStat, Revision};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::SeqNum;

#[derive(Debug, Clone)]
struct StoredRevision {
    seq: SeqNum,
    metadata: Vec<u8>,
    body: Vec<u8>,
    deleted: bool,
}

/// In-memory storage engine.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    revisions: HashMap<Vec<u8>, StoredRevision>,
    last_seq: SeqNum,
}

impl MemoryEngine {
    /// Creates an empty in-memory engine.
    pub fn new() -> Self {
        Self::default()
    }

    fn encoded_record(key: &[u8], revision: &StoredRevision) -> DocumentRecord {
        DocumentRecord {
            seq: revision.seq,
            deleted: revision.deleted,
            key: key.to_vec(),
            metadata: revision.metadata.clone(),
            body: revision.body.clone(),
        }
    }
}

impl Engine for MemoryEngine {
    fn save(
        &mut self,
        key: &[u8],
        metadata: &[u8],
        body: &[u8],
        deleted: bool,
    ) -> StoreResult<SeqNum> {
        if key.is_empty() {
            return Err(StoreError::with_message(
                ErrorKind::InvalidArguments,
                "document key must not be empty",
            ));
        }
        self.last_seq += 1;
        self.revisions.insert(
            key.to_vec(),
            StoredRevision {
                seq: self.last_seq,
                metadata: metadata.to_vec(),
                body: body.to_vec(),
                deleted,
            },
        );
        Ok(self.last_seq)
    }

    fn load(&mut self, key: &[u8]) -> StoreResult<Revision> {
        match self.revisions.get(key) {
            Some(revision) if !revision.deleted => Ok(Revision {
                metadata: revision.metadata.clone(),
                body: revision.body.clone(),
                deleted: revision.deleted,
            }),
            _ => Err(StoreError::new(ErrorKind::DocNotFound)),
        }
    }

    fn flush(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn compact(&mut self, new_path: &Path) -> StoreResult<()> {
        let dest = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(new_path)
            .map_err(|e| {
                StoreError::with_source(
                    ErrorKind::Write,
                    format!("cannot create compaction target {}", new_path.display()),
                    e,
                )
            })?;
        let mut dest = std::io::BufWriter::new(dest);

        let mut records: Vec<DocumentRecord> = self
            .revisions
            .iter()
            .map(|(key, revision)| Self::encoded_record(key, revision))
            .collect();
        records.sort_by_key(|record| record.seq);

        let mut record_bytes = 0u64;
        for record in &records {
            let frame = record.encode();
            dest.write_all(&frame).map_err(|e| {
                StoreError::with_source(ErrorKind::Write, "compaction record write failed", e)
            })?;
            record_bytes += frame.len() as u64;
        }

        let stat = self.stat()?;
        let header = CommitHeader {
            disk_version: DISK_VERSION_LATEST,
            last_seq: self.last_seq,
            doc_count: stat.doc_count,
            deleted_count: stat.deleted_count,
            space_used: record_bytes + HEADER_FRAME_LEN as u64,
        };
        dest.write_all(&header.encode()).map_err(|e| {
            StoreError::with_source(ErrorKind::Write, "compaction header write failed", e)
        })?;
        dest.flush().map_err(|e| {
            StoreError::with_source(ErrorKind::Write, "compaction flush failed", e)
        })?;
        dest.get_ref().sync_all().map_err(|e| {
            StoreError::with_source(ErrorKind::Write, "compaction sync failed", e)
        })?;

        Ok(())
    }

    fn stat(&self) -> StoreResult<EngineStat> {
        let mut doc_count = 0;
        let mut deleted_count = 0;
        let mut record_bytes = 0u64;
        for (key, revision) in &self.revisions {
            if revision.deleted {
                deleted_count += 1;
            } else {
                doc_count += 1;
            }
            record_bytes += Self::encoded_record(key, revision).encoded_len() as u64;
        }
        let space_used = record_bytes + HEADER_FRAME_LEN as u64;
        Ok(EngineStat {
            last_seq: self.last_seq,
            space_used,
            file_size: space_used,
            doc_count,
            deleted_count,
        })
    }

    fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FileEngine;
    use crate::store::OpenFlags;
    use tempfile::TempDir;

    #[test]
    fn save_load_roundtrip() {
        let mut engine = MemoryEngine::new();
        let seq = engine.save(b"key1", b"meta", b"value1", false).unwrap();
        assert_eq!(seq, 1);

        let revision = engine.load(b"key1").unwrap();
        assert_eq!(revision.body, b"value1");
        assert_eq!(revision.metadata, b"meta");
    }

    #[test]
    fn tombstone_hides_key_but_counts() {
        let mut engine = MemoryEngine::new();
        engine.save(b"key1", b"", b"value1", false).unwrap();
        engine.save(b"key1", b"", b"", true).unwrap();

        assert_eq!(
            engine.load(b"key1").unwrap_err().kind(),
            ErrorKind::DocNotFound
        );
        let stat = engine.stat().unwrap();
        assert_eq!(stat.doc_count, 0);
        assert_eq!(stat.deleted_count, 1);
        assert_eq!(stat.last_seq, 2);
    }

    #[test]
    fn sequence_numbers_keep_growing_across_overwrites() {
        let mut engine = MemoryEngine::new();
        assert_eq!(engine.save(b"a", b"", b"1", false).unwrap(), 1);
        assert_eq!(engine.save(b"a", b"", b"2", false).unwrap(), 2);
        assert_eq!(engine.save(b"b", b"", b"3", false).unwrap(), 3);
    }

    #[test]
    fn compaction_output_opens_as_file_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory-compact.cask");

        let mut engine = MemoryEngine::new();
        engine.save(b"key1", b"m1", b"value1", false).unwrap();
        engine.save(b"key2", b"m2", b"value2", false).unwrap();
        engine.save(b"key2", b"", b"", true).unwrap();
        engine.compact(&path).unwrap();

        let mut file = FileEngine::open(&path, OpenFlags::NONE).unwrap();
        assert_eq!(file.load(b"key1").unwrap().body, b"value1");
        assert_eq!(
            file.load(b"key2").unwrap_err().kind(),
            ErrorKind::DocNotFound
        );
        let stat = file.stat().unwrap();
        assert_eq!(stat.doc_count, 1);
        assert_eq!(stat.deleted_count, 1);
        assert_eq!(stat.last_seq, 3);
    }
}
