//! Default append-only, single-file storage engine.
//!
//! One file holds a flat sequence of checksummed frames: document
//! records and commit headers. The engine never updates in place;
//! a later record for the same key supersedes the earlier one, and a
//! tombstone record is preserved like any other revision until
//! compaction rewrites the file.
//!
//! Durability follows the commit headers. Saves are buffered; `flush`
//! pushes the buffered records to disk, fsyncs, appends a commit
//! header, and fsyncs again. On open the file is scanned front to back:
//! the last frame-valid commit header defines the committed state, and
//! any trailing torn or uncommitted region is ignored; the write
//! cursor is positioned at the committed end so subsequent appends
//! reclaim it.
//!
//! The key index is held in memory and rebuilt by the open scan.
//! Positioned reads re-verify the record checksum every time.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::header::{
    CommitHeader, DISK_VERSION_LATEST, DISK_VERSION_LEGACY, HEADER_FRAME_LEN,
};
use super::record::{
    decode_frame, DocumentRecord, FRAME_TAG_DOCUMENT, FRAME_TAG_HEADER, MIN_FRAME_SIZE,
};
use super::{Engine, EngineStat, Revision};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::{OpenFlags, SeqNum};

const DEFAULT_SCAN_BUFFER: usize = 8 * 1024;
const MAX_SCAN_BUFFER: usize = 8 * 1024 * 1024;

/// Index entry for the current revision of one key.
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    frame_len: u32,
    deleted: bool,
}

/// In-memory index plus the bookkeeping derived from it.
#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<Vec<u8>, IndexEntry>,
    last_seq: SeqNum,
    doc_count: u64,
    deleted_count: u64,
    /// Bytes of current document records (live and tombstoned).
    record_bytes: u64,
}

impl IndexState {
    /// Applies one record, superseding any earlier revision of the key.
    fn apply(&mut self, key: &[u8], seq: SeqNum, deleted: bool, offset: u64, frame_len: u32) {
        if let Some(old) = self.entries.get(key) {
            self.record_bytes -= old.frame_len as u64;
            if old.deleted {
                self.deleted_count -= 1;
            } else {
                self.doc_count -= 1;
            }
        }
        self.entries.insert(
            key.to_vec(),
            IndexEntry {
                offset,
                frame_len,
                deleted,
            },
        );
        self.record_bytes += frame_len as u64;
        if deleted {
            self.deleted_count += 1;
        } else {
            self.doc_count += 1;
        }
        if seq > self.last_seq {
            self.last_seq = seq;
        }
    }
}

/// Write half of the engine: buffered by default, direct under
/// `UNBUFFERED`.
#[derive(Debug)]
enum Writer {
    Buffered(BufWriter<File>),
    Direct(File),
}

impl Writer {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Writer::Buffered(w) => w.write_all(buf),
            Writer::Direct(f) => f.write_all(buf),
        }
    }

    /// Pushes buffered bytes to the OS without forcing them to disk.
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Buffered(w) => w.flush(),
            Writer::Direct(_) => Ok(()),
        }
    }

    /// Flushes and then forces everything to physical storage.
    fn sync(&mut self) -> io::Result<()> {
        match self {
            Writer::Buffered(w) => {
                w.flush()?;
                w.get_ref().sync_all()
            }
            Writer::Direct(f) => f.sync_all(),
        }
    }
}

/// The default single-file engine.
#[derive(Debug)]
pub struct FileEngine {
    path: PathBuf,
    /// `None` when the store was opened read-only.
    writer: Option<Writer>,
    reader: File,
    scan_buffer: usize,
    disk_version: u32,
    read_only: bool,
    periodic_sync: Option<u64>,
    bytes_since_sync: u64,
    /// Logical end of file; the next append lands here.
    end_offset: u64,
    /// Everything below this offset has been handed to the OS.
    flushed_offset: u64,
    /// End of the last durable commit header.
    committed_offset: u64,
    has_header: bool,
    state: IndexState,
}

impl FileEngine {
    /// Opens (or, with `CREATE`, creates) the store file at `path`.
    pub fn open(path: &Path, flags: OpenFlags) -> StoreResult<Self> {
        let read_only = flags.contains(OpenFlags::RDONLY);
        let create = flags.contains(OpenFlags::CREATE);
        let exists = path.exists();

        if !exists && !create {
            return Err(StoreError::with_message(
                ErrorKind::NoSuchFile,
                format!("no store file at {}", path.display()),
            ));
        }

        let scan_buffer = flags
            .buffer_config()
            .map(|c| c.capacity.saturating_mul(c.count).min(MAX_SCAN_BUFFER))
            .unwrap_or(DEFAULT_SCAN_BUFFER);

        let mut engine = Self {
            path: path.to_path_buf(),
            writer: None,
            reader: open_read_handle(path, exists, create)?,
            scan_buffer,
            disk_version: if flags.contains(OpenFlags::LEGACY_CRC) {
                DISK_VERSION_LEGACY
            } else {
                DISK_VERSION_LATEST
            },
            read_only,
            periodic_sync: flags.periodic_sync_bytes(),
            bytes_since_sync: 0,
            end_offset: 0,
            flushed_offset: 0,
            committed_offset: 0,
            has_header: false,
            state: IndexState::default(),
        };

        let file_len = engine.recover(flags)?;

        if !read_only {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    StoreError::with_source(
                        ErrorKind::OpenFile,
                        format!("cannot open {} for writing", path.display()),
                        e,
                    )
                })?;
            file.seek(SeekFrom::Start(engine.committed_offset))
                .map_err(|e| {
                    StoreError::with_source(ErrorKind::OpenFile, "cannot position write cursor", e)
                })?;
            engine.writer = Some(if flags.contains(OpenFlags::UNBUFFERED) {
                Writer::Direct(file)
            } else {
                match flags.buffer_config() {
                    Some(config) => {
                        Writer::Buffered(BufWriter::with_capacity(config.capacity, file))
                    }
                    None => Writer::Buffered(BufWriter::new(file)),
                }
            });
        }

        engine.end_offset = engine.committed_offset;
        engine.flushed_offset = engine.committed_offset;

        if file_len == 0 && !read_only {
            // Fresh (or still empty) file: initialize it with an empty
            // commit header so the store is immediately valid.
            engine.write_commit_header()?;
        }

        Ok(engine)
    }

    /// Scans the file, validates the header against the open flags, and
    /// rebuilds the index up to the last committed offset. Returns the
    /// physical file length.
    fn recover(&mut self, flags: OpenFlags) -> StoreResult<u64> {
        let file_len = self
            .reader
            .metadata()
            .map_err(|e| StoreError::with_source(ErrorKind::OpenFile, "cannot stat store file", e))?
            .len();
        if file_len == 0 {
            return Ok(0);
        }

        // Pass 1: locate the last frame-valid commit header. A torn or
        // partially written tail ends the scan; everything before the
        // last header is the committed region.
        let mut last_header: Option<(CommitHeader, u64)> = None;
        {
            let mut scanner = FrameScanner::new(&self.path, self.scan_buffer, file_len)?;
            while let Some((tag, frame, end)) = scanner.next_frame()? {
                if tag == FRAME_TAG_HEADER {
                    let (_, payload, _) = decode_frame(&frame)?;
                    match CommitHeader::decode_payload(payload) {
                        Ok(header) => last_header = Some((header, end)),
                        Err(err) if err.kind() == ErrorKind::HeaderVersion => return Err(err),
                        // A damaged header ends the trustworthy region.
                        Err(_) => break,
                    }
                }
            }
        }

        let Some((header, committed_end)) = last_header else {
            return Ok(file_len);
        };

        if flags.contains(OpenFlags::LEGACY_CRC) && header.disk_version != DISK_VERSION_LEGACY {
            return Err(StoreError::with_message(
                ErrorKind::HeaderVersion,
                format!(
                    "legacy checksum requested but file has disk version {}",
                    header.disk_version
                ),
            ));
        }
        self.disk_version = header.disk_version;
        self.has_header = true;
        self.committed_offset = committed_end;

        // Pass 2: rebuild the key index from the committed region.
        let mut scanner = FrameScanner::new(&self.path, self.scan_buffer, committed_end)?;
        while let Some((tag, frame, end)) = scanner.next_frame()? {
            if tag != FRAME_TAG_DOCUMENT {
                continue;
            }
            let (_, payload, frame_len) = decode_frame(&frame)?;
            let record = DocumentRecord::decode_payload(payload)?;
            self.state.apply(
                &record.key,
                record.seq,
                record.deleted,
                end - frame_len as u64,
                frame_len as u32,
            );
        }

        Ok(file_len)
    }

    fn writer(&mut self) -> StoreResult<&mut Writer> {
        match self.writer {
            Some(ref mut writer) => Ok(writer),
            None => Err(StoreError::with_message(
                ErrorKind::Write,
                "store is opened read-only",
            )),
        }
    }

    /// Appends a commit header and makes everything before it durable.
    fn write_commit_header(&mut self) -> StoreResult<()> {
        let header = CommitHeader {
            disk_version: self.disk_version,
            last_seq: self.state.last_seq,
            doc_count: self.state.doc_count,
            deleted_count: self.state.deleted_count,
            space_used: self.state.record_bytes + HEADER_FRAME_LEN as u64,
        };
        let frame = header.encode();

        let writer = self.writer()?;
        writer
            .sync()
            .map_err(|e| StoreError::with_source(ErrorKind::Write, "pre-commit sync failed", e))?;
        writer
            .write_all(&frame)
            .map_err(|e| StoreError::with_source(ErrorKind::Write, "commit header write failed", e))?;
        writer
            .sync()
            .map_err(|e| StoreError::with_source(ErrorKind::Write, "commit sync failed", e))?;

        self.end_offset += frame.len() as u64;
        self.flushed_offset = self.end_offset;
        self.committed_offset = self.end_offset;
        self.has_header = true;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Reads and re-verifies the frame behind an index entry.
    fn read_record(&mut self, entry: IndexEntry) -> StoreResult<DocumentRecord> {
        if entry.offset + entry.frame_len as u64 > self.flushed_offset {
            if let Some(ref mut writer) = self.writer {
                writer.flush().map_err(|e| {
                    StoreError::with_source(ErrorKind::Write, "flush before read failed", e)
                })?;
            }
            self.flushed_offset = self.end_offset;
        }

        let mut frame = vec![0u8; entry.frame_len as usize];
        self.reader
            .seek(SeekFrom::Start(entry.offset))
            .map_err(|e| StoreError::with_source(ErrorKind::Read, "seek failed", e))?;
        self.reader.read_exact(&mut frame).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                StoreError::with_message(
                    ErrorKind::DbNoLongerValid,
                    "store file shrank beneath indexed data",
                )
            } else {
                StoreError::with_source(ErrorKind::Read, "record read failed", e)
            }
        })?;

        let (tag, payload, _) = decode_frame(&frame)?;
        if tag != FRAME_TAG_DOCUMENT {
            return Err(StoreError::with_message(
                ErrorKind::Corrupt,
                "index offset does not hold a document record",
            ));
        }
        DocumentRecord::decode_payload(payload)
    }
}

impl Engine for FileEngine {
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

        let seq = self.state.last_seq + 1;
        let record = DocumentRecord {
            seq,
            deleted,
            key: key.to_vec(),
            metadata: metadata.to_vec(),
            body: body.to_vec(),
        };
        let frame = record.encode();
        let offset = self.end_offset;

        self.writer()?.write_all(&frame).map_err(|e| {
            StoreError::with_source(ErrorKind::Write, "record append failed", e)
        })?;

        self.end_offset += frame.len() as u64;
        self.state.apply(key, seq, deleted, offset, frame.len() as u32);

        if let Some(interval) = self.periodic_sync {
            self.bytes_since_sync += frame.len() as u64;
            if self.bytes_since_sync >= interval {
                self.writer()?.sync().map_err(|e| {
                    StoreError::with_source(ErrorKind::Write, "periodic sync failed", e)
                })?;
                self.flushed_offset = self.end_offset;
                self.bytes_since_sync = 0;
            }
        }

        Ok(seq)
    }

    fn load(&mut self, key: &[u8]) -> StoreResult<Revision> {
        let entry = match self.state.entries.get(key) {
            Some(entry) if !entry.deleted => *entry,
            // Tombstones occupy the key slot but are not found.
            _ => return Err(StoreError::new(ErrorKind::DocNotFound)),
        };

        let record = self.read_record(entry)?;
        if record.key != key {
            return Err(StoreError::with_message(
                ErrorKind::Corrupt,
                "index offset holds a record for a different key",
            ));
        }
        Ok(Revision {
            metadata: record.metadata,
            body: record.body,
            deleted: record.deleted,
        })
    }

    fn flush(&mut self) -> StoreResult<()> {
        self.write_commit_header()
    }

    fn compact(&mut self, new_path: &Path) -> StoreResult<()> {
        // Compaction consumes the read-your-writes state, so pending
        // buffered records must be visible to the positioned reads.
        if self.flushed_offset < self.end_offset {
            if let Some(ref mut writer) = self.writer {
                writer.flush().map_err(|e| {
                    StoreError::with_source(ErrorKind::Write, "flush before compaction failed", e)
                })?;
            }
            self.flushed_offset = self.end_offset;
        }

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
        let mut dest = BufWriter::with_capacity(self.scan_buffer, dest);

        // Current revisions in file order, tombstones included;
        // superseded revisions and dead space stay behind.
        let mut entries: Vec<IndexEntry> = self.state.entries.values().copied().collect();
        entries.sort_by_key(|entry| entry.offset);

        let mut record_bytes = 0u64;
        for entry in entries {
            let record = self.read_record(entry)?;
            let frame = record.encode();
            dest.write_all(&frame).map_err(|e| {
                StoreError::with_source(ErrorKind::Write, "compaction record write failed", e)
            })?;
            record_bytes += frame.len() as u64;
        }

        let header = CommitHeader {
            disk_version: self.disk_version,
            last_seq: self.state.last_seq,
            doc_count: self.state.doc_count,
            deleted_count: self.state.deleted_count,
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
        if !self.has_header {
            return Err(StoreError::with_message(
                ErrorKind::NoHeader,
                format!("{} has no valid commit header", self.path.display()),
            ));
        }
        Ok(EngineStat {
            last_seq: self.state.last_seq,
            space_used: self.state.record_bytes + HEADER_FRAME_LEN as u64,
            file_size: self.end_offset,
            doc_count: self.state.doc_count,
            deleted_count: self.state.deleted_count,
        })
    }

    fn close(&mut self) -> StoreResult<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().map_err(|e| {
                StoreError::with_source(ErrorKind::Write, "flush on close failed", e)
            })?;
        }
        self.writer = None;
        Ok(())
    }
}

fn open_read_handle(path: &Path, exists: bool, create: bool) -> StoreResult<File> {
    if !exists && create {
        // Create through a separate handle so the read handle below can
        // be plain read-only.
        OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| {
                StoreError::with_source(
                    ErrorKind::OpenFile,
                    format!("cannot create {}", path.display()),
                    e,
                )
            })?;
    }
    File::open(path).map_err(|e| {
        let kind = if e.kind() == io::ErrorKind::NotFound {
            ErrorKind::NoSuchFile
        } else {
            ErrorKind::OpenFile
        };
        StoreError::with_source(kind, format!("cannot open {}", path.display()), e)
    })
}

/// Sequential frame reader used by the open scan and recovery passes.
///
/// Yields `(tag, frame bytes, end offset)` per frame and stops cleanly
/// at the first torn or truncated frame.
struct FrameScanner {
    reader: BufReader<File>,
    offset: u64,
    limit: u64,
}

impl FrameScanner {
    fn new(path: &Path, capacity: usize, limit: u64) -> StoreResult<Self> {
        let file = File::open(path).map_err(|e| {
            StoreError::with_source(
                ErrorKind::OpenFile,
                format!("cannot open {} for scanning", path.display()),
                e,
            )
        })?;
        Ok(Self {
            reader: BufReader::with_capacity(capacity, file),
            offset: 0,
            limit,
        })
    }

    fn next_frame(&mut self) -> StoreResult<Option<(u8, Vec<u8>, u64)>> {
        if self.offset + MIN_FRAME_SIZE as u64 > self.limit {
            return Ok(None);
        }

        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(StoreError::with_source(ErrorKind::Read, "scan read failed", e))
            }
        }
        let frame_len = u32::from_le_bytes(len_buf) as u64;
        if frame_len < MIN_FRAME_SIZE as u64 || self.offset + frame_len > self.limit {
            // Torn tail: a length field that cannot fit a real frame.
            return Ok(None);
        }

        let mut frame = vec![0u8; frame_len as usize];
        frame[..4].copy_from_slice(&len_buf);
        match self.reader.read_exact(&mut frame[4..]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(StoreError::with_source(ErrorKind::Read, "scan read failed", e))
            }
        }

        match decode_frame(&frame) {
            Ok((tag, _, consumed)) => {
                self.offset += consumed as u64;
                Ok(Some((tag, frame, self.offset)))
            }
            // A frame that fails its checksum ends the trustworthy
            // region; everything before it stands.
            Err(_) => Ok(None),
        }
    }
}
