//! Aggregate store statistics.

/// Sequence number assigned to each successful mutation.
pub type SeqNum = u64;

/// Read-only snapshot of aggregate store statistics.
///
/// Computed on demand from the engine and never cached: a snapshot is
/// stale the instant another mutation occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseInfo {
    last_seq_number: SeqNum,
    space_used: u64,
    file_size: u64,
    document_count: u64,
    deleted_count: u64,
}

impl DatabaseInfo {
    pub(crate) fn new(
        last_seq_number: SeqNum,
        space_used: u64,
        file_size: u64,
        document_count: u64,
        deleted_count: u64,
    ) -> Self {
        Self {
            last_seq_number,
            space_used,
            file_size,
            document_count,
            deleted_count,
        }
    }

    /// Sequence number of the most recent mutation.
    pub fn last_seq_number(&self) -> SeqNum {
        self.last_seq_number
    }

    /// Bytes occupied by current revisions and bookkeeping.
    pub fn space_used(&self) -> u64 {
        self.space_used
    }

    /// Total file size in bytes. Always at least [`space_used`]; the
    /// difference is reclaimable through compaction.
    ///
    /// [`space_used`]: DatabaseInfo::space_used
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of live (non-tombstoned) keys.
    pub fn document_count(&self) -> u64 {
        self.document_count
    }

    /// Number of tombstoned keys still retained in the file.
    pub fn deleted_count(&self) -> u64 {
        self.deleted_count
    }
}
