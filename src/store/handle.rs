//! The store handle.
//!
//! A [`Store`] owns exactly one open engine for its lifetime and is the
//! only way callers reach it. All operations are synchronous and must
//! be serialized by the caller; the handle is `Send` but deliberately
//! not `Sync`.
//!
//! Lifecycle: a handle is `Open` from a successful [`Store::open`] until
//! [`Store::close`]. If any operation reports
//! `CASK_ERROR_DB_NO_LONGER_VALID` the handle is poisoned: every later
//! operation except `close` repeats that error. A closed handle answers
//! everything with `CASK_ERROR_FILE_CLOSED`.

use std::path::Path;

use super::flags::OpenFlags;
use super::info::{DatabaseInfo, SeqNum};
use crate::document::Document;
use crate::engine::{Engine, FileEngine};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::observability::{Logger, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Open,
    Poisoned,
    Closed,
}

/// Handle over one open document store.
#[derive(Debug)]
pub struct Store {
    engine: Box<dyn Engine>,
    label: String,
    state: HandleState,
}

impl Store {
    /// Opens the store file at `path` with the default file engine.
    ///
    /// # Errors
    ///
    /// `CASK_ERROR_NO_SUCH_FILE` when the file is absent and `CREATE`
    /// was not requested, `CASK_ERROR_OPEN_FILE` on I/O refusal, and
    /// `CASK_ERROR_HEADER_VERSION` when the file's disk version is
    /// incompatible with the requested flags.
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> StoreResult<Store> {
        let path = path.as_ref();
        let label = path.display().to_string();
        match FileEngine::open(path, flags) {
            Ok(engine) => {
                Logger::log(
                    Severity::Info,
                    "store_open",
                    &[("path", &label), ("flags", &format!("{:#x}", flags.bits()))],
                );
                Ok(Store {
                    engine: Box::new(engine),
                    label,
                    state: HandleState::Open,
                })
            }
            Err(err) => {
                Logger::log(
                    Severity::Error,
                    "store_open_failed",
                    &[("path", &label), ("error", &err.to_string())],
                );
                Err(err)
            }
        }
    }

    /// Wraps an already-constructed engine in a handle.
    ///
    /// This is how the in-memory engine (or a custom one) is driven
    /// through the same surface as a file store.
    pub fn with_engine(engine: impl Engine + 'static) -> Store {
        Store {
            engine: Box::new(engine),
            label: "<engine>".to_string(),
            state: HandleState::Open,
        }
    }

    /// Whether the handle is still open and usable.
    pub fn is_open(&self) -> bool {
        self.state == HandleState::Open
    }

    /// Inserts or overwrites the document at its key, assigning the
    /// next sequence number. Buffered until [`commit`](Store::commit).
    pub fn set(&mut self, doc: &Document) -> StoreResult<SeqNum> {
        self.run(|engine| engine.save(doc.key(), doc.metadata(), doc.body(), doc.is_deleted()))
    }

    /// Looks up `doc`'s key and replaces its metadata, body, and
    /// tombstone flag with the stored revision.
    ///
    /// Missing and tombstoned keys both fail with
    /// `CASK_ERROR_DOC_NOT_FOUND`. Uncommitted writes on this handle
    /// are visible.
    pub fn get(&mut self, doc: &mut Document) -> StoreResult<()> {
        let revision = self.run(|engine| engine.load(doc.key()))?;
        doc.apply_revision(revision.metadata, revision.body, revision.deleted);
        Ok(())
    }

    /// Marks `doc` as a tombstone and writes it, consuming a sequence
    /// number.
    ///
    /// Deleting a key that does not exist is not an error; the
    /// tombstone is written unconditionally.
    pub fn delete(&mut self, doc: &mut Document) -> StoreResult<SeqNum> {
        doc.mark_deleted();
        self.set(doc)
    }

    /// Forces all buffered mutations to durable storage.
    pub fn commit(&mut self) -> StoreResult<()> {
        match self.run(|engine| engine.flush()) {
            Ok(()) => {
                Logger::log(Severity::Trace, "store_commit", &[("path", &self.label)]);
                Ok(())
            }
            Err(err) => {
                Logger::log(
                    Severity::Error,
                    "store_commit_failed",
                    &[("path", &self.label), ("error", &err.to_string())],
                );
                Err(err)
            }
        }
    }

    /// Rewrites current revisions into a fresh store file at
    /// `new_path`, reclaiming space from superseded revisions.
    ///
    /// The handle's own file is left untouched; swapping files is the
    /// caller's decision.
    pub fn compact(&mut self, new_path: impl AsRef<Path>) -> StoreResult<()> {
        let new_path = new_path.as_ref();
        let target = new_path.display().to_string();
        self.run(|engine| engine.compact(new_path))?;
        Logger::log(
            Severity::Info,
            "store_compact",
            &[("path", &self.label), ("target", &target)],
        );
        Ok(())
    }

    /// Returns a statistics snapshot. Never cached; stale the moment
    /// another mutation occurs.
    pub fn info(&mut self) -> StoreResult<DatabaseInfo> {
        let stat = self.run(|engine| engine.stat())?;
        Ok(DatabaseInfo::new(
            stat.last_seq,
            stat.space_used,
            stat.file_size,
            stat.doc_count,
            stat.deleted_count,
        ))
    }

    /// Releases the underlying resource.
    ///
    /// A second `close`, like any other operation on a closed handle,
    /// fails with `CASK_ERROR_FILE_CLOSED`.
    pub fn close(&mut self) -> StoreResult<()> {
        if self.state == HandleState::Closed {
            return Err(StoreError::with_message(
                ErrorKind::FileClosed,
                "store already closed",
            ));
        }
        self.state = HandleState::Closed;
        let result = self.engine.close();
        Logger::log(Severity::Info, "store_close", &[("path", &self.label)]);
        result
    }

    /// Runs one engine operation under the handle state machine.
    fn run<T>(&mut self, op: impl FnOnce(&mut dyn Engine) -> StoreResult<T>) -> StoreResult<T> {
        match self.state {
            HandleState::Open => {}
            HandleState::Closed => {
                return Err(StoreError::with_message(
                    ErrorKind::FileClosed,
                    "store is closed",
                ))
            }
            HandleState::Poisoned => {
                return Err(StoreError::with_message(
                    ErrorKind::DbNoLongerValid,
                    "store was invalidated by an earlier failure",
                ))
            }
        }

        let result = op(self.engine.as_mut());
        if let Err(ref err) = result {
            if err.kind() == ErrorKind::DbNoLongerValid {
                self.state = HandleState::Poisoned;
                Logger::log(
                    Severity::Fatal,
                    "store_invalidated",
                    &[("path", &self.label), ("error", &err.to_string())],
                );
            }
        }
        result
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.state != HandleState::Closed {
            let _ = self.engine.close();
        }
    }
}
