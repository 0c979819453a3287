//! Error taxonomy for the store.
//!
//! The taxonomy is closed: every fallible operation in this crate returns
//! success or exactly one [`ErrorKind`]. Each kind carries an integer code,
//! a symbolic name, and a human-readable description. Rendering never
//! fails; raw codes outside the taxonomy degrade to `"errno N"` instead of
//! panicking.
//!
//! Two kinds are fatal to a store handle: [`ErrorKind::FileClosed`] and
//! [`ErrorKind::DbNoLongerValid`]. After either, only `close` remains
//! legal on the handle. All other kinds leave the handle usable.

use std::fmt;
use std::io;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// Failure opening the store file.
    #[error("error opening file")]
    OpenFile,
    /// Data corruption detected in the file.
    #[error("malformed data in file")]
    Corrupt,
    /// Allocation failure inside the engine.
    #[error("out of memory")]
    AllocFail,
    /// Read failure from the underlying file.
    #[error("error reading file")]
    Read,
    /// No live document exists for the key (missing or tombstoned).
    #[error("document not found")]
    DocNotFound,
    /// The file contains no valid commit header.
    #[error("no header in file")]
    NoHeader,
    /// Write or flush failure.
    #[error("error writing to file")]
    Write,
    /// The file's disk version is not compatible with the open request.
    #[error("incompatible disk version")]
    HeaderVersion,
    /// A stored checksum did not match the data read.
    #[error("checksum fail")]
    ChecksumFail,
    /// Caller-supplied arguments were rejected.
    #[error("invalid arguments")]
    InvalidArguments,
    /// The store file does not exist.
    #[error("no such file")]
    NoSuchFile,
    /// The operation was cancelled by the engine.
    #[error("cancelled")]
    Cancel,
    /// A view reduction exceeded the engine's size limit.
    #[error("reduction too large")]
    ReductionTooLarge,
    /// A view reducer reported failure.
    #[error("reducer failure")]
    ReducerFailure,
    /// The handle was already closed.
    #[error("file closed")]
    FileClosed,
    /// The handle's underlying database is no longer usable.
    #[error("database no longer valid")]
    DbNoLongerValid,
}

impl ErrorKind {
    /// All kinds, in code order (`-1` first).
    pub const ALL: [ErrorKind; 16] = [
        ErrorKind::OpenFile,
        ErrorKind::Corrupt,
        ErrorKind::AllocFail,
        ErrorKind::Read,
        ErrorKind::DocNotFound,
        ErrorKind::NoHeader,
        ErrorKind::Write,
        ErrorKind::HeaderVersion,
        ErrorKind::ChecksumFail,
        ErrorKind::InvalidArguments,
        ErrorKind::NoSuchFile,
        ErrorKind::Cancel,
        ErrorKind::ReductionTooLarge,
        ErrorKind::ReducerFailure,
        ErrorKind::FileClosed,
        ErrorKind::DbNoLongerValid,
    ];

    /// Returns the integer code for this kind.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::OpenFile => -1,
            ErrorKind::Corrupt => -2,
            ErrorKind::AllocFail => -3,
            ErrorKind::Read => -4,
            ErrorKind::DocNotFound => -5,
            ErrorKind::NoHeader => -6,
            ErrorKind::Write => -7,
            ErrorKind::HeaderVersion => -8,
            ErrorKind::ChecksumFail => -9,
            ErrorKind::InvalidArguments => -10,
            ErrorKind::NoSuchFile => -11,
            ErrorKind::Cancel => -12,
            ErrorKind::ReductionTooLarge => -13,
            ErrorKind::ReducerFailure => -14,
            ErrorKind::FileClosed => -15,
            ErrorKind::DbNoLongerValid => -16,
        }
    }

    /// Returns the symbolic name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::OpenFile => "CASK_ERROR_OPEN_FILE",
            ErrorKind::Corrupt => "CASK_ERROR_CORRUPT",
            ErrorKind::AllocFail => "CASK_ERROR_ALLOC_FAIL",
            ErrorKind::Read => "CASK_ERROR_READ",
            ErrorKind::DocNotFound => "CASK_ERROR_DOC_NOT_FOUND",
            ErrorKind::NoHeader => "CASK_ERROR_NO_HEADER",
            ErrorKind::Write => "CASK_ERROR_WRITE",
            ErrorKind::HeaderVersion => "CASK_ERROR_HEADER_VERSION",
            ErrorKind::ChecksumFail => "CASK_ERROR_CHECKSUM_FAIL",
            ErrorKind::InvalidArguments => "CASK_ERROR_INVALID_ARGUMENTS",
            ErrorKind::NoSuchFile => "CASK_ERROR_NO_SUCH_FILE",
            ErrorKind::Cancel => "CASK_ERROR_CANCEL",
            ErrorKind::ReductionTooLarge => "CASK_ERROR_REDUCTION_TOO_LARGE",
            ErrorKind::ReducerFailure => "CASK_ERROR_REDUCER_FAILURE",
            ErrorKind::FileClosed => "CASK_ERROR_FILE_CLOSED",
            ErrorKind::DbNoLongerValid => "CASK_ERROR_DB_NO_LONGER_VALID",
        }
    }

    /// Looks up a kind by integer code.
    pub fn from_code(code: i32) -> Option<ErrorKind> {
        ErrorKind::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// Returns whether this kind permanently invalidates the handle.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::FileClosed | ErrorKind::DbNoLongerValid)
    }
}

/// Renders a raw integer code to a stable, non-empty string.
///
/// Unknown codes render as `"errno N"` rather than failing.
pub fn describe_code(code: i32) -> String {
    match ErrorKind::from_code(code) {
        Some(kind) => kind.name().to_string(),
        None => format!("errno {}", code),
    }
}

/// Error type returned by every fallible store operation.
///
/// Carries the taxonomy kind, a message with operation context, and the
/// underlying I/O error where one exists.
#[derive(Debug)]
pub struct StoreError {
    kind: ErrorKind,
    message: String,
    source: Option<io::Error>,
}

impl StoreError {
    /// Creates an error of the given kind with its default description.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.to_string(),
            source: None,
        }
    }

    /// Creates an error of the given kind with a contextual message.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error of the given kind wrapping an I/O error.
    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: io::Error) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns the taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the integer code of the kind.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Returns the contextual message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether this error permanently invalidates the handle.
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl From<ErrorKind> for StoreError {
    fn from(kind: ErrorKind) -> Self {
        StoreError::new(kind)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_dense_and_negative() {
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.code(), -(i as i32) - 1);
        }
    }

    #[test]
    fn from_code_roundtrips() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(0), None);
        assert_eq!(ErrorKind::from_code(-17), None);
        assert_eq!(ErrorKind::from_code(1), None);
    }

    #[test]
    fn every_kind_renders_non_empty() {
        for kind in ErrorKind::ALL {
            assert!(!kind.name().is_empty());
            assert!(!kind.to_string().is_empty());
            assert!(!describe_code(kind.code()).is_empty());
        }
    }

    #[test]
    fn unknown_code_renders_errno_fallback() {
        assert_eq!(describe_code(-99), "errno -99");
        assert_eq!(describe_code(42), "errno 42");
    }

    #[test]
    fn only_handle_invalidating_kinds_are_fatal() {
        for kind in ErrorKind::ALL {
            let fatal = matches!(kind, ErrorKind::FileClosed | ErrorKind::DbNoLongerValid);
            assert_eq!(kind.is_fatal(), fatal, "{:?}", kind);
        }
    }

    #[test]
    fn error_display_includes_name_and_message() {
        let err = StoreError::with_message(ErrorKind::Write, "fsync failed during commit");
        let rendered = err.to_string();
        assert!(rendered.contains("CASK_ERROR_WRITE"));
        assert!(rendered.contains("fsync failed during commit"));
    }

    #[test]
    fn error_source_is_preserved() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk full");
        let err = StoreError::with_source(ErrorKind::Write, "append failed", io_err);
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("disk full"));
    }
}
