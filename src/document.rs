//! In-memory document model.
//!
//! A [`Document`] is a value object: it owns its key, revision metadata,
//! and body buffers outright. Bytes are copied in at construction and
//! borrowed out by the accessors, so a document retrieved from a store
//! stays valid after the handle that produced it is closed.
//!
//! Documents carry no mutation surface of their own. The store fills in
//! the stored revision on `get` and raises the tombstone flag on
//! `delete`; nothing else changes a constructed document.

use crate::errors::{ErrorKind, StoreError, StoreResult};

/// A keyed document: key, revision metadata, body, and tombstone flag.
///
/// An empty body is a legal value, distinct from "no document". A
/// document with the tombstone flag raised occupies a key slot and a
/// sequence number but has no live body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    key: Vec<u8>,
    metadata: Vec<u8>,
    body: Vec<u8>,
    deleted: bool,
}

impl Document {
    /// Constructs a document from key, revision metadata, and body.
    ///
    /// The key must be non-empty; metadata and body may be empty.
    ///
    /// # Errors
    ///
    /// Returns `CASK_ERROR_INVALID_ARGUMENTS` for an empty key.
    pub fn new(
        key: impl Into<Vec<u8>>,
        metadata: impl Into<Vec<u8>>,
        body: impl Into<Vec<u8>>,
    ) -> StoreResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(StoreError::with_message(
                ErrorKind::InvalidArguments,
                "document key must not be empty",
            ));
        }
        Ok(Self {
            key,
            metadata: metadata.into(),
            body: body.into(),
            deleted: false,
        })
    }

    /// Constructs a lookup probe carrying only a key.
    ///
    /// Equivalent to `Document::new(key, [], [])`; the store fills in the
    /// stored revision on `get`.
    pub fn with_key(key: impl Into<Vec<u8>>) -> StoreResult<Self> {
        Self::new(key, Vec::new(), Vec::new())
    }

    /// The document key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The revision metadata. Opaque to the store.
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// The document body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether this document is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Consumes the document, returning its body buffer.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Replaces the revision state with what the engine returned.
    pub(crate) fn apply_revision(&mut self, metadata: Vec<u8>, body: Vec<u8>, deleted: bool) {
        self.metadata = metadata;
        self.body = body;
        self.deleted = deleted;
    }

    /// Raises the tombstone flag. Tombstones carry no body.
    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
        self.body.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_empty_key() {
        let err = Document::new("", "", "body").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn empty_metadata_and_body_are_legal() {
        let doc = Document::new("key", "", "").unwrap();
        assert_eq!(doc.key(), b"key");
        assert!(doc.metadata().is_empty());
        assert!(doc.body().is_empty());
        assert!(!doc.is_deleted());
    }

    #[test]
    fn accessors_return_constructed_bytes() {
        let doc = Document::new("user/7", "rev-meta", "payload bytes").unwrap();
        assert_eq!(doc.key(), b"user/7");
        assert_eq!(doc.metadata(), b"rev-meta");
        assert_eq!(doc.body(), b"payload bytes");
    }

    #[test]
    fn mark_deleted_drops_body() {
        let mut doc = Document::new("key", "meta", "body").unwrap();
        doc.mark_deleted();
        assert!(doc.is_deleted());
        assert!(doc.body().is_empty());
        assert_eq!(doc.metadata(), b"meta");
    }

    #[test]
    fn documents_are_independent_values() {
        let doc = Document::new("key", "meta", "body").unwrap();
        let copy = doc.clone();
        drop(doc);
        assert_eq!(copy.body(), b"body");
    }
}
