//! Compaction tests.
//!
//! Compaction rewrites current revisions (live documents and retained
//! tombstones) to a new file, reclaiming space from superseded
//! revisions. The source handle keeps serving reads from its own file,
//! and the output is an independently openable store.

use caskdb::{Document, ErrorKind, OpenFlags, Store};
use tempfile::TempDir;

#[test]
fn thousand_keys_survive_compaction() {
    let dir = TempDir::new().unwrap();
    let mut store = Store::open(dir.path().join("test.cask"), OpenFlags::CREATE).unwrap();

    for i in 0..1000 {
        let key = format!("key-{}", i);
        store.set(&Document::new(key, "", "value1").unwrap()).unwrap();
    }

    let compacted = dir.path().join("test-compacted.cask");
    store.compact(&compacted).unwrap();

    // Every key still resolves through the original handle.
    for i in 0..1000 {
        let mut doc = Document::with_key(format!("key-{}", i)).unwrap();
        store.get(&mut doc).unwrap();
        assert_eq!(doc.body(), b"value1");
    }

    // And through a fresh handle over the compacted file.
    let mut fresh = Store::open(&compacted, OpenFlags::NONE).unwrap();
    for i in 0..1000 {
        let mut doc = Document::with_key(format!("key-{}", i)).unwrap();
        fresh.get(&mut doc).unwrap();
        assert_eq!(doc.body(), b"value1");
    }
    assert_eq!(fresh.info().unwrap().document_count(), 1000);
}

#[test]
fn compaction_reclaims_superseded_space() {
    let dir = TempDir::new().unwrap();
    let mut store = Store::open(dir.path().join("churn.cask"), OpenFlags::CREATE).unwrap();

    for _ in 0..50 {
        store
            .set(&Document::new("hot-key", "", "a body that gets rewritten").unwrap())
            .unwrap();
    }
    store.commit().unwrap();

    let before = store.info().unwrap();
    assert!(before.file_size() > before.space_used());

    let compacted = dir.path().join("churn-compacted.cask");
    store.compact(&compacted).unwrap();

    let mut fresh = Store::open(&compacted, OpenFlags::NONE).unwrap();
    let after = fresh.info().unwrap();
    assert_eq!(after.file_size(), after.space_used());
    assert_eq!(after.document_count(), 1);
    assert_eq!(after.last_seq_number(), before.last_seq_number());

    let mut doc = Document::with_key("hot-key").unwrap();
    fresh.get(&mut doc).unwrap();
    assert_eq!(doc.body(), b"a body that gets rewritten");
}

#[test]
fn tombstones_are_retained_through_compaction() {
    let dir = TempDir::new().unwrap();
    let mut store = Store::open(dir.path().join("ts.cask"), OpenFlags::CREATE).unwrap();

    store.set(&Document::new("live", "", "body").unwrap()).unwrap();
    store.set(&Document::new("dead", "", "body").unwrap()).unwrap();
    store.delete(&mut Document::with_key("dead").unwrap()).unwrap();
    store.commit().unwrap();

    let compacted = dir.path().join("ts-compacted.cask");
    store.compact(&compacted).unwrap();

    let mut fresh = Store::open(&compacted, OpenFlags::NONE).unwrap();
    let info = fresh.info().unwrap();
    assert_eq!(info.document_count(), 1);
    assert_eq!(info.deleted_count(), 1);

    // The tombstone still answers DOC_NOT_FOUND, distinguishing
    // "deleted" from data loss.
    let mut doc = Document::with_key("dead").unwrap();
    assert_eq!(fresh.get(&mut doc).unwrap_err().kind(), ErrorKind::DocNotFound);

    let mut doc = Document::with_key("live").unwrap();
    fresh.get(&mut doc).unwrap();
    assert_eq!(doc.body(), b"body");
}

#[test]
fn compaction_does_not_disturb_the_source_file() {
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("src.cask");
    let mut store = Store::open(&source_path, OpenFlags::CREATE).unwrap();

    store.set(&Document::new("key1", "", "value1").unwrap()).unwrap();
    store.commit().unwrap();

    let size_before = std::fs::metadata(&source_path).unwrap().len();
    store.compact(dir.path().join("dst.cask")).unwrap();
    let size_after = std::fs::metadata(&source_path).unwrap().len();

    assert_eq!(size_before, size_after);

    // The handle still reads and writes its original file.
    store.set(&Document::new("key2", "", "value2").unwrap()).unwrap();
    let mut doc = Document::with_key("key2").unwrap();
    store.get(&mut doc).unwrap();
    assert_eq!(doc.body(), b"value2");
}

#[test]
fn uncommitted_writes_are_included_in_compaction() {
    let dir = TempDir::new().unwrap();
    let mut store = Store::open(dir.path().join("buffered.cask"), OpenFlags::CREATE).unwrap();

    // No commit before compacting: the buffered write must still be
    // carried into the output, which ends with its own commit header.
    store.set(&Document::new("key1", "", "value1").unwrap()).unwrap();

    let compacted = dir.path().join("buffered-compacted.cask");
    store.compact(&compacted).unwrap();

    let mut fresh = Store::open(&compacted, OpenFlags::NONE).unwrap();
    let mut doc = Document::with_key("key1").unwrap();
    fresh.get(&mut doc).unwrap();
    assert_eq!(doc.body(), b"value1");
    assert_eq!(fresh.info().unwrap().document_count(), 1);
}
