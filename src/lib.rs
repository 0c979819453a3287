//! caskdb - an embedded, single-file, append-only document store.
//!
//! Keyed binary documents with revision metadata, tombstone deletes,
//! explicit commit points, and file compaction. One [`Store`] handle
//! owns one open file; mutations buffer until [`Store::commit`], which
//! is the durability boundary; [`Store::compact`] rewrites current
//! revisions to a fresh file to reclaim space.
//!
//! ```no_run
//! use caskdb::{Document, OpenFlags, Store};
//!
//! # fn main() -> caskdb::StoreResult<()> {
//! let mut store = Store::open("data.cask", OpenFlags::CREATE)?;
//!
//! store.set(&Document::new("key1", "", "value1")?)?;
//! store.commit()?;
//!
//! let mut doc = Document::with_key("key1")?;
//! store.get(&mut doc)?;
//! assert_eq!(doc.body(), b"value1");
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod store;

pub use document::Document;
pub use engine::{Engine, EngineStat, FileEngine, MemoryEngine, Revision};
pub use errors::{describe_code, ErrorKind, StoreError, StoreResult};
pub use store::{DatabaseInfo, OpenFlags, SeqNum, Store};
