//! Store handle, open flags, and statistics.
//!
//! This is the caller-facing surface: [`Store`] owns one open engine
//! and exposes the CRUD, commit, compaction, and statistics operations;
//! [`OpenFlags`] configures the open; [`DatabaseInfo`] reports
//! aggregate state.

mod flags;
mod handle;
mod info;

pub use flags::{
    BufferConfig, NodeSize, OpenFlags, DEFAULT_BUFFER_CAPACITY, DEFAULT_BUFFER_COUNT,
    DEFAULT_NODE_SIZE,
};
pub use handle::Store;
pub use info::{DatabaseInfo, SeqNum};
