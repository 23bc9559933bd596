//! # tandem-sync
//!
//! Auto-save engine: detects dirty open editors by content hash and flushes
//! them to disk through a hash-gated atomic writer.
//!
//! Create an [`AutoSaveEngine`] per host and call [`AutoSaveEngine::start`]
//! to run the periodic loop, or drive [`AutoSaveEngine::cycle`] /
//! [`AutoSaveEngine::flush`] directly.

pub mod autosave;
pub mod error;
pub mod hash;
pub mod tracking;
pub mod writer;

pub use autosave::{AutoSaveEngine, FlushReport};
pub use error::SyncError;
pub use hash::ContentHash;
pub use tracking::DirtyTracking;
pub use writer::{DiskStore, DocumentStore, WriteResult};
