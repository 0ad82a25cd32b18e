//! # pagestore
//!
//! A tiered, snapshot-isolated page storage engine:
//! - Durable storage of opaque byte blobs ("pages") keyed by arbitrary
//!   byte strings
//! - Append-only local blob files indexed by an in-memory multi-version
//!   directory, persisted through a write-ahead manifest
//! - On-demand incremental checkpoints to an object store, with
//!   cross-node reference locks on the files they share
//! - Transparent remote fallback reads for locally reclaimed pages, with
//!   best-effort write-back caching
//! - Single writer per process, many concurrent readers
//!
//! ## Architecture Overview
//!
//! ```text
//!            write / read / traverse / gc / checkpoint
//!                            │
//!                   ┌────────▼────────┐
//!                   │   PageStorage   │
//!                   └────────┬────────┘
//!          ┌─────────┬───────┴───────┬─────────────┐
//!          ▼         ▼               ▼             ▼
//!    ┌──────────┐ ┌──────────────┐ ┌──────────┐ ┌──────────────┐
//!    │ BlobStore│ │ PageDirectory│ │ GcManager│ │ LockManager  │
//!    │ (files)  │ │  + Manifest  │ │          │ │ RemoteReader │
//!    └──────────┘ └──────────────┘ └──────────┘ └──────┬───────┘
//!                                                      ▼
//!                                                 object store
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batch;
pub mod blob;
pub mod checkpoint;
pub mod directory;
pub mod error;
pub mod gc;
pub mod limiter;
pub mod remote;
pub mod storage;
pub mod types;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::{Edit, WriteBatch};
pub use blob::BlobConfig;
pub use checkpoint::{
    read_checkpoint_data_index, read_checkpoint_data_prefix, read_checkpoint_manifest,
    CheckpointManifest, CheckpointRecord, CheckpointStats, DumpCheckpointOptions,
    LocalCheckpointFiles,
};
pub use directory::manifest::ManifestConfig;
pub use directory::{PageDirectory, Snapshot};
pub use error::{PageError, Result};
pub use gc::ExternalPageCallbacks;
pub use limiter::RateLimiter;
pub use remote::locks::ExtraLockInfo;
pub use remote::{InMemoryObjectStore, ObjectStore, RemoteConfig};
pub use storage::{PageStorage, PageStorageConfig};
pub use types::{
    page_id_u64, ChecksumAlgorithm, CheckpointInfo, DataLocation, FieldData, Page, PageEntry,
    PageId,
};

/// Current version of pagestore.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
