//! Write batches and directory edits.
//!
//! A [`WriteBatch`] is the caller-visible ordered list of operations.
//! The blob store resolves it into an [`Edit`] (the same operations with
//! payload bytes replaced by allocated blob positions), which the
//! directory then applies atomically under the next sequence.

use crate::types::{DataLocation, PageEntry, PageId};

/// Caller-visible ordered batch of page operations.
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

#[derive(Debug)]
pub(crate) enum WriteOp {
    Put {
        page_id: PageId,
        data: Vec<u8>,
        tag: u64,
        field_offsets: Vec<u64>,
    },
    Del {
        page_id: PageId,
    },
    Ref {
        page_id: PageId,
        origin: PageId,
    },
    External {
        page_id: PageId,
    },
    PutRemote {
        page_id: PageId,
        location: DataLocation,
        /// Stamped by the lock manager before the batch is written.
        lock_key: Option<String>,
    },
    UpdateRemotePage {
        page_id: PageId,
        data: Vec<u8>,
    },
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `page_id` with an opaque tag and optional
    /// intra-page field boundaries.
    pub fn put(
        &mut self,
        page_id: impl Into<PageId>,
        data: Vec<u8>,
        tag: u64,
        field_offsets: Vec<u64>,
    ) {
        self.ops.push(WriteOp::Put {
            page_id: page_id.into(),
            data,
            tag,
            field_offsets,
        });
    }

    /// Deletes `page_id`.
    pub fn del(&mut self, page_id: impl Into<PageId>) {
        self.ops.push(WriteOp::Del {
            page_id: page_id.into(),
        });
    }

    /// Creates a one-level alias from `page_id` to `origin`.
    pub fn put_ref(&mut self, page_id: impl Into<PageId>, origin: impl Into<PageId>) {
        self.ops.push(WriteOp::Ref {
            page_id: page_id.into(),
            origin: origin.into(),
        });
    }

    /// Registers an external page: a directory-only marker with no byte
    /// payload, visible to prefix listings and GC callbacks.
    pub fn put_external(&mut self, page_id: impl Into<PageId>) {
        self.ops.push(WriteOp::External {
            page_id: page_id.into(),
        });
    }

    /// Ingests a page whose data lives in a remote checkpoint data file.
    /// The entry starts out remote-only; a lock marker for the remote
    /// file is created before the batch is applied.
    pub fn put_remote_page(&mut self, page_id: impl Into<PageId>, location: DataLocation) {
        self.ops.push(WriteOp::PutRemote {
            page_id: page_id.into(),
            location,
            lock_key: None,
        });
    }

    /// Stages a local replica of a remote-only page. Built internally by
    /// the read path's write-back; never part of a user batch.
    pub(crate) fn update_remote_page(&mut self, page_id: impl Into<PageId>, data: Vec<u8>) {
        self.ops.push(WriteOp::UpdateRemotePage {
            page_id: page_id.into(),
            data,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether any operation introduces a remote reference (and so needs
    /// a lock marker before apply).
    pub(crate) fn has_remote_writes(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, WriteOp::PutRemote { .. }))
    }

    pub(crate) fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub(crate) fn ops_mut(&mut self) -> &mut [WriteOp] {
        &mut self.ops
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Lock keys stamped onto this batch by the lock manager.
    pub(crate) fn lock_keys(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::PutRemote { lock_key, .. } => lock_key.clone(),
                _ => None,
            })
            .collect()
    }
}

/// One directory mutation inside an [`Edit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EditOp {
    Put(PageEntry),
    Del,
    Ref(PageId),
    External,
    /// Install a local replica for a remote-only page (no sequence bump).
    UpdateRemoteCache(PageEntry),
    /// Replace the tip entry with its remote-only form after a local-data
    /// reclaim (no sequence bump). Carries the full entry so a restarted
    /// directory never resurrects the freed local range. Only ever
    /// written by the directory itself.
    Reclaim(PageEntry),
}

/// One record of an edit: the page id, the operation, the version the
/// record was dumped at (snapshot dumps only) and the lock key the
/// operation depends on.
#[derive(Clone, Debug)]
pub(crate) struct EditRecord {
    pub page_id: PageId,
    pub op: EditOp,
    /// Sequence of the chain node this record was dumped from; 0 for
    /// records produced by writers.
    pub sequence: u64,
    pub lock_key: Option<String>,
}

/// An ordered batch of directory mutations, produced by the blob store
/// from a [`WriteBatch`] or by dumping a snapshot.
#[derive(Default)]
pub struct Edit {
    pub(crate) records: Vec<EditRecord>,
}

impl Edit {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn put(&mut self, page_id: PageId, entry: PageEntry) {
        self.records.push(EditRecord {
            page_id,
            op: EditOp::Put(entry),
            sequence: 0,
            lock_key: None,
        });
    }

    pub(crate) fn put_with_lock(
        &mut self,
        page_id: PageId,
        entry: PageEntry,
        lock_key: Option<String>,
    ) {
        self.records.push(EditRecord {
            page_id,
            op: EditOp::Put(entry),
            sequence: 0,
            lock_key,
        });
    }

    pub(crate) fn del(&mut self, page_id: PageId) {
        self.records.push(EditRecord {
            page_id,
            op: EditOp::Del,
            sequence: 0,
            lock_key: None,
        });
    }

    pub(crate) fn put_ref(&mut self, page_id: PageId, origin: PageId) {
        self.records.push(EditRecord {
            page_id,
            op: EditOp::Ref(origin),
            sequence: 0,
            lock_key: None,
        });
    }

    pub(crate) fn put_external(&mut self, page_id: PageId) {
        self.records.push(EditRecord {
            page_id,
            op: EditOp::External,
            sequence: 0,
            lock_key: None,
        });
    }

    pub(crate) fn update_remote_cache(&mut self, page_id: PageId, entry: PageEntry) {
        self.records.push(EditRecord {
            page_id,
            op: EditOp::UpdateRemoteCache(entry),
            sequence: 0,
            lock_key: None,
        });
    }

    pub(crate) fn reclaim(&mut self, page_id: PageId, entry: PageEntry) {
        self.records.push(EditRecord {
            page_id,
            op: EditOp::Reclaim(entry),
            sequence: 0,
            lock_key: None,
        });
    }
}
