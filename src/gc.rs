//! Garbage collection of blob space and external pages.
//!
//! One externally-triggered pass: purge unreachable directory versions,
//! run the external-page callbacks, rewrite the live entries of sparse
//! blob files through the normal apply path, drop emptied files, and
//! accumulate per-remote-file valid sizes for the facade's cache.
//! Rewrites are ordinary edits, so a failing pass leaves the engine in a
//! consistent state and snapshots keep resolving their pinned versions.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::blob::BlobStore;
use crate::directory::PageDirectory;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::types::{PageEntry, PageId};

/// Callbacks scoping external pages under a namespace prefix. The
/// scanner lists the ids the external owner currently holds on disk; the
/// remover receives `(pending, alive)` and deletes pending ids that are
/// no longer alive in the directory.
pub struct ExternalPageCallbacks {
    pub prefix: Vec<u8>,
    pub scanner: Box<dyn Fn() -> HashSet<PageId> + Send + Sync>,
    pub remover: Box<dyn Fn(&HashSet<PageId>, &HashSet<PageId>) + Send + Sync>,
}

/// Outcome of one GC pass.
pub(crate) struct GcOutcome {
    pub did_work: bool,
    pub remote_valid_sizes: HashMap<String, u64>,
}

/// Decides which blob files to rewrite or drop and drives the pass.
pub(crate) struct GcManager {
    callbacks: Mutex<HashMap<Vec<u8>, ExternalPageCallbacks>>,
}

impl GcManager {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn register_callbacks(&self, callbacks: ExternalPageCallbacks) {
        self.callbacks
            .lock()
            .insert(callbacks.prefix.clone(), callbacks);
    }

    pub(crate) fn unregister_callbacks(&self, prefix: &[u8]) {
        self.callbacks.lock().remove(prefix);
    }

    /// Runs one pass. Returns whether anything was reclaimed or rewritten
    /// plus the remote-file valid-size statistics gathered on the way.
    pub(crate) fn gc(
        &self,
        blob_store: &BlobStore,
        directory: &PageDirectory,
        heavy_gc_valid_rate: f64,
        write_limiter: Option<&RateLimiter>,
        read_limiter: Option<&RateLimiter>,
    ) -> Result<GcOutcome> {
        // 1. Versions no snapshot can reach anymore.
        let purged = directory.purge_stale_versions();
        blob_store.remove(&purged);

        // 2. External pages whose directory entries are gone.
        self.run_external_callbacks(directory);

        // 3. Sparse files: rewrite their live tip entries.
        let candidates: HashSet<u64> = blob_store
            .stats()
            .into_iter()
            .filter(|stat| {
                !stat.is_hot && stat.watermark > 0 && stat.valid_rate < heavy_gc_valid_rate
            })
            .map(|stat| stat.file_id)
            .collect();

        let mut rewrite: Vec<(PageId, PageEntry)> = Vec::new();
        let mut remote_valid_sizes: HashMap<String, u64> = HashMap::new();
        directory.for_each_tip_entry(|page_id, _, entry| {
            if let Some(info) = &entry.checkpoint_info {
                *remote_valid_sizes
                    .entry(info.data_location.data_file_id.clone())
                    .or_insert(0) += info.data_location.size;
            }
            if entry.has_local_data() && candidates.contains(&entry.file_id) {
                rewrite.push((page_id.clone(), entry.clone()));
            }
        });

        let rewrote = !rewrite.is_empty();
        if rewrote {
            debug!(
                entries = rewrite.len(),
                files = candidates.len(),
                "rewriting live entries out of sparse blob files"
            );
            let mut items = Vec::with_capacity(rewrite.len());
            for (page_id, entry) in rewrite {
                let data = blob_store.read(&page_id, &entry, read_limiter)?;
                items.push((page_id, data, entry));
            }
            let edit = blob_store.write_rewrite(items, write_limiter)?;
            directory.apply(edit)?;

            // The superseded versions are stale unless a snapshot pins
            // them; purge again so emptied files can go now.
            let purged_after = directory.purge_stale_versions();
            blob_store.remove(&purged_after);
        }

        // 4. Files with no live bytes left.
        let dropped = blob_store.drop_empty_files();

        let did_work = !purged.is_empty() || rewrote || !dropped.is_empty();
        if did_work {
            info!(
                purged = purged.len(),
                rewrote,
                dropped = dropped.len(),
                "gc pass finished"
            );
        }
        Ok(GcOutcome {
            did_work,
            remote_valid_sizes,
        })
    }

    fn run_external_callbacks(&self, directory: &PageDirectory) {
        let callbacks = self.callbacks.lock();
        for cb in callbacks.values() {
            let alive = directory.alive_external_ids(&cb.prefix);
            let pending = (cb.scanner)();
            (cb.remover)(&pending, &alive);
        }
    }
}
