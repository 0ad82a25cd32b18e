//! The page storage facade.
//!
//! Composes the blob store, directory, remote reader, lock manager and
//! GC into one engine. Write control flow: lock markers are created
//! before anything becomes visible, payloads become durable in blob
//! files, the directory applies the edit, and only then is the pending
//! lock state released. Reads resolve through the directory and fall
//! back to the object store for reclaimed entries, with a best-effort
//! write-back into the local cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::batch::WriteBatch;
use crate::blob::{BlobConfig, BlobStore};
use crate::checkpoint::{
    format_pattern, CheckpointFilePrefix, CheckpointFilesWriter, CheckpointStats,
    DumpCheckpointOptions, LocalCheckpointFiles,
};
use crate::directory::manifest::ManifestConfig;
use crate::directory::{PageDirectory, Snapshot};
use crate::error::{PageError, Result};
use crate::gc::{ExternalPageCallbacks, GcManager};
use crate::limiter::RateLimiter;
use crate::remote::locks::{ExtraLockInfo, LockManager};
use crate::remote::reader::RemoteReader;
use crate::remote::{ObjectStore, RemoteConfig};
use crate::types::{display_page_id, DataLocation, FieldData, Page, PageEntry, PageId};

/// Engine-wide configuration.
#[derive(Clone, Debug, Default)]
pub struct PageStorageConfig {
    pub blob: BlobConfig,
    pub manifest: ManifestConfig,
    pub remote: RemoteConfig,
}

struct CheckpointState {
    last_checkpoint_sequence: u64,
}

/// Durable, snapshot-isolated, tiered storage of pages keyed by byte
/// strings.
pub struct PageStorage {
    name: String,
    config: PageStorageConfig,
    blob_store: BlobStore,
    directory: PageDirectory,
    remote_reader: Option<RemoteReader>,
    lock_manager: Option<LockManager>,
    gc_manager: GcManager,
    /// Serializes checkpoint dumps and `last_checkpoint_sequence`.
    checkpoint: Mutex<CheckpointState>,
    /// Per-remote-file valid sizes, refreshed only by a finished GC pass.
    remote_valid_sizes: RwLock<HashMap<String, u64>>,
}

impl PageStorage {
    /// Opens (or creates) the engine rooted at `root`, recovering the
    /// directory from the manifest and rebuilding blob space maps. An
    /// object store enables the remote tier; without one, remote
    /// operations fail with `PreconditionViolation`.
    pub fn open(
        name: impl Into<String>,
        root: impl AsRef<Path>,
        config: PageStorageConfig,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Result<PageStorage> {
        let name = name.into();
        let root = root.as_ref();

        let blob_store = BlobStore::new(root.join("blob"), config.blob.clone())?;
        blob_store.register_paths()?;

        let directory = PageDirectory::restore(&root.join("manifest"), config.manifest.clone())?;
        // Nothing pins old versions at startup: drop them before space
        // maps are rebuilt so only live ranges get re-marked used.
        directory.purge_stale_versions();
        directory.for_each_tip_entry(|_, _, entry| blob_store.restore_used(entry));

        let (remote_reader, lock_manager) = match object_store {
            Some(store) => (
                Some(RemoteReader::new(
                    store.clone(),
                    config.remote.clone(),
                    config.blob.checksum,
                )),
                Some(LockManager::new(store, config.remote.clone())),
            ),
            None => (None, None),
        };

        info!(name = %name, sequence = directory.sequence(), "page storage opened");
        Ok(PageStorage {
            name,
            config,
            blob_store,
            directory,
            remote_reader,
            lock_manager,
            gc_manager: GcManager::new(),
            checkpoint: Mutex::new(CheckpointState {
                last_checkpoint_sequence: 0,
            }),
            remote_valid_sizes: RwLock::new(HashMap::new()),
        })
    }

    /// Flushes the manifest; pair with `open` to bracket the lifetime.
    pub fn shutdown(&self) -> Result<()> {
        self.directory.sync()
    }

    fn remote_reader(&self) -> Result<&RemoteReader> {
        self.remote_reader.as_ref().ok_or_else(|| {
            PageError::PreconditionViolation("no object store configured".to_string())
        })
    }

    fn lock_manager(&self) -> Result<&LockManager> {
        self.lock_manager.as_ref().ok_or_else(|| {
            PageError::PreconditionViolation("no object store configured".to_string())
        })
    }

    /// Creates a snapshot of the directory.
    pub fn snapshot(&self, tag: &str) -> Snapshot {
        self.directory.create_snapshot(tag)
    }

    /// Number of pages alive under `prefix`.
    pub fn num_pages_with_prefix(&self, prefix: &[u8]) -> usize {
        let snap = self.directory.create_snapshot("num_pages_with_prefix");
        self.directory
            .get_all_page_ids_with_prefix(prefix, &snap)
            .len()
    }

    /// Applies a write batch: lock markers first, then durable blob
    /// bytes, then the directory edit, then lock-state cleanup. Failure
    /// anywhere aborts the whole batch and leaves no pending lock.
    pub fn write(&self, mut batch: WriteBatch, write_limiter: Option<&RateLimiter>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let has_remote = batch.has_remote_writes();
        if has_remote {
            self.lock_manager()?.create_locks_for_write_batch(&mut batch)?;
        }
        let lock_keys = batch.lock_keys();

        let result = self
            .blob_store
            .write(batch, write_limiter)
            .and_then(|edit| self.directory.apply(edit));
        match result {
            Ok(applied_lock_ids) => {
                if has_remote {
                    if let Some(manager) = &self.lock_manager {
                        manager.clean_applied_locks(applied_lock_ids);
                    }
                }
                Ok(())
            }
            Err(err) => {
                if has_remote {
                    if let Some(manager) = &self.lock_manager {
                        manager.release_pending_locks(&lock_keys);
                    }
                }
                error!(storage = %self.name, "write batch failed: {}", err);
                Err(err)
            }
        }
    }

    /// Reads one page, failing with `NotFound` when it does not resolve.
    pub fn read(
        &self,
        page_id: &[u8],
        read_limiter: Option<&RateLimiter>,
        snapshot: Option<&Snapshot>,
    ) -> Result<Page> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("read");
                &owned
            }
        };
        let entry = self.directory.get_by_id(page_id, snap)?;
        self.read_resolved(page_id, &entry, read_limiter, snap)
    }

    /// Reads one page, returning `None` when it does not resolve.
    pub fn try_read(
        &self,
        page_id: &[u8],
        read_limiter: Option<&RateLimiter>,
        snapshot: Option<&Snapshot>,
    ) -> Result<Option<Page>> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("try_read");
                &owned
            }
        };
        match self.directory.try_get_by_id(page_id, snap) {
            Some(entry) => self
                .read_resolved(page_id, &entry, read_limiter, snap)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Batched read preserving the input order; fails with `NotFound` on
    /// the first missing id.
    pub fn read_multi(
        &self,
        page_ids: &[PageId],
        read_limiter: Option<&RateLimiter>,
        snapshot: Option<&Snapshot>,
    ) -> Result<Vec<Page>> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("read_multi");
                &owned
            }
        };
        let entries = self.directory.get_by_ids(page_ids, snap)?;
        let pages = self.read_entries(entries, read_limiter, snap)?;
        Ok(reorder(page_ids, pages))
    }

    /// Batched read partitioning into found pages (input order) and
    /// missing ids.
    pub fn try_read_multi(
        &self,
        page_ids: &[PageId],
        read_limiter: Option<&RateLimiter>,
        snapshot: Option<&Snapshot>,
    ) -> Result<(Vec<Page>, Vec<PageId>)> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("try_read_multi");
                &owned
            }
        };
        let (entries, missing) = self.directory.try_get_by_ids(page_ids, snap);
        let found_ids: Vec<PageId> = entries.iter().map(|(id, _)| id.clone()).collect();
        let pages = self.read_entries(entries, read_limiter, snap)?;
        Ok((reorder(&found_ids, pages), missing))
    }

    /// Reads only the requested fields of each page.
    pub fn read_fields(
        &self,
        requests: &[(PageId, Vec<usize>)],
        read_limiter: Option<&RateLimiter>,
        snapshot: Option<&Snapshot>,
    ) -> Result<Vec<(PageId, Vec<FieldData>)>> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("read_fields");
                &owned
            }
        };

        let mut local = Vec::new();
        let mut remote = Vec::new();
        for (page_id, indices) in requests {
            let entry = self.directory.get_by_id(page_id, snap)?;
            if entry.is_remote_only() {
                remote.push((page_id.clone(), entry, indices.clone()));
            } else {
                local.push((page_id.clone(), entry, indices.clone()));
            }
        }

        let mut results: HashMap<PageId, Vec<FieldData>> = HashMap::new();
        for (page_id, entry, indices) in &local {
            let fields = self
                .blob_store
                .read_fields(page_id, entry, indices, read_limiter)?;
            results.insert(page_id.clone(), fields);
        }

        if !remote.is_empty() {
            let reader = self.remote_reader()?;
            let (for_cache, sliced) = reader.read_fields(&remote)?;
            let mut write_back = WriteBatch::new();
            for page in &for_cache {
                write_back.update_remote_page(page.page_id.clone(), page.data.clone());
            }
            if let Err(err) = self.try_update_local_cache_for_remote_pages(write_back, snap) {
                warn!(storage = %self.name, "remote write-back failed: {}", err);
            }
            for (page_id, fields) in sliced {
                results.insert(page_id, fields);
            }
        }

        Ok(requests
            .iter()
            .filter_map(|(page_id, _)| {
                results
                    .remove(page_id)
                    .map(|fields| (page_id.clone(), fields))
            })
            .collect())
    }

    /// Visits every page under `prefix` with its bytes.
    pub fn traverse(
        &self,
        prefix: &[u8],
        snapshot: Option<&Snapshot>,
        mut acceptor: impl FnMut(&[u8], Page),
    ) -> Result<()> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("traverse");
                &owned
            }
        };
        for page_id in self.directory.get_all_page_ids_with_prefix(prefix, snap) {
            // External pages and dangling refs carry no data; skip them.
            let Some(entry) = self.directory.try_get_by_id(&page_id, snap) else {
                continue;
            };
            let page = self.read_resolved(&page_id, &entry, None, snap)?;
            acceptor(&page_id, page);
        }
        Ok(())
    }

    /// Visits every page under `prefix` with its directory entry.
    pub fn traverse_entries(
        &self,
        prefix: &[u8],
        snapshot: Option<&Snapshot>,
        mut acceptor: impl FnMut(&[u8], &PageEntry),
    ) -> Result<()> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("traverse_entries");
                &owned
            }
        };
        for page_id in self.directory.get_all_page_ids_with_prefix(prefix, snap) {
            if let Some(entry) = self.directory.try_get_by_id(&page_id, snap) {
                acceptor(&page_id, &entry);
            }
        }
        Ok(())
    }

    /// The directory entry of a page, if it resolves.
    pub fn get_entry(&self, page_id: &[u8], snapshot: Option<&Snapshot>) -> Option<PageEntry> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("get_entry");
                &owned
            }
        };
        self.directory.try_get_by_id(page_id, snap)
    }

    /// Where the page's data lives remotely, if it was ever checkpointed.
    pub fn get_checkpoint_location(
        &self,
        page_id: &[u8],
        snapshot: Option<&Snapshot>,
    ) -> Option<DataLocation> {
        self.get_entry(page_id, snapshot)
            .and_then(|entry| entry.checkpoint_info)
            .map(|info| info.data_location)
    }

    /// Follows one level of ref aliasing to the canonical id.
    pub fn get_normal_page_id(&self, page_id: &[u8], snapshot: Option<&Snapshot>) -> Result<PageId> {
        let owned;
        let snap = match snapshot {
            Some(snap) => snap,
            None => {
                owned = self.directory.create_snapshot("get_normal_page_id");
                &owned
            }
        };
        self.directory.get_normal_page_id(page_id, snap)
    }

    /// Highest numeric page id observed in the restored manifest.
    pub fn get_max_id_after_restart(&self) -> u64 {
        self.directory.get_max_id_after_restart()
    }

    /// Runs one GC pass; returns whether anything was reclaimed.
    pub fn gc(
        &self,
        write_limiter: Option<&RateLimiter>,
        read_limiter: Option<&RateLimiter>,
    ) -> Result<bool> {
        let outcome = self.gc_manager.gc(
            &self.blob_store,
            &self.directory,
            self.config.blob.heavy_gc_valid_rate,
            write_limiter,
            read_limiter,
        )?;
        *self.remote_valid_sizes.write() = outcome.remote_valid_sizes;
        Ok(outcome.did_work)
    }

    /// Latest per-remote-file valid sizes, as of the last GC pass.
    pub fn remote_data_files_valid_sizes(&self) -> HashMap<String, u64> {
        self.remote_valid_sizes.read().clone()
    }

    /// Registers external-page callbacks scoped to a prefix.
    pub fn register_external_pages_callbacks(&self, callbacks: ExternalPageCallbacks) {
        self.directory.register_namespace(&callbacks.prefix);
        self.gc_manager.register_callbacks(callbacks);
    }

    /// Unregisters the callbacks and drops external-id bookkeeping.
    pub fn unregister_external_pages_callbacks(&self, prefix: &[u8]) {
        self.gc_manager.unregister_callbacks(prefix);
        self.directory.unregister_namespace(prefix);
    }

    /// Binds the lock manager to this node's identity and seeds
    /// `last_checkpoint_sequence` from the last persisted checkpoint.
    pub fn init_locks_local_manager(&self, store_id: u64) -> Result<()> {
        let manager = self.lock_manager()?;
        if let Some(sequence) = manager.init_store_info(store_id)? {
            self.checkpoint.lock().last_checkpoint_sequence = sequence;
        }
        Ok(())
    }

    /// Lock descriptors a new checkpoint upload must carry.
    pub fn allocate_new_upload_locks_info(&self) -> Result<ExtraLockInfo> {
        self.lock_manager()?.allocate_new_upload_locks_info()
    }

    /// True when no directory change happened since the last successful
    /// checkpoint; a cheap pre-check before a dump.
    pub fn can_skip_checkpoint(&self) -> bool {
        let state = self.checkpoint.lock();
        let snap = self.directory.create_snapshot("can_skip_checkpoint");
        snap.sequence() == state.last_checkpoint_sequence
    }

    /// Flips every checkpointed version of `page_id` to remote-only and
    /// frees its local blob ranges. Returns whether anything changed.
    pub fn reclaim_local_data(&self, page_id: &[u8]) -> Result<bool> {
        let freed = self.directory.reclaim_local_data(page_id)?;
        if freed.is_empty() {
            return Ok(false);
        }
        self.blob_store.remove(&freed);
        Ok(true)
    }

    /// Dumps an incremental checkpoint: a data file and manifest file
    /// staged locally, shipped by the persist callback, then accounted.
    pub fn dump_incremental_checkpoint(
        &self,
        options: &DumpCheckpointOptions,
    ) -> Result<CheckpointStats> {
        let mut state = self.checkpoint.lock();

        // Held until return: GC must not reclaim the blob bytes the
        // writer is about to copy.
        let snap = self
            .directory
            .create_snapshot("dump_incremental_checkpoint");
        if snap.sequence() == state.last_checkpoint_sequence {
            return Ok(CheckpointStats::default());
        }

        let mut edit = self.directory.dump_snapshot_to_edit(&snap);

        let sequence = options.override_sequence.unwrap_or_else(|| snap.sequence());
        let data_file_id = format_pattern(&options.data_file_id_pattern, sequence, 0);
        let data_file_path =
            PathBuf::from(format_pattern(&options.data_file_path_pattern, sequence, 0));
        let manifest_file_id =
            format_pattern(&options.manifest_file_id_pattern, sequence, 0);
        let manifest_file_path = PathBuf::from(format_pattern(
            &options.manifest_file_path_pattern,
            sequence,
            0,
        ));
        if data_file_path == manifest_file_path {
            return Err(PageError::PreconditionViolation(format!(
                "checkpoint data and manifest paths collide: {}",
                data_file_path.display()
            )));
        }
        debug!(
            data_file_id = %data_file_id,
            manifest_file_id = %manifest_file_id,
            sequence = snap.sequence(),
            "dumping incremental checkpoint"
        );

        let prefix = CheckpointFilePrefix {
            writer_info: options.writer_info.clone(),
            sequence: snap.sequence(),
            last_sequence: state.last_checkpoint_sequence,
            locked_files: options.must_locked_files.iter().cloned().collect(),
        };
        let mut writer = CheckpointFilesWriter::create(
            data_file_path.clone(),
            manifest_file_path.clone(),
            data_file_id,
            prefix,
            &self.blob_store,
            self.remote_reader.as_ref(),
            self.config.manifest.checksum,
        )?;

        let files_to_compact = options
            .compact_getter
            .as_ref()
            .map(|getter| getter())
            .unwrap_or_default();
        writer.write_edits(&mut edit, &files_to_compact, None)?;
        let stats = writer.finish(&edit)?;

        // Not persisted means not happened: no state moves.
        let local_files = LocalCheckpointFiles {
            data_file: data_file_path,
            manifest_file: manifest_file_path,
        };
        match (options.persist_checkpoint)(&local_files) {
            Ok(true) => {}
            Ok(false) => {
                error!(storage = %self.name, "failed to persist checkpoint");
                return Ok(CheckpointStats::default());
            }
            Err(err) => {
                error!(storage = %self.name, "failed to persist checkpoint: {}", err);
                return Ok(CheckpointStats::default());
            }
        }

        if stats.has_new_data {
            self.directory.copy_checkpoint_info_from_edit(&edit);
        }
        state.last_checkpoint_sequence = snap.sequence();
        Ok(stats)
    }

    fn read_resolved(
        &self,
        page_id: &[u8],
        entry: &PageEntry,
        read_limiter: Option<&RateLimiter>,
        snap: &Snapshot,
    ) -> Result<Page> {
        if entry.is_remote_only() {
            let reader = self.remote_reader()?;
            let page = reader.read(page_id, entry)?;

            let mut write_back = WriteBatch::new();
            write_back.update_remote_page(page_id.to_vec(), page.data.clone());
            if let Err(err) = self.try_update_local_cache_for_remote_pages(write_back, snap) {
                warn!(
                    storage = %self.name,
                    page_id = %display_page_id(page_id),
                    "remote write-back failed: {}", err
                );
            }
            Ok(page)
        } else {
            let data = self.blob_store.read(page_id, entry, read_limiter)?;
            Ok(Page {
                page_id: page_id.to_vec(),
                data,
                field_offsets: entry.field_offsets.clone(),
            })
        }
    }

    fn read_entries(
        &self,
        entries: Vec<(PageId, PageEntry)>,
        read_limiter: Option<&RateLimiter>,
        snap: &Snapshot,
    ) -> Result<Vec<Page>> {
        let mut local = Vec::new();
        let mut remote = Vec::new();
        for (page_id, entry) in entries {
            if entry.is_remote_only() {
                remote.push((page_id, entry));
            } else {
                local.push((page_id, entry));
            }
        }

        let mut pages = self.blob_store.read_multi(&local, read_limiter)?;
        if !remote.is_empty() {
            let reader = self.remote_reader()?;
            let remote_pages = reader.read_multi(&remote)?;

            // One write-back batch for the whole read.
            let mut write_back = WriteBatch::new();
            for page in &remote_pages {
                write_back.update_remote_page(page.page_id.clone(), page.data.clone());
            }
            if let Err(err) = self.try_update_local_cache_for_remote_pages(write_back, snap) {
                warn!(storage = %self.name, "remote write-back failed: {}", err);
            }
            pages.extend(remote_pages);
        }
        Ok(pages)
    }

    /// Best-effort installation of local replicas for remote-fetched
    /// pages. Obsolete installations (the mapping moved on) free their
    /// blob ranges immediately.
    fn try_update_local_cache_for_remote_pages(
        &self,
        write_back: WriteBatch,
        snap: &Snapshot,
    ) -> Result<()> {
        if write_back.is_empty() {
            return Ok(());
        }
        let edit = self.blob_store.write(write_back, None)?;
        let ignored = self
            .directory
            .update_local_cache_for_remote_pages(edit, snap)?;
        if !ignored.is_empty() {
            debug!(
                storage = %self.name,
                obsolete = ignored.len(),
                "dropping obsolete remote write-backs"
            );
            self.blob_store.remove(&ignored);
        }
        Ok(())
    }
}

/// Restores `pages` to the order of `page_ids`.
fn reorder(page_ids: &[PageId], pages: Vec<Page>) -> Vec<Page> {
    let mut by_id: HashMap<PageId, Page> = pages
        .into_iter()
        .map(|page| (page.page_id.clone(), page))
        .collect();
    page_ids
        .iter()
        .filter_map(|page_id| by_id.remove(page_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(tmp: &TempDir) -> PageStorage {
        PageStorage::open("test", tmp.path(), PageStorageConfig::default(), None).unwrap()
    }

    #[test]
    fn test_basic_round_trip() {
        let tmp = TempDir::new().unwrap();
        let storage = open(&tmp);

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), vec![1, 2, 3], 7, vec![]);
        storage.write(batch, None).unwrap();

        let page = storage.read(b"a", None, None).unwrap();
        assert_eq!(page.data, vec![1, 2, 3]);
        assert_eq!(storage.get_entry(b"a", None).unwrap().tag, 7);
    }

    #[test]
    fn test_remote_ops_require_object_store() {
        let tmp = TempDir::new().unwrap();
        let storage = open(&tmp);
        assert!(matches!(
            storage.init_locks_local_manager(1),
            Err(PageError::PreconditionViolation(_))
        ));
        assert!(matches!(
            storage.allocate_new_upload_locks_info(),
            Err(PageError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn test_read_multi_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let storage = open(&tmp);

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), vec![1], 0, vec![]);
        batch.put(b"b".to_vec(), vec![2], 0, vec![]);
        batch.put(b"c".to_vec(), vec![3], 0, vec![]);
        storage.write(batch, None).unwrap();

        let ids = vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()];
        let pages = storage.read_multi(&ids, None, None).unwrap();
        let datas: Vec<Vec<u8>> = pages.into_iter().map(|p| p.data).collect();
        assert_eq!(datas, vec![vec![3], vec![1], vec![2]]);

        let (found, missing) = storage
            .try_read_multi(&[b"a".to_vec(), b"zz".to_vec()], None, None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(missing, vec![b"zz".to_vec()]);
    }

    #[test]
    fn test_traverse_skips_externals() {
        let tmp = TempDir::new().unwrap();
        let storage = open(&tmp);

        let mut batch = WriteBatch::new();
        batch.put(b"p/1".to_vec(), vec![1], 0, vec![]);
        batch.put_external(b"p/2".to_vec());
        storage.write(batch, None).unwrap();

        let mut seen = Vec::new();
        storage
            .traverse(b"p/", None, |page_id, page| {
                seen.push((page_id.to_vec(), page.data));
            })
            .unwrap();
        assert_eq!(seen, vec![(b"p/1".to_vec(), vec![1])]);
        assert_eq!(storage.num_pages_with_prefix(b"p/"), 2);
    }
}
