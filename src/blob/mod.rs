//! Blob store: append-only placement of page data into bounded files.
//!
//! Translates [`WriteBatch`] bytes into durable byte ranges and serves
//! positional reads. Key properties:
//!
//! - Allocation is best-fit inside a small set of "hot" files, rolling a
//!   new file when none fits; the per-file size cap bounds file growth.
//! - The fsync boundary is the batch: every touched file is synced once
//!   before `write` returns, so a returned [`Edit`] only ever references
//!   durable bytes.
//! - Crash recovery trusts the manifest: files are rediscovered at
//!   startup and their space maps rebuilt from recovered entries.

mod file;
mod space;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::batch::{Edit, WriteBatch, WriteOp};
use crate::error::{PageError, Result};
use crate::limiter::{maybe_request, RateLimiter};
use crate::types::{display_page_id, ChecksumAlgorithm, FieldData, Page, PageEntry, PageId};

use file::BlobFile;
pub(crate) use file::RECORD_HEADER_SIZE;
use space::SpaceMap;

/// Configuration for the blob store.
#[derive(Clone, Debug)]
pub struct BlobConfig {
    /// Maximum size of a single blob file in bytes.
    pub file_capacity: u64,

    /// How many files are kept open as allocation targets.
    pub hot_file_count: usize,

    /// Checksum algorithm for page payloads.
    pub checksum: ChecksumAlgorithm,

    /// Files whose live-data ratio drops below this are rewritten by GC.
    pub heavy_gc_valid_rate: f64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            file_capacity: 256 * 1024 * 1024,
            hot_file_count: 2,
            checksum: ChecksumAlgorithm::default(),
            heavy_gc_valid_rate: 0.5,
        }
    }
}

/// Per-file statistics surfaced to the GC pass.
#[derive(Clone, Debug)]
pub(crate) struct BlobFileStat {
    pub file_id: u64,
    pub used_bytes: u64,
    pub watermark: u64,
    pub valid_rate: f64,
    pub is_hot: bool,
}

struct FileSlot {
    file: BlobFile,
    space: Mutex<SpaceMap>,
}

struct StoreInner {
    files: HashMap<u64, Arc<FileSlot>>,
    /// Allocation targets, most recently rolled first.
    hot: Vec<u64>,
    next_file_id: u64,
}

/// Append-only placement of page data into bounded blob files.
pub struct BlobStore {
    dir: PathBuf,
    config: BlobConfig,
    inner: RwLock<StoreInner>,
}

impl BlobStore {
    /// Creates the store rooted at `dir` (created if absent).
    pub(crate) fn new(dir: impl Into<PathBuf>, config: BlobConfig) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            config,
            inner: RwLock::new(StoreInner {
                files: HashMap::new(),
                hot: Vec::new(),
                next_file_id: 1,
            }),
        })
    }

    /// Scans the blob directory for existing files. Their space maps
    /// start fully free; [`BlobStore::restore_used`] re-marks the ranges
    /// of manifest-recovered entries afterwards.
    pub(crate) fn register_paths(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let mut max_id = 0u64;
        for dirent in std::fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(id) = name.to_str().and_then(BlobFile::parse_file_name) else {
                continue;
            };
            let file = BlobFile::open(dirent.path(), id)?;
            let len = file.len()?;
            let slot = Arc::new(FileSlot {
                file,
                space: Mutex::new(SpaceMap::with_watermark(self.config.file_capacity, len)),
            });
            inner.files.insert(id, slot);
            max_id = max_id.max(id);
        }
        inner.next_file_id = inner.next_file_id.max(max_id + 1);

        // Reuse the newest existing files as allocation targets.
        let mut ids: Vec<u64> = inner.files.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(self.config.hot_file_count.max(1));
        inner.hot = ids;

        info!(
            files = inner.files.len(),
            next_file_id = inner.next_file_id,
            "blob store registered paths"
        );
        Ok(())
    }

    /// Marks the byte range of a recovered live entry as used.
    pub(crate) fn restore_used(&self, entry: &PageEntry) {
        if !entry.has_local_data() {
            return;
        }
        let inner = self.inner.read();
        match inner.files.get(&entry.file_id) {
            Some(slot) => {
                let ok = slot
                    .space
                    .lock()
                    .mark_used(entry.offset - RECORD_HEADER_SIZE, entry.size + RECORD_HEADER_SIZE);
                if !ok {
                    warn!(
                        file_id = entry.file_id,
                        offset = entry.offset,
                        "recovered entry overlaps already-used blob range"
                    );
                }
            }
            None => warn!(
                file_id = entry.file_id,
                "recovered entry references missing blob file"
            ),
        }
    }

    /// Resolves a write batch into an [`Edit`]: appends every payload,
    /// computes checksums, and syncs all touched files once. A failed
    /// write frees this batch's allocations and fails the whole batch.
    pub(crate) fn write(&self, batch: WriteBatch, limiter: Option<&RateLimiter>) -> Result<Edit> {
        let mut edit = Edit::new();
        let mut allocated = Vec::new();
        let mut touched = HashMap::new();

        let result =
            self.write_ops(batch.into_ops(), limiter, &mut edit, &mut allocated, &mut touched);
        match result {
            Ok(()) => Ok(edit),
            Err(err) => {
                for (slot, record_offset, len) in allocated {
                    slot.space.lock().free(record_offset, len);
                }
                Err(err)
            }
        }
    }

    fn write_ops(
        &self,
        ops: Vec<WriteOp>,
        limiter: Option<&RateLimiter>,
        edit: &mut Edit,
        allocated: &mut Vec<(Arc<FileSlot>, u64, u64)>,
        touched: &mut HashMap<u64, Arc<FileSlot>>,
    ) -> Result<()> {
        for op in ops {
            match op {
                WriteOp::Put {
                    page_id,
                    data,
                    tag,
                    field_offsets,
                } => {
                    let (file_id, offset, checksum) =
                        self.write_payload(&data, tag, limiter, allocated, touched)?;
                    edit.put(
                        page_id,
                        PageEntry {
                            file_id,
                            offset,
                            size: data.len() as u64,
                            tag,
                            checksum,
                            field_offsets,
                            checkpoint_info: None,
                        },
                    );
                }
                WriteOp::UpdateRemotePage { page_id, data } => {
                    let (file_id, offset, checksum) =
                        self.write_payload(&data, 0, limiter, allocated, touched)?;
                    edit.update_remote_cache(
                        page_id,
                        PageEntry {
                            file_id,
                            offset,
                            size: data.len() as u64,
                            tag: 0,
                            checksum,
                            field_offsets: Vec::new(),
                            checkpoint_info: None,
                        },
                    );
                }
                WriteOp::PutRemote {
                    page_id,
                    location,
                    lock_key,
                } => {
                    let size = location.size;
                    edit.put_with_lock(
                        page_id,
                        PageEntry {
                            file_id: crate::types::INVALID_BLOB_FILE_ID,
                            offset: 0,
                            size,
                            tag: 0,
                            checksum: 0,
                            field_offsets: Vec::new(),
                            checkpoint_info: Some(crate::types::CheckpointInfo {
                                data_location: location,
                                is_local_data_reclaimed: true,
                            }),
                        },
                        lock_key,
                    );
                }
                WriteOp::Del { page_id } => edit.del(page_id),
                WriteOp::Ref { page_id, origin } => edit.put_ref(page_id, origin),
                WriteOp::External { page_id } => edit.put_external(page_id),
            }
        }

        for slot in touched.values() {
            slot.file.sync()?;
        }
        Ok(())
    }

    /// Rewrites live entries into fresh blob files during GC. The new
    /// entries keep the old tag, field boundaries and checkpoint info;
    /// only the local position and checksum change.
    pub(crate) fn write_rewrite(
        &self,
        items: Vec<(PageId, Vec<u8>, PageEntry)>,
        limiter: Option<&RateLimiter>,
    ) -> Result<Edit> {
        let mut edit = Edit::new();
        let mut allocated = Vec::new();
        let mut touched = HashMap::new();

        let result = (|| {
            for (page_id, data, old) in items {
                let (file_id, offset, checksum) =
                    self.write_payload(&data, old.tag, limiter, &mut allocated, &mut touched)?;
                let mut entry = old;
                entry.file_id = file_id;
                entry.offset = offset;
                entry.size = data.len() as u64;
                entry.checksum = checksum;
                if let Some(info) = entry.checkpoint_info.as_mut() {
                    info.is_local_data_reclaimed = false;
                }
                edit.put(page_id, entry);
            }
            for slot in touched.values() {
                slot.file.sync()?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok(edit),
            Err(err) => {
                for (slot, record_offset, len) in allocated {
                    slot.space.lock().free(record_offset, len);
                }
                Err(err)
            }
        }
    }

    fn write_payload(
        &self,
        data: &[u8],
        tag: u64,
        limiter: Option<&RateLimiter>,
        allocated: &mut Vec<(Arc<FileSlot>, u64, u64)>,
        touched: &mut HashMap<u64, Arc<FileSlot>>,
    ) -> Result<(u64, u64, u64)> {
        let total = data.len() as u64 + RECORD_HEADER_SIZE;
        maybe_request(limiter, total);

        let (slot, record_offset) = self.allocate(total)?;
        allocated.push((slot.clone(), record_offset, total));

        let checksum = self.config.checksum.compute(data);
        slot.file.write_record(record_offset, tag, checksum, data)?;

        let file_id = slot.file.id();
        touched.insert(file_id, slot);
        Ok((file_id, record_offset + RECORD_HEADER_SIZE, checksum))
    }

    fn allocate(&self, size: u64) -> Result<(Arc<FileSlot>, u64)> {
        if size > self.config.file_capacity {
            return Err(PageError::PreconditionViolation(format!(
                "record of {} bytes exceeds blob file capacity {}",
                size, self.config.file_capacity
            )));
        }

        {
            let inner = self.inner.read();
            if let Some(found) = Self::try_hot_alloc(&inner, size) {
                return Ok(found);
            }
        }

        let mut inner = self.inner.write();
        // Another writer may have rolled a file while we upgraded.
        if let Some(found) = Self::try_hot_alloc(&inner, size) {
            return Ok(found);
        }

        let id = inner.next_file_id;
        inner.next_file_id += 1;
        let file = BlobFile::create(&self.dir, id)?;
        let mut space = SpaceMap::new(self.config.file_capacity);
        let offset = space.alloc(size).expect("fresh file must fit one record");
        let slot = Arc::new(FileSlot {
            file,
            space: Mutex::new(space),
        });
        inner.files.insert(id, slot.clone());
        inner.hot.insert(0, id);
        inner.hot.truncate(self.config.hot_file_count.max(1));
        debug!(file_id = id, "rolled new blob file");
        Ok((slot, offset))
    }

    fn try_hot_alloc(inner: &StoreInner, size: u64) -> Option<(Arc<FileSlot>, u64)> {
        for id in &inner.hot {
            let Some(slot) = inner.files.get(id) else {
                continue;
            };
            if let Some(offset) = slot.space.lock().alloc(size) {
                return Some((slot.clone(), offset));
            }
        }
        None
    }

    fn slot(&self, file_id: u64) -> Result<Arc<FileSlot>> {
        self.inner
            .read()
            .files
            .get(&file_id)
            .cloned()
            .ok_or_else(|| {
                PageError::Corruption(format!("blob file {} is not registered", file_id))
            })
    }

    /// Reads the payload of one entry, verifying its checksum.
    pub(crate) fn read(
        &self,
        page_id: &[u8],
        entry: &PageEntry,
        limiter: Option<&RateLimiter>,
    ) -> Result<Vec<u8>> {
        let slot = self.slot(entry.file_id)?;
        maybe_request(limiter, entry.size);
        let data = slot.file.read_exact_at(entry.offset, entry.size)?;
        if entry.checksum != 0 {
            let actual = self.config.checksum.compute(&data);
            if actual != entry.checksum {
                return Err(PageError::Corruption(format!(
                    "checksum mismatch for page {} in blob file {} at offset {}: \
                     expected {:#x}, got {:#x}",
                    display_page_id(page_id),
                    entry.file_id,
                    entry.offset,
                    entry.checksum,
                    actual
                )));
            }
        }
        Ok(data)
    }

    /// Batched positional reads.
    pub(crate) fn read_multi(
        &self,
        entries: &[(PageId, PageEntry)],
        limiter: Option<&RateLimiter>,
    ) -> Result<Vec<Page>> {
        let mut pages = Vec::with_capacity(entries.len());
        for (page_id, entry) in entries {
            let data = self.read(page_id, entry, limiter)?;
            pages.push(Page {
                page_id: page_id.clone(),
                data,
                field_offsets: entry.field_offsets.clone(),
            });
        }
        Ok(pages)
    }

    /// Reads only the requested fields of one entry. The page checksum
    /// covers the whole payload, so partial reads skip verification.
    pub(crate) fn read_fields(
        &self,
        page_id: &[u8],
        entry: &PageEntry,
        indices: &[usize],
        limiter: Option<&RateLimiter>,
    ) -> Result<Vec<FieldData>> {
        let slot = self.slot(entry.file_id)?;
        let mut fields = Vec::with_capacity(indices.len());
        for &index in indices {
            let (start, len) = entry.field_range(index).ok_or_else(|| {
                PageError::PreconditionViolation(format!(
                    "field {} out of range for page {}",
                    index,
                    display_page_id(page_id)
                ))
            })?;
            maybe_request(limiter, len);
            let data = slot.file.read_exact_at(entry.offset + start, len)?;
            fields.push(FieldData { index, data });
        }
        Ok(fields)
    }

    /// Marks the byte ranges of `entries` free. Does not delete files.
    pub(crate) fn remove(&self, entries: &[PageEntry]) {
        let inner = self.inner.read();
        for entry in entries {
            if !entry.has_local_data() {
                continue;
            }
            match inner.files.get(&entry.file_id) {
                Some(slot) => slot
                    .space
                    .lock()
                    .free(entry.offset - RECORD_HEADER_SIZE, entry.size + RECORD_HEADER_SIZE),
                None => warn!(
                    file_id = entry.file_id,
                    "remove references unknown blob file"
                ),
            }
        }
    }

    /// Per-file usage statistics for the GC pass.
    pub(crate) fn stats(&self) -> Vec<BlobFileStat> {
        let inner = self.inner.read();
        inner
            .files
            .iter()
            .map(|(id, slot)| {
                let space = slot.space.lock();
                BlobFileStat {
                    file_id: *id,
                    used_bytes: space.used_bytes(),
                    watermark: space.watermark(),
                    valid_rate: space.valid_rate(),
                    is_hot: inner.hot.contains(id),
                }
            })
            .collect()
    }

    /// Deletes files that no longer hold any live bytes. Returns the ids
    /// of the files dropped.
    pub(crate) fn drop_empty_files(&self) -> Vec<u64> {
        let mut inner = self.inner.write();
        let empty: Vec<u64> = inner
            .files
            .iter()
            .filter(|(id, slot)| {
                !inner.hot.contains(*id) && {
                    let space = slot.space.lock();
                    space.is_empty() && space.watermark() > 0
                }
            })
            .map(|(id, _)| *id)
            .collect();

        let mut dropped = Vec::new();
        for id in empty {
            if let Some(slot) = inner.files.remove(&id) {
                if let Err(err) = std::fs::remove_file(slot.file.path()) {
                    warn!(file_id = id, "failed to delete empty blob file: {}", err);
                }
                dropped.push(id);
            }
        }
        if !dropped.is_empty() {
            info!(files = ?dropped, "dropped empty blob files");
        }
        dropped
    }
}
