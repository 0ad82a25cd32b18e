//! Remote reader: fetches page bytes from checkpoint data files.
//!
//! Given an entry's `checkpoint_info.data_location`, issues ranged object
//! reads with bounded exponential backoff. A missing object maps to
//! `RemoteGone` and a checksum mismatch to `Corruption`; neither is ever
//! retried. All extra read context travels as explicit arguments; there
//! is no per-thread state.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{PageError, Result};
use crate::types::{display_page_id, ChecksumAlgorithm, FieldData, Page, PageEntry, PageId};

use super::{join_key, ObjectStore, ObjectStoreError, RemoteConfig};

/// Fetches page bytes from the object store with retry and backoff.
pub struct RemoteReader {
    store: Arc<dyn ObjectStore>,
    config: RemoteConfig,
    checksum: ChecksumAlgorithm,
}

impl RemoteReader {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        config: RemoteConfig,
        checksum: ChecksumAlgorithm,
    ) -> Self {
        Self {
            store,
            config,
            checksum,
        }
    }

    /// Reads one remote page. The result is identical in format to a
    /// blob-store read.
    pub(crate) fn read(&self, page_id: &[u8], entry: &PageEntry) -> Result<Page> {
        let data = self.read_entry_bytes(page_id, entry)?;
        Ok(Page {
            page_id: page_id.to_vec(),
            data,
            field_offsets: entry.field_offsets.clone(),
        })
    }

    /// Batched remote reads.
    pub(crate) fn read_multi(&self, entries: &[(PageId, PageEntry)]) -> Result<Vec<Page>> {
        let mut pages = Vec::with_capacity(entries.len());
        for (page_id, entry) in entries {
            pages.push(self.read(page_id, entry)?);
        }
        Ok(pages)
    }

    /// Field reads against remote entries. Whole pages are fetched (they
    /// are what the caller writes back into the local cache) and the
    /// requested fields sliced out of them. Returns
    /// `(pages_for_cache_update, field_slices)`.
    pub(crate) fn read_fields(
        &self,
        requests: &[(PageId, PageEntry, Vec<usize>)],
    ) -> Result<(Vec<Page>, Vec<(PageId, Vec<FieldData>)>)> {
        let mut for_cache = Vec::with_capacity(requests.len());
        let mut sliced = Vec::with_capacity(requests.len());
        for (page_id, entry, indices) in requests {
            let page = self.read(page_id, entry)?;
            let mut fields = Vec::with_capacity(indices.len());
            for &index in indices {
                let (start, len) = entry.field_range(index).ok_or_else(|| {
                    PageError::PreconditionViolation(format!(
                        "field {} out of range for page {}",
                        index,
                        display_page_id(page_id)
                    ))
                })?;
                let start = start as usize;
                let end = start + len as usize;
                let data = page.data.get(start..end).ok_or_else(|| {
                    PageError::Corruption(format!(
                        "remote page {} shorter than its field boundaries",
                        display_page_id(page_id)
                    ))
                })?;
                fields.push(FieldData {
                    index,
                    data: data.to_vec(),
                });
            }
            sliced.push((page_id.clone(), fields));
            for_cache.push(page);
        }
        Ok((for_cache, sliced))
    }

    fn read_entry_bytes(&self, page_id: &[u8], entry: &PageEntry) -> Result<Vec<u8>> {
        let info = entry.checkpoint_info.as_ref().ok_or_else(|| {
            PageError::PreconditionViolation(format!(
                "page {} has no remote replica",
                display_page_id(page_id)
            ))
        })?;
        let location = &info.data_location;
        let key = join_key(&self.config.root, &location.data_file_id);

        let data = self.get_range_with_retry(&key, location.offset, location.size)?;
        if entry.checksum != 0 {
            let actual = self.checksum.compute(&data);
            if actual != entry.checksum {
                return Err(PageError::Corruption(format!(
                    "checksum mismatch for remote page {} in {}: expected {:#x}, got {:#x}",
                    display_page_id(page_id),
                    key,
                    entry.checksum,
                    actual
                )));
            }
        }
        Ok(data)
    }

    fn get_range_with_retry(&self, key: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.store.get_object_range(key, offset, size) {
                Ok(data) => return Ok(data),
                Err(ObjectStoreError::NotFound(key)) => {
                    return Err(PageError::RemoteGone(key));
                }
                Err(ObjectStoreError::Other(msg)) => {
                    if attempt >= self.config.max_retries {
                        warn!(key, attempt, "remote read failed: {}", msg);
                        return Err(PageError::RemoteFailure(msg));
                    }
                    let backoff = self.backoff(attempt);
                    debug!(key, attempt, backoff_ms = backoff.as_millis() as u64,
                        "retrying remote read: {}", msg);
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
            }
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let base = self.config.retry_backoff.saturating_mul(1 << attempt.min(16));
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64 / 2);
        base + Duration::from_millis(jitter)
    }
}
