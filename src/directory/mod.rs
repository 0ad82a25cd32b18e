//! Multi-version page directory with manifest-backed durability.
//!
//! Every page id maps to a chain of `(sequence, version)` records. Reads
//! at sequence `s` resolve the latest version with sequence <= `s` that
//! is not a tombstone; snapshots therefore observe a stable view no
//! matter how far the tip moves on. Key design points:
//!
//! - `apply` is exclusive and stage-then-publish: the edit is encoded and
//!   appended to the manifest first, so any I/O failure leaves the
//!   in-memory state untouched.
//! - Snapshots pin sequences through a shared retention map (see
//!   [`snapshot`]); version chains never hand out owning references.
//! - GC-driven purging drops exactly the versions no live pin can reach
//!   and reports their blob ranges for reclamation.

pub mod manifest;
mod snapshot;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::batch::{Edit, EditOp, EditRecord};
use crate::error::{PageError, Result};
use crate::types::{display_page_id, page_id_u64, CheckpointInfo, PageEntry, PageId};

use manifest::{ImageNode, Manifest, ManifestConfig};
pub use snapshot::Snapshot;
use snapshot::SnapshotRegistry;

/// One version of a page.
#[derive(Clone, Debug)]
pub(crate) enum VersionRecord {
    Entry(PageEntry),
    Tombstone,
    /// One-level alias to another page id.
    Ref(PageId),
    /// Directory-only marker page with no byte payload.
    External,
}

#[derive(Default)]
struct VersionChain {
    /// Versions in ascending sequence order. Records sharing a sequence
    /// (several ops on one id inside a batch) keep insertion order and
    /// the last one wins.
    versions: Vec<(u64, VersionRecord)>,
}

fn resolve_record<'a>(chain: &'a VersionChain, sequence: u64) -> Option<&'a (u64, VersionRecord)> {
    chain.versions.iter().rev().find(|(s, _)| *s <= sequence)
}

struct DirectoryInner {
    sequence: u64,
    chains: BTreeMap<PageId, VersionChain>,
}

impl DirectoryInner {
    fn entry_at(&self, page_id: &[u8], sequence: u64, follow_ref: bool) -> Option<PageEntry> {
        let chain = self.chains.get(page_id)?;
        match resolve_record(chain, sequence)? {
            (_, VersionRecord::Entry(entry)) => Some(entry.clone()),
            (_, VersionRecord::Tombstone) => None,
            (_, VersionRecord::External) => None,
            (_, VersionRecord::Ref(origin)) => {
                if follow_ref {
                    self.entry_at(origin, sequence, false)
                } else {
                    None
                }
            }
        }
    }

    fn is_alive(&self, page_id: &[u8], sequence: u64) -> bool {
        self.chains
            .get(page_id)
            .and_then(|chain| resolve_record(chain, sequence))
            .map_or(false, |(_, record)| {
                !matches!(record, VersionRecord::Tombstone)
            })
    }
}

/// Snapshot-isolated mapping `page_id -> versioned entry chain`,
/// persisted through the manifest.
pub struct PageDirectory {
    inner: RwLock<DirectoryInner>,
    manifest: Mutex<Manifest>,
    snapshots: SnapshotRegistry,
    /// Registered namespace prefix -> external ids seen under it.
    namespaces: Mutex<HashMap<Vec<u8>, HashSet<PageId>>>,
    max_restored_id: u64,
}

impl PageDirectory {
    /// Recovers the directory from the manifest under `dir`.
    pub(crate) fn restore(dir: &Path, config: ManifestConfig) -> Result<PageDirectory> {
        let (manifest, recovered) = Manifest::open(dir, config)?;

        let mut inner = DirectoryInner {
            sequence: 0,
            chains: BTreeMap::new(),
        };
        let mut max_id = 0u64;

        if let Some(image) = recovered.image {
            inner.sequence = image.sequence;
            for node in image.nodes {
                max_id = max_id.max(page_id_u64(&node.page_id));
                let record = match node.op {
                    EditOp::Put(entry) => VersionRecord::Entry(entry),
                    EditOp::Ref(origin) => VersionRecord::Ref(origin),
                    EditOp::External => VersionRecord::External,
                    other => {
                        warn!("ignoring unexpected image op: {:?}", other);
                        continue;
                    }
                };
                inner
                    .chains
                    .entry(node.page_id)
                    .or_default()
                    .versions
                    .push((node.sequence, record));
            }
        }

        for log in recovered.logs {
            let mut bumped = false;
            for record in log.records {
                max_id = max_id.max(page_id_u64(&record.page_id));
                match record.op {
                    EditOp::Put(entry) => {
                        push_version(
                            &mut inner.chains,
                            record.page_id,
                            log.sequence,
                            VersionRecord::Entry(entry),
                        );
                        bumped = true;
                    }
                    EditOp::Del => {
                        push_version(
                            &mut inner.chains,
                            record.page_id,
                            log.sequence,
                            VersionRecord::Tombstone,
                        );
                        bumped = true;
                    }
                    EditOp::Ref(origin) => {
                        push_version(
                            &mut inner.chains,
                            record.page_id,
                            log.sequence,
                            VersionRecord::Ref(origin),
                        );
                        bumped = true;
                    }
                    EditOp::External => {
                        push_version(
                            &mut inner.chains,
                            record.page_id,
                            log.sequence,
                            VersionRecord::External,
                        );
                        bumped = true;
                    }
                    EditOp::UpdateRemoteCache(local) => {
                        install_cache_update(&mut inner, &record.page_id, &local, log.sequence);
                    }
                    EditOp::Reclaim(remote_form) => {
                        replace_tip_entry(&mut inner, &record.page_id, remote_form);
                    }
                }
            }
            if bumped {
                inner.sequence = inner.sequence.max(log.sequence);
            }
        }

        info!(
            sequence = inner.sequence,
            pages = inner.chains.len(),
            "page directory restored"
        );

        Ok(PageDirectory {
            inner: RwLock::new(inner),
            manifest: Mutex::new(manifest),
            snapshots: Arc::new(Mutex::new(BTreeMap::new())),
            namespaces: Mutex::new(HashMap::new()),
            max_restored_id: max_id,
        })
    }

    /// Current directory sequence.
    pub fn sequence(&self) -> u64 {
        self.inner.read().sequence
    }

    /// Highest numeric page id observed in the restored manifest.
    pub fn get_max_id_after_restart(&self) -> u64 {
        self.max_restored_id
    }

    /// Captures the current sequence as a snapshot, pinning every entry
    /// resolvable at it.
    pub fn create_snapshot(&self, tag: &str) -> Snapshot {
        let inner = self.inner.read();
        Snapshot::register(&self.snapshots, inner.sequence, tag)
    }

    /// Number of snapshots currently alive.
    pub fn live_snapshots(&self) -> usize {
        self.snapshots.lock().values().sum()
    }

    /// Atomically assigns the next sequence to `edit`, appends it to the
    /// manifest and installs the new versions. Returns the lock keys the
    /// edit consumed so the caller can release their pending state.
    pub(crate) fn apply(&self, edit: Edit) -> Result<Vec<String>> {
        for record in &edit.records {
            if matches!(
                record.op,
                EditOp::UpdateRemoteCache(_) | EditOp::Reclaim(_)
            ) {
                return Err(PageError::PreconditionViolation(
                    "cache updates do not go through apply".to_string(),
                ));
            }
        }

        let mut inner = self.inner.write();
        let sequence = inner.sequence + 1;
        let payload = manifest::encode_edit(sequence, &edit);
        self.manifest.lock().append(&payload)?;

        let record_count = edit.records.len();
        let mut lock_keys = Vec::new();
        for record in edit.records {
            if let Some(key) = record.lock_key {
                lock_keys.push(key);
            }
            match record.op {
                EditOp::Put(entry) => push_version(
                    &mut inner.chains,
                    record.page_id,
                    sequence,
                    VersionRecord::Entry(entry),
                ),
                EditOp::Del => push_version(
                    &mut inner.chains,
                    record.page_id,
                    sequence,
                    VersionRecord::Tombstone,
                ),
                EditOp::Ref(origin) => push_version(
                    &mut inner.chains,
                    record.page_id,
                    sequence,
                    VersionRecord::Ref(origin),
                ),
                EditOp::External => {
                    self.track_external(&record.page_id);
                    push_version(
                        &mut inner.chains,
                        record.page_id,
                        sequence,
                        VersionRecord::External,
                    );
                }
                EditOp::UpdateRemoteCache(_) | EditOp::Reclaim(_) => {}
            }
        }
        inner.sequence = sequence;
        debug!(sequence, records = record_count, "edit applied");

        if let Err(err) = self.maybe_compact(&inner) {
            warn!("manifest compaction failed: {}", err);
        }
        Ok(lock_keys)
    }

    fn maybe_compact(&self, inner: &DirectoryInner) -> Result<()> {
        let mut manifest = self.manifest.lock();
        if !manifest.should_compact() {
            return Ok(());
        }
        let mut nodes = Vec::new();
        for (page_id, chain) in &inner.chains {
            let Some((seq, record)) = resolve_record(chain, inner.sequence) else {
                continue;
            };
            let op = match record {
                VersionRecord::Entry(entry) => EditOp::Put(entry.clone()),
                VersionRecord::Ref(origin) => EditOp::Ref(origin.clone()),
                VersionRecord::External => EditOp::External,
                VersionRecord::Tombstone => continue,
            };
            nodes.push(ImageNode {
                page_id: page_id.clone(),
                sequence: *seq,
                op,
            });
        }
        manifest.compact(&manifest::encode_image(inner.sequence, &nodes))
    }

    /// Single lookup; fails with `NotFound` when the id does not resolve.
    pub fn get_by_id(&self, page_id: &[u8], snapshot: &Snapshot) -> Result<PageEntry> {
        self.try_get_by_id(page_id, snapshot).ok_or_else(|| {
            PageError::NotFound(format!(
                "page {} at sequence {}",
                display_page_id(page_id),
                snapshot.sequence()
            ))
        })
    }

    /// Single lookup returning `None` when the id does not resolve.
    pub fn try_get_by_id(&self, page_id: &[u8], snapshot: &Snapshot) -> Option<PageEntry> {
        self.inner
            .read()
            .entry_at(page_id, snapshot.sequence(), true)
    }

    /// Batched lookup; fails with `NotFound` on the first missing id.
    pub fn get_by_ids(
        &self,
        page_ids: &[PageId],
        snapshot: &Snapshot,
    ) -> Result<Vec<(PageId, PageEntry)>> {
        let inner = self.inner.read();
        let mut out = Vec::with_capacity(page_ids.len());
        for page_id in page_ids {
            match inner.entry_at(page_id, snapshot.sequence(), true) {
                Some(entry) => out.push((page_id.clone(), entry)),
                None => {
                    return Err(PageError::NotFound(format!(
                        "page {} at sequence {}",
                        display_page_id(page_id),
                        snapshot.sequence()
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Batched lookup partitioning into resolved entries and missing ids.
    pub fn try_get_by_ids(
        &self,
        page_ids: &[PageId],
        snapshot: &Snapshot,
    ) -> (Vec<(PageId, PageEntry)>, Vec<PageId>) {
        let inner = self.inner.read();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for page_id in page_ids {
            match inner.entry_at(page_id, snapshot.sequence(), true) {
                Some(entry) => found.push((page_id.clone(), entry)),
                None => missing.push(page_id.clone()),
            }
        }
        (found, missing)
    }

    /// Ordered enumeration of ids alive at the snapshot under `prefix`.
    pub fn get_all_page_ids_with_prefix(&self, prefix: &[u8], snapshot: &Snapshot) -> Vec<PageId> {
        let inner = self.inner.read();
        inner
            .chains
            .range(prefix.to_vec()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .filter(|(id, _)| inner.is_alive(id, snapshot.sequence()))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Follows one level of ref aliasing to the canonical page id.
    pub fn get_normal_page_id(&self, page_id: &[u8], snapshot: &Snapshot) -> Result<PageId> {
        self.try_get_normal_page_id(page_id, snapshot)
            .ok_or_else(|| {
                PageError::NotFound(format!(
                    "page {} at sequence {}",
                    display_page_id(page_id),
                    snapshot.sequence()
                ))
            })
    }

    /// Non-throwing form of [`PageDirectory::get_normal_page_id`].
    pub fn try_get_normal_page_id(&self, page_id: &[u8], snapshot: &Snapshot) -> Option<PageId> {
        let inner = self.inner.read();
        let chain = inner.chains.get(page_id)?;
        match resolve_record(chain, snapshot.sequence())? {
            (_, VersionRecord::Ref(origin)) => Some(origin.clone()),
            (_, VersionRecord::Tombstone) => None,
            _ => Some(page_id.to_vec()),
        }
    }

    /// Produces the full set of puts needed to recreate the directory at
    /// the snapshot. Records carry the sequence of the chain node they
    /// were dumped from, so checkpoint info can be copied back precisely.
    pub(crate) fn dump_snapshot_to_edit(&self, snapshot: &Snapshot) -> Edit {
        let inner = self.inner.read();
        let mut edit = Edit::new();
        for (page_id, chain) in &inner.chains {
            let Some((seq, record)) = resolve_record(chain, snapshot.sequence()) else {
                continue;
            };
            let op = match record {
                VersionRecord::Entry(entry) => EditOp::Put(entry.clone()),
                VersionRecord::Ref(origin) => EditOp::Ref(origin.clone()),
                VersionRecord::External => EditOp::External,
                VersionRecord::Tombstone => continue,
            };
            edit.records.push(EditRecord {
                page_id: page_id.clone(),
                op,
                sequence: *seq,
                lock_key: None,
            });
        }
        edit
    }

    /// Attaches checkpoint locations from a dumped-and-persisted edit
    /// back onto the in-memory entries. A record only matches the chain
    /// node with the exact sequence it was dumped from; moved-on pages
    /// are skipped.
    pub(crate) fn copy_checkpoint_info_from_edit(&self, edit: &Edit) {
        let mut inner = self.inner.write();
        for record in &edit.records {
            let EditOp::Put(dumped) = &record.op else {
                continue;
            };
            let Some(info) = &dumped.checkpoint_info else {
                continue;
            };
            let Some(chain) = inner.chains.get_mut(&record.page_id) else {
                continue;
            };
            for (seq, version) in chain.versions.iter_mut().rev() {
                if *seq < record.sequence {
                    break;
                }
                if *seq == record.sequence {
                    if let VersionRecord::Entry(entry) = version {
                        let reclaimed = entry
                            .checkpoint_info
                            .as_ref()
                            .map_or(false, |c| c.is_local_data_reclaimed);
                        entry.checkpoint_info = Some(CheckpointInfo {
                            data_location: info.data_location.clone(),
                            is_local_data_reclaimed: reclaimed,
                        });
                    }
                    break;
                }
            }
        }
    }

    /// Installs locally-cached replicas of remote-only entries. A record
    /// lands only when the chain tip is still the exact version the
    /// snapshot resolved and is still remote-only; everything else is
    /// returned as ignored entries whose blob ranges the caller frees.
    pub(crate) fn update_local_cache_for_remote_pages(
        &self,
        edit: Edit,
        snapshot: &Snapshot,
    ) -> Result<Vec<PageEntry>> {
        let mut inner = self.inner.write();
        let mut ignored = Vec::new();
        let mut installable = Vec::new();

        for record in edit.records {
            let EditOp::UpdateRemoteCache(local) = record.op else {
                return Err(PageError::PreconditionViolation(
                    "cache update batch may only carry update_remote_page ops".to_string(),
                ));
            };
            if cache_update_applies(&inner, &record.page_id, snapshot.sequence()) {
                installable.push((record.page_id, local));
            } else {
                ignored.push(local);
            }
        }

        if !installable.is_empty() {
            // Persist first: a manifest failure must leave memory as-is.
            let mut persisted = Edit::new();
            for (page_id, local) in &installable {
                persisted.update_remote_cache(page_id.clone(), local.clone());
            }
            let payload = manifest::encode_edit(inner.sequence, &persisted);
            if let Err(err) = self.manifest.lock().append(&payload) {
                ignored.extend(installable.into_iter().map(|(_, local)| local));
                warn!("cache update not persisted: {}", err);
                return Ok(ignored);
            }

            for (page_id, local) in installable {
                let sequence = inner.sequence;
                install_cache_update(&mut inner, &page_id, &local, sequence);
            }
        }
        Ok(ignored)
    }

    /// Frees the local data of every checkpointed version of `page_id`,
    /// flipping the entries to remote-only. Returns the entries whose
    /// blob ranges the caller must release. Versions never captured by a
    /// checkpoint are left untouched.
    ///
    /// When the tip version flips, its remote-only form is persisted in
    /// the manifest: a restarted directory must route reads through the
    /// object store rather than a local range that may have been reused.
    /// Flipped non-tip versions only matter to in-process snapshots and
    /// need no persistence.
    pub(crate) fn reclaim_local_data(&self, page_id: &[u8]) -> Result<Vec<PageEntry>> {
        let mut inner = self.inner.write();
        let Some(chain) = inner.chains.get(page_id) else {
            return Ok(Vec::new());
        };

        let reclaimable = |entry: &PageEntry| entry.has_local_data() && entry.checkpoint_info.is_some();
        if !chain.versions.iter().any(
            |(_, version)| matches!(version, VersionRecord::Entry(e) if reclaimable(e)),
        ) {
            return Ok(Vec::new());
        }

        // Stage: the tip's remote-only form is what gets persisted.
        let persisted_tip = match chain.versions.last() {
            Some((_, VersionRecord::Entry(entry))) if reclaimable(entry) => {
                let mut remote_form = entry.clone();
                if let Some(info) = remote_form.checkpoint_info.as_mut() {
                    info.is_local_data_reclaimed = true;
                }
                Some(remote_form)
            }
            _ => None,
        };
        if let Some(remote_form) = &persisted_tip {
            let mut edit = Edit::new();
            edit.reclaim(page_id.to_vec(), remote_form.clone());
            let payload = manifest::encode_edit(inner.sequence, &edit);
            self.manifest.lock().append(&payload)?;
        }

        let mut freed = Vec::new();
        if let Some(chain) = inner.chains.get_mut(page_id) {
            for (_, version) in chain.versions.iter_mut() {
                if let VersionRecord::Entry(entry) = version {
                    if reclaimable(entry) {
                        freed.push(entry.clone());
                        if let Some(info) = entry.checkpoint_info.as_mut() {
                            info.is_local_data_reclaimed = true;
                        }
                    }
                }
            }
        }
        debug!(
            page_id = %display_page_id(page_id),
            versions = freed.len(),
            "local data reclaimed"
        );
        Ok(freed)
    }

    /// Drops every version no live pin (snapshot or tip) can reach and
    /// whole chains that end in an unpinned tombstone. Returns the
    /// entries whose blob ranges became unreferenced.
    pub(crate) fn purge_stale_versions(&self) -> Vec<PageEntry> {
        let mut inner = self.inner.write();
        let mut pins: Vec<u64> = self.snapshots.lock().keys().copied().collect();
        pins.push(inner.sequence);

        let mut freed = Vec::new();
        let mut dead = Vec::new();
        for (page_id, chain) in inner.chains.iter_mut() {
            let needed = mark_needed(&chain.versions, &pins);
            if needed.iter().all(|n| *n) {
                // Fast path, nothing to drop except maybe a lone tombstone.
            } else {
                let mut idx = 0;
                chain.versions.retain(|(_, version)| {
                    let keep = needed[idx];
                    idx += 1;
                    if !keep {
                        if let VersionRecord::Entry(entry) = version {
                            if entry.has_local_data() {
                                freed.push(entry.clone());
                            }
                        }
                    }
                    keep
                });
            }

            // A tombstone with nothing underneath resolves the same as an
            // absent version: drop it.
            while matches!(
                chain.versions.first(),
                Some((_, VersionRecord::Tombstone))
            ) {
                chain.versions.remove(0);
            }
            if chain.versions.is_empty() {
                dead.push(page_id.clone());
            }
        }
        for page_id in &dead {
            inner.chains.remove(page_id);
        }

        if !dead.is_empty() || !freed.is_empty() {
            let mut namespaces = self.namespaces.lock();
            for ids in namespaces.values_mut() {
                ids.retain(|id| inner.chains.contains_key(id));
            }
            debug!(
                freed = freed.len(),
                removed_chains = dead.len(),
                "purged stale versions"
            );
        }
        freed
    }

    /// Visits the tip version of every page holding a local or remote
    /// entry. Used by GC for file statistics and rewrite candidates.
    pub(crate) fn for_each_tip_entry(&self, mut f: impl FnMut(&PageId, u64, &PageEntry)) {
        let inner = self.inner.read();
        for (page_id, chain) in &inner.chains {
            if let Some((seq, VersionRecord::Entry(entry))) = chain.versions.last() {
                f(page_id, *seq, entry);
            }
        }
    }

    /// Registers a namespace prefix for external-id tracking, seeding it
    /// with the external pages already alive under the prefix.
    pub(crate) fn register_namespace(&self, prefix: &[u8]) {
        let inner = self.inner.read();
        let mut ids = HashSet::new();
        for (page_id, chain) in inner
            .chains
            .range(prefix.to_vec()..)
            .take_while(|(id, _)| id.starts_with(prefix))
        {
            if matches!(
                resolve_record(chain, inner.sequence),
                Some((_, VersionRecord::External))
            ) {
                ids.insert(page_id.clone());
            }
        }
        self.namespaces.lock().insert(prefix.to_vec(), ids);
    }

    /// Drops external-id bookkeeping under `prefix`.
    pub fn unregister_namespace(&self, prefix: &[u8]) {
        self.namespaces.lock().remove(prefix);
    }

    /// External ids alive at the current sequence under `prefix`.
    pub(crate) fn alive_external_ids(&self, prefix: &[u8]) -> HashSet<PageId> {
        let inner = self.inner.read();
        let namespaces = self.namespaces.lock();
        let Some(ids) = namespaces.get(prefix) else {
            return HashSet::new();
        };
        ids.iter()
            .filter(|id| {
                matches!(
                    inner
                        .chains
                        .get(*id)
                        .and_then(|chain| resolve_record(chain, inner.sequence)),
                    Some((_, VersionRecord::External))
                )
            })
            .cloned()
            .collect()
    }

    fn track_external(&self, page_id: &[u8]) {
        let mut namespaces = self.namespaces.lock();
        for (prefix, ids) in namespaces.iter_mut() {
            if page_id.starts_with(prefix) {
                ids.insert(page_id.to_vec());
            }
        }
    }

    /// Flushes the manifest log to disk.
    pub(crate) fn sync(&self) -> Result<()> {
        self.manifest.lock().sync()
    }
}

fn push_version(
    chains: &mut BTreeMap<PageId, VersionChain>,
    page_id: PageId,
    sequence: u64,
    record: VersionRecord,
) {
    chains
        .entry(page_id)
        .or_default()
        .versions
        .push((sequence, record));
}

/// Whether a staged cache update still applies: the tip must be the very
/// version visible at `sequence` and still remote-only.
fn cache_update_applies(inner: &DirectoryInner, page_id: &[u8], sequence: u64) -> bool {
    let Some(chain) = inner.chains.get(page_id) else {
        return false;
    };
    let Some((tip_seq, tip)) = chain.versions.last() else {
        return false;
    };
    let Some((visible_seq, _)) = resolve_record(chain, sequence) else {
        return false;
    };
    if tip_seq != visible_seq {
        return false;
    }
    matches!(tip, VersionRecord::Entry(entry) if entry.is_remote_only())
}

fn install_cache_update(
    inner: &mut DirectoryInner,
    page_id: &[u8],
    local: &PageEntry,
    sequence: u64,
) {
    if !cache_update_applies(inner, page_id, sequence) {
        return;
    }
    if let Some(chain) = inner.chains.get_mut(page_id) {
        if let Some((_, VersionRecord::Entry(entry))) = chain.versions.last_mut() {
            entry.file_id = local.file_id;
            entry.offset = local.offset;
            entry.size = local.size;
            entry.checksum = local.checksum;
            if let Some(info) = entry.checkpoint_info.as_mut() {
                info.is_local_data_reclaimed = false;
            }
        }
    }
}

fn replace_tip_entry(inner: &mut DirectoryInner, page_id: &[u8], remote_form: PageEntry) {
    if let Some(chain) = inner.chains.get_mut(page_id) {
        if let Some((_, version)) = chain.versions.last_mut() {
            if matches!(version, VersionRecord::Entry(_)) {
                *version = VersionRecord::Entry(remote_form);
            }
        }
    }
}

/// Marks which versions at least one pin resolves to.
fn mark_needed(versions: &[(u64, VersionRecord)], pins: &[u64]) -> Vec<bool> {
    let mut needed = vec![false; versions.len()];
    for &pin in pins {
        let i = versions.partition_point(|(seq, _)| *seq <= pin);
        if i > 0 {
            needed[i - 1] = true;
        }
    }
    needed
}
