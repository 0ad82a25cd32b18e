//! Lock manager: pins remote checkpoint data files this node references.
//!
//! While any directory entry references a remote data file, a zero-byte
//! lock marker object must exist in the object store so cross-node GC
//! cannot delete the file. Lock bookkeeping is a finite-state contract:
//!
//! ```text
//! Pending  -- apply succeeds -->  Applied (marker owned by entries)
//!    |
//!    +----- batch aborts ----->  Released (marker deleted iff we made it)
//! ```
//!
//! A batch that fails between Pending and Applied leaves no Pending
//! state behind: the compensating release deletes exactly the markers
//! this batch created.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::batch::{WriteBatch, WriteOp};
use crate::error::{PageError, Result};

use super::{join_key, ObjectStore, RemoteConfig};

/// Lock descriptors a new checkpoint upload must carry so the files it
/// references stay protected until the upload is fully persisted.
#[derive(Clone, Debug)]
pub struct ExtraLockInfo {
    /// Upload sequence allocated for the new checkpoint.
    pub upload_sequence: u64,

    /// Lock keys still pending on this node; the upload must keep their
    /// files locked.
    pub pending_lock_keys: HashSet<String>,
}

struct PendingLock {
    refcount: u32,
    /// Whether this node created the marker object (and so may delete it
    /// on a compensating release).
    created_by_us: bool,
}

struct LockState {
    store_id: Option<u64>,
    upload_sequence: u64,
    pending: HashMap<String, PendingLock>,
}

/// Tracks references from this node to remote checkpoint data files and
/// maintains the corresponding lock marker objects.
pub struct LockManager {
    store: Arc<dyn ObjectStore>,
    config: RemoteConfig,
    state: Mutex<LockState>,
    init_cv: Condvar,
}

/// Key of the lock marker pinning `data_file_id` on behalf of
/// `(store_id, upload_sequence)`.
pub(crate) fn lock_key(data_file_id: &str, store_id: u64, upload_sequence: u64) -> String {
    format!("lock/{}.lock_s{}_{}", data_file_id, store_id, upload_sequence)
}

/// Object-store prefix holding this store's checkpoint manifests.
pub(crate) fn manifest_prefix(store_id: u64) -> String {
    format!("s{}/manifest/", store_id)
}

fn parse_manifest_sequence(key: &str) -> Option<u64> {
    key.rsplit('_').next()?.parse().ok()
}

impl LockManager {
    pub(crate) fn new(store: Arc<dyn ObjectStore>, config: RemoteConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(LockState {
                store_id: None,
                upload_sequence: 0,
                pending: HashMap::new(),
            }),
            init_cv: Condvar::new(),
        }
    }

    /// Binds the manager to this node's identity. Scans the store for the
    /// last persisted checkpoint manifest and returns its sequence, which
    /// the caller uses to seed `last_checkpoint_sequence`. Unblocks every
    /// waiter once the identity is set.
    pub(crate) fn init_store_info(&self, store_id: u64) -> Result<Option<u64>> {
        let prefix = join_key(&self.config.root, &manifest_prefix(store_id));
        let manifests = self
            .store
            .list_prefix(&prefix)
            .map_err(|err| PageError::RemoteFailure(err.to_string()))?;
        let last_sequence = manifests
            .iter()
            .filter_map(|key| parse_manifest_sequence(key))
            .max();

        let mut state = self.state.lock();
        state.store_id = Some(store_id);
        if let Some(sequence) = last_sequence {
            state.upload_sequence = sequence;
        }
        drop(state);
        self.init_cv.notify_all();

        info!(store_id, last_sequence, "lock manager initialized");
        Ok(last_sequence)
    }

    /// Blocks until `init_store_info` has run, bounded by the configured
    /// wait timeout.
    fn wait_store_id<'a>(
        &'a self,
        mut state: parking_lot::MutexGuard<'a, LockState>,
    ) -> Result<(parking_lot::MutexGuard<'a, LockState>, u64)> {
        let deadline = Instant::now() + self.config.lock_wait_timeout;
        while state.store_id.is_none() {
            if self.init_cv.wait_until(&mut state, deadline).timed_out() {
                return Err(PageError::PreconditionViolation(
                    "lock manager used before init_store_info".to_string(),
                ));
            }
        }
        let store_id = state.store_id.unwrap_or_default();
        Ok((state, store_id))
    }

    /// Creates the lock markers a write batch depends on, stamping each
    /// remote-referencing op with its lock key. Runs strictly before the
    /// batch is applied. On any failure nothing stays Pending and no
    /// marker created here survives.
    pub(crate) fn create_locks_for_write_batch(&self, batch: &mut WriteBatch) -> Result<()> {
        let state = self.state.lock();
        let (mut state, store_id) = self.wait_store_id(state)?;
        let upload_sequence = state.upload_sequence + 1;

        let mut stamped: Vec<String> = Vec::new();
        let mut failure: Option<PageError> = None;

        for op in batch.ops_mut() {
            let WriteOp::PutRemote {
                location, lock_key: slot, ..
            } = op
            else {
                continue;
            };
            let key = lock_key(&location.data_file_id, store_id, upload_sequence);

            if let Some(pending) = state.pending.get_mut(&key) {
                pending.refcount += 1;
                *slot = Some(key.clone());
                stamped.push(key);
                continue;
            }

            let object_key = join_key(&self.config.root, &key);
            let exists = match self.store.list_prefix(&object_key) {
                Ok(keys) => !keys.is_empty(),
                Err(err) => {
                    failure = Some(PageError::LockFailure(err.to_string()));
                    break;
                }
            };
            if !exists {
                if let Err(err) = self.store.put_object(&object_key, &[]) {
                    failure = Some(PageError::LockFailure(err.to_string()));
                    break;
                }
            }
            state.pending.insert(
                key.clone(),
                PendingLock {
                    refcount: 1,
                    created_by_us: !exists,
                },
            );
            debug!(lock = %key, created = !exists, "lock marker pending");
            *slot = Some(key.clone());
            stamped.push(key);
        }

        if let Some(err) = failure {
            self.release_locked(&mut state, &stamped);
            for op in batch.ops_mut() {
                if let WriteOp::PutRemote { lock_key, .. } = op {
                    *lock_key = None;
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Releases the Pending bookkeeping for lock keys consumed by a
    /// successful apply. The marker objects themselves stay: they are now
    /// owned by the directory's entries.
    pub(crate) fn clean_applied_locks(&self, lock_keys: Vec<String>) {
        let mut state = self.state.lock();
        for key in lock_keys {
            if let Some(pending) = state.pending.get_mut(&key) {
                pending.refcount -= 1;
                if pending.refcount == 0 {
                    state.pending.remove(&key);
                }
            }
        }
    }

    /// Compensating release for an aborted batch: undoes the Pending
    /// state and deletes any marker objects this batch created.
    pub(crate) fn release_pending_locks(&self, lock_keys: &[String]) {
        let mut state = self.state.lock();
        self.release_locked(&mut state, lock_keys);
    }

    fn release_locked(&self, state: &mut LockState, lock_keys: &[String]) {
        for key in lock_keys {
            let Some(pending) = state.pending.get_mut(key) else {
                continue;
            };
            pending.refcount -= 1;
            if pending.refcount > 0 {
                continue;
            }
            let created = pending.created_by_us;
            state.pending.remove(key);
            if created {
                let object_key = join_key(&self.config.root, key);
                if let Err(err) = self.store.delete_object(&object_key) {
                    warn!(lock = %key, "failed to delete aborted lock marker: {}", err);
                }
            }
        }
    }

    /// Allocates the lock info a new checkpoint upload must carry.
    pub(crate) fn allocate_new_upload_locks_info(&self) -> Result<ExtraLockInfo> {
        let state = self.state.lock();
        let (mut state, _) = self.wait_store_id(state)?;
        state.upload_sequence += 1;
        Ok(ExtraLockInfo {
            upload_sequence: state.upload_sequence,
            pending_lock_keys: state.pending.keys().cloned().collect(),
        })
    }

    /// Number of lock keys currently pending (diagnostics and tests).
    pub(crate) fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}
