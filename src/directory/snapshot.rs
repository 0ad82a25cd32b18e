//! Snapshot handles and the retention registry.
//!
//! A snapshot is nothing but a sequence plus a reference count in the
//! directory's retention registry. It holds no references into directory
//! nodes, so snapshots and the version chains cannot form ownership
//! cycles. Dropping the snapshot releases its pin; the next GC pass may
//! then reclaim versions only that pin kept alive.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared map of pinned sequence -> number of live snapshots at it.
pub(crate) type SnapshotRegistry = Arc<Mutex<BTreeMap<u64, usize>>>;

/// Immutable view of the directory at a fixed sequence. Reads through a
/// snapshot never observe edits with a higher sequence. The snapshot pins
/// the entries (and their blob ranges) it can resolve for its lifetime.
pub struct Snapshot {
    sequence: u64,
    tag: String,
    registry: SnapshotRegistry,
}

impl Snapshot {
    pub(crate) fn register(registry: &SnapshotRegistry, sequence: u64, tag: &str) -> Snapshot {
        *registry.lock().entry(sequence).or_insert(0) += 1;
        Snapshot {
            sequence,
            tag: tag.to_string(),
            registry: registry.clone(),
        }
    }

    /// The directory sequence this snapshot observes.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The tracing tag the snapshot was created with.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if let Some(count) = registry.get_mut(&self.sequence) {
            *count -= 1;
            if *count == 0 {
                registry.remove(&self.sequence);
            }
        }
    }
}
