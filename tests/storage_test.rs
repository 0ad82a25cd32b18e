//! End-to-end tests for the page storage engine: write/read round trips,
//! snapshot isolation, restart recovery, checkpoint dumps, remote
//! fallback reads with write-back, reference locks and GC.

use std::collections::HashSet;
use std::sync::Arc;

use tempfile::TempDir;

use pagestore::{
    read_checkpoint_data_index, read_checkpoint_manifest, CheckpointRecord, DataLocation,
    DumpCheckpointOptions, InMemoryObjectStore, ObjectStore, PageStorage, PageStorageConfig,
    WriteBatch,
};

/// Opens an engine rooted in `dir`, backed by the given object store.
fn open_storage(dir: &TempDir, store: Option<Arc<InMemoryObjectStore>>) -> PageStorage {
    PageStorage::open(
        "test-storage",
        dir.path(),
        PageStorageConfig::default(),
        store.map(|s| s as Arc<dyn ObjectStore>),
    )
    .expect("failed to open storage")
}

fn put(storage: &PageStorage, page_id: &[u8], data: Vec<u8>, tag: u64) {
    let mut batch = WriteBatch::new();
    batch.put(page_id.to_vec(), data, tag, vec![]);
    storage.write(batch, None).expect("write failed");
}

fn del(storage: &PageStorage, page_id: &[u8]) {
    let mut batch = WriteBatch::new();
    batch.del(page_id.to_vec());
    storage.write(batch, None).expect("delete failed");
}

/// Checkpoint options uploading both staged files into the object store
/// under their remote ids.
fn checkpoint_options(
    dir: &TempDir,
    store: Arc<InMemoryObjectStore>,
) -> DumpCheckpointOptions {
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    let staging = staging.to_str().unwrap().to_string();
    DumpCheckpointOptions {
        data_file_id_pattern: "s1/data/dat_{seq}_{index}".to_string(),
        data_file_path_pattern: format!("{}/dat_{{seq}}_{{index}}", staging),
        manifest_file_id_pattern: "s1/manifest/mf_{seq}".to_string(),
        manifest_file_path_pattern: format!("{}/mf_{{seq}}", staging),
        override_sequence: None,
        must_locked_files: HashSet::new(),
        compact_getter: None,
        writer_info: "storage-test".to_string(),
        persist_checkpoint: Box::new(move |files| {
            let data = std::fs::read(&files.data_file)?;
            let manifest = std::fs::read(&files.manifest_file)?;
            let seq = files
                .data_file
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("dat_"))
                .and_then(|n| n.strip_suffix("_0"))
                .unwrap()
                .to_string();
            store
                .put_object(&format!("s1/data/dat_{}_0", seq), &data)
                .unwrap();
            store
                .put_object(&format!("s1/manifest/mf_{}", seq), &manifest)
                .unwrap();
            Ok(true)
        }),
    }
}

// ============================================================================
// Round trips and snapshot semantics
// ============================================================================

#[test]
fn test_basic_round_trip() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    put(&storage, b"a", vec![1, 2, 3], 7);
    let page = storage.read(b"a", None, None).unwrap();
    assert_eq!(page.data, vec![1, 2, 3]);
    assert_eq!(storage.get_entry(b"a", None).unwrap().tag, 7);
}

#[test]
fn test_snapshot_isolation() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    put(&storage, b"a", vec![1], 0);
    let snap = storage.snapshot("isolation");
    put(&storage, b"a", vec![2], 0);

    assert_eq!(storage.read(b"a", None, Some(&snap)).unwrap().data, vec![1]);
    assert_eq!(storage.read(b"a", None, None).unwrap().data, vec![2]);
}

#[test]
fn test_delete_under_snapshot() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    put(&storage, b"a", vec![9], 0);
    let snap = storage.snapshot("pre-delete");
    del(&storage, b"a");

    assert_eq!(storage.read(b"a", None, Some(&snap)).unwrap().data, vec![9]);
    assert!(storage.try_read(b"a", None, None).unwrap().is_none());
    assert!(storage.read(b"a", None, None).is_err());
}

#[test]
fn test_writes_visible_to_later_snapshots_only() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    for round in 0..5u8 {
        put(&storage, b"k", vec![round], 0);
        let snap = storage.snapshot("round");
        // Later writes never leak into this snapshot.
        put(&storage, b"k", vec![round + 100], 0);
        assert_eq!(
            storage.read(b"k", None, Some(&snap)).unwrap().data,
            vec![round]
        );
    }
}

#[test]
fn test_ref_pages() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    put(&storage, b"origin", vec![5, 5], 0);
    let mut batch = WriteBatch::new();
    batch.put_ref(b"alias".to_vec(), b"origin".to_vec());
    storage.write(batch, None).unwrap();

    assert_eq!(storage.read(b"alias", None, None).unwrap().data, vec![5, 5]);
    assert_eq!(
        storage.get_normal_page_id(b"alias", None).unwrap(),
        b"origin".to_vec()
    );
}

#[test]
fn test_field_reads() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    let mut data = Vec::new();
    data.extend_from_slice(&[1; 4]);
    data.extend_from_slice(&[2; 6]);
    data.extend_from_slice(&[3; 2]);
    let mut batch = WriteBatch::new();
    batch.put(b"f".to_vec(), data, 0, vec![0, 4, 10]);
    storage.write(batch, None).unwrap();

    let results = storage
        .read_fields(&[(b"f".to_vec(), vec![1, 2])], None, None)
        .unwrap();
    assert_eq!(results.len(), 1);
    let fields = &results[0].1;
    assert_eq!(fields[0].data, vec![2; 6]);
    assert_eq!(fields[1].data, vec![3; 2]);

    // Whole-page reads expose the same boundaries.
    let page = storage.read(b"f", None, None).unwrap();
    assert_eq!(page.field(0).unwrap(), &[1; 4]);
}

#[test]
fn test_traverse_prefix() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    put(&storage, b"t/1", vec![1], 0);
    put(&storage, b"t/2", vec![2], 0);
    put(&storage, b"u/1", vec![3], 0);

    let mut seen = Vec::new();
    storage
        .traverse(b"t/", None, |page_id, page| {
            seen.push((page_id.to_vec(), page.data));
        })
        .unwrap();
    assert_eq!(
        seen,
        vec![(b"t/1".to_vec(), vec![1]), (b"t/2".to_vec(), vec![2])]
    );

    let mut entries = 0;
    storage
        .traverse_entries(b"t/", None, |_, _| entries += 1)
        .unwrap();
    assert_eq!(entries, 2);
}

// ============================================================================
// Restart recovery
// ============================================================================

#[test]
fn test_restart_recovers_pages() {
    let dir = TempDir::new().unwrap();
    {
        let storage = open_storage(&dir, None);
        put(&storage, b"a", vec![1], 0);
        put(&storage, b"b", vec![2], 0);
        let mut id = b"n/".to_vec();
        id.extend_from_slice(&41u64.to_be_bytes());
        put(&storage, &id, vec![3], 0);
        storage.shutdown().unwrap();
    }

    let storage = open_storage(&dir, None);
    assert_eq!(storage.read(b"a", None, None).unwrap().data, vec![1]);
    assert_eq!(storage.read(b"b", None, None).unwrap().data, vec![2]);
    assert_eq!(storage.get_max_id_after_restart(), 41);
}

#[test]
fn test_restart_preserves_overwrites_and_deletes() {
    let dir = TempDir::new().unwrap();
    {
        let storage = open_storage(&dir, None);
        put(&storage, b"a", vec![1], 0);
        put(&storage, b"a", vec![2], 0);
        put(&storage, b"gone", vec![9], 0);
        del(&storage, b"gone");
    }

    let storage = open_storage(&dir, None);
    assert_eq!(storage.read(b"a", None, None).unwrap().data, vec![2]);
    assert!(storage.try_read(b"gone", None, None).unwrap().is_none());

    // New writes after recovery keep working.
    put(&storage, b"c", vec![3], 0);
    assert_eq!(storage.read(b"c", None, None).unwrap().data, vec![3]);
}

// ============================================================================
// Checkpoints
// ============================================================================

#[test]
fn test_checkpoint_is_mountable_without_engine() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(1).unwrap();

    put(&storage, b"a", vec![1, 2], 0);
    put(&storage, b"b", vec![3, 4, 5], 0);

    let options = checkpoint_options(&dir, store.clone());
    let stats = storage.dump_incremental_checkpoint(&options).unwrap();
    assert!(stats.has_new_data);
    assert_eq!(stats.incremental_data_bytes, 5);

    // A reader with only the manifest + data file resolves every page.
    let manifest_bytes = store.get_object("s1/manifest/mf_2").unwrap();
    let manifest = read_checkpoint_manifest(&manifest_bytes).unwrap();
    assert_eq!(manifest.sequence, 2);
    assert_eq!(manifest.records.len(), 2);

    for record in &manifest.records {
        let CheckpointRecord::Put { page_id, entry } = record else {
            panic!("expected put records");
        };
        let location = &entry.checkpoint_info.as_ref().unwrap().data_location;
        let bytes = store
            .get_object_range(&location.data_file_id, location.offset, location.size)
            .unwrap();
        match page_id.as_slice() {
            b"a" => assert_eq!(bytes, vec![1, 2]),
            b"b" => assert_eq!(bytes, vec![3, 4, 5]),
            other => panic!("unexpected page {:?}", other),
        }
    }

    // The data file's own index agrees.
    let data_bytes = store.get_object("s1/data/dat_2_0").unwrap();
    let index = read_checkpoint_data_index(&data_bytes).unwrap();
    assert_eq!(index.len(), 2);
}

#[test]
fn test_duplicate_checkpoint_is_noop() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(1).unwrap();

    put(&storage, b"a", vec![1], 0);
    assert!(!storage.can_skip_checkpoint());

    let stats = storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store.clone()))
        .unwrap();
    assert!(stats.has_new_data);
    let objects_after_first = store.len();
    assert!(storage.can_skip_checkpoint());

    // No intervening write: the second dump returns has_new_data = false
    // and never invokes the persist callback.
    let stats = storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store.clone()))
        .unwrap();
    assert!(!stats.has_new_data);
    assert_eq!(store.len(), objects_after_first);
}

#[test]
fn test_second_checkpoint_only_ships_new_data() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(1).unwrap();

    put(&storage, b"a", vec![1; 16], 0);
    let stats = storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store.clone()))
        .unwrap();
    assert_eq!(stats.incremental_data_bytes, 16);

    put(&storage, b"b", vec![2; 8], 0);
    let stats = storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store.clone()))
        .unwrap();
    // Only "b" is copied; "a" keeps its location in the first data file.
    assert_eq!(stats.incremental_data_bytes, 8);

    let manifest_bytes = store.get_object("s1/manifest/mf_2").unwrap();
    let manifest = read_checkpoint_manifest(&manifest_bytes).unwrap();
    let a_location = manifest
        .records
        .iter()
        .find_map(|record| match record {
            CheckpointRecord::Put { page_id, entry } if page_id == b"a" => {
                Some(entry.checkpoint_info.as_ref().unwrap().data_location.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(a_location.data_file_id, "s1/data/dat_1_0");
}

#[test]
fn test_failed_persist_rolls_back_accounting() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(1).unwrap();

    put(&storage, b"a", vec![1], 0);

    let mut options = checkpoint_options(&dir, store.clone());
    options.persist_checkpoint = Box::new(|_| Ok(false));
    let stats = storage.dump_incremental_checkpoint(&options).unwrap();
    assert!(!stats.has_new_data);
    assert!(!storage.can_skip_checkpoint());

    // A later dump with a working callback succeeds.
    let stats = storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store))
        .unwrap();
    assert!(stats.has_new_data);
    assert!(storage.can_skip_checkpoint());
}

// ============================================================================
// Remote fallback and write-back
// ============================================================================

#[test]
fn test_reclaim_then_remote_read_with_write_back() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(1).unwrap();

    put(&storage, b"a", vec![4, 5], 0);
    storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store.clone()))
        .unwrap();

    assert!(storage.reclaim_local_data(b"a").unwrap());
    let entry = storage.get_entry(b"a", None).unwrap();
    assert!(entry.is_remote_only());

    // Served through the remote reader, then written back locally.
    let page = storage.read(b"a", None, None).unwrap();
    assert_eq!(page.data, vec![4, 5]);

    let cached = storage.get_entry(b"a", None).unwrap();
    assert!(cached.has_local_data());

    // A subsequent read is served locally even with the remote broken.
    store.inject_get_failures(100);
    let page = storage.read(b"a", None, None).unwrap();
    assert_eq!(page.data, vec![4, 5]);
}

#[test]
fn test_obsolete_write_back_is_dropped() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(1).unwrap();

    put(&storage, b"a", vec![4, 5], 0);
    storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store.clone()))
        .unwrap();
    storage.reclaim_local_data(b"a").unwrap();

    // Resolve the old version under a snapshot, overwrite the page, then
    // read through the snapshot: the write-back must be dropped and the
    // new mapping unaffected.
    let snap = storage.snapshot("in-flight");
    put(&storage, b"a", vec![9, 9], 0);

    let page = storage.read(b"a", None, Some(&snap)).unwrap();
    assert_eq!(page.data, vec![4, 5]);

    assert_eq!(storage.read(b"a", None, None).unwrap().data, vec![9, 9]);
    let tip_entry = storage.get_entry(b"a", None).unwrap();
    assert!(tip_entry.has_local_data());
    assert!(tip_entry.checkpoint_info.is_none());
}

#[test]
fn test_put_remote_page_creates_lock() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(7).unwrap();

    // The remote payload another node produced.
    store.put_object("s1/data/dat_9_0", &[1, 2, 3, 4]).unwrap();

    let mut batch = WriteBatch::new();
    batch.put_remote_page(
        b"ingested".to_vec(),
        DataLocation {
            data_file_id: "s1/data/dat_9_0".to_string(),
            offset: 0,
            size: 4,
        },
    );
    storage.write(batch, None).unwrap();

    // The lock marker exists and the page reads through the remote tier.
    assert!(store.contains("lock/s1/data/dat_9_0.lock_s7_1"));
    assert_eq!(
        storage.read(b"ingested", None, None).unwrap().data,
        vec![1, 2, 3, 4]
    );

    // The ingest lock was created under upload sequence 1; the next
    // checkpoint upload allocates that same sequence.
    let info = storage.allocate_new_upload_locks_info().unwrap();
    assert_eq!(info.upload_sequence, 1);
}

#[test]
fn test_init_locks_restores_checkpoint_sequence() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());

    // First life: write and checkpoint, leaving mf_2 in the store.
    {
        let storage = open_storage(&dir, Some(store.clone()));
        storage.init_locks_local_manager(1).unwrap();
        put(&storage, b"a", vec![1], 0);
        put(&storage, b"b", vec![2], 0);
        storage
            .dump_incremental_checkpoint(&checkpoint_options(&dir, store.clone()))
            .unwrap();
        storage.shutdown().unwrap();
    }

    // Second life: init restores last_checkpoint_sequence from mf_2, so
    // with no new writes the checkpoint can be skipped outright.
    let storage = open_storage(&dir, Some(store));
    assert!(!storage.can_skip_checkpoint());
    storage.init_locks_local_manager(1).unwrap();
    assert!(storage.can_skip_checkpoint());
}

// ============================================================================
// GC
// ============================================================================

#[test]
fn test_gc_preserves_live_snapshot() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir, None);

    put(&storage, b"a", vec![1], 0);
    put(&storage, b"a", vec![2], 0);
    let snap = storage.snapshot("pin");
    del(&storage, b"a");

    storage.gc(None, None).unwrap();

    assert_eq!(storage.read(b"a", None, Some(&snap)).unwrap().data, vec![2]);
    assert!(storage.try_read(b"a", None, None).unwrap().is_none());

    // Once the snapshot is gone, another pass reclaims the rest.
    drop(snap);
    assert!(storage.gc(None, None).unwrap());
}

#[test]
fn test_gc_updates_remote_valid_sizes() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let storage = open_storage(&dir, Some(store.clone()));
    storage.init_locks_local_manager(1).unwrap();

    put(&storage, b"a", vec![1; 10], 0);
    put(&storage, b"b", vec![2; 30], 0);
    storage
        .dump_incremental_checkpoint(&checkpoint_options(&dir, store))
        .unwrap();

    storage.gc(None, None).unwrap();
    let sizes = storage.remote_data_files_valid_sizes();
    assert_eq!(sizes.get("s1/data/dat_2_0"), Some(&40));

    // Deleting a page shrinks the valid size on the next pass.
    del(&storage, b"b");
    storage.gc(None, None).unwrap();
    let sizes = storage.remote_data_files_valid_sizes();
    assert_eq!(sizes.get("s1/data/dat_2_0"), Some(&10));
}

#[test]
fn test_concurrent_writers_and_readers() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(open_storage(&dir, None));

    let mut handles = Vec::new();
    for writer in 0..4u8 {
        let storage = storage.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25u8 {
                let key = vec![b'w', writer, i];
                let mut batch = WriteBatch::new();
                batch.put(key.clone(), vec![writer, i], 0, vec![]);
                storage.write(batch, None).unwrap();
                let page = storage.read(&key, None, None).unwrap();
                assert_eq!(page.data, vec![writer, i]);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    assert_eq!(storage.num_pages_with_prefix(b"w"), 100);
}
