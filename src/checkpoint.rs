//! Checkpoint files: immutable snapshots of the directory in the object
//! store.
//!
//! A checkpoint is a pair of files. The *data file* holds the payloads
//! of entries not yet persisted by an earlier checkpoint, plus a trailing
//! `page_id -> (offset, size)` index. The *manifest file* holds the full
//! directory edit at the checkpoint's sequence, every entry annotated
//! with its remote `data_location`, which may point into this data file
//! or into an older checkpoint's.
//!
//! Writing is a pipeline of discrete stages over explicit values:
//! snapshot -> dumped edit -> files writer -> persist callback ->
//! copy-info. The facade drives it (see `PageStorage::
//! dump_incremental_checkpoint`); this module owns the file formats.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::batch::{Edit, EditOp};
use crate::blob::BlobStore;
use crate::directory::manifest;
use crate::error::{PageError, Result};
use crate::limiter::RateLimiter;
use crate::remote::reader::RemoteReader;
use crate::types::{
    ByteReader, CheckpointInfo, ChecksumAlgorithm, DataLocation, PageEntry, PageId,
};

const DATA_MAGIC: &[u8; 4] = b"PSCD";
const MANIFEST_MAGIC: &[u8; 4] = b"PSCM";
const FORMAT_VERSION: u8 = 1;

/// Local staging paths of a finished checkpoint, handed to the persist
/// callback for upload.
#[derive(Clone, Debug)]
pub struct LocalCheckpointFiles {
    pub data_file: PathBuf,
    pub manifest_file: PathBuf,
}

/// Supplies the set of remote file ids whose live entries should be
/// rewritten into the new data file (remote compaction).
pub type CompactGetter = Box<dyn Fn() -> HashSet<String> + Send + Sync>;

/// Ships the staged files to the object store. Returning `Ok(false)` or
/// an error aborts the checkpoint without touching engine state.
pub type PersistCheckpoint = Box<dyn Fn(&LocalCheckpointFiles) -> Result<bool> + Send + Sync>;

/// Options for one incremental checkpoint dump. The `*_path_pattern`s
/// name local staging files, the `*_id_pattern`s name the remote objects
/// entries will reference; each substitutes `{seq}` and `{index}`.
pub struct DumpCheckpointOptions {
    pub data_file_id_pattern: String,
    pub data_file_path_pattern: String,
    pub manifest_file_id_pattern: String,
    pub manifest_file_path_pattern: String,

    /// Overrides the sequence substituted into file names (not the
    /// engine's checkpoint accounting).
    pub override_sequence: Option<u64>,

    /// Remote files that must stay locked for this upload.
    pub must_locked_files: HashSet<String>,

    pub compact_getter: Option<CompactGetter>,

    /// Free-form writer identity recorded in the file prefixes.
    pub writer_info: String,

    pub persist_checkpoint: PersistCheckpoint,
}

/// Outcome of one dump.
#[derive(Clone, Debug, Default)]
pub struct CheckpointStats {
    /// True when at least one payload was copied into the data file.
    pub has_new_data: bool,

    /// Bytes copied for entries persisted remotely for the first time.
    pub incremental_data_bytes: u64,

    /// Bytes copied out of remote files being compacted.
    pub compact_data_bytes: u64,
}

/// Substitutes `{seq}` and `{index}` in a file name pattern.
pub(crate) fn format_pattern(pattern: &str, seq: u64, index: u64) -> String {
    pattern
        .replace("{seq}", &seq.to_string())
        .replace("{index}", &index.to_string())
}

/// Header common to both checkpoint files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointFilePrefix {
    pub writer_info: String,
    pub sequence: u64,
    pub last_sequence: u64,
    /// Data file only: lock keys this upload keeps alive.
    pub locked_files: Vec<String>,
}

/// One record of a decoded checkpoint manifest.
#[derive(Clone, Debug)]
pub enum CheckpointRecord {
    Put { page_id: PageId, entry: PageEntry },
    Ref { page_id: PageId, origin: PageId },
    External { page_id: PageId },
}

/// A decoded checkpoint manifest file: everything a reader needs to
/// resolve the directory at the checkpoint's sequence without the
/// engine.
pub struct CheckpointManifest {
    pub writer_info: String,
    pub sequence: u64,
    pub last_sequence: u64,
    pub records: Vec<CheckpointRecord>,
}

/// Streams payloads into the data file and finalizes both files.
pub(crate) struct CheckpointFilesWriter<'a> {
    data_file: File,
    data_path: PathBuf,
    manifest_path: PathBuf,
    data_file_id: String,
    data_offset: u64,
    index: Vec<(PageId, u64, u64)>,
    prefix: CheckpointFilePrefix,
    blob_store: &'a BlobStore,
    remote_reader: Option<&'a RemoteReader>,
    checksum: ChecksumAlgorithm,
    stats: CheckpointStats,
}

impl<'a> CheckpointFilesWriter<'a> {
    /// Opens both staging files and writes the data file prefix.
    pub(crate) fn create(
        data_path: PathBuf,
        manifest_path: PathBuf,
        data_file_id: String,
        prefix: CheckpointFilePrefix,
        blob_store: &'a BlobStore,
        remote_reader: Option<&'a RemoteReader>,
        checksum: ChecksumAlgorithm,
    ) -> Result<Self> {
        if let Some(parent) = data_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = manifest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut data_file = File::create(&data_path)?;

        let mut header = Vec::new();
        header.extend_from_slice(DATA_MAGIC);
        header.push(FORMAT_VERSION);
        put_string(&mut header, &prefix.writer_info);
        header.extend_from_slice(&prefix.sequence.to_le_bytes());
        header.extend_from_slice(&prefix.last_sequence.to_le_bytes());
        header.extend_from_slice(&(prefix.locked_files.len() as u32).to_le_bytes());
        for lock in &prefix.locked_files {
            put_string(&mut header, lock);
        }
        data_file.write_all(&header)?;

        Ok(Self {
            data_offset: header.len() as u64,
            data_file,
            data_path,
            manifest_path,
            data_file_id,
            index: Vec::new(),
            prefix,
            blob_store,
            remote_reader,
            checksum,
            stats: CheckpointStats::default(),
        })
    }

    /// Copies the payload of every entry not already persisted by an
    /// earlier checkpoint (or whose remote file is being compacted) into
    /// the data file, annotating the edit in place with the new
    /// `data_location`s.
    pub(crate) fn write_edits(
        &mut self,
        edit: &mut Edit,
        files_to_compact: &HashSet<String>,
        read_limiter: Option<&RateLimiter>,
    ) -> Result<()> {
        for record in &mut edit.records {
            let EditOp::Put(entry) = &mut record.op else {
                continue;
            };
            let needs_copy = match &entry.checkpoint_info {
                None => true,
                Some(info) => files_to_compact.contains(&info.data_location.data_file_id),
            };
            if !needs_copy {
                continue;
            }
            let compacting = entry.checkpoint_info.is_some();

            let data = if entry.is_remote_only() {
                let reader = self.remote_reader.ok_or_else(|| {
                    PageError::PreconditionViolation(
                        "compacting a remote file requires a remote reader".to_string(),
                    )
                })?;
                reader.read(&record.page_id, entry)?.data
            } else {
                self.blob_store.read(&record.page_id, entry, read_limiter)?
            };

            let offset = self.append_record(&record.page_id, &data)?;
            let reclaimed = entry.is_remote_only();
            entry.checkpoint_info = Some(CheckpointInfo {
                data_location: DataLocation {
                    data_file_id: self.data_file_id.clone(),
                    offset,
                    size: data.len() as u64,
                },
                is_local_data_reclaimed: reclaimed,
            });

            self.stats.has_new_data = true;
            if compacting {
                self.stats.compact_data_bytes += data.len() as u64;
            } else {
                self.stats.incremental_data_bytes += data.len() as u64;
            }
        }
        Ok(())
    }

    fn append_record(&mut self, page_id: &[u8], data: &[u8]) -> Result<u64> {
        let mut record = Vec::with_capacity(12 + page_id.len() + data.len());
        record.extend_from_slice(&(page_id.len() as u32).to_le_bytes());
        record.extend_from_slice(page_id);
        record.extend_from_slice(&(data.len() as u64).to_le_bytes());
        let payload_offset = self.data_offset + record.len() as u64;
        record.extend_from_slice(data);
        self.data_file.write_all(&record)?;
        self.data_offset += record.len() as u64;
        self.index
            .push((page_id.to_vec(), payload_offset, data.len() as u64));
        Ok(payload_offset)
    }

    /// Writes the data file's index and trailer, then the manifest file
    /// carrying the annotated edit. Returns the collected stats.
    pub(crate) fn finish(mut self, edit: &Edit) -> Result<CheckpointStats> {
        // Data file suffix: index then trailer.
        let index_offset = self.data_offset;
        let mut suffix = Vec::new();
        suffix.extend_from_slice(&(self.index.len() as u64).to_le_bytes());
        for (page_id, offset, size) in &self.index {
            suffix.extend_from_slice(&(page_id.len() as u32).to_le_bytes());
            suffix.extend_from_slice(page_id);
            suffix.extend_from_slice(&offset.to_le_bytes());
            suffix.extend_from_slice(&size.to_le_bytes());
        }
        suffix.extend_from_slice(&index_offset.to_le_bytes());
        suffix.extend_from_slice(DATA_MAGIC);
        self.data_file.write_all(&suffix)?;
        self.data_file.sync_data()?;

        // Manifest file: prefix plus the framed edit.
        let mut manifest_file = File::create(&self.manifest_path)?;
        let mut out = Vec::new();
        out.extend_from_slice(MANIFEST_MAGIC);
        out.push(FORMAT_VERSION);
        put_string(&mut out, &self.prefix.writer_info);
        out.extend_from_slice(&self.prefix.sequence.to_le_bytes());
        out.extend_from_slice(&self.prefix.last_sequence.to_le_bytes());

        let payload = manifest::encode_edit(self.prefix.sequence, edit);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.checksum.compute(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        manifest_file.write_all(&out)?;
        manifest_file.sync_data()?;

        debug!(
            data_file = %self.data_path.display(),
            records = self.index.len(),
            incremental_bytes = self.stats.incremental_data_bytes,
            compact_bytes = self.stats.compact_data_bytes,
            "checkpoint files staged"
        );
        Ok(self.stats)
    }
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(r: &mut ByteReader<'_>) -> Result<String> {
    let len = r.read_u32()? as usize;
    String::from_utf8(r.read_bytes(len)?.to_vec())
        .map_err(|_| PageError::Corruption("non-utf8 string in checkpoint file".to_string()))
}

fn read_prefix(r: &mut ByteReader<'_>, magic: &[u8; 4], with_locks: bool) -> Result<CheckpointFilePrefix> {
    if r.read_bytes(4)? != magic {
        return Err(PageError::Corruption(
            "bad checkpoint file magic".to_string(),
        ));
    }
    let version = r.read_u8()?;
    if version != FORMAT_VERSION {
        return Err(PageError::Corruption(format!(
            "unsupported checkpoint format version {}",
            version
        )));
    }
    let writer_info = read_string(r)?;
    let sequence = r.read_u64()?;
    let last_sequence = r.read_u64()?;
    let mut locked_files = Vec::new();
    if with_locks {
        let count = r.read_u32()? as usize;
        for _ in 0..count {
            locked_files.push(read_string(r)?);
        }
    }
    Ok(CheckpointFilePrefix {
        writer_info,
        sequence,
        last_sequence,
        locked_files,
    })
}

/// Decodes the header of a checkpoint data file.
pub fn read_checkpoint_data_prefix(bytes: &[u8]) -> Result<CheckpointFilePrefix> {
    let mut r = ByteReader::new(bytes);
    read_prefix(&mut r, DATA_MAGIC, true)
}

/// Decodes the trailing index of a checkpoint data file:
/// `page_id -> (offset, size)`.
pub fn read_checkpoint_data_index(bytes: &[u8]) -> Result<Vec<(PageId, u64, u64)>> {
    if bytes.len() < 12 {
        return Err(PageError::Corruption(
            "checkpoint data file too short".to_string(),
        ));
    }
    let trailer = &bytes[bytes.len() - 12..];
    if &trailer[8..] != DATA_MAGIC {
        return Err(PageError::Corruption(
            "bad checkpoint data trailer".to_string(),
        ));
    }
    let index_offset = u64::from_le_bytes(trailer[..8].try_into().unwrap()) as usize;
    if index_offset >= bytes.len() {
        return Err(PageError::Corruption(
            "checkpoint index offset out of bounds".to_string(),
        ));
    }
    let mut r = ByteReader::new(&bytes[index_offset..bytes.len() - 12]);
    let count = r.read_u64()? as usize;
    let mut index = Vec::with_capacity(count);
    for _ in 0..count {
        let id_len = r.read_u32()? as usize;
        let page_id = r.read_bytes(id_len)?.to_vec();
        let offset = r.read_u64()?;
        let size = r.read_u64()?;
        index.push((page_id, offset, size));
    }
    Ok(index)
}

/// Decodes a checkpoint manifest file. A reader that mounts only this
/// manifest plus the data files it references can resolve every entry
/// visible at the checkpoint's sequence.
pub fn read_checkpoint_manifest(bytes: &[u8]) -> Result<CheckpointManifest> {
    let mut r = ByteReader::new(bytes);
    let prefix = read_prefix(&mut r, MANIFEST_MAGIC, false)?;

    let payload_len = r.read_u32()? as usize;
    let _frame_checksum = r.read_u64()?;
    let payload = r.read_bytes(payload_len)?;
    let (_, edit_records) = manifest::decode_edit(payload)?;

    let mut records = Vec::with_capacity(edit_records.len());
    for record in edit_records {
        match record.op {
            EditOp::Put(entry) => records.push(CheckpointRecord::Put {
                page_id: record.page_id,
                entry,
            }),
            EditOp::Ref(origin) => records.push(CheckpointRecord::Ref {
                page_id: record.page_id,
                origin,
            }),
            EditOp::External => records.push(CheckpointRecord::External {
                page_id: record.page_id,
            }),
            other => {
                return Err(PageError::Corruption(format!(
                    "unexpected op in checkpoint manifest: {:?}",
                    other
                )))
            }
        }
    }
    Ok(CheckpointManifest {
        writer_info: prefix.writer_info,
        sequence: prefix.sequence,
        last_sequence: prefix.last_sequence,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::WriteBatch;
    use crate::blob::BlobConfig;
    use tempfile::TempDir;

    #[test]
    fn test_format_pattern() {
        assert_eq!(
            format_pattern("s1/data/dat_{seq}_{index}", 42, 0),
            "s1/data/dat_42_0"
        );
        assert_eq!(format_pattern("mf_{seq}", 7, 3), "mf_7");
    }

    #[test]
    fn test_writer_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let blob_store = BlobStore::new(tmp.path().join("blob"), BlobConfig::default()).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), vec![1, 2, 3, 4], 9, vec![]);
        batch.put(b"b".to_vec(), vec![5, 6], 0, vec![]);
        let mut edit = blob_store.write(batch, None).unwrap();

        let data_path = tmp.path().join("ckpt").join("dat_1_0");
        let manifest_path = tmp.path().join("ckpt").join("mf_1");
        let prefix = CheckpointFilePrefix {
            writer_info: "writer-1".to_string(),
            sequence: 1,
            last_sequence: 0,
            locked_files: vec!["lock/dat_0_0.lock_s1_1".to_string()],
        };
        let mut writer = CheckpointFilesWriter::create(
            data_path.clone(),
            manifest_path.clone(),
            "dat_1_0".to_string(),
            prefix,
            &blob_store,
            None,
            ChecksumAlgorithm::default(),
        )
        .unwrap();
        writer.write_edits(&mut edit, &HashSet::new(), None).unwrap();
        let stats = writer.finish(&edit).unwrap();

        assert!(stats.has_new_data);
        assert_eq!(stats.incremental_data_bytes, 6);
        assert_eq!(stats.compact_data_bytes, 0);

        // Data file: prefix, index, and payloads all line up.
        let data_bytes = std::fs::read(&data_path).unwrap();
        let data_prefix = read_checkpoint_data_prefix(&data_bytes).unwrap();
        assert_eq!(data_prefix.writer_info, "writer-1");
        assert_eq!(data_prefix.sequence, 1);
        assert_eq!(data_prefix.locked_files.len(), 1);

        let index = read_checkpoint_data_index(&data_bytes).unwrap();
        assert_eq!(index.len(), 2);
        let (ref id, offset, size) = index[0];
        assert_eq!(id, &b"a".to_vec());
        assert_eq!(
            &data_bytes[offset as usize..(offset + size) as usize],
            &[1, 2, 3, 4]
        );

        // Manifest file: entries carry locations into the data file.
        let manifest_bytes = std::fs::read(&manifest_path).unwrap();
        let manifest = read_checkpoint_manifest(&manifest_bytes).unwrap();
        assert_eq!(manifest.sequence, 1);
        assert_eq!(manifest.records.len(), 2);
        for record in &manifest.records {
            let CheckpointRecord::Put { entry, .. } = record else {
                panic!("expected put records");
            };
            let info = entry.checkpoint_info.as_ref().unwrap();
            assert_eq!(info.data_location.data_file_id, "dat_1_0");
            assert!(!info.is_local_data_reclaimed);
        }
    }

    #[test]
    fn test_already_persisted_entries_not_copied() {
        let tmp = TempDir::new().unwrap();
        let blob_store = BlobStore::new(tmp.path().join("blob"), BlobConfig::default()).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), vec![1; 8], 0, vec![]);
        let mut edit = blob_store.write(batch, None).unwrap();
        // Pretend an earlier checkpoint already holds this payload.
        if let EditOp::Put(entry) = &mut edit.records[0].op {
            entry.checkpoint_info = Some(CheckpointInfo {
                data_location: DataLocation {
                    data_file_id: "dat_0_0".to_string(),
                    offset: 100,
                    size: 8,
                },
                is_local_data_reclaimed: false,
            });
        }

        let mut writer = CheckpointFilesWriter::create(
            tmp.path().join("dat_1_0"),
            tmp.path().join("mf_1"),
            "dat_1_0".to_string(),
            CheckpointFilePrefix {
                writer_info: String::new(),
                sequence: 2,
                last_sequence: 1,
                locked_files: vec![],
            },
            &blob_store,
            None,
            ChecksumAlgorithm::default(),
        )
        .unwrap();
        writer.write_edits(&mut edit, &HashSet::new(), None).unwrap();
        let stats = writer.finish(&edit).unwrap();

        assert!(!stats.has_new_data);
        // The old location is preserved in the manifest.
        if let EditOp::Put(entry) = &edit.records[0].op {
            assert_eq!(
                entry.checkpoint_info.as_ref().unwrap().data_location.data_file_id,
                "dat_0_0"
            );
        }
    }

    #[test]
    fn test_compact_set_forces_copy() {
        let tmp = TempDir::new().unwrap();
        let blob_store = BlobStore::new(tmp.path().join("blob"), BlobConfig::default()).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), vec![7; 16], 0, vec![]);
        let mut edit = blob_store.write(batch, None).unwrap();
        if let EditOp::Put(entry) = &mut edit.records[0].op {
            entry.checkpoint_info = Some(CheckpointInfo {
                data_location: DataLocation {
                    data_file_id: "dat_0_0".to_string(),
                    offset: 100,
                    size: 16,
                },
                is_local_data_reclaimed: false,
            });
        }

        let mut compact = HashSet::new();
        compact.insert("dat_0_0".to_string());
        let mut writer = CheckpointFilesWriter::create(
            tmp.path().join("dat_1_0"),
            tmp.path().join("mf_1"),
            "dat_1_0".to_string(),
            CheckpointFilePrefix {
                writer_info: String::new(),
                sequence: 2,
                last_sequence: 1,
                locked_files: vec![],
            },
            &blob_store,
            None,
            ChecksumAlgorithm::default(),
        )
        .unwrap();
        writer.write_edits(&mut edit, &compact, None).unwrap();
        let stats = writer.finish(&edit).unwrap();

        assert!(stats.has_new_data);
        assert_eq!(stats.compact_data_bytes, 16);
        if let EditOp::Put(entry) = &edit.records[0].op {
            assert_eq!(
                entry.checkpoint_info.as_ref().unwrap().data_location.data_file_id,
                "dat_1_0"
            );
        }
    }
}
