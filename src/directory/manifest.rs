//! Manifest: the directory's write-ahead log.
//!
//! Edits are appended to a numbered log file, each framed as
//! `[len: u32][checksum: u64][payload]` where the payload is
//! `{seq: u64, count: u32, records*}`. When the log grows past the
//! configured limit it is compacted into an image file
//! (`{image_seq, entry_count, (seq, record)*}`) and a fresh log started.
//!
//! Recovery loads the newest intact image, replays the logs numbered
//! after it in order, and discards a partial trailing record: the
//! largest intact sequence wins. Blob files hold no recovery metadata of
//! their own; this log is the directory's single source of truth.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::batch::{Edit, EditOp, EditRecord};
use crate::error::{PageError, Result};
use crate::types::{ByteReader, ChecksumAlgorithm, PageEntry, PageId};

/// Configuration for the manifest log.
#[derive(Clone, Debug)]
pub struct ManifestConfig {
    /// Log size that triggers compaction into an image.
    pub max_log_bytes_before_image: u64,

    /// Whether every append is fsynced before `apply` returns.
    pub fsync_on_apply: bool,

    /// Checksum algorithm for record frames.
    pub checksum: ChecksumAlgorithm,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            max_log_bytes_before_image: 16 * 1024 * 1024,
            fsync_on_apply: true,
            checksum: ChecksumAlgorithm::default(),
        }
    }
}

const OP_PUT: u8 = 1;
const OP_DEL: u8 = 2;
const OP_REF: u8 = 3;
const OP_EXTERNAL: u8 = 4;
const OP_UPDATE_REMOTE_CACHE: u8 = 5;
const OP_RECLAIM: u8 = 6;

/// One decoded log frame: the sequence it was logged at and its records.
pub(crate) struct RecoveredLog {
    pub sequence: u64,
    pub records: Vec<EditRecord>,
}

/// One node of a recovered image: a page version with its sequence.
pub(crate) struct ImageNode {
    pub page_id: PageId,
    pub sequence: u64,
    pub op: EditOp,
}

pub(crate) struct RecoveredImage {
    pub sequence: u64,
    pub nodes: Vec<ImageNode>,
}

/// Everything recovery found on disk, already decoded.
pub(crate) struct Recovered {
    pub image: Option<RecoveredImage>,
    pub logs: Vec<RecoveredLog>,
}

/// The append log plus its rotation state.
pub(crate) struct Manifest {
    dir: PathBuf,
    config: ManifestConfig,
    log: File,
    log_no: u64,
    log_bytes: u64,
}

fn log_name(no: u64) -> String {
    format!("wal_{:06}.log", no)
}

fn image_name(no: u64) -> String {
    format!("image_{:06}.dat", no)
}

fn parse_numbered(name: &str, prefix: &str, suffix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?.strip_suffix(suffix)?.parse().ok()
}

impl Manifest {
    /// Opens the manifest under `dir`, recovering whatever is on disk and
    /// starting a fresh log for new appends.
    pub(crate) fn open(dir: &Path, config: ManifestConfig) -> Result<(Manifest, Recovered)> {
        std::fs::create_dir_all(dir)?;

        let mut log_files = BTreeMap::new();
        let mut image_files = BTreeMap::new();
        for dirent in std::fs::read_dir(dir)? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(no) = parse_numbered(name, "wal_", ".log") {
                log_files.insert(no, dirent.path());
            } else if let Some(no) = parse_numbered(name, "image_", ".dat") {
                image_files.insert(no, dirent.path());
            }
        }

        // Newest intact image wins.
        let mut image = None;
        let mut image_no = None;
        for (no, path) in image_files.iter().rev() {
            match read_image_file(path, config.checksum) {
                Ok(decoded) => {
                    image = Some(decoded);
                    image_no = Some(*no);
                    break;
                }
                Err(err) => warn!(file = %path.display(), "skipping unreadable image: {}", err),
            }
        }

        // Replay logs newer than the image, in order, stopping at the
        // first partial or corrupt frame.
        let mut logs = Vec::new();
        'outer: for (no, path) in log_files.iter() {
            if let Some(img_no) = image_no {
                if *no <= img_no {
                    continue;
                }
            }
            let (decoded, clean) = read_log_file(path, config.checksum)?;
            logs.extend(decoded);
            if !clean {
                warn!(
                    file = %path.display(),
                    "discarding partial manifest tail"
                );
                break 'outer;
            }
        }

        let max_no = log_files
            .keys()
            .last()
            .copied()
            .max(image_files.keys().last().copied())
            .unwrap_or(0);
        let log_no = max_no + 1;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(log_name(log_no)))?;

        info!(
            logs = logs.len(),
            image_sequence = image.as_ref().map(|i| i.sequence).unwrap_or(0),
            log_no,
            "manifest recovered"
        );

        Ok((
            Manifest {
                dir: dir.to_path_buf(),
                config,
                log,
                log_no,
                log_bytes: 0,
            },
            Recovered { image, logs },
        ))
    }

    /// Appends one framed record, fsyncing per the configured policy.
    pub(crate) fn append(&mut self, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(12 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&self.config.checksum.compute(payload).to_le_bytes());
        frame.extend_from_slice(payload);
        self.log.write_all(&frame)?;
        if self.config.fsync_on_apply {
            self.log.sync_data()?;
        }
        self.log_bytes += frame.len() as u64;
        Ok(())
    }

    pub(crate) fn should_compact(&self) -> bool {
        self.log_bytes >= self.config.max_log_bytes_before_image
    }

    /// Writes `image_payload` as the image covering everything up to and
    /// including the current log, then starts a fresh log and removes the
    /// files the image supersedes.
    pub(crate) fn compact(&mut self, image_payload: &[u8]) -> Result<()> {
        let image_no = self.log_no;
        let image_path = self.dir.join(image_name(image_no));
        let mut image_file = File::create(&image_path)?;
        let mut frame = Vec::with_capacity(12 + image_payload.len());
        frame.extend_from_slice(&(image_payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&self.config.checksum.compute(image_payload).to_le_bytes());
        frame.extend_from_slice(image_payload);
        image_file.write_all(&frame)?;
        image_file.sync_data()?;

        let new_no = self.log_no + 1;
        let new_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(log_name(new_no)))?;
        self.log = new_log;
        self.log_no = new_no;
        self.log_bytes = 0;

        // Superseded files are garbage now; failures to unlink are not.
        for dirent in std::fs::read_dir(&self.dir)?.flatten() {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            let stale = parse_numbered(name, "wal_", ".log").is_some_and(|no| no <= image_no)
                || parse_numbered(name, "image_", ".dat").is_some_and(|no| no < image_no);
            if stale {
                if let Err(err) = std::fs::remove_file(dirent.path()) {
                    warn!(file = name, "failed to remove stale manifest file: {}", err);
                }
            }
        }

        debug!(image_no, "manifest compacted into image");
        Ok(())
    }

    pub(crate) fn sync(&mut self) -> Result<()> {
        self.log.sync_data()?;
        Ok(())
    }
}

/// Encodes an edit logged at `sequence` into a frame payload.
pub(crate) fn encode_edit(sequence: u64, edit: &Edit) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&(edit.records.len() as u32).to_le_bytes());
    for record in &edit.records {
        encode_record(&mut buf, record);
    }
    buf
}

fn encode_record(buf: &mut Vec<u8>, record: &EditRecord) {
    let op = match &record.op {
        EditOp::Put(_) => OP_PUT,
        EditOp::Del => OP_DEL,
        EditOp::Ref(_) => OP_REF,
        EditOp::External => OP_EXTERNAL,
        EditOp::UpdateRemoteCache(_) => OP_UPDATE_REMOTE_CACHE,
        EditOp::Reclaim(_) => OP_RECLAIM,
    };
    buf.push(op);
    buf.extend_from_slice(&(record.page_id.len() as u32).to_le_bytes());
    buf.extend_from_slice(&record.page_id);
    match &record.op {
        EditOp::Put(entry) | EditOp::UpdateRemoteCache(entry) | EditOp::Reclaim(entry) => {
            entry.encode_into(buf)
        }
        EditOp::Ref(origin) => {
            buf.extend_from_slice(&(origin.len() as u32).to_le_bytes());
            buf.extend_from_slice(origin);
        }
        EditOp::Del | EditOp::External => {}
    }
}

fn decode_record(r: &mut ByteReader<'_>) -> Result<EditRecord> {
    let op = r.read_u8()?;
    let id_len = r.read_u32()? as usize;
    let page_id = r.read_bytes(id_len)?.to_vec();
    let op = match op {
        OP_PUT => EditOp::Put(PageEntry::decode(r)?),
        OP_DEL => EditOp::Del,
        OP_REF => {
            let origin_len = r.read_u32()? as usize;
            EditOp::Ref(r.read_bytes(origin_len)?.to_vec())
        }
        OP_EXTERNAL => EditOp::External,
        OP_UPDATE_REMOTE_CACHE => EditOp::UpdateRemoteCache(PageEntry::decode(r)?),
        OP_RECLAIM => EditOp::Reclaim(PageEntry::decode(r)?),
        other => {
            return Err(PageError::Corruption(format!(
                "unknown manifest op: {}",
                other
            )))
        }
    };
    Ok(EditRecord {
        page_id,
        op,
        sequence: 0,
        lock_key: None,
    })
}

/// Decodes a frame payload back into `(sequence, records)`.
pub(crate) fn decode_edit(payload: &[u8]) -> Result<(u64, Vec<EditRecord>)> {
    let mut r = ByteReader::new(payload);
    let sequence = r.read_u64()?;
    let count = r.read_u32()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(decode_record(&mut r)?);
    }
    if !r.is_empty() {
        return Err(PageError::Corruption(
            "trailing bytes after manifest record".to_string(),
        ));
    }
    Ok((sequence, records))
}

/// Encodes a directory image at `sequence`.
pub(crate) fn encode_image(sequence: u64, nodes: &[ImageNode]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&(nodes.len() as u64).to_le_bytes());
    for node in nodes {
        buf.extend_from_slice(&node.sequence.to_le_bytes());
        encode_record(
            &mut buf,
            &EditRecord {
                page_id: node.page_id.clone(),
                op: node.op.clone(),
                sequence: 0,
                lock_key: None,
            },
        );
    }
    buf
}

fn decode_image(payload: &[u8]) -> Result<RecoveredImage> {
    let mut r = ByteReader::new(payload);
    let sequence = r.read_u64()?;
    let count = r.read_u64()? as usize;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let node_seq = r.read_u64()?;
        let record = decode_record(&mut r)?;
        nodes.push(ImageNode {
            page_id: record.page_id,
            sequence: node_seq,
            op: record.op,
        });
    }
    Ok(RecoveredImage { sequence, nodes })
}

fn read_frame<'a>(
    r: &mut ByteReader<'a>,
    checksum: ChecksumAlgorithm,
) -> Result<Option<&'a [u8]>> {
    if r.is_empty() {
        return Ok(None);
    }
    if r.remaining() < 12 {
        return Err(PageError::Corruption("partial frame header".to_string()));
    }
    let len = r.read_u32()? as usize;
    let expect = r.read_u64()?;
    if r.remaining() < len {
        return Err(PageError::Corruption("partial frame payload".to_string()));
    }
    let payload = r.read_bytes(len)?;
    if checksum.compute(payload) != expect {
        return Err(PageError::Corruption("frame checksum mismatch".to_string()));
    }
    Ok(Some(payload))
}

/// Reads every intact frame of a log file. The bool is false when a
/// partial or corrupt trailing frame was discarded.
fn read_log_file(path: &Path, checksum: ChecksumAlgorithm) -> Result<(Vec<RecoveredLog>, bool)> {
    let raw = std::fs::read(path)?;
    let mut r = ByteReader::new(&raw);
    let mut logs = Vec::new();
    loop {
        match read_frame(&mut r, checksum) {
            Ok(None) => return Ok((logs, true)),
            Ok(Some(payload)) => match decode_edit(payload) {
                Ok((sequence, records)) => logs.push(RecoveredLog { sequence, records }),
                Err(_) => return Ok((logs, false)),
            },
            Err(_) => return Ok((logs, false)),
        }
    }
}

fn read_image_file(path: &Path, checksum: ChecksumAlgorithm) -> Result<RecoveredImage> {
    let raw = std::fs::read(path)?;
    let mut r = ByteReader::new(&raw);
    let payload = read_frame(&mut r, checksum)?
        .ok_or_else(|| PageError::Corruption("empty image file".to_string()))?;
    decode_image(payload)
}
