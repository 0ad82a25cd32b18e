//! Positional I/O over a single blob file.
//!
//! A blob file is an append-only sequence of records, each framed as
//! `{len: u32, tag: u64, checksum: u64, payload}`. Directory entries
//! address the payload directly; the header exists for scavenging and
//! debugging only. Crash recovery trusts the manifest, never the blob
//! file contents.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Bytes of the per-record header: len (u32) + tag (u64) + checksum (u64).
pub(crate) const RECORD_HEADER_SIZE: u64 = 20;

/// An open blob file. Reads and writes are positional and take `&self`,
/// so concurrent reads never block each other.
pub(crate) struct BlobFile {
    id: u64,
    path: PathBuf,
    file: File,
}

impl BlobFile {
    pub(crate) fn file_name(id: u64) -> String {
        format!("blob_{}.dat", id)
    }

    /// Parses a blob file id out of a file name, if it is one of ours.
    pub(crate) fn parse_file_name(name: &str) -> Option<u64> {
        let rest = name.strip_prefix("blob_")?.strip_suffix(".dat")?;
        rest.parse().ok()
    }

    /// Creates a fresh blob file under `dir`.
    pub(crate) fn create(dir: &Path, id: u64) -> Result<Self> {
        let path = dir.join(Self::file_name(id));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self { id, path, file })
    }

    /// Opens an existing blob file.
    pub(crate) fn open(path: PathBuf, id: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self { id, path, file })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Writes one framed record at `record_offset`. The payload lands at
    /// `record_offset + RECORD_HEADER_SIZE`.
    pub(crate) fn write_record(
        &self,
        record_offset: u64,
        tag: u64,
        checksum: u64,
        payload: &[u8],
    ) -> Result<()> {
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE as usize + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(payload);
        self.file.write_all_at(&buf, record_offset)?;
        Ok(())
    }

    /// Reads `len` bytes at `offset`.
    pub(crate) fn read_exact_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    /// Flushes file data to disk (fsync boundary of a write batch).
    pub(crate) fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
