//! Core data model: page ids, directory entries and checksums.
//!
//! A page is an opaque byte blob keyed by an arbitrary byte string. The
//! directory locates each page through a [`PageEntry`]: a byte range in a
//! local blob file, optionally doubled by a remote replica described by
//! [`CheckpointInfo`]. When the local bytes have been reclaimed the entry
//! keeps only the remote [`DataLocation`] and reads fall back to the
//! object store.

use crate::error::{PageError, Result};

/// User-supplied byte-string key addressing a page.
pub type PageId = Vec<u8>;

/// Sentinel blob file id meaning "no local data".
pub const INVALID_BLOB_FILE_ID: u64 = 0;

/// Renders a page id for log/error messages.
pub(crate) fn display_page_id(page_id: &[u8]) -> String {
    String::from_utf8_lossy(page_id).into_owned()
}

/// Extracts the numeric id encoded in the trailing 8 bytes of a page id
/// (big-endian). Returns 0 for ids shorter than 8 bytes.
///
/// Callers that mint numeric ids under a prefix use this after restart to
/// resume their counters.
pub fn page_id_u64(page_id: &[u8]) -> u64 {
    if page_id.len() < 8 {
        return 0;
    }
    let tail: [u8; 8] = page_id[page_id.len() - 8..].try_into().unwrap_or([0; 8]);
    u64::from_be_bytes(tail)
}

/// Checksum algorithm applied to page payloads and manifest records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// XXH3 64-bit (default).
    XxHash64,
    /// CRC32, widened to the 64-bit checksum field.
    Crc32,
}

impl ChecksumAlgorithm {
    /// Computes the checksum of `data` under this algorithm.
    pub fn compute(&self, data: &[u8]) -> u64 {
        match self {
            ChecksumAlgorithm::XxHash64 => xxhash_rust::xxh3::xxh3_64(data),
            ChecksumAlgorithm::Crc32 => crc32fast::hash(data) as u64,
        }
    }
}

impl Default for ChecksumAlgorithm {
    fn default() -> Self {
        ChecksumAlgorithm::XxHash64
    }
}

/// Location of a page payload inside a remote checkpoint data file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataLocation {
    /// Remote data file id (the object key the entry references).
    pub data_file_id: String,

    /// Byte offset of the payload within the data file.
    pub offset: u64,

    /// Payload size in bytes.
    pub size: u64,
}

/// Remote replica information attached to a directory entry once its data
/// has been persisted in a checkpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Where the payload lives in the object store.
    pub data_location: DataLocation,

    /// When true, `file_id`/`offset` of the owning entry are no longer
    /// valid locally and reads must go through the remote reader.
    pub is_local_data_reclaimed: bool,
}

/// Directory record locating a page's bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageEntry {
    /// Blob file holding the local data; [`INVALID_BLOB_FILE_ID`] if none.
    pub file_id: u64,

    /// Byte offset of the payload within the blob file.
    pub offset: u64,

    /// Payload size in bytes.
    pub size: u64,

    /// Opaque 64-bit user tag.
    pub tag: u64,

    /// Integrity tag over the payload; 0 when unknown (remote-ingested).
    pub checksum: u64,

    /// Optional ordered intra-page field boundaries enabling partial reads.
    /// `field_offsets[i]` is the byte offset of field `i`; the last field
    /// runs to `size`.
    pub field_offsets: Vec<u64>,

    /// Present when the entry also has a remote replica.
    pub checkpoint_info: Option<CheckpointInfo>,
}

impl PageEntry {
    /// Whether the entry still owns a readable local byte range.
    pub fn has_local_data(&self) -> bool {
        self.file_id != INVALID_BLOB_FILE_ID && !self.is_remote_only()
    }

    /// Whether reads must be served from the object store.
    pub fn is_remote_only(&self) -> bool {
        self.checkpoint_info
            .as_ref()
            .map_or(false, |info| info.is_local_data_reclaimed)
    }

    /// Byte range `(offset_in_page, len)` of field `index`, if valid.
    pub fn field_range(&self, index: usize) -> Option<(u64, u64)> {
        let start = *self.field_offsets.get(index)?;
        let end = self
            .field_offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.size);
        if start > end || end > self.size {
            return None;
        }
        Some((start, end - start))
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.file_id.to_le_bytes());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.tag.to_le_bytes());
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf.extend_from_slice(&(self.field_offsets.len() as u32).to_le_bytes());
        for off in &self.field_offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }
        match &self.checkpoint_info {
            None => buf.push(0),
            Some(info) => {
                buf.push(1);
                let id = info.data_location.data_file_id.as_bytes();
                buf.extend_from_slice(&(id.len() as u32).to_le_bytes());
                buf.extend_from_slice(id);
                buf.extend_from_slice(&info.data_location.offset.to_le_bytes());
                buf.extend_from_slice(&info.data_location.size.to_le_bytes());
                buf.push(info.is_local_data_reclaimed as u8);
            }
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<PageEntry> {
        let file_id = r.read_u64()?;
        let offset = r.read_u64()?;
        let size = r.read_u64()?;
        let tag = r.read_u64()?;
        let checksum = r.read_u64()?;
        let field_count = r.read_u32()? as usize;
        let mut field_offsets = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            field_offsets.push(r.read_u64()?);
        }
        let checkpoint_info = match r.read_u8()? {
            0 => None,
            1 => {
                let id_len = r.read_u32()? as usize;
                let data_file_id = String::from_utf8(r.read_bytes(id_len)?.to_vec())
                    .map_err(|_| PageError::Corruption("non-utf8 data file id".to_string()))?;
                let loc_offset = r.read_u64()?;
                let loc_size = r.read_u64()?;
                let reclaimed = r.read_u8()? != 0;
                Some(CheckpointInfo {
                    data_location: DataLocation {
                        data_file_id,
                        offset: loc_offset,
                        size: loc_size,
                    },
                    is_local_data_reclaimed: reclaimed,
                })
            }
            other => {
                return Err(PageError::Corruption(format!(
                    "invalid checkpoint_info marker: {}",
                    other
                )))
            }
        };
        Ok(PageEntry {
            file_id,
            offset,
            size,
            tag,
            checksum,
            field_offsets,
            checkpoint_info,
        })
    }
}

/// A page returned from a read: the id, its bytes, and the field
/// boundaries the entry carried (empty if the page has no fields).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    pub page_id: PageId,
    pub data: Vec<u8>,
    pub field_offsets: Vec<u64>,
}

impl Page {
    /// Bytes of field `index`, if the page carries field boundaries.
    pub fn field(&self, index: usize) -> Option<&[u8]> {
        let start = *self.field_offsets.get(index)? as usize;
        let end = self
            .field_offsets
            .get(index + 1)
            .map(|v| *v as usize)
            .unwrap_or(self.data.len());
        self.data.get(start..end)
    }
}

/// A single field fetched by a partial read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldData {
    pub index: usize,
    pub data: Vec<u8>,
}

/// Bounds-checked little-endian reader over a byte slice.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(PageError::Corruption(format!(
                "record truncated: need {} bytes, have {}",
                len,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_u64() {
        let mut id = b"prefix/".to_vec();
        id.extend_from_slice(&42u64.to_be_bytes());
        assert_eq!(page_id_u64(&id), 42);
        assert_eq!(page_id_u64(b"short"), 0);
    }

    #[test]
    fn test_checksum_algorithms_differ_on_input() {
        for algo in [ChecksumAlgorithm::XxHash64, ChecksumAlgorithm::Crc32] {
            let a = algo.compute(b"hello");
            let b = algo.compute(b"hellp");
            assert_ne!(a, b);
            assert_eq!(a, algo.compute(b"hello"));
        }
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = PageEntry {
            file_id: 3,
            offset: 128,
            size: 64,
            tag: 7,
            checksum: 0xdead_beef,
            field_offsets: vec![0, 16, 48],
            checkpoint_info: Some(CheckpointInfo {
                data_location: DataLocation {
                    data_file_id: "s1/data/dat_5_0".to_string(),
                    offset: 1024,
                    size: 64,
                },
                is_local_data_reclaimed: true,
            }),
        };

        let mut buf = Vec::new();
        entry.encode_into(&mut buf);
        let mut reader = ByteReader::new(&buf);
        let decoded = PageEntry::decode(&mut reader).unwrap();
        assert_eq!(decoded, entry);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_entry_decode_truncated() {
        let entry = PageEntry {
            file_id: 1,
            offset: 0,
            size: 8,
            tag: 0,
            checksum: 1,
            field_offsets: vec![],
            checkpoint_info: None,
        };
        let mut buf = Vec::new();
        entry.encode_into(&mut buf);
        buf.truncate(buf.len() - 1);
        let mut reader = ByteReader::new(&buf);
        assert!(matches!(
            PageEntry::decode(&mut reader),
            Err(PageError::Corruption(_))
        ));
    }

    #[test]
    fn test_field_range() {
        let entry = PageEntry {
            file_id: 1,
            offset: 0,
            size: 100,
            tag: 0,
            checksum: 0,
            field_offsets: vec![0, 10, 60],
            checkpoint_info: None,
        };
        assert_eq!(entry.field_range(0), Some((0, 10)));
        assert_eq!(entry.field_range(1), Some((10, 50)));
        assert_eq!(entry.field_range(2), Some((60, 40)));
        assert_eq!(entry.field_range(3), None);
    }

    #[test]
    fn test_remote_only() {
        let mut entry = PageEntry {
            file_id: 2,
            offset: 0,
            size: 4,
            tag: 0,
            checksum: 0,
            field_offsets: vec![],
            checkpoint_info: Some(CheckpointInfo {
                data_location: DataLocation {
                    data_file_id: "f".to_string(),
                    offset: 0,
                    size: 4,
                },
                is_local_data_reclaimed: false,
            }),
        };
        assert!(entry.has_local_data());
        entry.checkpoint_info.as_mut().unwrap().is_local_data_reclaimed = true;
        assert!(entry.is_remote_only());
        assert!(!entry.has_local_data());
    }
}
