//! Durable store files: naming, framing, and atomic writes.
//!
//! Every file is `magic + format version + codec byte + crc32(body) +
//! codec-compressed body`. Bodies are sequences of tagged, length-prefixed
//! records ending in an explicit end marker, so truncation is always
//! detectable.

pub mod codec;
pub mod delta;
pub mod snapshot;

pub use codec::CompressionCodec;
pub use delta::DeltaOp;

use crate::error::{Result, StateStoreError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current store file format version.
const FORMAT_VERSION: u8 = 1;

/// Record tags shared by delta and snapshot bodies.
pub(crate) const TAG_END: u8 = 0;
pub(crate) const TAG_PUT: u8 = 1;
pub(crate) const TAG_DELETE: u8 = 2;

/// Upper bound on a single key/value span; larger lengths mean corruption.
const MAX_SPAN_LEN: usize = 100 * 1024 * 1024;

/// The kind of a durable store file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreFileKind {
    Delta,
    Snapshot,
}

/// One durable file of a store partition directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreFile {
    pub version: u64,
    pub kind: StoreFileKind,
}

/// Directory holding all files of one (operator, partition) store.
pub fn partition_dir(root: &Path, operator_id: u64, partition_id: u32) -> PathBuf {
    root.join(operator_id.to_string())
        .join(partition_id.to_string())
}

pub fn delta_path(dir: &Path, version: u64) -> PathBuf {
    dir.join(format!("{}.delta", version))
}

pub fn snapshot_path(dir: &Path, version: u64) -> PathBuf {
    dir.join(format!("{}.snapshot", version))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// List committed store files in `dir`, sorted by version (deltas before
/// snapshots of the same version). Temp files and strangers are ignored.
pub fn list_store_files(dir: &Path) -> Result<Vec<StoreFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some((stem, suffix)) = name.split_once('.') else {
            continue;
        };
        let Ok(version) = stem.parse::<u64>() else {
            continue;
        };
        let kind = match suffix {
            "delta" => StoreFileKind::Delta,
            "snapshot" => StoreFileKind::Snapshot,
            _ => continue,
        };
        files.push(StoreFile { version, kind });
    }
    files.sort_by_key(|f| (f.version, f.kind == StoreFileKind::Snapshot));
    Ok(files)
}

/// Frame and compress a file body into its final on-disk bytes.
pub(crate) fn encode_file(magic: &[u8; 4], codec: CompressionCodec, body: &[u8]) -> Vec<u8> {
    let checksum = crc32fast::hash(body);
    let compressed = codec.compress(body);

    let mut out = Vec::with_capacity(10 + compressed.len());
    out.extend_from_slice(magic);
    out.push(FORMAT_VERSION);
    out.push(codec.to_byte());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&compressed);
    out
}

/// Read, verify, and decompress a store file body.
pub(crate) fn decode_file(path: &Path, magic: &[u8; 4]) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StateStoreError::CorruptData(format!("missing store file: {}", path.display()))
        } else {
            StateStoreError::Io(e)
        }
    })?;
    if bytes.len() < 10 {
        return Err(StateStoreError::CorruptData(format!(
            "store file too short: {}",
            path.display()
        )));
    }
    if &bytes[0..4] != magic {
        return Err(StateStoreError::InvalidFormat(format!(
            "bad magic in {}",
            path.display()
        )));
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(StateStoreError::InvalidFormat(format!(
            "unsupported store file version: {}",
            bytes[4]
        )));
    }
    let codec = CompressionCodec::from_byte(bytes[5])?;
    let stored_checksum = u32::from_le_bytes(bytes[6..10].try_into().unwrap());

    let body = codec.decompress(&bytes[10..])?;
    let computed_checksum = crc32fast::hash(&body);
    if stored_checksum != computed_checksum {
        return Err(StateStoreError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }
    Ok(body)
}

/// Write `bytes` to a temp file, sync, then atomically rename to `path`.
///
/// Fails with [`StateStoreError::ConcurrentCommit`] when the target already
/// exists: a committed file is never overwritten. A failed write leaves no
/// partial target visible; the temp file is removed best-effort.
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8], version: u64) -> Result<()> {
    if path.exists() {
        return Err(StateStoreError::ConcurrentCommit { version });
    }
    let tmp = tmp_path(path);
    let write_result = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if path.exists() {
        let _ = fs::remove_file(&tmp);
        return Err(StateStoreError::ConcurrentCommit { version });
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Cursor over a decoded file body with corruption-checked reads.
pub(crate) struct BodyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        if self.pos >= self.bytes.len() {
            return Err(StateStoreError::CorruptData(
                "truncated store file body".into(),
            ));
        }
        let byte = self.bytes[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_span(&mut self) -> Result<&'a [u8]> {
        if self.pos + 4 > self.bytes.len() {
            return Err(StateStoreError::CorruptData(
                "truncated span length".into(),
            ));
        }
        let len =
            u32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap()) as usize;
        self.pos += 4;
        if len > MAX_SPAN_LEN {
            return Err(StateStoreError::CorruptData(format!(
                "span of {} bytes exceeds sanity limit",
                len
            )));
        }
        if self.pos + len > self.bytes.len() {
            return Err(StateStoreError::CorruptData("truncated span".into()));
        }
        let span = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(span)
    }
}

/// Append a length-prefixed span to a body under construction.
pub(crate) fn write_span(body: &mut Vec<u8>, span: &[u8]) {
    body.extend_from_slice(&(span.len() as u32).to_le_bytes());
    body.extend_from_slice(span);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let root = Path::new("/tmp/ckpt");
        let dir = partition_dir(root, 7, 3);
        assert_eq!(dir, Path::new("/tmp/ckpt/7/3"));
        assert_eq!(delta_path(&dir, 12), Path::new("/tmp/ckpt/7/3/12.delta"));
        assert_eq!(
            snapshot_path(&dir, 12),
            Path::new("/tmp/ckpt/7/3/12.snapshot")
        );
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.delta");
        let body = b"tagged body bytes".to_vec();

        let bytes = encode_file(b"SDL\0", CompressionCodec::Lz4, &body);
        write_file_atomic(&path, &bytes, 1).unwrap();

        assert_eq!(decode_file(&path, b"SDL\0").unwrap(), body);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.delta");
        let bytes = encode_file(b"SDL\0", CompressionCodec::None, b"body");
        write_file_atomic(&path, &bytes, 1).unwrap();

        // Flip a body byte past the header.
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        fs::write(&path, raw).unwrap();

        assert!(matches!(
            decode_file(&path, b"SDL\0"),
            Err(StateStoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_atomic_write_refuses_existing_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2.delta");
        write_file_atomic(&path, b"first", 2).unwrap();

        assert!(matches!(
            write_file_atomic(&path, b"second", 2),
            Err(StateStoreError::ConcurrentCommit { version: 2 })
        ));
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn test_list_store_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["2.delta", "1.delta", "2.snapshot", "3.delta.tmp", "LOCK"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = list_store_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                StoreFile {
                    version: 1,
                    kind: StoreFileKind::Delta
                },
                StoreFile {
                    version: 2,
                    kind: StoreFileKind::Delta
                },
                StoreFile {
                    version: 2,
                    kind: StoreFileKind::Snapshot
                },
            ]
        );
    }

    #[test]
    fn test_missing_file_is_corrupt_data() {
        let dir = TempDir::new().unwrap();
        let result = decode_file(&dir.path().join("9.delta"), b"SDL\0");
        assert!(matches!(result, Err(StateStoreError::CorruptData(_))));
    }
}
