//! Snapshot files: a full key/value dump at one version, bounding how deep
//! delta replay has to go.

use super::{
    decode_file, encode_file, write_file_atomic, write_span, BodyReader, CompressionCodec,
    TAG_END, TAG_PUT,
};
use crate::error::{Result, StateStoreError};
use crate::row::BinaryRow;
use std::path::Path;

/// Magic bytes for snapshot files.
const SNAPSHOT_MAGIC: &[u8; 4] = b"SSN\0";

/// Write a full dump of `pairs` for `version` atomically.
pub fn write_snapshot<'a>(
    path: &Path,
    codec: CompressionCodec,
    version: u64,
    pairs: impl Iterator<Item = (&'a BinaryRow, &'a BinaryRow)>,
) -> Result<()> {
    let mut body = Vec::new();
    for (key, value) in pairs {
        body.push(TAG_PUT);
        write_span(&mut body, key.as_bytes());
        write_span(&mut body, value.as_bytes());
    }
    body.push(TAG_END);

    write_file_atomic(path, &encode_file(SNAPSHOT_MAGIC, codec, &body), version)
}

/// Read a snapshot back as key/value pairs.
pub fn read_snapshot(
    path: &Path,
    key_fields: usize,
    value_fields: usize,
) -> Result<Vec<(BinaryRow, BinaryRow)>> {
    let body = decode_file(path, SNAPSHOT_MAGIC)?;
    let mut reader = BodyReader::new(&body);
    let mut pairs = Vec::new();
    loop {
        match reader.read_u8()? {
            TAG_END => break,
            TAG_PUT => {
                let key = BinaryRow::from_bytes(reader.read_span()?.to_vec(), key_fields);
                let value = BinaryRow::from_bytes(reader.read_span()?.to_vec(), value_fields);
                pairs.push((key, value));
            }
            other => {
                return Err(StateStoreError::CorruptData(format!(
                    "unknown snapshot record tag: {}",
                    other
                )));
            }
        }
    }
    Ok(pairs)
}
