//! Delta files: the operations separating version N from N-1.

use super::{
    decode_file, encode_file, write_file_atomic, write_span, BodyReader, CompressionCodec,
    TAG_DELETE, TAG_END, TAG_PUT,
};
use crate::error::{Result, StateStoreError};
use crate::map::KeyValueMap;
use crate::row::BinaryRow;
use std::path::Path;

/// Magic bytes for delta files.
const DELTA_MAGIC: &[u8; 4] = b"SDL\0";

/// One recorded store mutation, replayed in order during load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeltaOp {
    Put { key: BinaryRow, value: BinaryRow },
    Delete { key: BinaryRow },
}

/// Write the delta for `version` atomically (temp file + rename).
pub fn write_delta(
    path: &Path,
    codec: CompressionCodec,
    version: u64,
    ops: &[DeltaOp],
) -> Result<()> {
    let mut body = Vec::new();
    for op in ops {
        match op {
            DeltaOp::Put { key, value } => {
                body.push(TAG_PUT);
                write_span(&mut body, key.as_bytes());
                write_span(&mut body, value.as_bytes());
            }
            DeltaOp::Delete { key } => {
                body.push(TAG_DELETE);
                write_span(&mut body, key.as_bytes());
            }
        }
    }
    body.push(TAG_END);

    write_file_atomic(path, &encode_file(DELTA_MAGIC, codec, &body), version)
}

/// Read a delta file back into its ordered operations.
///
/// Persisted rows are the in-memory layout verbatim, so each span is a
/// byte copy plus a rebind with the schema's field count.
pub fn read_delta(path: &Path, key_fields: usize, value_fields: usize) -> Result<Vec<DeltaOp>> {
    let body = decode_file(path, DELTA_MAGIC)?;
    let mut reader = BodyReader::new(&body);
    let mut ops = Vec::new();
    loop {
        match reader.read_u8()? {
            TAG_END => break,
            TAG_PUT => {
                let key = BinaryRow::from_bytes(reader.read_span()?.to_vec(), key_fields);
                let value = BinaryRow::from_bytes(reader.read_span()?.to_vec(), value_fields);
                ops.push(DeltaOp::Put { key, value });
            }
            TAG_DELETE => {
                let key = BinaryRow::from_bytes(reader.read_span()?.to_vec(), key_fields);
                ops.push(DeltaOp::Delete { key });
            }
            other => {
                return Err(StateStoreError::CorruptData(format!(
                    "unknown delta record tag: {}",
                    other
                )));
            }
        }
    }
    Ok(ops)
}

/// Apply recorded operations, in order, to a materialized map.
pub fn apply_delta(map: &mut KeyValueMap, ops: Vec<DeltaOp>) -> Result<()> {
    for op in ops {
        match op {
            DeltaOp::Put { key, value } => map.put(key, value)?,
            DeltaOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
    Ok(())
}
