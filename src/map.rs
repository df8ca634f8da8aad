//! In-memory key/value content of one store version.

use crate::error::{Result, StateStoreError};
use crate::row::{read_value, BinaryRow, FieldType, RowWriter};
use std::collections::{HashMap, HashSet};

/// A mutable map of row key to row value, the materialized content of one
/// version. Copy-on-write across versions: the provider clones the previous
/// version's map and applies a delta, or rebuilds from a snapshot; committed
/// versions are never mutated again.
///
/// Iterators capture the entries at creation ("snapshot read"): puts and
/// removes after an iterator is built do not retroactively appear. Backends
/// with merge-on-read storage may only guarantee repeatable-within-batch
/// reads; each backend documents and tests its own policy.
#[derive(Clone, Debug, Default)]
pub struct KeyValueMap {
    entries: HashMap<BinaryRow, BinaryRow>,
    prefix: Option<PrefixIndex>,
}

/// Secondary index from encoded key-prefix bytes to the full keys sharing
/// that prefix, kept in lockstep with the primary map.
#[derive(Clone, Debug)]
struct PrefixIndex {
    columns: usize,
    key_schema: Vec<FieldType>,
    by_prefix: HashMap<Vec<u8>, HashSet<BinaryRow>>,
}

impl PrefixIndex {
    /// Canonical encoding of the leading `columns` key columns: re-encoded
    /// through the row writer so caller-built prefix rows match byte for byte.
    fn project(&self, key: &BinaryRow) -> Vec<u8> {
        let mut writer = RowWriter::new(self.columns);
        for (i, field_type) in self.key_schema.iter().take(self.columns).enumerate() {
            let value = read_value(key, i, *field_type);
            writer.write_value(i, &value);
        }
        writer.finish().as_bytes().to_vec()
    }
}

impl KeyValueMap {
    /// A map without prefix-scan support.
    pub fn new() -> Self {
        Self::default()
    }

    /// A map indexing the leading `prefix_columns` columns of `key_schema`
    /// for prefix scans. `prefix_columns` must be a proper leading subset.
    pub fn with_prefix(key_schema: Vec<FieldType>, prefix_columns: usize) -> Result<Self> {
        if prefix_columns == 0 || prefix_columns >= key_schema.len() {
            return Err(StateStoreError::InvalidArgument(format!(
                "prefix columns must be in 1..{}, got {}",
                key_schema.len(),
                prefix_columns
            )));
        }
        Ok(Self {
            entries: HashMap::new(),
            prefix: Some(PrefixIndex {
                columns: prefix_columns,
                key_schema,
                by_prefix: HashMap::new(),
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &BinaryRow) -> Option<&BinaryRow> {
        self.entries.get(key)
    }

    /// Insert or overwrite an entry.
    ///
    /// Absence is modeled via [`remove`](Self::remove); an unbound value row
    /// (the "null row" sentinel) is rejected rather than stored as present.
    pub fn put(&mut self, key: BinaryRow, value: BinaryRow) -> Result<()> {
        if !value.is_bound() {
            return Err(StateStoreError::InvalidArgument(
                "cannot put an unbound value row; use remove for absence".into(),
            ));
        }
        if !key.is_bound() {
            return Err(StateStoreError::InvalidArgument(
                "cannot put an unbound key row".into(),
            ));
        }
        if let Some(index) = &mut self.prefix {
            let prefix = index.project(&key);
            index.by_prefix.entry(prefix).or_default().insert(key.clone());
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Remove an entry, returning its value if present.
    pub fn remove(&mut self, key: &BinaryRow) -> Option<BinaryRow> {
        let value = self.entries.remove(key)?;
        if let Some(index) = &mut self.prefix {
            let prefix = index.project(key);
            if let Some(keys) = index.by_prefix.get_mut(&prefix) {
                keys.remove(key);
                if keys.is_empty() {
                    index.by_prefix.remove(&prefix);
                }
            }
        }
        Some(value)
    }

    /// Borrowed view of all entries, for dumping without cloning rows.
    pub fn entries(&self) -> impl Iterator<Item = (&BinaryRow, &BinaryRow)> {
        self.entries.iter()
    }

    /// Iterate all entries as they are at this moment.
    pub fn iter(&self) -> SnapshotIter {
        SnapshotIter::capture(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }

    /// All entries whose leading key columns match `prefix_row` (a row of
    /// exactly the configured prefix columns, built with the row writer).
    pub fn prefix_scan(&self, prefix_row: &BinaryRow) -> Result<SnapshotIter> {
        let index = self.prefix.as_ref().ok_or_else(|| {
            StateStoreError::InvalidArgument(
                "prefix scan requires a store configured with prefix key columns".into(),
            )
        })?;
        let keys = index.by_prefix.get(prefix_row.as_bytes());
        Ok(SnapshotIter::capture(
            keys.into_iter()
                .flatten()
                .filter_map(|key| self.entries.get(key).map(|v| (key.clone(), v.clone()))),
        ))
    }
}

/// Owning iterator over `(key, value)` pairs captured at creation time.
pub struct SnapshotIter {
    entries: std::vec::IntoIter<(BinaryRow, BinaryRow)>,
}

impl SnapshotIter {
    fn capture(pairs: impl Iterator<Item = (BinaryRow, BinaryRow)>) -> Self {
        Self {
            entries: pairs.collect::<Vec<_>>().into_iter(),
        }
    }
}

impl Iterator for SnapshotIter {
    type Item = (BinaryRow, BinaryRow);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
