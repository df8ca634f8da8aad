//! Store configuration.

use crate::files::CompressionCodec;
use crate::row::FieldType;
use std::fmt;
use std::path::PathBuf;

/// Identity of one store: an operator within a checkpoint, one partition.
/// Versions increase monotonically per id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateStoreId {
    pub operator_id: u64,
    pub partition_id: u32,
}

impl fmt::Debug for StateStoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateStoreId({}/{})", self.operator_id, self.partition_id)
    }
}

impl fmt::Display for StateStoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op={} part={}", self.operator_id, self.partition_id)
    }
}

/// Configuration for one state store provider.
#[derive(Clone, Debug)]
pub struct StateStoreConfig {
    /// Root directory of the checkpoint; store files live under
    /// `{root}/{operator_id}/{partition_id}/`.
    pub checkpoint_root: PathBuf,

    /// Which store this is.
    pub id: StateStoreId,

    /// Field types of key rows.
    pub key_schema: Vec<FieldType>,

    /// Field types of value rows.
    pub value_schema: Vec<FieldType>,

    /// Leading key columns indexed for prefix scans; 0 disables them.
    pub prefix_key_columns: usize,

    /// Write a snapshot once this many deltas accumulated past the last one.
    pub min_deltas_for_snapshot: usize,

    /// How many trailing versions maintenance keeps reloadable on disk.
    pub min_versions_to_retain: usize,

    /// How many committed versions the in-memory cache holds.
    pub num_versions_to_retain_in_memory: usize,

    /// Compression applied to delta and snapshot files.
    pub codec: CompressionCodec,

    /// Interval of the background maintenance task.
    pub maintenance_interval_ms: u64,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            checkpoint_root: PathBuf::from("./state"),
            id: StateStoreId {
                operator_id: 0,
                partition_id: 0,
            },
            key_schema: Vec::new(),
            value_schema: Vec::new(),
            prefix_key_columns: 0,
            min_deltas_for_snapshot: 10,
            min_versions_to_retain: 100,
            num_versions_to_retain_in_memory: 2,
            codec: CompressionCodec::default(),
            maintenance_interval_ms: 60_000,
        }
    }
}
