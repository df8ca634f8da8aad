//! # Stream State Store
//!
//! Versioned key/value state for streaming operators: each processing batch
//! loads one committed version, mutates a private copy, and commits it as
//! the next version. Keys and values are binary rows, stored and shipped in
//! the same byte layout they are read with.
//!
//! ## Core Concepts
//!
//! - **Binary rows**: Fixed slots plus a variable region in one byte buffer,
//!   hashed and compared by bytes alone
//! - **Versions**: Monotonic per store; version 0 is always the empty map
//! - **Deltas and snapshots**: Every commit writes a delta file, maintenance
//!   folds long chains into snapshots and drops files past retention
//! - **Providers**: One per (operator, partition), caching recent versions
//!   in memory and rebuilding older ones from durable files
//!
//! ## Example
//!
//! ```ignore
//! use streamstate::{
//!     FileStateStoreProvider, FieldType, FieldValue, RowWriter, StateStoreConfig,
//!     StateStoreId, StateStoreProvider,
//! };
//!
//! let provider = FileStateStoreProvider::open(StateStoreConfig {
//!     checkpoint_root: "./checkpoint".into(),
//!     id: StateStoreId { operator_id: 1, partition_id: 0 },
//!     key_schema: vec![FieldType::Str, FieldType::Int],
//!     value_schema: vec![FieldType::Long],
//!     ..Default::default()
//! })?;
//!
//! let mut store = provider.get_store(provider.latest_version())?;
//! store.put(
//!     RowWriter::from_values(&[FieldValue::Str("user-1".into()), FieldValue::Int(0)]),
//!     RowWriter::from_values(&[FieldValue::Long(42)]),
//! )?;
//! let committed = store.commit()?;
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod files;
pub mod maintenance;
pub mod map;
pub mod provider;
pub mod row;

// Re-exports
pub use config::{StateStoreConfig, StateStoreId};
pub use coordinator::{InProcessCoordinator, StateStoreCoordinator};
pub use error::{Result, StateStoreError};
pub use files::{CompressionCodec, DeltaOp};
pub use maintenance::{MaintenanceTask, ProviderRegistry};
pub use map::{KeyValueMap, SnapshotIter};
pub use provider::{
    FileStateStoreProvider, ReadOnlyStateStore, StateStore, StateStoreMetrics, StateStoreProvider,
};
pub use row::{read_value, BinaryRow, FieldType, FieldValue, ObjectPool, RowBuffer, RowWriter};
