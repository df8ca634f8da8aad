//! Versioned state store provider.
//!
//! A provider owns all versions of one (operator, partition) store: an
//! in-memory cache of recently committed maps, the durable delta/snapshot
//! chain on disk, and the maintenance that keeps both bounded. Loading a
//! version replays the delta chain from the nearest snapshot; committing
//! writes one delta atomically and advances the latest-version pointer.

use crate::config::{StateStoreConfig, StateStoreId};
use crate::coordinator::StateStoreCoordinator;
use crate::error::{Result, StateStoreError};
use crate::files::{
    delta::{apply_delta, read_delta, write_delta},
    delta_path, list_store_files, partition_dir,
    snapshot::{read_snapshot, write_snapshot},
    snapshot_path, DeltaOp, StoreFileKind,
};
use crate::map::{KeyValueMap, SnapshotIter};
use crate::row::BinaryRow;
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// A loaded read-write store handle for one version transition.
///
/// Mutations stay in memory until `commit`; the handle is consumed by
/// `commit` or `abort`, so a store is either fully applied or fully
/// rejected. One worker thread drives one handle; callers must not open
/// two read-write handles on the same (store, version) at once.
pub trait StateStore {
    fn id(&self) -> StateStoreId;

    /// The version this handle will produce when committed.
    fn version(&self) -> u64;

    fn get(&self, key: &BinaryRow) -> Option<&BinaryRow>;

    fn put(&mut self, key: BinaryRow, value: BinaryRow) -> Result<()>;

    fn remove(&mut self, key: &BinaryRow) -> Option<BinaryRow>;

    fn iter(&self) -> SnapshotIter;

    fn prefix_scan(&self, prefix: &BinaryRow) -> Result<SnapshotIter>;

    /// Durably commit the buffered mutations, returning the new version.
    fn commit(self: Box<Self>) -> Result<u64>;

    /// Discard the buffered mutations; nothing durable is written.
    fn abort(self: Box<Self>);
}

/// Read-only view of one committed version. May coexist with a read-write
/// handle on the same version; releasing it never touches durable files.
pub struct ReadOnlyStateStore {
    id: StateStoreId,
    version: u64,
    map: Arc<KeyValueMap>,
}

impl ReadOnlyStateStore {
    pub fn id(&self) -> StateStoreId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, key: &BinaryRow) -> Option<&BinaryRow> {
        self.map.get(key)
    }

    pub fn iter(&self) -> SnapshotIter {
        self.map.iter()
    }

    pub fn prefix_scan(&self, prefix: &BinaryRow) -> Result<SnapshotIter> {
        self.map.prefix_scan(prefix)
    }

    pub fn abort(self) {
        debug!(store = %self.id, version = self.version, "read-only store released");
    }
}

/// Point-in-time counters for one provider.
#[derive(Clone, Debug)]
pub struct StateStoreMetrics {
    pub id: StateStoreId,
    pub latest_version: u64,
    pub cached_versions: usize,
    pub entries_in_latest: Option<usize>,
}

/// The versioned-snapshot contract a storage backend implements. Backends
/// are selected by configuration and swapped behind this trait.
pub trait StateStoreProvider: Send + Sync {
    fn id(&self) -> StateStoreId;

    /// The newest committed version (0 when the store is empty).
    fn latest_version(&self) -> u64;

    /// Load `version` for a read-write transition producing `version + 1`.
    fn get_store(&self, version: u64) -> Result<Box<dyn StateStore>>;

    /// Load `version` for reading only.
    fn get_read_only(&self, version: u64) -> Result<ReadOnlyStateStore>;

    /// One maintenance pass: snapshot if due, then drop files older than
    /// the retention floor. Failures are logged and deferred to the next
    /// pass; committed versions are never put at risk.
    fn do_maintenance(&self) -> Result<()>;

    fn metrics(&self) -> StateStoreMetrics;
}

struct ProviderInner {
    config: StateStoreConfig,
    dir: PathBuf,
    _lock_file: File,
    /// Committed maps by version, bounded by `num_versions_to_retain_in_memory`.
    /// Shared between worker threads and the maintenance thread.
    cache: Mutex<LruCache<u64, Arc<KeyValueMap>>>,
    latest: Mutex<u64>,
    /// Empty map carrying the prefix-index configuration.
    template: KeyValueMap,
    coordinator: Option<Arc<dyn StateStoreCoordinator>>,
    executor: String,
}

impl Drop for ProviderInner {
    fn drop(&mut self) {
        if let Some(coordinator) = &self.coordinator {
            coordinator.report_removed(self.config.id);
        }
    }
}

/// File-backed provider: one directory of `{version}.delta` /
/// `{version}.snapshot` files under the checkpoint root.
pub struct FileStateStoreProvider {
    inner: Arc<ProviderInner>,
}

impl FileStateStoreProvider {
    /// Open (or create) the store directory and discover the latest
    /// committed version from the files present.
    pub fn open(config: StateStoreConfig) -> Result<Self> {
        Self::open_inner(config, None, "local")
    }

    /// Open and report this instance's placement to a coordinator.
    pub fn open_with_coordinator(
        config: StateStoreConfig,
        coordinator: Arc<dyn StateStoreCoordinator>,
        executor: &str,
    ) -> Result<Self> {
        Self::open_inner(config, Some(coordinator), executor)
    }

    fn open_inner(
        config: StateStoreConfig,
        coordinator: Option<Arc<dyn StateStoreCoordinator>>,
        executor: &str,
    ) -> Result<Self> {
        let template = if config.prefix_key_columns > 0 {
            KeyValueMap::with_prefix(config.key_schema.clone(), config.prefix_key_columns)?
        } else {
            KeyValueMap::new()
        };

        let dir = partition_dir(
            &config.checkpoint_root,
            config.id.operator_id,
            config.id.partition_id,
        );
        fs::create_dir_all(&dir)?;

        let lock_file = File::create(dir.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StateStoreError::Locked)?;

        let latest = list_store_files(&dir)?
            .iter()
            .map(|f| f.version)
            .max()
            .unwrap_or(0);

        let cache_size = NonZeroUsize::new(config.num_versions_to_retain_in_memory)
            .unwrap_or(NonZeroUsize::MIN);

        if let Some(coordinator) = &coordinator {
            coordinator.report_active(config.id, executor);
        }
        debug!(store = %config.id, latest, "state store provider opened");

        Ok(Self {
            inner: Arc::new(ProviderInner {
                dir,
                cache: Mutex::new(LruCache::new(cache_size)),
                latest: Mutex::new(latest),
                template,
                coordinator,
                executor: executor.to_string(),
                _lock_file: lock_file,
                config,
            }),
        })
    }

    /// The executor label this provider reports to the coordinator.
    pub fn executor(&self) -> &str {
        &self.inner.executor
    }

    /// Materialize the map for `version`: cache hit, or nearest snapshot
    /// plus ordered delta replay. The caller has already range-checked
    /// `version`; missing or unreadable chain files are corruption.
    fn load_map(&self, version: u64) -> Result<Arc<KeyValueMap>> {
        let inner = &self.inner;
        if version == 0 {
            return Ok(Arc::new(inner.template.clone()));
        }
        if let Some(map) = inner.cache.lock().get(&version) {
            debug!(store = %inner.config.id, version, "version cache hit");
            return Ok(Arc::clone(map));
        }

        let files = list_store_files(&inner.dir)?;
        let snapshot_version = files
            .iter()
            .filter(|f| f.kind == StoreFileKind::Snapshot && f.version <= version)
            .map(|f| f.version)
            .max();

        let key_fields = inner.config.key_schema.len();
        let value_fields = inner.config.value_schema.len();

        let mut map = inner.template.clone();
        let replay_from = match snapshot_version {
            Some(snapshot_version) => {
                let pairs = read_snapshot(
                    &snapshot_path(&inner.dir, snapshot_version),
                    key_fields,
                    value_fields,
                )?;
                for (key, value) in pairs {
                    map.put(key, value)?;
                }
                snapshot_version + 1
            }
            None => 1,
        };

        for v in replay_from..=version {
            let ops = read_delta(&delta_path(&inner.dir, v), key_fields, value_fields)?;
            apply_delta(&mut map, ops)?;
        }
        debug!(
            store = %inner.config.id,
            version,
            snapshot = ?snapshot_version,
            entries = map.len(),
            "version materialized from durable files"
        );

        let map = Arc::new(map);
        inner.cache.lock().put(version, Arc::clone(&map));
        Ok(map)
    }

    fn check_version(&self, version: u64) -> Result<()> {
        let latest = *self.inner.latest.lock();
        if version > latest {
            return Err(StateStoreError::InvalidVersion {
                requested: version,
                latest,
            });
        }
        Ok(())
    }

    /// Write a snapshot for the latest version when enough deltas piled up
    /// since the last one. Additive: never touches existing files.
    fn maybe_snapshot(&self, latest: u64) {
        let inner = &self.inner;
        let files = match list_store_files(&inner.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(store = %inner.config.id, error = %e, "maintenance: listing failed");
                return;
            }
        };
        let last_snapshot = files
            .iter()
            .filter(|f| f.kind == StoreFileKind::Snapshot && f.version <= latest)
            .map(|f| f.version)
            .max()
            .unwrap_or(0);
        if (latest - last_snapshot) < inner.config.min_deltas_for_snapshot as u64 {
            return;
        }

        let path = snapshot_path(&inner.dir, latest);
        if path.exists() {
            return;
        }
        let map = match self.load_map(latest) {
            Ok(map) => map,
            Err(e) => {
                warn!(store = %inner.config.id, version = latest, error = %e,
                      "maintenance: loading latest version for snapshot failed");
                return;
            }
        };
        match write_snapshot(&path, inner.config.codec, latest, map.entries()) {
            Ok(()) => {
                debug!(store = %inner.config.id, version = latest, entries = map.len(),
                       "maintenance: snapshot written");
            }
            // Someone else snapshotted this version in the meantime.
            Err(StateStoreError::ConcurrentCommit { .. }) => {}
            Err(e) => {
                warn!(store = %inner.config.id, version = latest, error = %e,
                      "maintenance: snapshot write failed, will retry next pass");
            }
        }
    }

    /// Delete files strictly older than the earliest one needed to rebuild
    /// the retention floor. Deletion never touches a file a retained
    /// version depends on.
    fn cleanup_old_files(&self, latest: u64) {
        let inner = &self.inner;
        let retain = inner.config.min_versions_to_retain as u64;
        if retain == 0 || latest < retain {
            return;
        }
        // Earliest version that must remain reloadable.
        let floor = latest - retain + 1;

        let files = match list_store_files(&inner.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(store = %inner.config.id, error = %e, "maintenance: listing failed");
                return;
            }
        };
        // The floor is rebuilt from the newest snapshot at or below it;
        // without one the whole delta chain is still needed.
        let Some(earliest_needed) = files
            .iter()
            .filter(|f| f.kind == StoreFileKind::Snapshot && f.version <= floor)
            .map(|f| f.version)
            .max()
        else {
            return;
        };

        let mut deleted = 0usize;
        for file in files.iter().filter(|f| f.version < earliest_needed) {
            let path = match file.kind {
                StoreFileKind::Delta => delta_path(&inner.dir, file.version),
                StoreFileKind::Snapshot => snapshot_path(&inner.dir, file.version),
            };
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(store = %inner.config.id, file = %path.display(), error = %e,
                          "maintenance: delete failed, will retry next pass");
                }
            }
        }
        if deleted > 0 {
            debug!(store = %inner.config.id, deleted, floor, "maintenance: old files removed");
        }
    }
}

impl StateStoreProvider for FileStateStoreProvider {
    fn id(&self) -> StateStoreId {
        self.inner.config.id
    }

    fn latest_version(&self) -> u64 {
        *self.inner.latest.lock()
    }

    fn get_store(&self, version: u64) -> Result<Box<dyn StateStore>> {
        self.check_version(version)?;
        let map = self.load_map(version)?;
        Ok(Box::new(FileStateStore {
            inner: Arc::clone(&self.inner),
            map: (*map).clone(),
            version_to_commit: version + 1,
            ops: Vec::new(),
        }))
    }

    fn get_read_only(&self, version: u64) -> Result<ReadOnlyStateStore> {
        self.check_version(version)?;
        Ok(ReadOnlyStateStore {
            id: self.inner.config.id,
            version,
            map: self.load_map(version)?,
        })
    }

    fn do_maintenance(&self) -> Result<()> {
        let latest = *self.inner.latest.lock();
        if latest == 0 {
            return Ok(());
        }
        self.maybe_snapshot(latest);
        self.cleanup_old_files(latest);
        Ok(())
    }

    fn metrics(&self) -> StateStoreMetrics {
        let latest = *self.inner.latest.lock();
        let cache = self.inner.cache.lock();
        StateStoreMetrics {
            id: self.inner.config.id,
            latest_version: latest,
            cached_versions: cache.len(),
            entries_in_latest: cache.peek(&latest).map(|map| map.len()),
        }
    }
}

/// Read-write store over the file-backed provider.
struct FileStateStore {
    inner: Arc<ProviderInner>,
    map: KeyValueMap,
    version_to_commit: u64,
    /// Mutations in application order, becoming the delta file on commit.
    ops: Vec<DeltaOp>,
}

impl StateStore for FileStateStore {
    fn id(&self) -> StateStoreId {
        self.inner.config.id
    }

    fn version(&self) -> u64 {
        self.version_to_commit
    }

    fn get(&self, key: &BinaryRow) -> Option<&BinaryRow> {
        self.map.get(key)
    }

    fn put(&mut self, key: BinaryRow, value: BinaryRow) -> Result<()> {
        self.ops.push(DeltaOp::Put {
            key: key.clone(),
            value: value.clone(),
        });
        self.map.put(key, value)
    }

    fn remove(&mut self, key: &BinaryRow) -> Option<BinaryRow> {
        let removed = self.map.remove(key)?;
        self.ops.push(DeltaOp::Delete { key: key.clone() });
        Some(removed)
    }

    fn iter(&self) -> SnapshotIter {
        self.map.iter()
    }

    fn prefix_scan(&self, prefix: &BinaryRow) -> Result<SnapshotIter> {
        self.map.prefix_scan(prefix)
    }

    fn commit(self: Box<Self>) -> Result<u64> {
        let FileStateStore {
            inner,
            map,
            version_to_commit: version,
            ops,
        } = *self;

        write_delta(&delta_path(&inner.dir, version), inner.config.codec, version, &ops)?;

        inner.cache.lock().put(version, Arc::new(map));
        {
            let mut latest = inner.latest.lock();
            if version > *latest {
                *latest = version;
            }
        }
        debug!(store = %inner.config.id, version, ops = ops.len(), "version committed");
        Ok(version)
    }

    fn abort(self: Box<Self>) {
        debug!(
            store = %self.inner.config.id,
            version = self.version_to_commit,
            discarded_ops = self.ops.len(),
            "store aborted"
        );
        // No durable artifact exists yet; the working map just drops.
    }
}
