//! Background maintenance: periodic snapshot and retention passes.
//!
//! One task serves every registered provider. Each tick it asks every
//! provider to run one maintenance pass; a failing provider is logged and
//! retried on the next tick, never taken out of rotation.

use crate::config::{StateStoreConfig, StateStoreId};
use crate::provider::StateStoreProvider;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Shared registry of live providers, consulted by the maintenance task on
/// every tick. Register on open, deregister on close.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<StateStoreId, Arc<dyn StateStoreProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn StateStoreProvider>) {
        self.providers.write().insert(provider.id(), provider);
    }

    pub fn deregister(&self, id: StateStoreId) {
        self.providers.write().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// The current set of providers; the read lock is not held while
    /// maintenance runs against them.
    fn current(&self) -> Vec<Arc<dyn StateStoreProvider>> {
        self.providers.read().values().cloned().collect()
    }
}

/// Handle to the background maintenance thread. Dropping it (or calling
/// [`stop`](Self::stop)) signals the thread and waits for any in-flight
/// pass to finish.
pub struct MaintenanceTask {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceTask {
    /// Spawn the maintenance loop, ticking every `interval`.
    pub fn spawn(registry: Arc<ProviderRegistry>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("state-maintenance".to_string())
            .spawn(move || loop {
                // A stop signal (or a dropped sender) ends the loop; a
                // timeout means it is time for the next pass.
                match stop_rx.recv_timeout(interval) {
                    Ok(()) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                }
                for provider in registry.current() {
                    if let Err(e) = provider.do_maintenance() {
                        warn!(store = %provider.id(), error = %e,
                              "maintenance pass failed, retrying next tick");
                    }
                }
            })
            .expect("failed to spawn maintenance thread");
        debug!(interval_ms = interval.as_millis() as u64, "maintenance task started");
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Spawn the maintenance loop with the configured
    /// `maintenance_interval_ms`.
    pub fn from_config(registry: Arc<ProviderRegistry>, config: &StateStoreConfig) -> Self {
        Self::spawn(
            registry,
            Duration::from_millis(config.maintenance_interval_ms),
        )
    }

    /// Stop the loop and join the thread. Safe to call more than once.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.stop_tx.send(());
        if handle.join().is_err() {
            warn!("maintenance thread panicked during shutdown");
        }
    }
}

impl Drop for MaintenanceTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StateStoreConfig, StateStoreId};
    use crate::error::Result;
    use crate::provider::{ReadOnlyStateStore, StateStore, StateStoreMetrics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct CountingProvider {
        id: StateStoreId,
        passes: AtomicUsize,
    }

    impl StateStoreProvider for CountingProvider {
        fn id(&self) -> StateStoreId {
            self.id
        }

        fn latest_version(&self) -> u64 {
            0
        }

        fn get_store(&self, _version: u64) -> Result<Box<dyn StateStore>> {
            unimplemented!("not exercised by maintenance")
        }

        fn get_read_only(&self, _version: u64) -> Result<ReadOnlyStateStore> {
            unimplemented!("not exercised by maintenance")
        }

        fn do_maintenance(&self) -> Result<()> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn metrics(&self) -> StateStoreMetrics {
            StateStoreMetrics {
                id: self.id,
                latest_version: 0,
                cached_versions: 0,
                entries_in_latest: None,
            }
        }
    }

    fn counting(op: u64) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            id: StateStoreId {
                operator_id: op,
                partition_id: 0,
            },
            passes: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_task_runs_passes_until_stopped() {
        let registry = Arc::new(ProviderRegistry::new());
        let provider = counting(1);
        registry.register(provider.clone());

        let mut task = MaintenanceTask::spawn(Arc::clone(&registry), Duration::from_millis(10));

        let deadline = Instant::now() + Duration::from_secs(5);
        while provider.passes.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(provider.passes.load(Ordering::SeqCst) >= 3);

        task.stop();
        let after_stop = provider.passes.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(provider.passes.load(Ordering::SeqCst), after_stop);

        // Idempotent.
        task.stop();
    }

    #[test]
    fn test_from_config_uses_configured_interval() {
        let registry = Arc::new(ProviderRegistry::new());
        let provider = counting(1);
        registry.register(provider.clone());

        let config = StateStoreConfig {
            maintenance_interval_ms: 10,
            ..Default::default()
        };
        let _task = MaintenanceTask::from_config(Arc::clone(&registry), &config);

        let deadline = Instant::now() + Duration::from_secs(5);
        while provider.passes.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(provider.passes.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_deregistered_provider_is_skipped() {
        let registry = Arc::new(ProviderRegistry::new());
        let kept = counting(1);
        let dropped = counting(2);
        registry.register(kept.clone());
        registry.register(dropped.clone());
        assert_eq!(registry.len(), 2);

        registry.deregister(dropped.id);
        assert_eq!(registry.len(), 1);

        let _task = MaintenanceTask::spawn(Arc::clone(&registry), Duration::from_millis(10));
        let deadline = Instant::now() + Duration::from_secs(5);
        while kept.passes.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(kept.passes.load(Ordering::SeqCst) >= 2);
        assert_eq!(dropped.passes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_file_provider_under_task() {
        use crate::provider::FileStateStoreProvider;
        use crate::row::{FieldType, FieldValue, RowWriter};
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let provider = Arc::new(
            FileStateStoreProvider::open(StateStoreConfig {
                checkpoint_root: dir.path().to_path_buf(),
                id: StateStoreId {
                    operator_id: 7,
                    partition_id: 0,
                },
                key_schema: vec![FieldType::Long],
                value_schema: vec![FieldType::Long],
                min_deltas_for_snapshot: 2,
                ..Default::default()
            })
            .unwrap(),
        );

        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider.clone());
        let _task = MaintenanceTask::spawn(Arc::clone(&registry), Duration::from_millis(10));

        for v in 0..3u64 {
            let mut store = provider.get_store(v).unwrap();
            store
                .put(
                    RowWriter::from_values(&[FieldValue::Long(v as i64)]),
                    RowWriter::from_values(&[FieldValue::Long(v as i64)]),
                )
                .unwrap();
            store.commit().unwrap();
        }

        // The task snapshots the latest version once enough deltas exist.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let metrics = provider.metrics();
            assert_eq!(metrics.latest_version, 3);
            let files = crate::files::list_store_files(
                &crate::files::partition_dir(dir.path(), 7, 0),
            )
            .unwrap();
            if files
                .iter()
                .any(|f| f.kind == crate::files::StoreFileKind::Snapshot)
            {
                break;
            }
            assert!(Instant::now() < deadline, "snapshot never appeared");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
