//! Distributed placement tracking for store instances.
//!
//! The coordinator answers "who currently holds the active instance for
//! this store" so an executor can tell a warm local load from a replay of
//! durable files. Providers report themselves on open and deregister when
//! they close; the coordinator itself is external glue and only specified
//! at this interface.

use crate::config::StateStoreId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Placement registry for active store instances.
pub trait StateStoreCoordinator: Send + Sync {
    /// Record that `executor` now holds the active instance for `id`.
    fn report_active(&self, id: StateStoreId, executor: &str);

    /// Whether `executor` is still the registered holder of `id`.
    fn verify(&self, id: StateStoreId, executor: &str) -> bool;

    /// The executor currently holding `id`, if any.
    fn get_location(&self, id: StateStoreId) -> Option<String>;

    /// Remove the registration for `id` (instance unloaded or evicted).
    fn report_removed(&self, id: StateStoreId);

    /// Drop every registration belonging to `operator_id`.
    fn deactivate_operator(&self, operator_id: u64);
}

/// A single-process coordinator: an explicit registry object constructed at
/// runtime start and passed by handle, never a global.
#[derive(Default)]
pub struct InProcessCoordinator {
    locations: RwLock<HashMap<StateStoreId, String>>,
}

impl InProcessCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered active instances.
    pub fn active_count(&self) -> usize {
        self.locations.read().len()
    }
}

impl StateStoreCoordinator for InProcessCoordinator {
    fn report_active(&self, id: StateStoreId, executor: &str) {
        self.locations.write().insert(id, executor.to_string());
    }

    fn verify(&self, id: StateStoreId, executor: &str) -> bool {
        self.locations
            .read()
            .get(&id)
            .is_some_and(|holder| holder == executor)
    }

    fn get_location(&self, id: StateStoreId) -> Option<String> {
        self.locations.read().get(&id).cloned()
    }

    fn report_removed(&self, id: StateStoreId) {
        self.locations.write().remove(&id);
    }

    fn deactivate_operator(&self, operator_id: u64) {
        self.locations
            .write()
            .retain(|id, _| id.operator_id != operator_id);
    }
}
