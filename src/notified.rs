use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::providers::optimizely::EntityId;
use crate::report::{ClassifiedExperiment, StatusChange};

/// Identity of a notification: the same experiment reaching the same status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub exp_id: EntityId,
    pub status: String,
}

impl From<&StatusChange> for NotificationKey {
    fn from(change: &StatusChange) -> Self {
        Self {
            exp_id: change.exp_id,
            status: change.exp_status.clone(),
        }
    }
}

impl From<&ClassifiedExperiment> for NotificationKey {
    fn from(experiment: &ClassifiedExperiment) -> Self {
        Self::from(&experiment.change)
    }
}

/// Remembers which status changes were already reported.
///
/// Shared between scheduled runs, so implementations must be safe to call from
/// several tasks.
pub trait NotifiedStore: Send + Sync {
    fn contains(&self, key: &NotificationKey) -> bool;

    fn mark(&self, keys: &[NotificationKey]);
}

/// Process-local store; forgets everything on restart.
#[derive(Debug, Default)]
pub struct InMemoryNotifiedStore {
    keys: Mutex<HashSet<NotificationKey>>,
}

impl InMemoryNotifiedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl NotifiedStore for InMemoryNotifiedStore {
    fn contains(&self, key: &NotificationKey) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn mark(&self, keys: &[NotificationKey]) {
        let mut guard = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        guard.extend(keys.iter().cloned());
        debug!("Notified store now holds {} entries", guard.len());
    }
}
