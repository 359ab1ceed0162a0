//! Task registry: at most one live aggregation task per resource.
//!
//! Registering a handle for a key that already has one cancels the previous
//! handle. Unregister and clear are idempotent. A handle's stop signal fires
//! at most once no matter how many paths race to cancel it.

use dashmap::DashMap;
use depdag_core::{ResourceKey, TaskId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Registry result type
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The handle was already stopped before registration
    #[error("cannot register stopped task {task} for {key}")]
    HandleCancelled {
        /// Resource the handle was offered for
        key: ResourceKey,
        /// Task behind the handle
        task: TaskId,
    },
}

/// Stop signal of one aggregation task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Create a fresh, unfired handle
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: TaskId::new(),
            token: CancellationToken::new(),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Task identifier
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Fire the stop signal.
    ///
    /// Returns `true` only for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.token.cancel();
            true
        } else {
            false
        }
    }

    /// Check if the stop signal has fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Token observed by the task loop
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait until the stop signal fires
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskHandle {}

/// Concurrent map from resource key to its live task
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<ResourceKey, TaskHandle>,
}

impl TaskRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `handle` as the live task for `key`, stopping any previous one.
    ///
    /// Returns the id of the replaced task, if there was one.
    ///
    /// # Errors
    ///
    /// Returns error if `handle` has already been cancelled
    #[instrument(skip_all, fields(resource = %key, task = %handle.id()))]
    pub fn register(&self, key: ResourceKey, handle: TaskHandle) -> RegistryResult<Option<TaskId>> {
        if handle.is_cancelled() {
            return Err(RegistryError::HandleCancelled {
                key,
                task: handle.id(),
            });
        }

        // The map shard lock is released before the old handle is cancelled
        let previous = self.tasks.insert(key, handle);
        let replaced = previous.map(|old| {
            let fired = old.cancel();
            debug!(replaced = %old.id(), fired, "stopped previous task");
            old.id()
        });

        info!(replaced = replaced.is_some(), "task registered");
        Ok(replaced)
    }

    /// Live task for `key`
    #[must_use]
    pub fn lookup(&self, key: &ResourceKey) -> Option<TaskHandle> {
        self.tasks.get(key).map(|h| h.clone())
    }

    /// Stop and forget the task for `key`.
    ///
    /// Returns `false` when nothing was registered.
    #[instrument(skip_all, fields(resource = %key))]
    pub fn unregister(&self, key: &ResourceKey) -> bool {
        match self.tasks.remove(key) {
            Some((_, handle)) => {
                let fired = handle.cancel();
                info!(task = %handle.id(), fired, "task unregistered");
                true
            }
            None => {
                debug!("no task registered");
                false
            }
        }
    }

    /// Stop and forget every task; returns how many were removed
    pub fn clear(&self) -> usize {
        let keys = self.keys();
        let removed = keys.iter().filter(|key| self.unregister(key)).count();
        if removed > 0 {
            info!(removed, "registry cleared");
        }
        removed
    }

    /// Keys with a live task
    #[must_use]
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.tasks.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of live tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if no task is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
