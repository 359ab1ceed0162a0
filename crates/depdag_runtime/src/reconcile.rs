//! Reconciliation driver: keeps the registry in step with graph changes.
//!
//! Every applied graph gets a freshly ordered task that replaces whatever
//! was running for its key; a deleted graph loses its task and its published
//! status. Shutdown clears the registry and waits for every task to end.

use depdag_core::{ResourceKey, TaskId};
use depdag_graph::{DependencyGraph, GraphError, Validator};
use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RuntimeConfig;
use crate::metrics::MetricSource;
use crate::monitor::TickMonitor;
use crate::publish::StatusPublisher;
use crate::registry::{RegistryError, TaskHandle, TaskRegistry};
use crate::scheduler::AggregationTask;

/// Reconcile result type
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Change notification for one tracked resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// The graph was created or changed
    Applied(DependencyGraph),
    /// The resource was deleted
    Deleted(ResourceKey),
}

impl GraphEvent {
    /// Resource the event is about
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        match self {
            Self::Applied(graph) => &graph.key,
            Self::Deleted(key) => key,
        }
    }
}

/// What a reconcile did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// A task was started for the resource
    Registered {
        /// Resource
        key: ResourceKey,
        /// New task
        task: TaskId,
        /// Task that was stopped in its favour
        replaced: Option<TaskId>,
        /// The graph has a cycle; its ticks will be skipped
        cyclic: bool,
    },
    /// The resource's task was stopped
    Unregistered {
        /// Resource
        key: ResourceKey,
        /// Whether a task was running
        existed: bool,
    },
}

fn join_errors(errors: &[GraphError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reconcile errors
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The graph failed validation; any previous task was stopped
    #[error("invalid graph {key}: {}", join_errors(.errors))]
    InvalidGraph {
        /// Resource
        key: ResourceKey,
        /// Every problem found
        errors: Vec<GraphError>,
    },

    /// Registry refused the task
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Drives the task registry from graph events
pub struct Reconciler {
    registry: Arc<TaskRegistry>,
    joins: DashMap<ResourceKey, JoinHandle<u64>>,
    source: Arc<dyn MetricSource>,
    publisher: Arc<dyn StatusPublisher>,
    monitor: Arc<TickMonitor>,
    validator: Validator,
    config: RuntimeConfig,
}

impl Reconciler {
    /// Create a driver with its own registry and monitor
    #[must_use]
    pub fn new(
        config: RuntimeConfig,
        source: Arc<dyn MetricSource>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            joins: DashMap::new(),
            source,
            publisher,
            monitor: Arc::new(TickMonitor::new()),
            validator: Validator::new().with_max_nodes(config.max_nodes),
            config,
        }
    }

    /// Share an existing registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Share an existing monitor
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<TickMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Registry of live tasks
    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Counters shared by every task
    #[must_use]
    pub fn monitor(&self) -> &Arc<TickMonitor> {
        &self.monitor
    }

    /// Channel sized by the configured event buffer
    #[must_use]
    pub fn event_channel(&self) -> (mpsc::Sender<GraphEvent>, mpsc::Receiver<GraphEvent>) {
        mpsc::channel(self.config.event_buffer)
    }

    /// Apply one event. Must be called from within a tokio runtime.
    ///
    /// A replaced or deleted task is cancelled and awaited before anything
    /// else happens for its key, so its in-flight tick never overlaps the
    /// next task or outlives a retraction.
    ///
    /// # Errors
    ///
    /// Returns error if an applied graph is invalid, after stopping the
    /// resource's previous task
    #[instrument(skip_all, fields(resource = %event.key()))]
    pub async fn reconcile(&self, event: GraphEvent) -> ReconcileResult<ReconcileAction> {
        match event {
            GraphEvent::Applied(graph) => self.apply(graph).await,
            GraphEvent::Deleted(key) => {
                let existed = self.stop(&key).await;
                if let Err(e) = self.publisher.retract(&key).await {
                    warn!(error = %e, "failed to retract status");
                }
                Ok(ReconcileAction::Unregistered { key, existed })
            }
        }
    }

    async fn apply(&self, graph: DependencyGraph) -> ReconcileResult<ReconcileAction> {
        if let Err(errors) = self.validator.validate(&graph) {
            // Stop the task built from the previous graph
            self.stop(&graph.key).await;
            return Err(ReconcileError::InvalidGraph {
                key: graph.key,
                errors,
            });
        }

        let task = AggregationTask::new(&graph, Arc::clone(&self.source), Arc::clone(&self.publisher))
            .with_monitor(Arc::clone(&self.monitor));
        let cyclic = !task.is_runnable();

        // Registering cancels the previous handle; the new loop starts after
        let handle = TaskHandle::new();
        let replaced = self.registry.register(graph.key.clone(), handle.clone())?;
        if let Some(previous) = self.joins.remove(&graph.key) {
            self.finish(&graph.key, previous.1).await;
        }

        let join = task.spawn_on(&handle, self.config.interval());
        self.joins.insert(graph.key.clone(), join);

        info!(task = %handle.id(), nodes = graph.nodes.len(), cyclic, "graph reconciled");
        Ok(ReconcileAction::Registered {
            key: graph.key,
            task: handle.id(),
            replaced,
            cyclic,
        })
    }

    /// Cancel and await the task of `key`; returns whether one was registered
    async fn stop(&self, key: &ResourceKey) -> bool {
        let existed = self.registry.unregister(key);
        if let Some((_, join)) = self.joins.remove(key) {
            self.finish(key, join).await;
        }
        existed
    }

    async fn finish(&self, key: &ResourceKey, join: JoinHandle<u64>) {
        match join.await {
            Ok(ticks) => debug!(resource = %key, ticks, "task finished"),
            Err(e) if e.is_panic() => {
                error!(resource = %key, "aggregation task panicked");
                self.monitor.record_task_panic();
            }
            Err(e) => warn!(resource = %key, error = %e, "aggregation task aborted"),
        }
    }

    /// Consume events until `shutdown` fires or every sender is dropped,
    /// then stop all tasks. Returns the number of events handled.
    pub async fn run(&self, mut events: mpsc::Receiver<GraphEvent>, shutdown: CancellationToken) -> u64 {
        let mut handled = 0u64;
        loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        warn!("event channel closed");
                        break;
                    }
                },
            };

            let key = event.key().clone();
            if let Err(e) = self.reconcile(event).await {
                error!(resource = %key, error = %e, "reconcile failed");
            }
            handled += 1;
        }

        self.shutdown().await;
        handled
    }

    /// Stop every task and wait for it to finish; returns how many were running
    pub async fn shutdown(&self) -> usize {
        let stopped = self.registry.clear();
        let keys: Vec<ResourceKey> = self.joins.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, join)) = self.joins.remove(&key) {
                self.finish(&key, join).await;
            }
        }
        info!(stopped, "reconciler stopped");
        stopped
    }
}
