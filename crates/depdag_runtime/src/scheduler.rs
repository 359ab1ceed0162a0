//! Periodic aggregation task for one resource.
//!
//! A task fires immediately, then once per period, until its token is
//! cancelled. Ticks never overlap: the next one is only awaited after the
//! current one has published, and an overrunning tick delays the schedule
//! instead of bursting to catch up. Cancellation stops the next tick; a tick
//! already in flight runs to completion.

use depdag_core::ResourceKey;
use depdag_graph::{DependencyGraph, GraphError, OrderedGraph};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::engine::AggregationEngine;
use crate::metrics::MetricSource;
use crate::monitor::TickMonitor;
use crate::publish::StatusPublisher;
use crate::registry::TaskHandle;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What one tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A full snapshot was published
    Published {
        /// Functions in the snapshot
        functions: usize,
    },
    /// The snapshot was computed but the publisher refused it
    PublishFailed,
    /// The graph could not be ordered; nothing was computed
    Skipped,
}

/// Everything one resource needs to aggregate on a schedule
pub struct AggregationTask {
    key: ResourceKey,
    plan: Result<OrderedGraph, GraphError>,
    engine: AggregationEngine,
    source: Arc<dyn MetricSource>,
    publisher: Arc<dyn StatusPublisher>,
    monitor: Arc<TickMonitor>,
}

impl AggregationTask {
    /// Order `graph` and bind it to its collaborators.
    ///
    /// A cyclic graph still yields a task; each of its ticks is skipped.
    #[must_use]
    pub fn new(
        graph: &DependencyGraph,
        source: Arc<dyn MetricSource>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        let plan = OrderedGraph::from_graph(graph);
        if let Err(e) = &plan {
            warn!(resource = %graph.key, error = %e, "graph cannot be ordered, ticks will be skipped");
        }

        Self {
            key: graph.key.clone(),
            plan,
            engine: AggregationEngine::new(),
            source,
            publisher,
            monitor: Arc::new(TickMonitor::new()),
        }
    }

    /// Report into a shared monitor
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<TickMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Resource this task aggregates
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Check if the graph could be ordered
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.plan.is_ok()
    }

    /// Run one aggregation pass and publish the result
    pub async fn tick(&self) -> TickOutcome {
        let graph = match &self.plan {
            Ok(graph) => graph,
            Err(e) => {
                warn!(resource = %self.key, error = %e, "skipping tick");
                self.monitor.record_skipped();
                return TickOutcome::Skipped;
            }
        };

        let averages = self.engine.collect_averages(graph, self.source.as_ref()).await;
        self.monitor.record_metric_failures(averages.failures());
        self.monitor.record_unsampled(averages.unsampled());

        let result = self.engine.aggregate(graph, &averages);
        let functions = result.len();

        match self.publisher.publish(&self.key, result.into_status()).await {
            Ok(()) => {
                debug!(resource = %self.key, functions, "snapshot published");
                self.monitor.record_published();
                TickOutcome::Published { functions }
            }
            Err(e) => {
                error!(resource = %self.key, error = %e, "publish failed");
                self.monitor.record_publish_failure();
                TickOutcome::PublishFailed
            }
        }
    }

    /// Tick every `period` until `token` is cancelled; returns ticks run
    pub async fn run_until_cancelled(self, token: CancellationToken, period: Duration) -> u64 {
        let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // Outside the select so cancellation never interrupts a tick
            self.tick().await;
            ticks += 1;
        }

        info!(resource = %self.key, ticks, "aggregation stopped");
        ticks
    }

    /// Spawn the loop on the runtime with a fresh handle that stops it
    pub fn spawn(self, period: Duration) -> (TaskHandle, JoinHandle<u64>) {
        let handle = TaskHandle::new();
        let join = self.spawn_on(&handle, period);
        (handle, join)
    }

    /// Spawn the loop stopped by an existing handle, typically one already
    /// recorded in the registry
    pub fn spawn_on(self, handle: &TaskHandle, period: Duration) -> JoinHandle<u64> {
        let span = info_span!("aggregation", resource = %self.key, task = %handle.id());
        tokio::spawn(
            self.run_until_cancelled(handle.token(), period)
                .instrument(span),
        )
    }
}
