//! depdag Runtime
//!
//! Turns declared call graphs plus live latency samples into per-function
//! external response times, once per tick, for every tracked resource.
//! Each resource owns exactly one periodic task; the [`TaskRegistry`]
//! replaces or cancels it as the resource changes or disappears.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod metrics;
pub mod monitor;
pub mod publish;
pub mod reconcile;
pub mod registry;
pub mod scheduler;

pub use config::{ConfigError, RuntimeConfig};
pub use engine::{AggregationEngine, AggregationResult, Averages};
pub use metrics::{
    InstanceLister, InstanceMetricSource, InstanceSampler, MetricError, MetricResult,
    MetricSample, MetricSource, StaticMetricSource,
};
pub use monitor::{MonitorSnapshot, TickMonitor};
pub use publish::{
    GraphStatus, MemoryPublisher, NodeStatus, PublishError, StatusPublisher, TracingPublisher,
};
pub use reconcile::{GraphEvent, ReconcileAction, ReconcileError, ReconcileResult, Reconciler};
pub use registry::{RegistryError, RegistryResult, TaskHandle, TaskRegistry};
pub use scheduler::{AggregationTask, TickOutcome};
