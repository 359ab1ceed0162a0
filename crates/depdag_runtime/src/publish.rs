//! Status publishing: making each tick's snapshot visible.
//!
//! A publish is a full-replace overwrite of the resource's status. Publishers
//! do any diffing themselves; the engine never merges snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use depdag_core::{FunctionId, ResourceKey, ResponseTime};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Publish errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The status sink refused the update
    #[error("status update for {key} rejected: {reason}")]
    Rejected {
        /// Resource being published
        key: ResourceKey,
        /// Sink message
        reason: String,
    },

    /// Snapshot could not be encoded
    #[error("failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writing the snapshot failed
    #[error("failed to write status: {0}")]
    Io(#[from] std::io::Error),
}

/// External response time of one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Function name
    pub function_name: String,
    /// Function namespace
    pub function_namespace: String,
    /// Aggregated response time of the function's dependencies
    pub external_response_time: ResponseTime,
}

impl NodeStatus {
    /// Create a node status
    #[must_use]
    pub fn new(function: &FunctionId, external_response_time: ResponseTime) -> Self {
        Self {
            function_name: function.name.clone(),
            function_namespace: function.namespace.clone(),
            external_response_time,
        }
    }

    /// Identity of the function this status describes
    #[must_use]
    pub fn function(&self) -> FunctionId {
        FunctionId::new(&self.function_namespace, &self.function_name)
    }
}

/// Full status snapshot of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStatus {
    /// One entry per graph node, callees first
    pub nodes: Vec<NodeStatus>,
    /// When the snapshot was computed
    pub computed_at: DateTime<Utc>,
}

impl GraphStatus {
    /// External response time of `function`, if it is part of the snapshot
    #[must_use]
    pub fn get(&self, function: &FunctionId) -> Option<ResponseTime> {
        self.nodes
            .iter()
            .find(|n| n.function_name == function.name && n.function_namespace == function.namespace)
            .map(|n| n.external_response_time)
    }
}

/// Capability: make a resource's snapshot externally visible
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Overwrite the published status of `key`
    async fn publish(&self, key: &ResourceKey, status: GraphStatus) -> Result<(), PublishError>;

    /// Drop whatever was published for a deleted resource
    async fn retract(&self, _key: &ResourceKey) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Keeps the latest snapshot of every resource in memory
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    latest: DashMap<ResourceKey, GraphStatus>,
    publishes: AtomicU64,
}

impl MemoryPublisher {
    /// Create an empty publisher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot published for `key`
    #[must_use]
    pub fn latest(&self, key: &ResourceKey) -> Option<GraphStatus> {
        self.latest.get(key).map(|s| s.clone())
    }

    /// Total publishes across all resources
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusPublisher for MemoryPublisher {
    async fn publish(&self, key: &ResourceKey, status: GraphStatus) -> Result<(), PublishError> {
        self.latest.insert(key.clone(), status);
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn retract(&self, key: &ResourceKey) -> Result<(), PublishError> {
        self.latest.remove(key);
        Ok(())
    }
}

/// Logs every node status through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

#[async_trait]
impl StatusPublisher for TracingPublisher {
    async fn publish(&self, key: &ResourceKey, status: GraphStatus) -> Result<(), PublishError> {
        for node in &status.nodes {
            info!(
                resource = %key,
                function = %node.function(),
                external_response_time = node.external_response_time.as_millis(),
                "external response time"
            );
        }
        Ok(())
    }
}
