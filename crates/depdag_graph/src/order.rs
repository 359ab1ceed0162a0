//! Leaf-first ordering of function nodes.
//!
//! Nodes are peeled off in layers: each round collects every remaining node
//! whose calls all target functions that are already ordered (or not part of
//! the node set at all). Callees therefore always come before their callers.
//! Order inside one layer follows input order but carries no meaning.
//!
//! A graph that still has unordered nodes after `len(nodes)` rounds contains
//! a cycle; no partial order is ever returned.

use depdag_core::{FunctionId, ResourceKey};
use indexmap::{IndexMap, IndexSet};

use crate::error::{GraphError, GraphResult};
use crate::graph::{DependencyGraph, FunctionNode};

/// Peel `nodes` into leaf-first layers of indices into `nodes`.
fn peel(nodes: &[FunctionNode]) -> GraphResult<Vec<Vec<usize>>> {
    let mut remaining: IndexMap<&FunctionId, usize> = IndexMap::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        if remaining.insert(&node.id, index).is_some() {
            return Err(GraphError::DuplicateFunction {
                function: node.id.clone(),
            });
        }
    }

    let mut layers = Vec::new();
    for _ in 0..nodes.len() {
        // Out-degree only counts targets still waiting to be ordered
        let layer: Vec<usize> = remaining
            .values()
            .copied()
            .filter(|&i| {
                nodes[i]
                    .invocations
                    .iter()
                    .all(|edge| !remaining.contains_key(&edge.target))
            })
            .collect();

        if layer.is_empty() {
            break;
        }

        for &i in &layer {
            remaining.shift_remove(&nodes[i].id);
        }
        layers.push(layer);
    }

    if !remaining.is_empty() {
        return Err(GraphError::Cycle {
            unresolved: remaining.keys().map(|id| (*id).clone()).collect(),
        });
    }

    Ok(layers)
}

/// Order nodes so that every node comes after all the nodes it calls
///
/// # Errors
///
/// Returns [`GraphError::Cycle`] if the nodes contain a call cycle and
/// [`GraphError::DuplicateFunction`] if an identity appears twice.
pub fn order_leaf_first(nodes: &[FunctionNode]) -> GraphResult<Vec<FunctionNode>> {
    let layers = peel(nodes)?;
    Ok(layers
        .into_iter()
        .flatten()
        .map(|i| nodes[i].clone())
        .collect())
}

/// Leaf-first layers as function identities
///
/// # Errors
///
/// Same as [`order_leaf_first`].
pub fn leaf_layers(nodes: &[FunctionNode]) -> GraphResult<Vec<Vec<FunctionId>>> {
    let layers = peel(nodes)?;
    Ok(layers
        .into_iter()
        .map(|layer| layer.into_iter().map(|i| nodes[i].id.clone()).collect())
        .collect())
}

/// A graph whose nodes are stored leaf-first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedGraph {
    key: ResourceKey,
    nodes: Vec<FunctionNode>,
    external: IndexSet<FunctionId>,
}

impl OrderedGraph {
    /// Order a declared graph
    ///
    /// # Errors
    ///
    /// Returns error if the graph is cyclic or has duplicate nodes
    pub fn from_graph(graph: &DependencyGraph) -> GraphResult<Self> {
        Ok(Self {
            key: graph.key.clone(),
            nodes: order_leaf_first(&graph.nodes)?,
            external: graph.external_targets(),
        })
    }

    /// Resource the graph belongs to
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Nodes, callees before callers
    #[must_use]
    pub fn nodes(&self) -> &[FunctionNode] {
        &self.nodes
    }

    /// Called functions that are not nodes of the graph
    #[must_use]
    pub fn external_targets(&self) -> &IndexSet<FunctionId> {
        &self.external
    }

    /// Get node count
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
