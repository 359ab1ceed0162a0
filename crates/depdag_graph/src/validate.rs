//! Structural validation of declared graphs.
//!
//! Catches declaration mistakes that would otherwise produce silently wrong
//! aggregates: repeated identities, zero multipliers, empty references.
//! Cycles are not reported here; ordering detects them and the aggregation
//! task skips its ticks while the graph stays cyclic.

use depdag_core::FunctionId;
use indexmap::IndexSet;

use crate::error::GraphError;
use crate::graph::DependencyGraph;

fn is_blank(id: &FunctionId) -> bool {
    id.namespace.trim().is_empty() || id.name.trim().is_empty()
}

/// Validator for graph specs
#[derive(Debug, Clone, Default)]
pub struct Validator {
    /// Maximum allowed nodes (0 = no limit)
    pub max_nodes: usize,
}

impl Validator {
    /// Create a new validator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node limit
    #[must_use]
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Validate a graph
    ///
    /// # Errors
    ///
    /// Returns every problem found, not only the first
    pub fn validate(&self, graph: &DependencyGraph) -> Result<(), Vec<GraphError>> {
        let mut errors = Vec::new();

        if self.max_nodes > 0 && graph.node_count() > self.max_nodes {
            errors.push(GraphError::TooManyNodes {
                count: graph.node_count(),
                max: self.max_nodes,
            });
        }

        let mut seen = IndexSet::new();
        for node in &graph.nodes {
            if is_blank(&node.id) {
                errors.push(GraphError::EmptyName {
                    context: format!("node of graph {}", graph.key),
                });
            }
            if !seen.insert(&node.id) {
                errors.push(GraphError::DuplicateFunction {
                    function: node.id.clone(),
                });
            }

            for edge in &node.invocations {
                if is_blank(&edge.target) {
                    errors.push(GraphError::EmptyName {
                        context: format!("edge {} of {}", edge.edge_id, node.id),
                    });
                }
                if edge.multiplier == 0 {
                    errors.push(GraphError::ZeroMultiplier {
                        caller: node.id.clone(),
                        target: edge.target.clone(),
                        edge_id: edge.edge_id,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
