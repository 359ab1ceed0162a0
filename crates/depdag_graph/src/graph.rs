//! Declared call graph among deployed functions.
//!
//! A [`DependencyGraph`] is the declared content of one tracked resource: a set of
//! [`FunctionNode`]s, each listing the [`InvocationEdge`]s it issues. Edges
//! of one node that share an `edge_id` are issued concurrently; distinct ids
//! are issued one after the other.
//!
//! The JSON shape mirrors the resource definition (`functionName`,
//! `functionNamespace`, `edgeId`, `edgeMultiplier`, ...).

use depdag_core::{CoreResult, FunctionId, ResourceKey, ResponseTime, DEFAULT_NAMESPACE};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_multiplier() -> u32 {
    1
}

/// One outbound call from a function node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EdgeWire", into = "EdgeWire")]
pub struct InvocationEdge {
    /// Invoked function
    pub target: FunctionId,
    /// Concurrency group of this call within its caller
    pub edge_id: u32,
    /// Number of calls the caller issues along this edge
    pub multiplier: u32,
}

impl InvocationEdge {
    /// Create a new edge with a multiplier of one
    #[must_use]
    pub fn new(target: FunctionId, edge_id: u32) -> Self {
        Self {
            target,
            edge_id,
            multiplier: 1,
        }
    }

    /// Set the call multiplier
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeWire {
    function_name: String,
    #[serde(default = "default_namespace")]
    function_namespace: String,
    edge_id: u32,
    #[serde(default = "default_multiplier")]
    edge_multiplier: u32,
}

impl From<EdgeWire> for InvocationEdge {
    fn from(wire: EdgeWire) -> Self {
        Self {
            target: FunctionId::new(wire.function_namespace, wire.function_name),
            edge_id: wire.edge_id,
            multiplier: wire.edge_multiplier,
        }
    }
}

impl From<InvocationEdge> for EdgeWire {
    fn from(edge: InvocationEdge) -> Self {
        Self {
            function_name: edge.target.name,
            function_namespace: edge.target.namespace,
            edge_id: edge.edge_id,
            edge_multiplier: edge.multiplier,
        }
    }
}

/// A function and the calls it makes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NodeWire", into = "NodeWire")]
pub struct FunctionNode {
    /// Function identity
    pub id: FunctionId,
    /// Response time recorded while profiling the function in isolation
    pub nominal_response_time: ResponseTime,
    /// Outbound calls, in declaration order
    pub invocations: Vec<InvocationEdge>,
}

impl FunctionNode {
    /// Create a node with no outbound calls
    #[must_use]
    pub fn new(id: FunctionId) -> Self {
        Self {
            id,
            nominal_response_time: ResponseTime::zero(),
            invocations: Vec::new(),
        }
    }

    /// Add an outbound call
    #[must_use]
    pub fn with_edge(mut self, edge: InvocationEdge) -> Self {
        self.invocations.push(edge);
        self
    }

    /// Set the nominal response time
    #[must_use]
    pub fn with_nominal_response_time(mut self, nominal: ResponseTime) -> Self {
        self.nominal_response_time = nominal;
        self
    }

    /// A node that calls nothing
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.invocations.is_empty()
    }

    /// Outbound edges grouped by edge id, in first-seen order
    #[must_use]
    pub fn edge_groups(&self) -> IndexMap<u32, Vec<&InvocationEdge>> {
        let mut groups: IndexMap<u32, Vec<&InvocationEdge>> = IndexMap::new();
        for edge in &self.invocations {
            groups.entry(edge.edge_id).or_default().push(edge);
        }
        groups
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeWire {
    function_name: String,
    #[serde(default = "default_namespace")]
    function_namespace: String,
    #[serde(default)]
    invocations: Vec<InvocationEdge>,
    #[serde(default)]
    nominal_response_time: ResponseTime,
}

impl From<NodeWire> for FunctionNode {
    fn from(wire: NodeWire) -> Self {
        Self {
            id: FunctionId::new(wire.function_namespace, wire.function_name),
            nominal_response_time: wire.nominal_response_time,
            invocations: wire.invocations,
        }
    }
}

impl From<FunctionNode> for NodeWire {
    fn from(node: FunctionNode) -> Self {
        Self {
            function_name: node.id.name,
            function_namespace: node.id.namespace,
            invocations: node.invocations,
            nominal_response_time: node.nominal_response_time,
        }
    }
}

/// The declared call graph of one tracked resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Resource this graph is declared by
    #[serde(flatten)]
    pub key: ResourceKey,
    /// All function nodes
    pub nodes: Vec<FunctionNode>,
}

impl DependencyGraph {
    /// Create a new empty graph
    #[must_use]
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            nodes: Vec::new(),
        }
    }

    /// Add a node
    #[must_use]
    pub fn with_node(mut self, node: FunctionNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Parse a graph from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the document is not a valid graph
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Get node by function identity
    #[must_use]
    pub fn node(&self, id: &FunctionId) -> Option<&FunctionNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Check whether a function is a node of this graph
    #[must_use]
    pub fn contains(&self, id: &FunctionId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    /// Functions invoked by some node but not declared as nodes themselves
    #[must_use]
    pub fn external_targets(&self) -> IndexSet<FunctionId> {
        let declared: IndexSet<&FunctionId> = self.nodes.iter().map(|n| &n.id).collect();
        self.nodes
            .iter()
            .flat_map(|n| n.invocations.iter())
            .filter(|e| !declared.contains(&e.target))
            .map(|e| e.target.clone())
            .collect()
    }

    /// Get total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.invocations.len()).sum()
    }

    /// Check if graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(name: &str) -> FunctionId {
        FunctionId::in_default(name)
    }

    #[test]
    fn test_node_builder() {
        let node = FunctionNode::new(f("a"))
            .with_edge(InvocationEdge::new(f("b"), 1))
            .with_edge(InvocationEdge::new(f("c"), 1).with_multiplier(3))
            .with_nominal_response_time(ResponseTime::from_millis(12));

        assert!(!node.is_leaf());
        assert_eq!(node.invocations.len(), 2);
        assert_eq!(node.invocations[1].multiplier, 3);
        assert_eq!(node.nominal_response_time.as_millis(), 12);
        assert!(FunctionNode::new(f("leaf")).is_leaf());
    }

    #[test]
    fn test_edge_groups() {
        let node = FunctionNode::new(f("x"))
            .with_edge(InvocationEdge::new(f("y"), 1))
            .with_edge(InvocationEdge::new(f("z"), 2))
            .with_edge(InvocationEdge::new(f("w"), 1));

        let groups = node.edge_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&1].len(), 2);
        assert_eq!(groups[&2].len(), 1);
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_external_targets() {
        let graph = DependencyGraph::new(ResourceKey::new("default", "g"))
            .with_node(
                FunctionNode::new(f("a"))
                    .with_edge(InvocationEdge::new(f("b"), 1))
                    .with_edge(InvocationEdge::new(f("payments"), 2)),
            )
            .with_node(FunctionNode::new(f("b")));

        let external = graph.external_targets();
        assert_eq!(external.len(), 1);
        assert!(external.contains(&f("payments")));
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.contains(&f("b")));
        assert!(!graph.contains(&f("payments")));
    }

    #[test]
    fn test_graph_from_json() {
        let json = r#"{
            "namespace": "shop",
            "name": "checkout-graph",
            "nodes": [
                {
                    "functionName": "checkout",
                    "functionNamespace": "shop",
                    "nominalResponseTime": 40,
                    "invocations": [
                        { "functionName": "cart", "functionNamespace": "shop", "edgeId": 1, "edgeMultiplier": 2 },
                        { "functionName": "auth", "edgeId": 2 }
                    ]
                },
                { "functionName": "cart", "functionNamespace": "shop" }
            ]
        }"#;

        let graph = DependencyGraph::from_json(json).unwrap();
        assert_eq!(graph.key, ResourceKey::new("shop", "checkout-graph"));
        assert_eq!(graph.node_count(), 2);

        let checkout = graph.node(&FunctionId::new("shop", "checkout")).unwrap();
        assert_eq!(checkout.nominal_response_time.as_millis(), 40);
        assert_eq!(checkout.invocations[0].multiplier, 2);
        // Omitted namespace and multiplier fall back to defaults
        assert_eq!(checkout.invocations[1].target, FunctionId::in_default("auth"));
        assert_eq!(checkout.invocations[1].multiplier, 1);

        let cart = graph.node(&FunctionId::new("shop", "cart")).unwrap();
        assert!(cart.is_leaf());
    }

    #[test]
    fn test_graph_json_uses_wire_names() {
        let graph = DependencyGraph::new(ResourceKey::new("ns", "g")).with_node(
            FunctionNode::new(FunctionId::new("ns", "a"))
                .with_edge(InvocationEdge::new(FunctionId::new("ns", "b"), 4)),
        );
        let value = serde_json::to_value(&graph).unwrap();
        assert_eq!(value["name"], "g");
        assert_eq!(value["nodes"][0]["functionName"], "a");
        assert_eq!(value["nodes"][0]["invocations"][0]["edgeId"], 4);
        assert_eq!(value["nodes"][0]["invocations"][0]["edgeMultiplier"], 1);
    }

    #[test]
    fn test_graph_from_json_invalid() {
        assert!(DependencyGraph::from_json("{\"nodes\": 3}").is_err());
    }
}
