//! Aggregation engine: external response time per function.
//!
//! One tick runs in two steps:
//!
//! 1. [`AggregationEngine::collect_averages`] queries the metric source for
//!    every node and every external call target. Failed or unsampled lookups
//!    count as zero for this tick.
//! 2. [`AggregationEngine::aggregate`] walks the graph leaf-first. The value
//!    of an edge is `(target average + target external time) * multiplier`,
//!    where the target's external time is the one computed earlier in the
//!    same walk (zero for leaves and for functions outside the graph). Edges
//!    of a node sharing an edge id ran concurrently and contribute their
//!    maximum; distinct edge ids ran in sequence and are summed.

use chrono::Utc;
use depdag_core::{FunctionId, ResponseTime};
use depdag_graph::{FunctionNode, OrderedGraph};
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::metrics::MetricSource;
use crate::publish::{GraphStatus, NodeStatus};

/// Per-function averages gathered for one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Averages {
    values: IndexMap<FunctionId, ResponseTime>,
    failures: u64,
    unsampled: u64,
}

impl Averages {
    /// Create an empty set of averages
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the average of a function
    #[must_use]
    pub fn with(mut self, function: FunctionId, average: ResponseTime) -> Self {
        self.values.insert(function, average);
        self
    }

    /// Average of `function`; zero when unknown
    #[must_use]
    pub fn get(&self, function: &FunctionId) -> ResponseTime {
        self.values.get(function).copied().unwrap_or_default()
    }

    /// Lookups that failed this tick
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Lookups that returned no samples this tick
    #[must_use]
    pub fn unsampled(&self) -> u64 {
        self.unsampled
    }
}

/// External response time of every node of one graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationResult {
    times: IndexMap<FunctionId, ResponseTime>,
}

impl AggregationResult {
    /// External response time of `function`
    #[must_use]
    pub fn get(&self, function: &FunctionId) -> Option<ResponseTime> {
        self.times.get(function).copied()
    }

    /// Entries in leaf-first order
    pub fn iter(&self) -> impl Iterator<Item = (&FunctionId, &ResponseTime)> {
        self.times.iter()
    }

    /// Number of functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Convert into the published status shape
    #[must_use]
    pub fn into_status(self) -> GraphStatus {
        GraphStatus {
            nodes: self
                .times
                .iter()
                .map(|(function, time)| NodeStatus::new(function, *time))
                .collect(),
            computed_at: Utc::now(),
        }
    }
}

/// Computes external response times
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationEngine;

impl AggregationEngine {
    /// Create a new engine
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Query the average of every node and external target of `graph`
    pub async fn collect_averages(&self, graph: &OrderedGraph, source: &dyn MetricSource) -> Averages {
        let functions: Vec<&FunctionId> = graph
            .nodes()
            .iter()
            .map(|n| &n.id)
            .chain(graph.external_targets().iter())
            .collect();

        let lookups = join_all(
            functions
                .iter()
                .map(|function| source.average_response_time(function)),
        )
        .await;

        let mut averages = Averages::new();
        for (function, lookup) in functions.into_iter().zip(lookups) {
            let average = match lookup {
                Ok(sample) if sample.is_empty() => {
                    debug!(resource = %graph.key(), function = %function, "no samples, using zero");
                    averages.unsampled += 1;
                    ResponseTime::zero()
                }
                Ok(sample) => sample.average,
                Err(e) => {
                    warn!(resource = %graph.key(), function = %function, error = %e, "metric lookup failed, using zero");
                    averages.failures += 1;
                    ResponseTime::zero()
                }
            };
            averages.values.insert(function.clone(), average);
        }

        averages
    }

    /// Combine averages into external response times, callees first
    #[must_use]
    pub fn aggregate(&self, graph: &OrderedGraph, averages: &Averages) -> AggregationResult {
        let mut times: IndexMap<FunctionId, ResponseTime> = IndexMap::with_capacity(graph.len());

        for node in graph.nodes() {
            let external = Self::node_external_time(node, averages, &times);
            debug!(
                resource = %graph.key(),
                function = %node.id,
                external_response_time = external.as_millis(),
                "external response time"
            );
            times.insert(node.id.clone(), external);
        }

        AggregationResult { times }
    }

    /// Query and aggregate in one go
    pub async fn compute(&self, graph: &OrderedGraph, source: &dyn MetricSource) -> AggregationResult {
        let averages = self.collect_averages(graph, source).await;
        self.aggregate(graph, &averages)
    }

    fn node_external_time(
        node: &FunctionNode,
        averages: &Averages,
        computed: &IndexMap<FunctionId, ResponseTime>,
    ) -> ResponseTime {
        if node.is_leaf() {
            return ResponseTime::zero();
        }

        // One value per edge group: the slowest of its concurrent calls
        let mut groups: IndexMap<u32, ResponseTime> = IndexMap::new();
        for edge in &node.invocations {
            let downstream = computed.get(&edge.target).copied().unwrap_or_default();
            let value = averages
                .get(&edge.target)
                .saturating_add(downstream)
                .saturating_mul(edge.multiplier);

            groups
                .entry(edge.edge_id)
                .and_modify(|slowest| *slowest = (*slowest).max(value))
                .or_insert(value);
        }

        groups.into_values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricError, MetricResult, MetricSample, StaticMetricSource};
    use async_trait::async_trait;
    use depdag_core::ResourceKey;
    use depdag_graph::{DependencyGraph, InvocationEdge};

    fn f(name: &str) -> FunctionId {
        FunctionId::in_default(name)
    }

    fn ms(millis: u64) -> ResponseTime {
        ResponseTime::from_millis(millis)
    }

    fn ordered(nodes: Vec<FunctionNode>) -> OrderedGraph {
        let graph = nodes
            .into_iter()
            .fold(DependencyGraph::new(ResourceKey::new("default", "g")), |g, n| {
                g.with_node(n)
            });
        OrderedGraph::from_graph(&graph).unwrap()
    }

    fn averages(entries: &[(&str, u64)]) -> Averages {
        entries
            .iter()
            .fold(Averages::new(), |a, (name, millis)| a.with(f(name), ms(*millis)))
    }

    fn call(target: &str, edge_id: u32) -> InvocationEdge {
        InvocationEdge::new(f(target), edge_id)
    }

    #[test]
    fn test_leaf_is_zero() {
        let graph = ordered(vec![FunctionNode::new(f("a")), FunctionNode::new(f("b"))]);
        let result = AggregationEngine::new().aggregate(&graph, &averages(&[("a", 50), ("b", 7)]));
        assert_eq!(result.get(&f("a")), Some(ResponseTime::zero()));
        assert_eq!(result.get(&f("b")), Some(ResponseTime::zero()));
    }

    #[test]
    fn test_parallel_group_takes_max() {
        let graph = ordered(vec![
            FunctionNode::new(f("x")).with_edge(call("y", 1)).with_edge(call("z", 1)),
            FunctionNode::new(f("y")),
            FunctionNode::new(f("z")),
        ]);
        let result = AggregationEngine::new().aggregate(&graph, &averages(&[("y", 10), ("z", 20)]));
        assert_eq!(result.get(&f("x")), Some(ms(20)));
    }

    #[test]
    fn test_sequential_groups_sum() {
        let graph = ordered(vec![
            FunctionNode::new(f("x")).with_edge(call("y", 1)).with_edge(call("z", 2)),
            FunctionNode::new(f("y")),
            FunctionNode::new(f("z")),
        ]);
        let result = AggregationEngine::new().aggregate(&graph, &averages(&[("y", 10), ("z", 15)]));
        assert_eq!(result.get(&f("x")), Some(ms(25)));
    }

    #[test]
    fn test_multiplier_scales_edge() {
        let graph = ordered(vec![
            FunctionNode::new(f("x")).with_edge(call("y", 1).with_multiplier(3)),
            FunctionNode::new(f("y")),
        ]);
        let result = AggregationEngine::new().aggregate(&graph, &averages(&[("y", 5)]));
        assert_eq!(result.get(&f("x")), Some(ms(15)));
    }

    #[test]
    fn test_multiplier_applies_before_grouping() {
        // 3 * 5 = 15 beats the parallel 12
        let graph = ordered(vec![
            FunctionNode::new(f("x"))
                .with_edge(call("y", 1).with_multiplier(3))
                .with_edge(call("z", 1)),
            FunctionNode::new(f("y")),
            FunctionNode::new(f("z")),
        ]);
        let result = AggregationEngine::new().aggregate(&graph, &averages(&[("y", 5), ("z", 12)]));
        assert_eq!(result.get(&f("x")), Some(ms(15)));
    }

    #[test]
    fn test_mixed_groups_counted_once() {
        // group 1 = max(10, 20), group 2 = 5, group 1 again must not be re-added
        let graph = ordered(vec![
            FunctionNode::new(f("x"))
                .with_edge(call("y", 1))
                .with_edge(call("w", 2))
                .with_edge(call("z", 1)),
            FunctionNode::new(f("y")),
            FunctionNode::new(f("z")),
            FunctionNode::new(f("w")),
        ]);
        let result = AggregationEngine::new()
            .aggregate(&graph, &averages(&[("y", 10), ("z", 20), ("w", 5)]));
        assert_eq!(result.get(&f("x")), Some(ms(25)));
    }

    #[test]
    fn test_edge_groups_scoped_per_caller() {
        // both callers use edge id 1; each only sees its own edges
        let graph = ordered(vec![
            FunctionNode::new(f("p")).with_edge(call("y", 1)),
            FunctionNode::new(f("q")).with_edge(call("z", 1)),
            FunctionNode::new(f("y")),
            FunctionNode::new(f("z")),
        ]);
        let result = AggregationEngine::new().aggregate(&graph, &averages(&[("y", 10), ("z", 30)]));
        assert_eq!(result.get(&f("p")), Some(ms(10)));
        assert_eq!(result.get(&f("q")), Some(ms(30)));
    }

    #[test]
    fn test_tree_end_to_end() {
        // A -> B -> {C, D}, D -> E, every edge in its own group
        let graph = ordered(vec![
            FunctionNode::new(f("A")).with_edge(call("B", 1)),
            FunctionNode::new(f("B")).with_edge(call("C", 1)).with_edge(call("D", 2)),
            FunctionNode::new(f("C")),
            FunctionNode::new(f("D")).with_edge(call("E", 1)),
            FunctionNode::new(f("E")),
        ]);
        let result = AggregationEngine::new().aggregate(
            &graph,
            &averages(&[("A", 0), ("B", 0), ("C", 1), ("D", 0), ("E", 1)]),
        );

        assert_eq!(result.get(&f("E")), Some(ms(0)));
        assert_eq!(result.get(&f("D")), Some(ms(1)));
        assert_eq!(result.get(&f("C")), Some(ms(0)));
        assert_eq!(result.get(&f("B")), Some(ms(2)));
        assert_eq!(result.get(&f("A")), Some(ms(2)));
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn test_external_target_uses_average_only() {
        let graph = ordered(vec![
            FunctionNode::new(f("x")).with_edge(call("payments", 1).with_multiplier(2)),
        ]);
        let result = AggregationEngine::new().aggregate(&graph, &averages(&[("payments", 8)]));
        assert_eq!(result.get(&f("x")), Some(ms(16)));
        assert_eq!(result.get(&f("payments")), None);
    }

    #[test]
    fn test_into_status_keeps_order() {
        let graph = ordered(vec![
            FunctionNode::new(f("x")).with_edge(call("y", 1)),
            FunctionNode::new(f("y")),
        ]);
        let status = AggregationEngine::new()
            .aggregate(&graph, &averages(&[("y", 4)]))
            .into_status();
        assert_eq!(status.nodes[0].function_name, "y");
        assert_eq!(status.nodes[1].function_name, "x");
        assert_eq!(status.get(&f("x")), Some(ms(4)));
    }

    struct FailingFor(FunctionId, StaticMetricSource);

    #[async_trait]
    impl MetricSource for FailingFor {
        async fn average_response_time(&self, function: &FunctionId) -> MetricResult<MetricSample> {
            if function == &self.0 {
                return Err(MetricError::Unavailable {
                    function: function.clone(),
                    reason: "backend down".to_string(),
                });
            }
            self.1.average_response_time(function).await
        }
    }

    #[tokio::test]
    async fn test_collect_averages_degrades_failures_to_zero() {
        let graph = ordered(vec![
            FunctionNode::new(f("x")).with_edge(call("y", 1)).with_edge(call("z", 2)),
            FunctionNode::new(f("y")),
            FunctionNode::new(f("z")),
        ]);
        let source = FailingFor(
            f("y"),
            StaticMetricSource::new().with_average(f("y"), 100).with_average(f("z"), 15),
        );

        let engine = AggregationEngine::new();
        let averages = engine.collect_averages(&graph, &source).await;
        assert_eq!(averages.failures(), 1);
        // x has no samples in the table
        assert_eq!(averages.unsampled(), 1);
        assert_eq!(averages.get(&f("y")), ResponseTime::zero());

        let result = engine.aggregate(&graph, &averages);
        assert_eq!(result.get(&f("x")), Some(ms(15)));
    }

    #[tokio::test]
    async fn test_zero_samples_treated_as_zero() {
        let graph = ordered(vec![
            FunctionNode::new(f("x")).with_edge(call("y", 1)),
            FunctionNode::new(f("y")),
        ]);
        let source = StaticMetricSource::new()
            .with_sample(f("y"), MetricSample::new(ms(40), 0));

        let result = AggregationEngine::new().compute(&graph, &source).await;
        assert_eq!(result.get(&f("x")), Some(ResponseTime::zero()));
    }

    #[tokio::test]
    async fn test_compute_queries_external_targets() {
        let graph = ordered(vec![FunctionNode::new(f("x")).with_edge(call("payments", 1))]);
        let source = StaticMetricSource::new().with_average(f("payments"), 9);

        let result = AggregationEngine::new().compute(&graph, &source).await;
        assert_eq!(result.get(&f("x")), Some(ms(9)));
    }
}
