//! Metric sources: where per-function average response times come from.
//!
//! The engine only depends on [`MetricSource`]. Two implementations live
//! here: a fixed table, and an adapter that averages the samples of every
//! running instance of a function.

use async_trait::async_trait;
use depdag_core::{CoreError, CoreResult, FunctionId, ResponseTime};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Metric result type
pub type MetricResult<T> = Result<T, MetricError>;

/// Metric fetch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    /// The backend has no usable value
    #[error("metrics unavailable for {function}: {reason}")]
    Unavailable {
        /// Queried function
        function: FunctionId,
        /// Backend message
        reason: String,
    },

    /// Running instances could not be listed
    #[error("failed to list instances of {function}: {reason}")]
    Listing {
        /// Queried function
        function: FunctionId,
        /// Backend message
        reason: String,
    },

    /// One instance could not be sampled
    #[error("failed to sample instance {instance} of {function}: {reason}")]
    Sampling {
        /// Queried function
        function: FunctionId,
        /// Instance name
        instance: String,
        /// Backend message
        reason: String,
    },
}

fn one_sample() -> u64 {
    1
}

/// Average response time of a function and how many samples it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricSample {
    /// Average response time
    pub average: ResponseTime,
    /// Number of samples behind the average
    #[serde(default = "one_sample")]
    pub samples: u64,
}

impl MetricSample {
    /// Create a new sample
    #[must_use]
    pub const fn new(average: ResponseTime, samples: u64) -> Self {
        Self { average, samples }
    }

    /// A sample backed by nothing
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            average: ResponseTime::zero(),
            samples: 0,
        }
    }

    /// Check if no samples back this value
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

/// Capability: look up the average observed response time of a function
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Average response time and sample count for `function`
    async fn average_response_time(&self, function: &FunctionId) -> MetricResult<MetricSample>;
}

/// Fixed table of samples; unknown functions report no samples
#[derive(Debug, Clone, Default)]
pub struct StaticMetricSource {
    samples: IndexMap<FunctionId, MetricSample>,
}

impl StaticMetricSource {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample
    #[must_use]
    pub fn with_sample(mut self, function: FunctionId, sample: MetricSample) -> Self {
        self.samples.insert(function, sample);
        self
    }

    /// Add an average backed by a single sample
    #[must_use]
    pub fn with_average(self, function: FunctionId, millis: u64) -> Self {
        self.with_sample(function, MetricSample::new(ResponseTime::from_millis(millis), 1))
    }

    /// Parse a table of the form `{ "namespace/name": { "average": 12, "samples": 4 } }`
    ///
    /// # Errors
    ///
    /// Returns error if the document or a function reference is malformed
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let raw: IndexMap<String, MetricSample> = serde_json::from_str(json)?;
        let samples = raw
            .into_iter()
            .map(|(function, sample)| function.parse::<FunctionId>().map(|id| (id, sample)))
            .collect::<Result<IndexMap<_, _>, CoreError>>()?;
        Ok(Self { samples })
    }

    /// Number of functions in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[async_trait]
impl MetricSource for StaticMetricSource {
    async fn average_response_time(&self, function: &FunctionId) -> MetricResult<MetricSample> {
        Ok(self.samples.get(function).copied().unwrap_or_default())
    }
}

/// Capability: list the running instances of a function
#[async_trait]
pub trait InstanceLister: Send + Sync {
    /// Names of the instances currently serving `function`
    async fn list_instances(&self, function: &FunctionId) -> MetricResult<Vec<String>>;
}

/// Capability: sample the response time of one instance
#[async_trait]
pub trait InstanceSampler: Send + Sync {
    /// Current response time reported by `instance` of `function`
    async fn response_time(&self, function: &FunctionId, instance: &str)
    -> MetricResult<ResponseTime>;
}

/// Averages the response time over every running instance of a function.
///
/// An instance that cannot be sampled counts as zero rather than failing
/// the whole function; a function with no instances reports no samples.
pub struct InstanceMetricSource<L, S> {
    lister: L,
    sampler: S,
}

impl<L, S> InstanceMetricSource<L, S>
where
    L: InstanceLister,
    S: InstanceSampler,
{
    /// Create a new instance-averaging source
    #[must_use]
    pub fn new(lister: L, sampler: S) -> Self {
        Self { lister, sampler }
    }
}

#[async_trait]
impl<L, S> MetricSource for InstanceMetricSource<L, S>
where
    L: InstanceLister,
    S: InstanceSampler,
{
    async fn average_response_time(&self, function: &FunctionId) -> MetricResult<MetricSample> {
        let instances = self.lister.list_instances(function).await?;
        debug!(function = %function, instances = instances.len(), "listed instances");

        if instances.is_empty() {
            return Ok(MetricSample::empty());
        }

        let samples = join_all(
            instances
                .iter()
                .map(|instance| self.sampler.response_time(function, instance)),
        )
        .await;

        let sum: ResponseTime = samples
            .into_iter()
            .zip(&instances)
            .map(|(sample, instance)| {
                sample.unwrap_or_else(|e| {
                    warn!(
                        function = %function,
                        instance = %instance,
                        error = %e,
                        "instance sample failed, counting as zero"
                    );
                    ResponseTime::zero()
                })
            })
            .sum();

        let count = instances.len() as u64;
        Ok(MetricSample::new(ResponseTime::average(sum, count), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn f(name: &str) -> FunctionId {
        FunctionId::in_default(name)
    }

    struct FixedLister(HashMap<FunctionId, Vec<String>>);

    #[async_trait]
    impl InstanceLister for FixedLister {
        async fn list_instances(&self, function: &FunctionId) -> MetricResult<Vec<String>> {
            self.0.get(function).cloned().ok_or_else(|| MetricError::Listing {
                function: function.clone(),
                reason: "unknown function".to_string(),
            })
        }
    }

    struct FixedSampler(HashMap<String, u64>);

    #[async_trait]
    impl InstanceSampler for FixedSampler {
        async fn response_time(
            &self,
            function: &FunctionId,
            instance: &str,
        ) -> MetricResult<ResponseTime> {
            self.0
                .get(instance)
                .map(|&ms| ResponseTime::from_millis(ms))
                .ok_or_else(|| MetricError::Sampling {
                    function: function.clone(),
                    instance: instance.to_string(),
                    reason: "scrape failed".to_string(),
                })
        }
    }

    fn instance_source() -> InstanceMetricSource<FixedLister, FixedSampler> {
        let lister = FixedLister(HashMap::from([
            (f("api"), vec!["api-0".to_string(), "api-1".to_string(), "api-2".to_string()]),
            (f("idle"), Vec::new()),
            (f("flaky"), vec!["flaky-0".to_string(), "flaky-1".to_string()]),
        ]));
        let sampler = FixedSampler(HashMap::from([
            ("api-0".to_string(), 10),
            ("api-1".to_string(), 20),
            ("api-2".to_string(), 30),
            ("flaky-0".to_string(), 40),
        ]));
        InstanceMetricSource::new(lister, sampler)
    }

    #[tokio::test]
    async fn test_instance_source_averages() {
        let sample = instance_source().average_response_time(&f("api")).await.unwrap();
        assert_eq!(sample.average.as_millis(), 20);
        assert_eq!(sample.samples, 3);
    }

    #[tokio::test]
    async fn test_instance_source_no_instances() {
        let sample = instance_source().average_response_time(&f("idle")).await.unwrap();
        assert!(sample.is_empty());
        assert!(sample.average.is_zero());
    }

    #[tokio::test]
    async fn test_instance_source_failed_instance_counts_as_zero() {
        let sample = instance_source().average_response_time(&f("flaky")).await.unwrap();
        assert_eq!(sample.average.as_millis(), 20);
        assert_eq!(sample.samples, 2);
    }

    #[tokio::test]
    async fn test_instance_source_listing_error() {
        let result = instance_source().average_response_time(&f("missing")).await;
        assert!(matches!(result, Err(MetricError::Listing { .. })));
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticMetricSource::new()
            .with_average(f("a"), 12)
            .with_sample(f("b"), MetricSample::new(ResponseTime::from_millis(7), 9));

        let a = source.average_response_time(&f("a")).await.unwrap();
        assert_eq!(a, MetricSample::new(ResponseTime::from_millis(12), 1));

        let b = source.average_response_time(&f("b")).await.unwrap();
        assert_eq!(b.samples, 9);

        let unknown = source.average_response_time(&f("c")).await.unwrap();
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_static_source_from_json() {
        let json = r#"{
            "shop/cart": { "average": 15, "samples": 3 },
            "auth": { "average": 4 }
        }"#;
        let source = StaticMetricSource::from_json(json).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(
            source.samples[&FunctionId::new("shop", "cart")],
            MetricSample::new(ResponseTime::from_millis(15), 3)
        );
        // A bare average counts as one sample
        assert_eq!(source.samples[&f("auth")].samples, 1);
    }

    #[test]
    fn test_static_source_from_json_bad_key() {
        let json = r#"{ "a/b/c": { "average": 1 } }"#;
        assert!(StaticMetricSource::from_json(json).is_err());
    }
}
