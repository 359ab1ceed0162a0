//! Loading graphs, metric tables and runtime config from disk.

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use depdag_graph::DependencyGraph;
use depdag_runtime::{RuntimeConfig, StaticMetricSource};
use std::path::Path;
use std::time::Duration;

fn read(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {what} {}", path.display()))
}

/// Load one graph document
pub fn load_graph(path: &Path) -> Result<DependencyGraph> {
    let json = read(path, "graph")?;
    DependencyGraph::from_json(&json).wrap_err_with(|| format!("invalid graph {}", path.display()))
}

/// Load a JSON array of graph documents
pub fn load_graphs(path: &Path) -> Result<Vec<DependencyGraph>> {
    let json = read(path, "graph list")?;
    serde_json::from_str(&json).wrap_err_with(|| format!("invalid graph list {}", path.display()))
}

/// Load a metric table keyed by `namespace/name`
pub fn load_metrics(path: &Path) -> Result<StaticMetricSource> {
    let json = read(path, "metrics")?;
    StaticMetricSource::from_json(&json).wrap_err_with(|| format!("invalid metrics {}", path.display()))
}

/// Load the runtime config, or the defaults, then apply the interval override
pub fn load_config(path: Option<&Path>, interval_ms: Option<u64>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(ms) = interval_ms {
        config = config.with_interval(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}
