//! depdag CLI
//!
//! Orders dependency graphs and aggregates their external response times,
//! either once or on a schedule until interrupted.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod input;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use depdag_graph::{OrderedGraph, Validator, leaf_layers};
use depdag_runtime::{AggregationEngine, GraphEvent, Reconciler};
use output::JsonLinesPublisher;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "depdag")]
#[command(about = "Dependency-graph response-time aggregation", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a graph's functions callees first
    Order {
        /// Path to the graph document
        #[arg(short, long)]
        graph: PathBuf,
        /// Print one line per layer instead of one per function
        #[arg(long)]
        layers: bool,
    },
    /// Compute one snapshot and print it
    Compute {
        /// Path to the graph document
        #[arg(short, long)]
        graph: PathBuf,
        /// Path to the metric table
        #[arg(short, long)]
        metrics: PathBuf,
    },
    /// Aggregate every graph periodically until Ctrl-C
    Run {
        /// Path to a JSON array of graph documents
        #[arg(short, long)]
        graphs: PathBuf,
        /// Path to the metric table
        #[arg(short, long)]
        metrics: PathBuf,
        /// Path to the runtime config
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the aggregation interval
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("depdag=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn order(graph: PathBuf, layers: bool) -> Result<()> {
    let graph = input::load_graph(&graph)?;
    let ordered = leaf_layers(&graph.nodes)?;

    for (depth, layer) in ordered.iter().enumerate() {
        if layers {
            let names: Vec<_> = layer.iter().map(ToString::to_string).collect();
            println!("{depth}: {}", names.join(" "));
        } else {
            for function in layer {
                println!("{function}");
            }
        }
    }
    Ok(())
}

async fn compute(graph: PathBuf, metrics: PathBuf) -> Result<()> {
    let graph = input::load_graph(&graph)?;
    let source = input::load_metrics(&metrics)?;

    Validator::new().validate(&graph).map_err(|errors| {
        let messages: Vec<_> = errors.iter().map(ToString::to_string).collect();
        eyre!("invalid graph {}: {}", graph.key, messages.join("; "))
    })?;
    let ordered = OrderedGraph::from_graph(&graph)?;

    let status = AggregationEngine::new().compute(&ordered, &source).await.into_status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run(
    graphs: PathBuf,
    metrics: PathBuf,
    config: Option<PathBuf>,
    interval_ms: Option<u64>,
) -> Result<()> {
    let config = input::load_config(config.as_deref(), interval_ms)?;
    let graphs = input::load_graphs(&graphs)?;
    let source = Arc::new(input::load_metrics(&metrics)?);
    let publisher = Arc::new(JsonLinesPublisher::stdout());

    info!(graphs = graphs.len(), interval_ms = config.interval_ms, "starting");

    let reconciler = Arc::new(Reconciler::new(config, source, publisher));
    let (events, rx) = reconciler.event_channel();
    let shutdown = CancellationToken::new();

    let driver = {
        let reconciler = Arc::clone(&reconciler);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reconciler.run(rx, shutdown).await })
    };

    for graph in graphs {
        events.send(GraphEvent::Applied(graph)).await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping");
    shutdown.cancel();
    drop(events);

    let handled = driver.await?;
    let snapshot = reconciler.monitor().snapshot();
    info!(
        handled,
        ticks_published = snapshot.ticks_published,
        ticks_skipped = snapshot.ticks_skipped,
        metric_failures = snapshot.metric_failures,
        publish_failures = snapshot.publish_failures,
        "stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Order { graph, layers } => order(graph, layers),
        Commands::Compute { graph, metrics } => compute(graph, metrics).await,
        Commands::Run {
            graphs,
            metrics,
            config,
            interval_ms,
        } => run(graphs, metrics, config, interval_ms).await,
    }
}
