//! Cinder daemon: entry point for running a simulated cinder cluster.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cinder_node::{init_logging, CinderNode, LogFormat, NodeConfig, ShutdownController};
use cinder_nullables::{LoopbackNetwork, NullChainStore, NullPendingStore};
use cinder_types::{Timestamp, Transaction};
use clap::Parser;
use rand::Rng;

#[derive(Parser)]
#[command(name = "cinder-daemon", about = "Cinder block-proposal node daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "CINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CINDER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CINDER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Data directory for snapshots.
    #[arg(long, env = "CINDER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run N nodes in this process over a loopback network.
    Simulate(SimulateArgs),

    /// Print the effective configuration as TOML.
    #[command(name = "print-config")]
    PrintConfig,
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// Number of nodes in the cluster.
    #[arg(long, default_value_t = 3)]
    nodes: usize,

    /// Random transactions fed into the cluster per second.
    #[arg(long, default_value_t = 50.0)]
    transactions_per_second: f64,

    /// Overrides `max_transactions_per_block` from the config.
    #[arg(long)]
    max_transactions_per_block: Option<usize>,

    /// How long to run before shutting down.
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.log_format = match format {
            LogFormat::Human => "human".to_string(),
            LogFormat::Json => "json".to_string(),
        };
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Command::Simulate(args) = &cli.command {
        if let Some(max) = args.max_transactions_per_block {
            config.max_transactions_per_block = max;
        }
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.parsed_log_format()?, &config.log_level);

    match cli.command {
        Command::PrintConfig => {
            print!("{}", config.to_toml_string());
            Ok(())
        }
        Command::Simulate(args) => simulate(config, args).await,
    }
}

async fn simulate(base: NodeConfig, args: SimulateArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.nodes >= 1, "--nodes must be at least 1");
    anyhow::ensure!(
        args.transactions_per_second > 0.0,
        "--transactions-per-second must be positive"
    );

    let network = LoopbackNetwork::new();
    let mut nodes: Vec<Arc<CinderNode>> = Vec::with_capacity(args.nodes);
    for index in 0..args.nodes {
        let mut config = base.clone();
        // A fixed id from the config file can only belong to the first node.
        if index > 0 {
            config.node_id = None;
        }
        let id = config.node_id();
        config.node_id = Some(id.as_uuid());

        let node = Arc::new(CinderNode::new(
            config,
            network.endpoint(id),
            Arc::new(NullPendingStore::new()),
            Arc::new(NullChainStore::new()),
        )?);
        network.attach(node.id(), node.dispatcher());
        nodes.push(node);
    }
    for node in &nodes {
        node.start()?;
    }
    tracing::info!(
        nodes = args.nodes,
        tps = args.transactions_per_second,
        max_transactions = base.max_transactions_per_block,
        duration_secs = args.duration_secs,
        "simulation started"
    );

    let shutdown = Arc::new(ShutdownController::new());
    let signals = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };
    let mut stop_rx = shutdown.subscribe();

    let mut feed = tokio::time::interval(Duration::from_secs_f64(
        1.0 / args.transactions_per_second,
    ));
    let deadline = tokio::time::sleep(Duration::from_secs(args.duration_secs));
    tokio::pin!(deadline);

    let mut submitted: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::info!("simulation time elapsed");
                break;
            }
            _ = stop_rx.recv() => break,
            _ = feed.tick() => {
                let (index, payload) = {
                    let mut rng = rand::thread_rng();
                    (rng.gen_range(0..nodes.len()), rng.gen::<[u8; 16]>().to_vec())
                };
                let tx = Transaction::new(Timestamp::now(), payload);
                match nodes[index].submit_transaction(tx) {
                    Ok(()) => submitted += 1,
                    Err(e) => tracing::warn!(node = %nodes[index].id(), error = %e, "submit failed"),
                }
            }
        }
    }
    shutdown.shutdown();
    signals.abort();

    let stopping = nodes.clone();
    tokio::task::spawn_blocking(move || {
        for node in &stopping {
            node.stop();
        }
    })
    .await
    .context("stopping nodes")?;
    network.shutdown();

    for node in &nodes {
        let metrics = node.metrics();
        tracing::info!(
            node = %node.id(),
            height = node.chain_height()?,
            started = metrics.proposals_started.get(),
            committed = metrics.proposals_committed.get(),
            cancelled = metrics.proposals_cancelled.get(),
            followed = metrics.follower_proposals.get(),
            "final node state"
        );
    }
    tracing::info!(
        submitted,
        delivered = network.delivered_count(),
        "cinder daemon exited cleanly"
    );
    Ok(())
}
