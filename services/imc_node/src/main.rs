//! IMC node daemon
//!
//! - `run`: announce, heartbeat and track peers; optionally replay a log
//! - `index`: build an LSF side-file index and print per-type counts
//! - `merge`: merge every log under a directory into one time-ordered log

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use codec::{ImcCodec, MessageCodec};
use lsf::{IndexMode, LsfReader};
use messaging_actors::{node_builder, Actor, Context, Playback, PlaybackOptions};
use network::NodeKey;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node until interrupted
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,

        /// Replay this LSF log into the node
        #[arg(long)]
        playback: Option<PathBuf>,

        /// Playback speed, 0 for as fast as possible
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Skip logged messages before this unix time (discovery still replayed)
        #[arg(long)]
        start_time: Option<f64>,

        /// Stop once the playback log is exhausted
        #[arg(long)]
        stop_at_end: bool,
    },
    /// Build the index of a log and print message counts per type
    Index {
        log: PathBuf,
    },
    /// Merge every log below a directory into one time-ordered log
    Merge {
        root: PathBuf,
        output: PathBuf,
    },
}

/// Logs peer lifecycle; all protocol work is done by the built-in layers
#[derive(Debug, Default)]
struct NodeMonitor {
    connected: usize,
}

impl Actor for NodeMonitor {
    fn on_connect(&mut self, _ctx: &mut Context, node: &NodeKey) {
        self.connected += 1;
        info!(node = %node, connected = self.connected, "Peer connected");
    }

    fn on_disconnect(&mut self, _ctx: &mut Context, node: &NodeKey) {
        self.connected = self.connected.saturating_sub(1);
        info!(node = %node, connected = self.connected, "Peer disconnected");
    }

    fn on_first_heartbeat(&mut self, _ctx: &mut Context, node: &NodeKey) {
        info!(node = %node, "First heartbeat");
    }
}

/// Log replayed into a running node
struct PlaybackSource {
    log: PathBuf,
    options: PlaybackOptions,
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config_path: &Path, playback: Option<PlaybackSource>) -> Result<()> {
    let config = node_config::load_config(Some(config_path))
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing(&config.logging.level);
    info!(version = env!("CARGO_PKG_VERSION"), config = %config_path.display(), "Starting IMC node");

    let mut builder = node_builder(NodeMonitor::default(), &config)
        .await
        .context("assembling node")?;
    if let Some(args) = playback {
        let source = Playback::open(&args.log, args.options)
            .with_context(|| format!("opening playback log {}", args.log.display()))?;
        builder.listener(source.into_listener());
    }

    let mut scheduler = builder.build();
    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, stopping"),
            Err(error) => warn!(%error, "Unable to listen for Ctrl-C, stopping"),
        }
        stop.stop();
    });

    scheduler.run().await.context("running scheduler")?;
    info!(peers = scheduler.context().registry().len(), "Node stopped");
    Ok(())
}

fn index(log: &Path) -> Result<()> {
    init_tracing("info");
    let reader = LsfReader::open_with(log, IndexMode::Build)
        .with_context(|| format!("indexing {}", log.display()))?;
    let Some(index) = reader.index() else {
        anyhow::bail!("no index was built for {}", log.display());
    };

    println!("{} ({} records)", log.display(), index.record_count());
    for (type_id, count) in index.counts() {
        let name = ImcCodec.type_name(type_id).unwrap_or("Unknown");
        println!("{:>6} {:<16} {}", type_id, name, count);
    }
    Ok(())
}

fn merge(root: &Path, output: &Path) -> Result<()> {
    init_tracing("info");
    let report = lsf::merge(root, output)
        .with_context(|| format!("merging logs below {}", root.display()))?;

    for path in &report.truncated {
        warn!(path = %path.display(), "Input ended early, complete records kept");
    }
    info!(
        inputs = report.inputs.len(),
        records = report.records,
        output = %report.output.display(),
        "Merge complete"
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            config,
            playback,
            speed,
            start_time,
            stop_at_end,
        } => {
            let playback = playback.map(|log| PlaybackSource {
                log,
                options: PlaybackOptions {
                    speed,
                    start_time,
                    stop_at_end,
                    ..PlaybackOptions::default()
                },
            });
            run(&config, playback).await
        }
        Command::Index { log } => index(&log),
        Command::Merge { root, output } => merge(&root, &output),
    }
}
