//! opente CLI
//!
//! Offline training and inspection for the traffic-engineering engine.
//!
//! # Usage
//!
//! ```bash
//! opente config init --path opente.json
//! opente --config opente.json agent train --episodes 100
//! opente agent evaluate --checkpoint models/dqn_agent.safetensors
//! opente predictor train --samples 1000 --epochs 50
//! opente detect --checkpoint models/traffic_predictor.safetensors 70,72,75,78,80,82,84,85,87,88
//! opente run --ticks 30 --interval-ms 500
//! opente flows elephants -f flows.json --format json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "opente")]
#[command(version)]
#[command(about = "Adaptive traffic-engineering engine", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); defaults are used when omitted
    #[arg(long, short, env = "OPENTE_CONFIG")]
    config: Option<PathBuf>,

    /// Seed every RNG (overrides the configuration)
    #[arg(long, env = "OPENTE_SEED")]
    seed: Option<u64>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    format: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, evaluate and query the DQN agent
    Agent {
        #[command(subcommand)]
        action: AgentCommands,
    },
    /// Train and query the utilization forecaster
    Predictor {
        #[command(subcommand)]
        action: PredictorCommands,
    },
    /// Forecast five steps ahead and flag congestion
    Detect {
        /// Predictor checkpoint
        #[arg(long, default_value = "models/traffic_predictor.safetensors")]
        checkpoint: PathBuf,
        /// Utilization threshold (percent)
        #[arg(long, default_value_t = 80.0)]
        threshold: f64,
        /// Recent utilization samples, oldest first
        #[arg(value_delimiter = ',', required = true)]
        window: Vec<f64>,
    },
    /// Run the decision loop against the simulated network
    Run {
        /// Agent checkpoint (fresh agent when omitted)
        #[arg(long)]
        agent: Option<PathBuf>,
        /// Predictor checkpoint (no congestion checks when omitted)
        #[arg(long)]
        predictor: Option<PathBuf>,
        /// Tick budget
        #[arg(long, default_value_t = 20)]
        ticks: u64,
        /// Milliseconds between ticks
        #[arg(long, default_value_t = 10_000)]
        interval_ms: u64,
        /// Congestion threshold (percent)
        #[arg(long, default_value_t = 80.0)]
        threshold: f64,
    },
    /// Analyse flow counters
    Flows {
        #[command(subcommand)]
        action: FlowCommands,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Train on the simulated network and save a checkpoint
    Train {
        #[arg(long, default_value_t = 100)]
        episodes: usize,
        /// Greedy evaluation episodes after training
        #[arg(long, default_value_t = 10)]
        eval_episodes: usize,
        /// Continue from an existing checkpoint
        #[arg(long)]
        resume: Option<PathBuf>,
        #[arg(long, short, default_value = "models/dqn_agent.safetensors")]
        output: PathBuf,
    },
    /// Greedy evaluation of a checkpoint
    Evaluate {
        #[arg(long, default_value = "models/dqn_agent.safetensors")]
        checkpoint: PathBuf,
        #[arg(long, default_value_t = 10)]
        episodes: usize,
    },
    /// Route decision for a JSON snapshot
    Decide {
        #[arg(long, default_value = "models/dqn_agent.safetensors")]
        checkpoint: PathBuf,
        /// NetworkStateSnapshot JSON file
        #[arg(long, short)]
        snapshot: PathBuf,
    },
}

#[derive(Subcommand)]
enum PredictorCommands {
    /// Train on a JSON array of samples, or on synthetic traffic
    Train {
        /// JSON array of utilization samples
        #[arg(long, short)]
        input: Option<PathBuf>,
        /// Synthetic samples when no input is given
        #[arg(long, default_value_t = 1000)]
        samples: usize,
        /// Defaults to the configured epoch count
        #[arg(long)]
        epochs: Option<usize>,
        /// Share of samples used for training; the rest validates
        #[arg(long, default_value_t = 0.8)]
        train_ratio: f64,
        #[arg(long, short, default_value = "models/traffic_predictor.safetensors")]
        output: PathBuf,
    },
    /// Forecast the next steps after a window
    Forecast {
        #[arg(long, default_value = "models/traffic_predictor.safetensors")]
        checkpoint: PathBuf,
        #[arg(long, default_value_t = 5)]
        steps: usize,
        /// Recent utilization samples, oldest first
        #[arg(value_delimiter = ',', required = true)]
        window: Vec<f64>,
    },
}

#[derive(Subcommand)]
enum FlowCommands {
    /// Flows above a byte threshold, largest first
    Elephants {
        /// JSON array of flow counters
        #[arg(long, short)]
        file: PathBuf,
        #[arg(long, default_value_t = te_common::flow::ELEPHANT_FLOW_BYTES)]
        threshold: u64,
    },
    /// Totals and averages
    Metrics {
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Flows more than k standard deviations above the mean size
    Anomalies {
        #[arg(long, short)]
        file: PathBuf,
        #[arg(long, default_value_t = 3.0)]
        std_multiplier: f64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration
    Init {
        #[arg(long, default_value = "opente.json")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match commands::load_config(cli.config.as_deref(), cli.seed) {
        Ok(config) => match cli.command {
            Commands::Agent { action } => commands::agent::handle(action, &config, cli.format),
            Commands::Predictor { action } => {
                commands::predictor::handle(action, &config, cli.format)
            }
            Commands::Detect {
                checkpoint,
                threshold,
                window,
            } => commands::predictor::detect(&checkpoint, threshold, &window, &config, cli.format),
            Commands::Run {
                agent,
                predictor,
                ticks,
                interval_ms,
                threshold,
            } => {
                let options = commands::run::RunOptions {
                    agent,
                    predictor,
                    ticks,
                    interval_ms,
                    threshold,
                };
                commands::run::handle(options, &config, cli.format).await
            }
            Commands::Flows { action } => commands::flows::handle(action, cli.format),
            Commands::Config { action } => {
                commands::config::handle(action, &config, cli.format)
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
