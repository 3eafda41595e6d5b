//! Decision loop against the simulated network

use crate::output::OutputFormat;
use anyhow::Context;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use te_agent::DqnAgent;
use te_common::metrics::MetricsStatistics;
use te_common::TeConfig;
use te_controller::{
    shared_agent, DecisionLoop, DecisionLoopConfig, LoopStats, RouteDecider, SimulatedTelemetry,
};
use te_predictor::SequencePredictor;
use tokio::sync::watch;

pub struct RunOptions {
    pub agent: Option<PathBuf>,
    pub predictor: Option<PathBuf>,
    pub ticks: u64,
    pub interval_ms: u64,
    pub threshold: f64,
}

#[derive(Serialize)]
struct RunOutcome {
    stats: LoopStats,
    utilization: MetricsStatistics,
}

pub async fn handle(options: RunOptions, config: &TeConfig, format: OutputFormat) -> anyhow::Result<()> {
    let agent = match &options.agent {
        Some(path) => DqnAgent::from_checkpoint(config.agent.clone(), path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            tracing::warn!("No agent checkpoint given, routing with an untrained policy");
            DqnAgent::new(config.agent.clone())?
        }
    };

    let history_len = config.predictor.sequence_length;
    let loop_config = DecisionLoopConfig {
        interval: Duration::from_millis(options.interval_ms),
        congestion_threshold: options.threshold,
        history_len,
        max_ticks: Some(options.ticks),
    };
    let mut decision_loop = DecisionLoop::new(RouteDecider::new(shared_agent(agent)), loop_config)?;
    if let Some(path) = &options.predictor {
        let predictor = SequencePredictor::from_checkpoint(config.predictor.clone(), path)
            .with_context(|| format!("loading {}", path.display()))?;
        decision_loop = decision_loop.with_predictor(Arc::new(RwLock::new(predictor)));
    }

    let telemetry = SimulatedTelemetry::new(config.environment.clone(), history_len * 4)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, stopping");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would stop the loop
                tracing::warn!(error = %e, "Cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    });

    let stats = decision_loop.run(&telemetry, shutdown_rx).await;
    format.print(&RunOutcome {
        utilization: decision_loop.statistics(),
        stats,
    })
}
