//! Periodic congestion check and routing decision

use crate::decider::{RouteDecider, RouteDecision};
use crate::telemetry::TelemetrySource;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use te_common::metrics::MetricsStatistics;
use te_common::{MetricsTracker, TeResult};
use te_predictor::{CongestionDetector, CongestionReport, SequencePredictor};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Decision loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionLoopConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Utilization (percent) above which a forecast counts as congestion
    pub congestion_threshold: f64,
    /// Samples requested from telemetry for each forecast
    pub history_len: usize,
    /// Stop after this many ticks
    pub max_ticks: Option<u64>,
}

impl Default for DecisionLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            congestion_threshold: 80.0,
            history_len: 10,
            max_ticks: None,
        }
    }
}

/// A forecast that crossed the threshold
#[derive(Debug, Clone, Serialize)]
pub struct CongestionEvent {
    /// When the forecast was made
    pub timestamp: DateTime<Utc>,
    /// Forecast details
    pub report: CongestionReport,
}

/// What a loop run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    /// Ticks executed
    pub ticks: u64,
    /// Routing decisions issued
    pub decisions: u64,
    /// Decisions that used the default path
    pub fallbacks: u64,
    /// Forecasts that could not be made (untrained model, short history)
    pub skipped_forecasts: u64,
    /// Predicted congestion, oldest first
    pub congestion_events: Vec<CongestionEvent>,
    /// Last decision issued
    pub last_decision: Option<RouteDecision>,
}

/// Drives [`RouteDecider`] and the congestion forecaster on a timer
pub struct DecisionLoop {
    decider: RouteDecider,
    predictor: Option<Arc<RwLock<SequencePredictor>>>,
    detector: CongestionDetector,
    config: DecisionLoopConfig,
    metrics: Mutex<MetricsTracker>,
}

impl DecisionLoop {
    /// Loop without a forecaster (routing only)
    pub fn new(decider: RouteDecider, config: DecisionLoopConfig) -> TeResult<Self> {
        Ok(Self {
            decider,
            predictor: None,
            detector: CongestionDetector::new(config.congestion_threshold),
            config,
            metrics: Mutex::new(MetricsTracker::new(te_common::metrics::DEFAULT_WINDOW)?),
        })
    }

    /// Attach a trained forecaster
    pub fn with_predictor(mut self, predictor: Arc<RwLock<SequencePredictor>>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Utilization statistics over the observed snapshots
    pub fn statistics(&self) -> MetricsStatistics {
        self.metrics.lock().statistics()
    }

    /// Run until `shutdown` flips to `true`, its sender is dropped, or the
    /// tick budget is spent
    pub async fn run(
        &self,
        source: &dyn TelemetrySource,
        mut shutdown: watch::Receiver<bool>,
    ) -> LoopStats {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            threshold = self.config.congestion_threshold,
            "Decision loop started"
        );

        let mut stats = LoopStats::default();
        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            if let Some(max) = self.config.max_ticks {
                if stats.ticks >= max {
                    break;
                }
            }

            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.tick(source, &mut stats).await;
        }

        info!(
            ticks = stats.ticks,
            decisions = stats.decisions,
            fallbacks = stats.fallbacks,
            congestion_events = stats.congestion_events.len(),
            "Decision loop stopped"
        );
        stats
    }

    /// One iteration: forecast, decide, apply
    pub async fn tick(&self, source: &dyn TelemetrySource, stats: &mut LoopStats) {
        stats.ticks += 1;

        match self.forecast(source).await {
            Ok(Some(report)) if report.congestion_detected => {
                metrics::counter!("te_congestion_events_total").increment(1);
                stats.congestion_events.push(CongestionEvent {
                    timestamp: Utc::now(),
                    report,
                });
            }
            Ok(Some(_)) => {}
            Ok(None) => stats.skipped_forecasts += 1,
            Err(e) => {
                warn!(error = %e, "Congestion forecast failed");
                stats.skipped_forecasts += 1;
            }
        }

        let decision = match source.snapshot().await {
            Ok(snapshot) => {
                self.metrics
                    .lock()
                    .record_link_utilization(snapshot.max_link_utilization);
                self.decider.decide(&snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Telemetry snapshot unavailable");
                self.decider.fallback(&e)
            }
        };
        stats.decisions += 1;
        if decision.fallback {
            stats.fallbacks += 1;
        }
        stats.last_decision = Some(decision);

        if let Err(e) = source.apply_action(decision.action).await {
            warn!(action = decision.action, error = %e, "Failed to apply route");
        }
        debug!(tick = stats.ticks, action = decision.action, "Tick complete");
    }

    async fn forecast(&self, source: &dyn TelemetrySource) -> TeResult<Option<CongestionReport>> {
        let Some(predictor) = &self.predictor else {
            return Ok(None);
        };
        let history = source.utilization_history(self.config.history_len).await?;
        if history.len() < self.config.history_len {
            debug!(
                available = history.len(),
                required = self.config.history_len,
                "Not enough history for a forecast"
            );
            return Ok(None);
        }

        let predictor = predictor.read();
        if !predictor.is_trained() {
            return Ok(None);
        }
        self.detector.detect(&*predictor, &history).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::shared_agent;
    use crate::telemetry::SimulatedTelemetry;
    use te_agent::DqnAgent;
    use te_common::{AgentConfig, EnvironmentConfig, NetworkStateSnapshot, PredictorConfig, TeError};

    fn decider() -> RouteDecider {
        let agent = DqnAgent::new(AgentConfig {
            hidden_layers: vec![16],
            batch_size: 8,
            buffer_capacity: 64,
            seed: Some(1),
            ..Default::default()
        })
        .unwrap();
        RouteDecider::new(shared_agent(agent))
    }

    fn telemetry(history: usize) -> SimulatedTelemetry {
        SimulatedTelemetry::new(
            EnvironmentConfig {
                seed: Some(2),
                ..Default::default()
            },
            history,
        )
        .unwrap()
    }

    fn fast_config(ticks: u64) -> DecisionLoopConfig {
        DecisionLoopConfig {
            interval: Duration::from_millis(1),
            history_len: 10,
            max_ticks: Some(ticks),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_runs_tick_budget() {
        let decision_loop = DecisionLoop::new(decider(), fast_config(5)).unwrap();
        let telemetry = telemetry(32);
        let (_tx, rx) = watch::channel(false);

        let stats = decision_loop.run(&telemetry, rx).await;
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.decisions, 5);
        assert_eq!(stats.fallbacks, 0);
        assert_eq!(stats.skipped_forecasts, 5);
        assert_eq!(telemetry.utilization_history(100).await.unwrap().len(), 6);
        assert!(decision_loop.statistics().avg_link_utilization_pct > 0.0);
    }

    struct UnreachableTelemetry;

    #[async_trait::async_trait]
    impl TelemetrySource for UnreachableTelemetry {
        async fn utilization_history(&self, _len: usize) -> TeResult<Vec<f64>> {
            Err(TeError::InvalidInput("collector offline".into()))
        }

        async fn snapshot(&self) -> TeResult<NetworkStateSnapshot> {
            Err(TeError::InvalidInput("collector offline".into()))
        }
    }

    #[tokio::test]
    async fn test_missing_snapshot_routes_default_path() {
        let decision_loop = DecisionLoop::new(
            decider().with_default_action(2),
            fast_config(3),
        )
        .unwrap()
        .with_predictor(Arc::new(RwLock::new(
            SequencePredictor::new(PredictorConfig::default()).unwrap(),
        )));
        let (_tx, rx) = watch::channel(false);

        let stats = decision_loop.run(&UnreachableTelemetry, rx).await;
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.decisions, 3);
        assert_eq!(stats.fallbacks, 3);
        assert_eq!(stats.skipped_forecasts, 3);
        assert_eq!(
            stats.last_decision,
            Some(RouteDecision {
                action: 2,
                fallback: true
            })
        );

        let statistics = decision_loop.statistics();
        assert_eq!(statistics.avg_link_utilization_pct, 0.0);
        assert_eq!(statistics.max_link_utilization_pct, 0.0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_loop() {
        let decision_loop = DecisionLoop::new(
            decider(),
            DecisionLoopConfig {
                interval: Duration::from_millis(5),
                ..Default::default()
            },
        )
        .unwrap();
        let telemetry = telemetry(32);
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send(true).unwrap();
        });
        let stats = decision_loop.run(&telemetry, rx).await;
        stopper.await.unwrap();
        assert!(stats.ticks >= 1);
    }

    #[tokio::test]
    async fn test_congestion_events_counted() {
        let mut predictor = SequencePredictor::new(PredictorConfig {
            hidden_size: 16,
            num_layers: 1,
            dropout: 0.0,
            learning_rate: 0.01,
            seed: Some(3),
            ..Default::default()
        })
        .unwrap();
        let busy: Vec<f64> = (0..200).map(|i| 90.0 + 8.0 * (i as f64 * 0.3).sin()).collect();
        predictor.train(&busy, None, Some(100)).unwrap();

        let decision_loop = DecisionLoop::new(decider(), fast_config(1))
            .unwrap()
            .with_predictor(Arc::new(RwLock::new(predictor)));
        let telemetry = telemetry(32);
        for value in [70.0, 72.0, 75.0, 78.0, 80.0, 82.0, 84.0, 85.0, 87.0, 88.0] {
            telemetry.record_utilization(value);
        }

        let (_tx, rx) = watch::channel(false);
        let stats = decision_loop.run(&telemetry, rx).await;
        assert_eq!(stats.congestion_events.len(), 1);
        assert_eq!(stats.congestion_events[0].report.predictions.len(), 5);
        assert_eq!(stats.skipped_forecasts, 0);
    }
}
