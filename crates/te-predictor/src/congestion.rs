//! Threshold check over a short forecast

use serde::{Deserialize, Serialize};
use te_common::{TeError, TeResult};
use tracing::{debug, warn};

/// Forecast steps examined per check
pub const DEFAULT_HORIZON: usize = 5;

/// Default congestion threshold (percent utilization)
pub const DEFAULT_THRESHOLD: f64 = 80.0;

/// Multi-step forecaster the detector runs against
pub trait Forecaster {
    /// Autoregressive forecast of `steps` values following `window`
    fn predict_future(&self, window: &[f64], steps: usize) -> TeResult<Vec<f64>>;
}

/// Congestion verdict for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionReport {
    /// Whether any forecast value exceeds the threshold
    pub congestion_detected: bool,
    /// Largest forecast value
    pub max_predicted_utilization: f64,
    /// Forecast, one value per horizon step
    pub predictions: Vec<f64>,
    /// Last observed value (0 for an empty window)
    pub current_utilization: f64,
}

/// Flags windows whose forecast crosses a utilization threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionDetector {
    threshold: f64,
    horizon: usize,
}

impl CongestionDetector {
    /// Detector with the default horizon
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            horizon: DEFAULT_HORIZON,
        }
    }

    /// Override the horizon; at least one step is required
    pub fn with_horizon(mut self, horizon: usize) -> TeResult<Self> {
        if horizon == 0 {
            return Err(TeError::Config("congestion horizon must be positive".into()));
        }
        self.horizon = horizon;
        Ok(self)
    }

    /// Utilization threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Forecast steps examined
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Forecast `horizon` steps after `window` and compare against the threshold
    pub fn detect<F: Forecaster + ?Sized>(
        &self,
        forecaster: &F,
        window: &[f64],
    ) -> TeResult<CongestionReport> {
        let predictions = forecaster.predict_future(window, self.horizon)?;
        let congestion_detected = predictions.iter().any(|&p| p > self.threshold);
        let max_predicted_utilization = predictions
            .iter()
            .copied()
            .reduce(f64::max)
            .unwrap_or(0.0);
        let current_utilization = window.last().copied().unwrap_or(0.0);

        if congestion_detected {
            warn!(
                max_predicted = max_predicted_utilization,
                threshold = self.threshold,
                current = current_utilization,
                "Congestion predicted"
            );
        } else {
            debug!(max_predicted = max_predicted_utilization, "No congestion predicted");
        }

        Ok(CongestionReport {
            congestion_detected,
            max_predicted_utilization,
            predictions,
            current_utilization,
        })
    }
}

impl Default for CongestionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
