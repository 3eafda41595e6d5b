//! Network state snapshot exchanged with the telemetry collaborator

use crate::{TeError, TeResult};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Point-in-time network metrics
///
/// Every field is optional on the wire and defaults to empty / zero, so a
/// partially populated snapshot (cold start) still decodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkStateSnapshot {
    /// Per-link utilization in percent
    pub link_utilizations: Vec<f64>,
    /// Per-path flow counters
    pub flow_counts: Vec<f64>,
    /// Per-link queue depths
    pub queue_depths: Vec<f64>,
    /// Maximum link utilization in percent
    pub max_link_utilization: f64,
    /// Average delay
    pub avg_delay: f64,
    /// Packet loss rate
    pub packet_loss_rate: f64,
}

impl NetworkStateSnapshot {
    /// Build a snapshot from raw link state, deriving the summary metrics
    ///
    /// Delay is modelled as a tenth of the mean utilization and loss starts
    /// once the hottest link passes 80%.
    pub fn from_links(
        link_utilizations: Vec<f64>,
        flow_counts: Vec<f64>,
        queue_depths: Vec<f64>,
    ) -> Self {
        let max = link_utilizations
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let (max_link_utilization, avg_delay) = if link_utilizations.is_empty() {
            (0.0, 0.0)
        } else {
            (max, link_utilizations.iter().mean() * 0.1)
        };

        Self {
            link_utilizations,
            flow_counts,
            queue_depths,
            max_link_utilization,
            avg_delay,
            packet_loss_rate: ((max_link_utilization - 80.0) / 20.0).max(0.0),
        }
    }

    /// Decode and validate a JSON snapshot
    pub fn from_json(json: &str) -> TeResult<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Reject non-finite values before they reach the encoder
    pub fn validate(&self) -> TeResult<()> {
        let series = [
            ("link_utilizations", &self.link_utilizations),
            ("flow_counts", &self.flow_counts),
            ("queue_depths", &self.queue_depths),
        ];
        for (name, values) in series {
            if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
                return Err(TeError::InvalidInput(format!("{name}[{idx}] is not finite")));
            }
        }

        let scalars = [
            ("max_link_utilization", self.max_link_utilization),
            ("avg_delay", self.avg_delay),
            ("packet_loss_rate", self.packet_loss_rate),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(TeError::InvalidInput(format!("{name} is not finite")));
            }
        }
        Ok(())
    }
}
