//! Flow statistics analysis
//!
//! Operates on per-flow counters reported by the switch-control layer; no
//! packet parsing happens here.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Default elephant-flow threshold (1 MB)
pub const ELEPHANT_FLOW_BYTES: u64 = 1_000_000;

/// Counters for a single installed flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowStats {
    /// Bytes matched
    pub byte_count: u64,
    /// Packets matched
    pub packet_count: u64,
    /// Flow lifetime in seconds
    pub duration_sec: f64,
}

/// Aggregate flow-table metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    /// Number of flows
    pub total_flows: usize,
    /// Bytes across all flows
    pub total_bytes: u64,
    /// Packets across all flows
    pub total_packets: u64,
    /// Mean bytes per flow
    pub avg_flow_size: f64,
    /// Mean flow lifetime in seconds
    pub avg_flow_duration: f64,
    /// Mean bytes per packet
    pub avg_packet_size: f64,
}

/// Flows at or above `threshold_bytes`, largest first
pub fn identify_elephant_flows(flows: &[FlowStats], threshold_bytes: u64) -> Vec<FlowStats> {
    let mut elephants: Vec<FlowStats> = flows
        .iter()
        .filter(|f| f.byte_count >= threshold_bytes)
        .cloned()
        .collect();
    elephants.sort_by(|a, b| b.byte_count.cmp(&a.byte_count));
    elephants
}

/// Totals and per-flow averages
pub fn compute_flow_metrics(flows: &[FlowStats]) -> FlowMetrics {
    if flows.is_empty() {
        return FlowMetrics::default();
    }

    let total_bytes: u64 = flows.iter().map(|f| f.byte_count).sum();
    let total_packets: u64 = flows.iter().map(|f| f.packet_count).sum();
    let total_duration: f64 = flows.iter().map(|f| f.duration_sec).sum();
    let n = flows.len() as f64;

    FlowMetrics {
        total_flows: flows.len(),
        total_bytes,
        total_packets,
        avg_flow_size: total_bytes as f64 / n,
        avg_flow_duration: total_duration / n,
        avg_packet_size: if total_packets > 0 {
            total_bytes as f64 / total_packets as f64
        } else {
            0.0
        },
    }
}

/// Flows whose byte count exceeds `mean + std_multiplier * std`
pub fn detect_anomalies(flows: &[FlowStats], std_multiplier: f64) -> Vec<FlowStats> {
    if flows.is_empty() {
        return Vec::new();
    }

    let bytes: Vec<f64> = flows.iter().map(|f| f.byte_count as f64).collect();
    let mean = bytes.iter().mean();
    let std = bytes.iter().population_std_dev();
    let threshold = mean + std_multiplier * std;

    flows
        .iter()
        .filter(|f| f.byte_count as f64 > threshold)
        .cloned()
        .collect()
}
