//! Windowed performance metrics

use crate::{RingBuffer, TeResult};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::path::Path;
use std::time::Instant;

/// Default number of samples kept per metric
pub const DEFAULT_WINDOW: usize = 100;

/// Sliding-window tracker for throughput, latency, loss and utilization
#[derive(Debug)]
pub struct MetricsTracker {
    throughput_mbps: RingBuffer<f64>,
    latency_ms: RingBuffer<f64>,
    packet_loss_pct: RingBuffer<f64>,
    link_utilization_pct: RingBuffer<f64>,
    /// Seconds since start, one per throughput sample
    timestamps: RingBuffer<f64>,
    started: Instant,
    total_packets: u64,
    total_bytes: u64,
    dropped_packets: u64,
}

impl MetricsTracker {
    /// Create tracker keeping `window` samples per metric
    pub fn new(window: usize) -> TeResult<Self> {
        Ok(Self {
            throughput_mbps: RingBuffer::new(window)?,
            latency_ms: RingBuffer::new(window)?,
            packet_loss_pct: RingBuffer::new(window)?,
            link_utilization_pct: RingBuffer::new(window)?,
            timestamps: RingBuffer::new(window)?,
            started: Instant::now(),
            total_packets: 0,
            total_bytes: 0,
            dropped_packets: 0,
        })
    }

    /// Record throughput given in bytes per second
    pub fn record_throughput(&mut self, bytes_per_second: f64) {
        self.throughput_mbps.push(bytes_per_second * 8.0 / 1_000_000.0);
        self.timestamps.push(self.started.elapsed().as_secs_f64());
    }

    /// Record latency in milliseconds
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.latency_ms.push(latency_ms);
    }

    /// Record packet loss as a fraction in `[0, 1]`
    pub fn record_packet_loss(&mut self, loss_rate: f64) {
        self.packet_loss_pct.push(loss_rate * 100.0);
    }

    /// Record link utilization in percent
    pub fn record_link_utilization(&mut self, utilization: f64) {
        self.link_utilization_pct.push(utilization);
    }

    /// Account forwarded and dropped packets
    pub fn record_packets(&mut self, packets: u64, bytes: u64, dropped: u64) {
        self.total_packets += packets;
        self.total_bytes += bytes;
        self.dropped_packets += dropped;
    }

    /// Current window statistics
    pub fn statistics(&self) -> MetricsStatistics {
        MetricsStatistics {
            avg_throughput_mbps: window_mean(&self.throughput_mbps),
            avg_latency_ms: window_mean(&self.latency_ms),
            avg_packet_loss_pct: window_mean(&self.packet_loss_pct),
            avg_link_utilization_pct: window_mean(&self.link_utilization_pct),
            max_throughput_mbps: window_max(&self.throughput_mbps),
            max_latency_ms: window_max(&self.latency_ms),
            max_link_utilization_pct: window_max(&self.link_utilization_pct),
            total_packets: self.total_packets,
            total_bytes: self.total_bytes,
            dropped_packets: self.dropped_packets,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
        }
    }

    /// Export statistics and raw windows as JSON
    pub fn export(&self) -> MetricsExport {
        MetricsExport {
            statistics: self.statistics(),
            throughput: self.throughput_mbps.to_vec(),
            latency: self.latency_ms.to_vec(),
            packet_loss: self.packet_loss_pct.to_vec(),
            link_utilization: self.link_utilization_pct.to_vec(),
            timestamps: self.timestamps.to_vec(),
        }
    }

    /// Write [`MetricsTracker::export`] to a JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> TeResult<()> {
        let content = serde_json::to_string_pretty(&self.export())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Aggregated window statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsStatistics {
    /// Mean throughput in Mbps
    pub avg_throughput_mbps: f64,
    /// Mean latency in milliseconds
    pub avg_latency_ms: f64,
    /// Mean loss in percent
    pub avg_packet_loss_pct: f64,
    /// Mean link utilization in percent
    pub avg_link_utilization_pct: f64,
    /// Peak throughput in Mbps
    pub max_throughput_mbps: f64,
    /// Worst latency in milliseconds
    pub max_latency_ms: f64,
    /// Peak link utilization in percent
    pub max_link_utilization_pct: f64,
    /// Packets seen since start
    pub total_packets: u64,
    /// Bytes seen since start
    pub total_bytes: u64,
    /// Packets dropped since start
    pub dropped_packets: u64,
    /// Seconds since the tracker was created
    pub uptime_seconds: f64,
}

/// Serialized tracker contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsExport {
    /// Window aggregates
    pub statistics: MetricsStatistics,
    /// Throughput window, Mbps
    pub throughput: Vec<f64>,
    /// Latency window, ms
    pub latency: Vec<f64>,
    /// Loss window, percent
    pub packet_loss: Vec<f64>,
    /// Utilization window, percent
    pub link_utilization: Vec<f64>,
    /// Seconds since start per throughput sample
    pub timestamps: Vec<f64>,
}

fn window_mean(window: &RingBuffer<f64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().mean()
}

fn window_max(window: &RingBuffer<f64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker_reports_zero() {
        let tracker = MetricsTracker::new(DEFAULT_WINDOW).unwrap();
        let stats = tracker.statistics();
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.max_link_utilization_pct, 0.0);
        assert_eq!(stats.total_packets, 0);
    }

    #[test]
    fn test_unit_conversions() {
        let mut tracker = MetricsTracker::new(10).unwrap();
        tracker.record_throughput(1_250_000.0);
        tracker.record_packet_loss(0.02);

        let stats = tracker.statistics();
        assert!((stats.avg_throughput_mbps - 10.0).abs() < 1e-9);
        assert!((stats.avg_packet_loss_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_bounds_history() {
        let mut tracker = MetricsTracker::new(3).unwrap();
        for u in [10.0, 20.0, 30.0, 90.0] {
            tracker.record_link_utilization(u);
        }
        let stats = tracker.statistics();
        assert!((stats.avg_link_utilization_pct - 140.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.max_link_utilization_pct, 90.0);
        assert_eq!(tracker.export().link_utilization, vec![20.0, 30.0, 90.0]);
    }

    #[test]
    fn test_packet_totals() {
        let mut tracker = MetricsTracker::new(4).unwrap();
        tracker.record_packets(10, 1500, 1);
        tracker.record_packets(5, 500, 0);
        let stats = tracker.statistics();
        assert_eq!(stats.total_packets, 15);
        assert_eq!(stats.total_bytes, 2000);
        assert_eq!(stats.dropped_packets, 1);
    }
}
