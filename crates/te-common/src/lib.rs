//! opente Common - Shared types for the traffic-engineering engine
//!
//! This crate provides the pieces every other opente crate builds on:
//! - Error taxonomy and result alias
//! - Construction-time configuration
//! - The telemetry snapshot exchanged with the controller
//! - A fixed-capacity ring buffer
//! - Windowed metrics and flow-table analysis

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod ring;
pub mod snapshot;

pub use config::*;
pub use error::*;
pub use flow::{FlowMetrics, FlowStats};
pub use metrics::MetricsTracker;
pub use ring::RingBuffer;
pub use snapshot::NetworkStateSnapshot;
