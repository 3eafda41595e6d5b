//! opente Controller - Integration layer
//!
//! Connects the learned components to a running network:
//! - [`RouteDecider`]: snapshot -> path, never failing into the forwarding path
//! - [`TelemetrySource`]: where live utilization and state come from
//! - [`TelemetryEnvironment`]: online training against a telemetry source
//! - [`DecisionLoop`]: periodic congestion check plus routing decision

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decider;
pub mod decision_loop;
pub mod telemetry;

pub use decider::{shared_agent, RouteDecider, RouteDecision, SharedAgent};
pub use decision_loop::{CongestionEvent, DecisionLoop, DecisionLoopConfig, LoopStats};
pub use telemetry::{SimulatedTelemetry, TelemetryEnvironment, TelemetrySource};
