//! Flow analysis commands

use super::read_json;
use crate::{output::OutputFormat, FlowCommands};
use serde::Serialize;
use tabled::Tabled;
use te_common::flow::{compute_flow_metrics, detect_anomalies, identify_elephant_flows};
use te_common::FlowStats;

#[derive(Debug, Serialize, Tabled)]
struct FlowRow {
    byte_count: u64,
    packet_count: u64,
    #[tabled(display_with = "seconds")]
    duration_sec: f64,
}

impl From<FlowStats> for FlowRow {
    fn from(flow: FlowStats) -> Self {
        Self {
            byte_count: flow.byte_count,
            packet_count: flow.packet_count,
            duration_sec: flow.duration_sec,
        }
    }
}

fn seconds(value: &f64) -> String {
    format!("{value:.1}s")
}

pub fn handle(action: FlowCommands, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        FlowCommands::Elephants { file, threshold } => {
            let flows: Vec<FlowStats> = read_json(&file)?;
            let rows: Vec<FlowRow> = identify_elephant_flows(&flows, threshold)
                .into_iter()
                .map(FlowRow::from)
                .collect();
            format.print_rows(&rows)?;
        }
        FlowCommands::Metrics { file } => {
            let flows: Vec<FlowStats> = read_json(&file)?;
            format.print(&compute_flow_metrics(&flows))?;
        }
        FlowCommands::Anomalies {
            file,
            std_multiplier,
        } => {
            let flows: Vec<FlowStats> = read_json(&file)?;
            let rows: Vec<FlowRow> = detect_anomalies(&flows, std_multiplier)
                .into_iter()
                .map(FlowRow::from)
                .collect();
            format.print_rows(&rows)?;
        }
    }
    Ok(())
}
