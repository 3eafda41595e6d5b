//! Output formatting

use clap::ValueEnum;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print a single value; tables fall back to pretty JSON
    pub fn print<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Json | OutputFormat::Table => {
                println!("{}", serde_json::to_string_pretty(data)?);
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yaml::to_string(data)?);
            }
        }
        Ok(())
    }

    /// Print a list of rows
    pub fn print_rows<R: Tabled + Serialize>(&self, rows: &[R]) -> anyhow::Result<()> {
        match self {
            OutputFormat::Table => {
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
                Ok(())
            }
            _ => self.print(&rows),
        }
    }

    /// Whether human-readable decorations should be printed
    pub fn is_table(&self) -> bool {
        matches!(self, OutputFormat::Table)
    }
}
