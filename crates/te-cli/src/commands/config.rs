//! Config commands

use crate::{output::OutputFormat, ConfigCommands};
use te_common::TeConfig;

pub fn handle(action: ConfigCommands, config: &TeConfig, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            super::ensure_parent(&path)?;
            TeConfig::default().save(&path)?;
            println!("Configuration initialized at {}", path.display());
        }
        ConfigCommands::Show => format.print(config)?,
    }
    Ok(())
}
