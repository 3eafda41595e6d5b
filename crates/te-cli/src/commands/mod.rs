//! Command handlers

pub mod agent;
pub mod config;
pub mod flows;
pub mod predictor;
pub mod run;

use anyhow::Context;
use std::path::Path;
use te_common::TeConfig;

/// Load the configuration file (or defaults) and apply a global seed
pub fn load_config(path: Option<&Path>, seed: Option<u64>) -> anyhow::Result<TeConfig> {
    let mut config = match path {
        Some(path) => TeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => {
            tracing::debug!("No configuration file given, using defaults");
            TeConfig::default()
        }
    };

    if let Some(seed) = seed {
        config.agent.seed = Some(seed);
        config.predictor.seed = Some(seed.wrapping_add(1));
        config.environment.seed = Some(seed.wrapping_add(2));
    }
    config.validate()?;
    Ok(config)
}

/// Create the parent directory of an output file
pub fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Read a JSON document
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
