//! Engine configuration
//!
//! Every component takes its configuration by value at construction and
//! never mutates it afterwards. Defaults mirror the reference deployment
//! (4 paths, 12 links, 20-wide state vector).

use crate::{TeError, TeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeConfig {
    /// DQN load-balancing agent
    pub agent: AgentConfig,
    /// Utilization forecaster
    pub predictor: PredictorConfig,
    /// Offline training simulation
    pub environment: EnvironmentConfig,
}

impl TeConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> TeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> TeResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate all sections
    pub fn validate(&self) -> TeResult<()> {
        self.agent.validate()?;
        self.predictor.validate()?;
        self.environment.validate()?;
        if self.environment.num_paths != self.agent.action_size {
            return Err(TeError::Config(format!(
                "environment exposes {} paths but agent has {} actions",
                self.environment.num_paths, self.agent.action_size
            )));
        }
        Ok(())
    }
}

/// DQN agent hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Length of the encoded state vector
    pub state_size: usize,
    /// Number of discrete routing actions (paths)
    pub action_size: usize,
    /// Hidden layer widths of the Q network
    pub hidden_layers: Vec<usize>,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// Initial exploration rate
    pub epsilon_start: f64,
    /// Exploration floor
    pub epsilon_min: f64,
    /// Multiplicative decay applied after each executed update
    pub epsilon_decay: f64,
    /// Transitions per training update
    pub batch_size: usize,
    /// Replay buffer capacity
    pub buffer_capacity: usize,
    /// Executed updates between hard target syncs
    pub target_update_frequency: u64,
    /// Reward wiring for the episode trainer
    pub reward: RewardConfig,
    /// RNG seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_size: 20,
            action_size: 4,
            hidden_layers: vec![128, 64],
            learning_rate: 0.001,
            gamma: 0.95,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            batch_size: 64,
            buffer_capacity: 10_000,
            target_update_frequency: 10,
            reward: RewardConfig::default(),
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Check sizes and ranges
    pub fn validate(&self) -> TeResult<()> {
        positive("agent.state_size", self.state_size)?;
        positive("agent.action_size", self.action_size)?;
        positive("agent.batch_size", self.batch_size)?;
        positive("agent.buffer_capacity", self.buffer_capacity)?;
        if self.hidden_layers.is_empty() {
            return Err(TeError::Config("agent.hidden_layers must not be empty".into()));
        }
        if self.hidden_layers.iter().any(|&w| w == 0) {
            return Err(TeError::Config("agent.hidden_layers widths must be positive".into()));
        }
        if self.target_update_frequency == 0 {
            return Err(TeError::Config("agent.target_update_frequency must be positive".into()));
        }
        if self.batch_size > self.buffer_capacity {
            return Err(TeError::Config(format!(
                "agent.batch_size ({}) exceeds agent.buffer_capacity ({})",
                self.batch_size, self.buffer_capacity
            )));
        }
        learning_rate("agent.learning_rate", self.learning_rate)?;
        unit_interval("agent.gamma", self.gamma)?;
        unit_interval("agent.epsilon_start", self.epsilon_start)?;
        unit_interval("agent.epsilon_min", self.epsilon_min)?;
        unit_interval("agent.epsilon_decay", self.epsilon_decay)?;
        if self.epsilon_min > self.epsilon_start {
            return Err(TeError::Config(format!(
                "agent.epsilon_min ({}) exceeds agent.epsilon_start ({})",
                self.epsilon_min, self.epsilon_start
            )));
        }
        Ok(())
    }
}

/// Where the episode trainer takes its reward from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    /// Reward computed by the environment step
    #[default]
    Environment,
    /// Metric-weighted reward recomputed from the returned snapshot
    Weighted,
}

/// Reward wiring
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Active reward source
    pub source: RewardSource,
    /// Weights for [`RewardSource::Weighted`]
    pub weights: RewardWeights,
}

/// Penalty weights for the metric-weighted reward (expected negative)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    /// Weight on maximum link utilization
    pub max_utilization: f64,
    /// Weight on average delay
    pub avg_delay: f64,
    /// Weight on packet loss rate
    pub packet_loss: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            max_utilization: -1.0,
            avg_delay: -0.5,
            packet_loss: -2.0,
        }
    }
}

/// How the validation series is scaled during predictor training
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationScaling {
    /// Fit separate bounds on the validation series
    #[default]
    Independent,
    /// Reuse the bounds fit on the training series
    TrainingBounds,
}

/// Sequence predictor hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Input window length `L`
    pub sequence_length: usize,
    /// LSTM hidden width
    pub hidden_size: usize,
    /// Stacked LSTM layers
    pub num_layers: usize,
    /// Dropout between LSTM layers while training
    pub dropout: f64,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Persisted with the model; training is full-batch
    pub batch_size: usize,
    /// Default epoch count for `train`
    pub epochs: usize,
    /// Validation scaling policy
    pub validation_scaling: ValidationScaling,
    /// RNG seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            hidden_size: 64,
            num_layers: 2,
            dropout: 0.2,
            learning_rate: 0.001,
            batch_size: 32,
            epochs: 100,
            validation_scaling: ValidationScaling::default(),
            seed: None,
        }
    }
}

impl PredictorConfig {
    /// Check sizes and ranges
    pub fn validate(&self) -> TeResult<()> {
        positive("predictor.sequence_length", self.sequence_length)?;
        positive("predictor.hidden_size", self.hidden_size)?;
        positive("predictor.num_layers", self.num_layers)?;
        positive("predictor.batch_size", self.batch_size)?;
        learning_rate("predictor.learning_rate", self.learning_rate)?;
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TeError::Config(format!(
                "predictor.dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Offline training simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Simulated links
    pub num_links: usize,
    /// Candidate paths (must equal the agent's action count)
    pub num_paths: usize,
    /// Step budget per episode used by the trainer
    pub max_episode_steps: usize,
    /// RNG seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            num_links: 12,
            num_paths: 4,
            max_episode_steps: 100,
            seed: None,
        }
    }
}

impl EnvironmentConfig {
    /// Check sizes
    pub fn validate(&self) -> TeResult<()> {
        positive("environment.num_links", self.num_links)?;
        positive("environment.num_paths", self.num_paths)?;
        positive("environment.max_episode_steps", self.max_episode_steps)
    }
}

fn positive(name: &str, value: usize) -> TeResult<()> {
    if value == 0 {
        return Err(TeError::Config(format!("{name} must be positive")));
    }
    Ok(())
}

fn learning_rate(name: &str, value: f64) -> TeResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(TeError::Config(format!("{name} must be a positive number, got {value}")));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> TeResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(TeError::Config(format!("{name} must be in [0, 1], got {value}")));
    }
    Ok(())
}
