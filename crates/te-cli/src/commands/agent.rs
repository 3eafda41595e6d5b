//! Agent commands

use super::{ensure_parent, read_json};
use crate::{output::OutputFormat, AgentCommands};
use anyhow::Context;
use serde::Serialize;
use statrs::statistics::Statistics;
use tabled::Tabled;
use te_agent::{DqnAgent, TrainingEnvironment};
use te_common::{NetworkStateSnapshot, TeConfig};
use te_controller::{shared_agent, RouteDecider};
use tracing::info;

#[derive(Debug, Serialize, Tabled)]
struct EpisodeRow {
    episode: usize,
    #[tabled(display_with = "fixed3")]
    reward: f64,
    steps: usize,
    #[tabled(display_with = "fixed3")]
    epsilon: f64,
    #[tabled(display_with = "optional3")]
    mean_loss: Option<f64>,
}

#[derive(Debug, Serialize)]
struct TrainingOutcome {
    episodes: usize,
    updates: u64,
    final_epsilon: f64,
    mean_reward_last_10: f64,
    evaluation_mean_reward: Option<f64>,
    checkpoint: String,
}

fn fixed3(value: &f64) -> String {
    format!("{value:.3}")
}

fn optional3(value: &Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".into())
}

/// Mean of the last `n` values (0 when empty)
fn recent_mean(values: &[f64], n: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(n)..];
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().mean()
    }
}

pub fn handle(action: AgentCommands, config: &TeConfig, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        AgentCommands::Train {
            episodes,
            eval_episodes,
            resume,
            output,
        } => {
            let mut agent = match &resume {
                Some(path) => DqnAgent::from_checkpoint(config.agent.clone(), path)
                    .with_context(|| format!("resuming from {}", path.display()))?,
                None => DqnAgent::new(config.agent.clone())?,
            };
            let mut env = TrainingEnvironment::new(config.environment.clone())?;
            let max_steps = config.environment.max_episode_steps;

            let mut rows = Vec::with_capacity(episodes);
            for episode in 1..=episodes {
                let summary = agent.train_episode(&mut env, max_steps)?;
                if episode % 10 == 0 {
                    info!(
                        episode,
                        avg_reward = recent_mean(agent.episode_rewards(), 10),
                        epsilon = agent.epsilon(),
                        "Training progress"
                    );
                }
                rows.push(EpisodeRow {
                    episode,
                    reward: summary.total_reward,
                    steps: summary.steps,
                    epsilon: summary.epsilon,
                    mean_loss: summary.mean_loss,
                });
            }

            let evaluation = if eval_episodes > 0 {
                Some(agent.evaluate(&mut env, eval_episodes)?.mean_reward)
            } else {
                None
            };

            ensure_parent(&output)?;
            agent.save(&output)?;

            if format.is_table() {
                format.print_rows(&rows)?;
            }
            format.print(&TrainingOutcome {
                episodes,
                updates: agent.update_count(),
                final_epsilon: agent.epsilon(),
                mean_reward_last_10: recent_mean(agent.episode_rewards(), 10),
                evaluation_mean_reward: evaluation,
                checkpoint: output.display().to_string(),
            })?;
        }
        AgentCommands::Evaluate {
            checkpoint,
            episodes,
        } => {
            let agent = DqnAgent::from_checkpoint(config.agent.clone(), &checkpoint)
                .with_context(|| format!("loading {}", checkpoint.display()))?;
            let mut env = TrainingEnvironment::new(config.environment.clone())?;
            let summary = agent.evaluate(&mut env, episodes)?;
            format.print(&summary)?;
        }
        AgentCommands::Decide {
            checkpoint,
            snapshot,
        } => {
            let agent = DqnAgent::from_checkpoint(config.agent.clone(), &checkpoint)
                .with_context(|| format!("loading {}", checkpoint.display()))?;
            let snapshot: NetworkStateSnapshot = read_json(&snapshot)?;
            let decider = RouteDecider::new(shared_agent(agent));
            format.print(&decider.decide(&snapshot))?;
        }
    }
    Ok(())
}
