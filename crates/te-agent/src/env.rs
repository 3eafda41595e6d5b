//! Environment contract and the offline training simulation

use crate::reward::environment_reward;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use te_common::{EnvironmentConfig, NetworkStateSnapshot, TeError, TeResult};
use tracing::trace;

/// Steps after which a simulated episode always ends
pub const EPISODE_STEP_LIMIT: usize = 100;

/// Utilization above which a simulated episode ends early
pub const CONGESTION_CUTOFF: f64 = 95.0;

/// Per-step decay applied to every link (flows completing)
const UTILIZATION_DECAY: f64 = 0.95;

/// Result of executing one action
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Network state after the action
    pub snapshot: NetworkStateSnapshot,
    /// Reward computed by the environment
    pub reward: f64,
    /// Whether the episode is over
    pub done: bool,
}

/// Anything the agent can be trained or evaluated against
///
/// Implemented by [`TrainingEnvironment`] and by live-network adapters
/// supplied by the controller integration.
pub trait Environment {
    /// Start a new episode and return its first state
    fn reset(&mut self) -> NetworkStateSnapshot;

    /// Route one flow over path `action`
    fn step(&mut self, action: usize) -> TeResult<StepOutcome>;
}

/// Simulated links with paths owning contiguous link ranges
#[derive(Debug, Clone)]
pub struct TrainingEnvironment {
    config: EnvironmentConfig,
    link_utilizations: Vec<f64>,
    flow_counts: Vec<f64>,
    queue_depths: Vec<f64>,
    step_count: usize,
    rng: StdRng,
}

impl TrainingEnvironment {
    /// Build and reset a simulation
    pub fn new(config: EnvironmentConfig) -> TeResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut env = Self {
            link_utilizations: vec![0.0; config.num_links],
            flow_counts: vec![0.0; config.num_paths],
            queue_depths: vec![0.0; config.num_links],
            step_count: 0,
            rng,
            config,
        };
        env.reset();
        Ok(env)
    }

    /// Links carrying path `action`
    pub fn path_links(&self, action: usize) -> Range<usize> {
        let per_path = self.config.num_links / self.config.num_paths;
        let start = (action * per_path).min(self.config.num_links);
        let end = (start + per_path).min(self.config.num_links);
        start..end
    }

    /// Current state without advancing
    pub fn snapshot(&self) -> NetworkStateSnapshot {
        NetworkStateSnapshot::from_links(
            self.link_utilizations.clone(),
            self.flow_counts.clone(),
            self.queue_depths.clone(),
        )
    }

    /// Current per-link utilization
    pub fn link_utilizations(&self) -> &[f64] {
        &self.link_utilizations
    }

    /// Flows routed per path this episode
    pub fn flow_counts(&self) -> &[f64] {
        &self.flow_counts
    }

    /// Steps taken this episode
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Simulation parameters
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }
}

impl Environment for TrainingEnvironment {
    fn reset(&mut self) -> NetworkStateSnapshot {
        for util in &mut self.link_utilizations {
            *util = self.rng.gen_range(20.0..40.0);
        }
        self.flow_counts.iter_mut().for_each(|c| *c = 0.0);
        self.queue_depths.iter_mut().for_each(|q| *q = 0.0);
        self.step_count = 0;
        self.snapshot()
    }

    fn step(&mut self, action: usize) -> TeResult<StepOutcome> {
        if action >= self.config.num_paths {
            return Err(TeError::InvalidInput(format!(
                "action {action} out of range for {} paths",
                self.config.num_paths
            )));
        }
        self.step_count += 1;

        let flow_size = self.rng.gen_range(1.0..5.0);
        for link in self.path_links(action) {
            self.link_utilizations[link] += flow_size;
        }
        self.flow_counts[action] += 1.0;

        for util in &mut self.link_utilizations {
            *util = (*util * UTILIZATION_DECAY).clamp(0.0, 100.0);
        }

        let reward = environment_reward(&self.link_utilizations);
        let snapshot = self.snapshot();
        let done = self.step_count >= EPISODE_STEP_LIMIT
            || snapshot.max_link_utilization > CONGESTION_CUTOFF;

        trace!(
            step = self.step_count,
            action,
            flow_size,
            reward,
            max_util = snapshot.max_link_utilization,
            "Simulated step"
        );

        Ok(StepOutcome {
            snapshot,
            reward,
            done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(seed: u64) -> TrainingEnvironment {
        TrainingEnvironment::new(EnvironmentConfig {
            num_links: 12,
            num_paths: 4,
            seed: Some(seed),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reset_ranges() {
        let mut env = env(1);
        let snapshot = env.reset();
        assert_eq!(snapshot.link_utilizations.len(), 12);
        assert!(snapshot
            .link_utilizations
            .iter()
            .all(|u| (20.0..40.0).contains(u)));
        assert_eq!(snapshot.flow_counts, vec![0.0; 4]);
        assert_eq!(snapshot.queue_depths, vec![0.0; 12]);
        assert_eq!(env.step_count(), 0);
    }

    #[test]
    fn test_step_locality() {
        let mut env = env(2);
        let before = env.reset().link_utilizations;
        let outcome = env.step(0).unwrap();
        let after = &outcome.snapshot.link_utilizations;

        let flow = after[0] / UTILIZATION_DECAY - before[0];
        assert!((1.0..5.0).contains(&flow), "flow = {flow}");
        for i in 0..3 {
            let expected = (before[i] + flow) * UTILIZATION_DECAY;
            assert!((after[i] - expected).abs() < 1e-9);
        }
        for i in 3..12 {
            assert!((after[i] - before[i] * UTILIZATION_DECAY).abs() < 1e-12);
        }
        assert_eq!(outcome.snapshot.flow_counts, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(outcome.reward, environment_reward(after));
        assert!(!outcome.done);
    }

    #[test]
    fn test_path_links() {
        let env = env(3);
        assert_eq!(env.path_links(0), 0..3);
        assert_eq!(env.path_links(3), 9..12);

        let uneven = TrainingEnvironment::new(EnvironmentConfig {
            num_links: 10,
            num_paths: 4,
            seed: Some(0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(uneven.path_links(3), 6..8);
    }

    #[test]
    fn test_invalid_action() {
        let mut env = env(4);
        assert!(matches!(env.step(4), Err(TeError::InvalidInput(_))));
        assert_eq!(env.step_count(), 0);
    }

    #[test]
    fn test_episode_terminates() {
        let mut env = env(5);
        env.reset();
        let mut steps = 0;
        loop {
            steps += 1;
            if env.step(steps % 4).unwrap().done {
                break;
            }
        }
        assert!(steps <= EPISODE_STEP_LIMIT);
    }

    #[test]
    fn test_utilization_stays_clipped() {
        let mut env = env(6);
        env.reset();
        for _ in 0..EPISODE_STEP_LIMIT {
            let outcome = env.step(1).unwrap();
            assert!(outcome
                .snapshot
                .link_utilizations
                .iter()
                .all(|u| (0.0..=100.0).contains(u)));
            if outcome.done {
                break;
            }
        }
    }
}
