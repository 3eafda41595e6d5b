//! Deep Q-network agent
//!
//! Owns the replay memory, the policy network and its frozen target copy.
//! One [`DqnAgent::train_step`] is a single Adam update on a uniformly
//! sampled minibatch against the target network's bootstrapped values.

use crate::env::Environment;
use crate::replay::{ReplayBuffer, Transition};
use crate::reward::weighted_reward;
use crate::state::StateVectorBuilder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::path::Path;
use te_common::{AgentConfig, NetworkStateSnapshot, RewardSource, TeError, TeResult};
use te_nn::{
    copy_parameters, Adam, AdamParams, BundleKind, Device, ParamSet, QNetwork, Tensor,
    TensorBundle,
};
use tracing::{debug, info};

/// Global gradient-norm ceiling for every update
pub const MAX_GRAD_NORM: f64 = 1.0;

/// Evaluation episodes are cut off here if the environment never signals done
const MAX_EVALUATION_STEPS: usize = 10_000;

/// Outcome of one training episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    /// Sum of rewards fed to the learner
    pub total_reward: f64,
    /// Environment steps taken
    pub steps: usize,
    /// Training updates that actually ran
    pub updates: usize,
    /// Mean loss over those updates
    pub mean_loss: Option<f64>,
    /// Exploration rate at the end of the episode
    pub epsilon: f64,
}

/// Outcome of greedy evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    /// Per-episode total reward
    pub rewards: Vec<f64>,
    /// Mean of `rewards`
    pub mean_reward: f64,
}

/// Epsilon-greedy DQN agent with experience replay and a target network
#[derive(Debug)]
pub struct DqnAgent {
    config: AgentConfig,
    encoder: StateVectorBuilder,
    policy: QNetwork,
    target: QNetwork,
    optimizer: Adam,
    memory: ReplayBuffer,
    epsilon: f64,
    update_count: u64,
    episode_rewards: Vec<f64>,
    losses: Vec<f64>,
    rng: StdRng,
    device: Device,
}

impl DqnAgent {
    /// Create an agent with freshly initialised networks
    pub fn new(config: AgentConfig) -> TeResult<Self> {
        config.validate()?;
        let device = te_nn::device();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let policy = QNetwork::new(
            config.state_size,
            &config.hidden_layers,
            config.action_size,
            &mut rng,
            &device,
        )?;
        let target = QNetwork::new(
            config.state_size,
            &config.hidden_layers,
            config.action_size,
            &mut rng,
            &device,
        )?;
        copy_parameters(&target, &policy)?;

        let optimizer = Adam::new(policy.vars(), AdamParams::with_lr(config.learning_rate))?;
        let memory = ReplayBuffer::new(config.buffer_capacity)?;

        info!(
            state_size = config.state_size,
            action_size = config.action_size,
            hidden = ?config.hidden_layers,
            parameters = policy.num_parameters(),
            "DQN agent initialized"
        );

        Ok(Self {
            encoder: StateVectorBuilder::new(config.state_size),
            epsilon: config.epsilon_start,
            config,
            policy,
            target,
            optimizer,
            memory,
            update_count: 0,
            episode_rewards: Vec::new(),
            losses: Vec::new(),
            rng,
            device,
        })
    }

    /// Create an agent and restore it from a checkpoint
    pub fn from_checkpoint(config: AgentConfig, path: impl AsRef<Path>) -> TeResult<Self> {
        let mut agent = Self::new(config)?;
        agent.load(path)?;
        Ok(agent)
    }

    /// Encode a snapshot into this agent's state layout
    pub fn state_vector(&self, snapshot: &NetworkStateSnapshot) -> Vec<f64> {
        self.encoder.build(snapshot)
    }

    /// Policy network action values for one state
    pub fn q_values(&self, state: &[f64]) -> TeResult<Vec<f64>> {
        self.policy.q_values(state)
    }

    /// Epsilon-greedy when `training`, greedy otherwise
    pub fn select_action(&mut self, state: &[f64], training: bool) -> TeResult<usize> {
        if training && self.rng.gen::<f64>() < self.epsilon {
            return Ok(self.rng.gen_range(0..self.config.action_size));
        }
        self.greedy_action(state)
    }

    /// `argmax_a Q(state, a)`, ties broken towards the lowest index
    pub fn greedy_action(&self, state: &[f64]) -> TeResult<usize> {
        let q = self.q_values(state)?;
        let mut best = 0;
        for (action, value) in q.iter().enumerate().skip(1) {
            if *value > q[best] {
                best = action;
            }
        }
        Ok(best)
    }

    /// Record a transition in replay memory
    pub fn store_experience(
        &mut self,
        state: Vec<f64>,
        action: usize,
        reward: f64,
        next_state: Vec<f64>,
        terminal: bool,
    ) -> TeResult<()> {
        if action >= self.config.action_size {
            return Err(TeError::InvalidInput(format!(
                "action {action} out of range for {} actions",
                self.config.action_size
            )));
        }
        for (name, vector) in [("state", &state), ("next_state", &next_state)] {
            if vector.len() != self.config.state_size {
                return Err(TeError::InvalidInput(format!(
                    "{name} has {} values, expected {}",
                    vector.len(),
                    self.config.state_size
                )));
            }
        }
        self.memory.push(Transition {
            state,
            action,
            reward,
            next_state,
            terminal,
        });
        Ok(())
    }

    /// One minibatch update.
    ///
    /// Returns `Ok(None)` without touching anything while memory holds
    /// fewer than `batch_size` transitions.
    pub fn train_step(&mut self) -> TeResult<Option<f64>> {
        let batch = match self.memory.sample(self.config.batch_size, &mut self.rng) {
            Ok(batch) => batch,
            Err(e) if e.is_insufficient_data() => return Ok(None),
            Err(e) => return Err(e),
        };

        let n = batch.len();
        let states = self.policy.batch(batch.iter().map(|t| t.state.as_slice()))?;
        let next_states = self.target.batch(batch.iter().map(|t| t.next_state.as_slice()))?;
        let actions: Vec<u32> = batch.iter().map(|t| t.action as u32).collect();
        let rewards: Vec<f64> = batch.iter().map(|t| t.reward).collect();
        let continues: Vec<f64> = batch
            .iter()
            .map(|t| if t.terminal { 0.0 } else { 1.0 })
            .collect();

        let actions = Tensor::from_vec(actions, (n, 1), &self.device)?;
        let rewards = Tensor::from_vec(rewards, n, &self.device)?;
        let continues = Tensor::from_vec(continues, n, &self.device)?;

        let current_q = self.policy.forward(&states)?.gather(&actions, 1)?.squeeze(1)?;
        let next_q = self.target.forward(&next_states)?.max(1)?.detach();
        let target_q = rewards.add(&next_q.mul(&continues)?.affine(self.config.gamma, 0.0)?)?;

        let loss = candle_nn::loss::mse(&current_q, &target_q)?;
        let loss_value = loss.to_scalar::<f64>()?;
        let grad_norm = self.optimizer.backward_step(&loss, Some(MAX_GRAD_NORM))?;

        self.update_count += 1;
        if self.update_count % self.config.target_update_frequency == 0 {
            copy_parameters(&self.target, &self.policy)?;
            info!(update = self.update_count, "Target network synchronized");
        }
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        self.losses.push(loss_value);

        debug!(
            update = self.update_count,
            loss = loss_value,
            grad_norm,
            epsilon = self.epsilon,
            "Training step"
        );
        metrics::counter!("te_agent_updates_total").increment(1);
        metrics::gauge!("te_agent_loss").set(loss_value);
        metrics::gauge!("te_agent_epsilon").set(self.epsilon);

        Ok(Some(loss_value))
    }

    /// Metric-weighted reward for a snapshot (`action` does not enter the score)
    pub fn compute_reward(&self, snapshot: &NetworkStateSnapshot, _action: usize) -> f64 {
        weighted_reward(snapshot, &self.config.reward.weights)
    }

    /// Run one exploring episode, learning after every step
    pub fn train_episode<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        max_steps: usize,
    ) -> TeResult<EpisodeSummary> {
        let mut state = self.state_vector(&env.reset());
        let mut total_reward = 0.0;
        let mut steps = 0;
        let mut episode_losses = Vec::new();

        while steps < max_steps {
            let action = self.select_action(&state, true)?;
            let outcome = env.step(action)?;
            let reward = match self.config.reward.source {
                RewardSource::Environment => outcome.reward,
                RewardSource::Weighted => self.compute_reward(&outcome.snapshot, action),
            };
            let next_state = self.state_vector(&outcome.snapshot);

            self.store_experience(state, action, reward, next_state.clone(), outcome.done)?;
            if let Some(loss) = self.train_step()? {
                episode_losses.push(loss);
            }

            total_reward += reward;
            state = next_state;
            steps += 1;
            if outcome.done {
                break;
            }
        }

        self.episode_rewards.push(total_reward);
        let summary = EpisodeSummary {
            total_reward,
            steps,
            updates: episode_losses.len(),
            mean_loss: (!episode_losses.is_empty()).then(|| episode_losses.iter().mean()),
            epsilon: self.epsilon,
        };
        info!(
            episode = self.episode_rewards.len(),
            reward = total_reward,
            steps,
            epsilon = self.epsilon,
            "Episode finished"
        );
        Ok(summary)
    }

    /// Greedy rollouts, no learning and no memory writes
    pub fn evaluate<E: Environment + ?Sized>(
        &self,
        env: &mut E,
        episodes: usize,
    ) -> TeResult<EvaluationSummary> {
        if episodes == 0 {
            return Err(TeError::InvalidInput("evaluation needs at least one episode".into()));
        }

        let mut rewards = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            let mut state = self.state_vector(&env.reset());
            let mut total = 0.0;
            for _ in 0..MAX_EVALUATION_STEPS {
                let outcome = env.step(self.greedy_action(&state)?)?;
                total += outcome.reward;
                state = self.state_vector(&outcome.snapshot);
                if outcome.done {
                    break;
                }
            }
            rewards.push(total);
        }

        let mean_reward = rewards.iter().mean();
        info!(episodes, mean_reward, "Evaluation finished");
        Ok(EvaluationSummary { rewards, mean_reward })
    }

    /// Write networks, optimizer state, epsilon and history
    pub fn save(&self, path: impl AsRef<Path>) -> TeResult<()> {
        let mut bundle = TensorBundle::new(BundleKind::Agent, &self.device)?;
        for (prefix, net) in [("policy", &self.policy), ("target", &self.target)] {
            for (name, var) in net.named_vars() {
                bundle.insert(format!("{prefix}.{name}"), var.as_tensor().copy()?);
            }
        }
        self.optimizer.export(&mut bundle, "optim")?;
        bundle.insert_scalar("meta.epsilon", self.epsilon)?;
        bundle.insert_scalar("meta.update_count", self.update_count as f64)?;
        bundle.insert_series("history.episode_rewards", &self.episode_rewards)?;
        bundle.insert_series("history.losses", &self.losses)?;
        bundle.save(path.as_ref())?;

        info!(path = %path.as_ref().display(), updates = self.update_count, "Agent saved");
        Ok(())
    }

    /// Restore a checkpoint written by [`DqnAgent::save`].
    ///
    /// Shapes must match this agent's configuration; on error the agent is
    /// left as it was.
    pub fn load(&mut self, path: impl AsRef<Path>) -> TeResult<()> {
        let mut bundle = TensorBundle::load(path.as_ref(), BundleKind::Agent, &self.device)?;

        let mut restored = Vec::new();
        for (prefix, net) in [("policy", &self.policy), ("target", &self.target)] {
            for (name, var) in net.named_vars() {
                let tensor = bundle.take(&format!("{prefix}.{name}"), var.as_tensor().dims())?;
                restored.push((var, tensor));
            }
        }
        let epsilon = bundle.scalar("meta.epsilon")?;
        if !(self.config.epsilon_min..=self.config.epsilon_start).contains(&epsilon) {
            return Err(TeError::Persistence(format!(
                "stored epsilon {epsilon} outside [{}, {}]",
                self.config.epsilon_min, self.config.epsilon_start
            )));
        }
        let update_count = bundle.scalar("meta.update_count")?;
        let episode_rewards = bundle.series("history.episode_rewards")?;
        let losses = bundle.series("history.losses")?;
        self.optimizer.import(&mut bundle, "optim")?;

        for (var, tensor) in restored {
            var.set(&tensor)?;
        }
        self.epsilon = epsilon;
        self.update_count = update_count as u64;
        self.episode_rewards = episode_rewards;
        self.losses = losses;

        info!(path = %path.as_ref().display(), updates = self.update_count, "Agent loaded");
        Ok(())
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Executed training updates
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Loss of every executed update
    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    /// Total reward of every finished training episode
    pub fn episode_rewards(&self) -> &[f64] {
        &self.episode_rewards
    }

    /// Buffered transitions
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Trained network
    pub fn policy(&self) -> &QNetwork {
        &self.policy
    }

    /// Frozen bootstrap network
    pub fn target(&self) -> &QNetwork {
        &self.target
    }

    /// Construction-time configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::TrainingEnvironment;
    use te_common::{EnvironmentConfig, RewardConfig};

    fn small_config(seed: u64) -> AgentConfig {
        AgentConfig {
            state_size: 6,
            action_size: 3,
            hidden_layers: vec![8],
            batch_size: 4,
            buffer_capacity: 64,
            target_update_frequency: 3,
            seed: Some(seed),
            ..Default::default()
        }
    }

    fn fill(agent: &mut DqnAgent, count: usize) {
        for i in 0..count {
            let x = i as f64 * 0.1;
            agent
                .store_experience(
                    vec![x, 1.0 - x, 0.5, x * x, 0.0, 1.0],
                    i % 3,
                    if i % 2 == 0 { 1.0 } else { -0.5 },
                    vec![x + 0.1, 0.9 - x, 0.5, x, 1.0, 0.0],
                    i % 5 == 4,
                )
                .unwrap();
        }
    }

    fn probes() -> Vec<Vec<f64>> {
        (0..8)
            .map(|i| {
                let x = i as f64 / 8.0;
                vec![x, -x, 1.0 - x, x * 2.0, 0.3, -0.7]
            })
            .collect()
    }

    #[test]
    fn test_train_step_without_enough_data() {
        let mut agent = DqnAgent::new(small_config(0)).unwrap();
        fill(&mut agent, 3);
        assert_eq!(agent.train_step().unwrap(), None);
        assert_eq!(agent.update_count(), 0);
        assert_eq!(agent.epsilon(), 1.0);
        assert!(agent.losses().is_empty());
    }

    #[test]
    fn test_epsilon_monotone_and_floored() {
        let mut config = small_config(1);
        config.epsilon_decay = 0.5;
        config.epsilon_min = 0.1;
        let mut agent = DqnAgent::new(config).unwrap();
        fill(&mut agent, 16);

        let mut previous = agent.epsilon();
        for _ in 0..10 {
            assert!(agent.train_step().unwrap().is_some());
            assert!(agent.epsilon() <= previous);
            assert!(agent.epsilon() >= 0.1);
            previous = agent.epsilon();
        }
        assert_eq!(agent.epsilon(), 0.1);
        assert_eq!(agent.losses().len(), 10);
    }

    #[test]
    fn test_target_sync_schedule() {
        let mut agent = DqnAgent::new(small_config(2)).unwrap();
        fill(&mut agent, 20);
        let initial = agent.target().flat_parameters().unwrap();
        assert_eq!(initial, agent.policy().flat_parameters().unwrap());

        agent.train_step().unwrap();
        agent.train_step().unwrap();
        assert_eq!(agent.target().flat_parameters().unwrap(), initial);
        assert_ne!(agent.policy().flat_parameters().unwrap(), initial);

        agent.train_step().unwrap();
        let synced = agent.target().flat_parameters().unwrap();
        assert_eq!(synced, agent.policy().flat_parameters().unwrap());

        agent.train_step().unwrap();
        assert_eq!(agent.target().flat_parameters().unwrap(), synced);
    }

    #[test]
    fn test_bootstrap_values_carry_no_gradient() {
        let agent = DqnAgent::new(small_config(7)).unwrap();
        let states = agent
            .target()
            .batch(probes().iter().map(|p| p.as_slice()))
            .unwrap();
        let next_q = agent.target().forward(&states).unwrap().max(1).unwrap().detach();
        let grads = next_q.sum_all().unwrap().backward().unwrap();
        for var in agent.target().vars() {
            assert!(grads.get(var.as_tensor()).is_none());
        }
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let mut agent = DqnAgent::new(small_config(3)).unwrap();
        for state in probes() {
            let first = agent.select_action(&state, false).unwrap();
            for _ in 0..5 {
                assert_eq!(agent.select_action(&state, false).unwrap(), first);
            }
            let q = agent.q_values(&state).unwrap();
            assert!(q.iter().all(|v| *v <= q[first]));
        }
    }

    #[test]
    fn test_full_exploration_is_uniform() {
        let mut agent = DqnAgent::new(small_config(4)).unwrap();
        assert_eq!(agent.epsilon(), 1.0);
        let state = probes().remove(0);
        let mut counts = [0usize; 3];
        let draws = 3000;
        for _ in 0..draws {
            counts[agent.select_action(&state, true).unwrap()] += 1;
        }
        for count in counts {
            let share = count as f64 / draws as f64;
            assert!((share - 1.0 / 3.0).abs() < 0.05, "counts = {counts:?}");
        }
    }

    #[test]
    fn test_store_experience_validates() {
        let mut agent = DqnAgent::new(small_config(5)).unwrap();
        assert!(agent
            .store_experience(vec![0.0; 6], 3, 0.0, vec![0.0; 6], false)
            .is_err());
        assert!(agent
            .store_experience(vec![0.0; 5], 0, 0.0, vec![0.0; 6], false)
            .is_err());
        assert_eq!(agent.memory_len(), 0);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.safetensors");

        let mut agent = DqnAgent::new(small_config(6)).unwrap();
        fill(&mut agent, 20);
        for _ in 0..5 {
            agent.train_step().unwrap();
        }
        agent.save(&path).unwrap();

        let restored = DqnAgent::from_checkpoint(small_config(99), &path).unwrap();
        for state in probes() {
            assert_eq!(
                agent.greedy_action(&state).unwrap(),
                restored.greedy_action(&state).unwrap()
            );
            assert_eq!(agent.q_values(&state).unwrap(), restored.q_values(&state).unwrap());
        }
        assert_eq!(restored.epsilon(), agent.epsilon());
        assert_eq!(restored.update_count(), 5);
        assert_eq!(restored.losses(), agent.losses());
        assert_eq!(
            restored.target().flat_parameters().unwrap(),
            agent.target().flat_parameters().unwrap()
        );
    }

    #[test]
    fn test_load_rejects_other_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.safetensors");
        DqnAgent::new(small_config(7)).unwrap().save(&path).unwrap();

        let mut other = small_config(7);
        other.hidden_layers = vec![16];
        let mut agent = DqnAgent::new(other).unwrap();
        let before = agent.policy().flat_parameters().unwrap();
        assert!(matches!(agent.load(&path), Err(TeError::Persistence(_))));
        assert_eq!(agent.policy().flat_parameters().unwrap(), before);
    }

    #[test]
    fn test_train_and_evaluate_episodes() {
        let config = AgentConfig {
            state_size: 12,
            action_size: 4,
            hidden_layers: vec![16],
            batch_size: 8,
            buffer_capacity: 256,
            seed: Some(8),
            ..Default::default()
        };
        let mut agent = DqnAgent::new(config).unwrap();
        let mut env = TrainingEnvironment::new(EnvironmentConfig {
            seed: Some(8),
            ..Default::default()
        })
        .unwrap();

        let first = agent.train_episode(&mut env, 30).unwrap();
        let second = agent.train_episode(&mut env, 30).unwrap();
        assert!(first.steps <= 30 && second.steps <= 30);
        assert_eq!(agent.episode_rewards(), &[first.total_reward, second.total_reward]);
        assert!(!agent.losses().is_empty());
        assert!(agent.epsilon() < 1.0);

        let updates = agent.update_count();
        let eval = agent.evaluate(&mut env, 3).unwrap();
        assert_eq!(eval.rewards.len(), 3);
        assert!(eval.mean_reward.is_finite());
        assert_eq!(agent.update_count(), updates);
        assert!(agent.evaluate(&mut env, 0).is_err());
    }

    #[test]
    fn test_weighted_reward_source() {
        let config = AgentConfig {
            state_size: 12,
            action_size: 4,
            hidden_layers: vec![8],
            batch_size: 4,
            buffer_capacity: 64,
            reward: RewardConfig {
                source: RewardSource::Weighted,
                ..Default::default()
            },
            seed: Some(9),
            ..Default::default()
        };
        let mut agent = DqnAgent::new(config).unwrap();
        let mut env = TrainingEnvironment::new(EnvironmentConfig {
            seed: Some(9),
            ..Default::default()
        })
        .unwrap();

        // Low-load steps score +1 bonus minus the weighted max utilization,
        // far below the environment's own reward scale
        let summary = agent.train_episode(&mut env, 5).unwrap();
        assert_eq!(summary.steps, 5);
        assert!(summary.total_reward < -50.0);
    }
}
