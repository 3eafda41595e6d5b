//! Telemetry boundary

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use te_agent::{environment_reward, Environment, StepOutcome, TrainingEnvironment};
use te_common::{EnvironmentConfig, NetworkStateSnapshot, RingBuffer, TeError, TeResult};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Source of live network state for the decision loop
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Up to `len` most recent utilization samples, oldest first
    async fn utilization_history(&self, len: usize) -> TeResult<Vec<f64>>;

    /// Current network state
    async fn snapshot(&self) -> TeResult<NetworkStateSnapshot>;

    /// Install the chosen path; sources that only observe ignore it
    async fn apply_action(&self, _action: usize) -> TeResult<()> {
        Ok(())
    }
}

struct SimulatedState {
    env: TrainingEnvironment,
    history: RingBuffer<f64>,
}

/// Telemetry backed by the training simulation
///
/// Every applied action advances the simulation one step and records the
/// hottest link's utilization; a finished episode restarts transparently.
pub struct SimulatedTelemetry {
    state: Mutex<SimulatedState>,
}

impl SimulatedTelemetry {
    /// Simulation keeping `history_capacity` utilization samples
    pub fn new(config: EnvironmentConfig, history_capacity: usize) -> TeResult<Self> {
        let env = TrainingEnvironment::new(config)?;
        let mut history = RingBuffer::new(history_capacity)?;
        history.push(env.snapshot().max_link_utilization);
        Ok(Self {
            state: Mutex::new(SimulatedState { env, history }),
        })
    }

    /// Add an externally observed sample
    pub fn record_utilization(&self, utilization: f64) {
        self.state.lock().history.push(utilization);
    }
}

#[async_trait]
impl TelemetrySource for SimulatedTelemetry {
    async fn utilization_history(&self, len: usize) -> TeResult<Vec<f64>> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(len);
        Ok(state.history.iter().skip(skip).copied().collect())
    }

    async fn snapshot(&self) -> TeResult<NetworkStateSnapshot> {
        Ok(self.state.lock().env.snapshot())
    }

    async fn apply_action(&self, action: usize) -> TeResult<()> {
        let mut state = self.state.lock();
        let outcome = state.env.step(action)?;
        state.history.push(outcome.snapshot.max_link_utilization);
        if outcome.done {
            debug!(steps = state.env.step_count(), "Simulated episode ended, resetting");
            state.env.reset();
        }
        Ok(())
    }
}

/// [`Environment`] over a live [`TelemetrySource`] for online training
///
/// A step installs the action, then reads back the resulting state and
/// scores it with [`environment_reward`]. Calls block on `handle`, so drive
/// it from `tokio::task::spawn_blocking`, never from a runtime worker.
pub struct TelemetryEnvironment<S: ?Sized> {
    source: Arc<S>,
    handle: Handle,
    episode_steps: usize,
    step_count: usize,
    last: NetworkStateSnapshot,
}

impl<S: TelemetrySource + ?Sized> TelemetryEnvironment<S> {
    /// Episodes end after `episode_steps` steps
    pub fn new(source: Arc<S>, handle: Handle, episode_steps: usize) -> TeResult<Self> {
        if episode_steps == 0 {
            return Err(TeError::Config("episode_steps must be positive".into()));
        }
        Ok(Self {
            source,
            handle,
            episode_steps,
            step_count: 0,
            last: NetworkStateSnapshot::default(),
        })
    }

    /// Steps taken in the current episode
    pub fn step_count(&self) -> usize {
        self.step_count
    }
}

impl<S: TelemetrySource + ?Sized> Environment for TelemetryEnvironment<S> {
    fn reset(&mut self) -> NetworkStateSnapshot {
        self.step_count = 0;
        match self.handle.block_on(self.source.snapshot()) {
            Ok(snapshot) => self.last = snapshot,
            Err(e) => warn!(error = %e, "Telemetry snapshot unavailable, reusing last state"),
        }
        self.last.clone()
    }

    fn step(&mut self, action: usize) -> TeResult<StepOutcome> {
        self.handle.block_on(self.source.apply_action(action))?;
        let snapshot = self.handle.block_on(self.source.snapshot())?;
        snapshot.validate()?;

        self.step_count += 1;
        self.last = snapshot.clone();
        Ok(StepOutcome {
            reward: environment_reward(&snapshot.link_utilizations),
            done: self.step_count >= self.episode_steps,
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry() -> SimulatedTelemetry {
        SimulatedTelemetry::new(
            EnvironmentConfig {
                seed: Some(1),
                ..Default::default()
            },
            4,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_history_tracks_applied_actions() {
        let telemetry = telemetry();
        assert_eq!(telemetry.utilization_history(10).await.unwrap().len(), 1);

        for action in 0..5 {
            telemetry.apply_action(action % 4).await.unwrap();
        }
        let history = telemetry.utilization_history(10).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(telemetry.utilization_history(2).await.unwrap(), history[2..].to_vec());

        let snapshot = telemetry.snapshot().await.unwrap();
        assert_eq!(history[3], snapshot.max_link_utilization);
    }

    #[tokio::test]
    async fn test_invalid_action_is_reported() {
        let telemetry = telemetry();
        assert!(telemetry.apply_action(9).await.is_err());
    }

    #[tokio::test]
    async fn test_external_samples() {
        let telemetry = telemetry();
        telemetry.record_utilization(77.0);
        let history = telemetry.utilization_history(1).await.unwrap();
        assert_eq!(history, vec![77.0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_live_environment_trains_an_episode() {
        let source = Arc::new(telemetry());
        let handle = Handle::current();

        let (summary, history) = tokio::task::spawn_blocking(move || {
            let mut env = TelemetryEnvironment::new(source.clone(), handle.clone(), 12).unwrap();
            let mut agent = te_agent::DqnAgent::new(te_common::AgentConfig {
                hidden_layers: vec![16],
                batch_size: 4,
                buffer_capacity: 64,
                seed: Some(5),
                ..Default::default()
            })
            .unwrap();
            let summary = agent.train_episode(&mut env, 50).unwrap();
            assert_eq!(env.step_count(), 12);
            let history = handle.block_on(source.utilization_history(10)).unwrap();
            (summary, history)
        })
        .await
        .unwrap();

        assert_eq!(summary.steps, 12);
        assert!(summary.updates > 0);
        assert_eq!(history.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_live_environment_rejects_bad_action() {
        let source = Arc::new(telemetry());
        let handle = Handle::current();

        tokio::task::spawn_blocking(move || {
            let mut env = TelemetryEnvironment::new(source, handle, 5).unwrap();
            let first = env.reset();
            assert_eq!(first.link_utilizations.len(), 12);
            assert!(env.step(9).is_err());
            assert_eq!(env.step_count(), 0);
            assert!(TelemetryEnvironment::new(Arc::new(telemetry()), Handle::current(), 0).is_err());
        })
        .await
        .unwrap();
    }
}
