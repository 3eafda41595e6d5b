//! Live route decisions with a safe fallback

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use te_agent::{DqnAgent, Environment, EpisodeSummary};
use te_common::{NetworkStateSnapshot, TeError, TeResult};
use tracing::{error, warn};

/// Agent shared between the decision path (readers) and training (writer)
pub type SharedAgent = Arc<RwLock<DqnAgent>>;

/// Wrap an agent for sharing
pub fn shared_agent(agent: DqnAgent) -> SharedAgent {
    Arc::new(RwLock::new(agent))
}

/// Routing decision for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    /// Chosen path
    pub action: usize,
    /// Whether the default path was used because the policy failed
    pub fallback: bool,
}

/// Greedy policy lookup that falls back to a default path on any error
pub struct RouteDecider {
    agent: SharedAgent,
    default_action: usize,
}

impl RouteDecider {
    /// Create decider with default path 0
    pub fn new(agent: SharedAgent) -> Self {
        Self {
            agent,
            default_action: 0,
        }
    }

    /// Set the fallback path
    pub fn with_default_action(mut self, action: usize) -> Self {
        self.default_action = action;
        self
    }

    /// Fallback path
    pub fn default_action(&self) -> usize {
        self.default_action
    }

    /// Shared agent handle
    pub fn agent(&self) -> &SharedAgent {
        &self.agent
    }

    /// Policy decision, surfacing any error
    pub fn try_decide(&self, snapshot: &NetworkStateSnapshot) -> TeResult<usize> {
        snapshot.validate()?;
        let agent = self.agent.read();
        let state = agent.state_vector(snapshot);
        agent.greedy_action(&state)
    }

    /// Policy decision; errors are logged and answered with the default path
    pub fn decide(&self, snapshot: &NetworkStateSnapshot) -> RouteDecision {
        match self.try_decide(snapshot) {
            Ok(action) => {
                metrics::counter!("te_route_decisions_total").increment(1);
                RouteDecision {
                    action,
                    fallback: false,
                }
            }
            Err(e) => self.fallback(&e),
        }
    }

    /// Default-path decision after a failure, whether in the policy or in
    /// gathering its input
    pub fn fallback(&self, reason: &TeError) -> RouteDecision {
        error!(error = %reason, "Route decision failed");
        warn!(action = self.default_action, "Falling back to default path");
        metrics::counter!("te_route_fallbacks_total").increment(1);
        RouteDecision {
            action: self.default_action,
            fallback: true,
        }
    }

    /// Run one training episode under the write lock
    pub fn train_episode<E: Environment + ?Sized>(
        &self,
        env: &mut E,
        max_steps: usize,
    ) -> TeResult<EpisodeSummary> {
        self.agent.write().train_episode(env, max_steps)
    }
}
