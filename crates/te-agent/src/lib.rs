//! opente Agent - Deep Q-learning for path selection
//!
//! # Flow
//!
//! ```text
//! Environment::reset ─► StateVectorBuilder ─► DqnAgent::select_action
//!        ▲                                          │
//!        └──── Environment::step ◄──────────────────┘
//!                     │
//!                     ▼
//!   ReplayBuffer::push ─► DqnAgent::train_step ─► (every N) target sync
//! ```
//!
//! The agent is single-writer: anything that shares it across tasks must
//! wrap it in a lock (see `te-controller`).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod env;
pub mod replay;
pub mod reward;
pub mod state;

pub use agent::{DqnAgent, EpisodeSummary, EvaluationSummary};
pub use env::{Environment, StepOutcome, TrainingEnvironment};
pub use replay::{ReplayBuffer, Transition};
pub use reward::{environment_reward, weighted_reward};
pub use state::StateVectorBuilder;
