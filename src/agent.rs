//! Agent lifecycle contract.
//!
//! One flat trait instead of an inheritance chain: algorithm families (A3C,
//! PPO, DDQN) are composed into [`crate::worker::Worker`] as strategies, and
//! the episode driver only ever talks to this interface.

use crate::env::Step;
use crate::error::Result;
use crate::memory::ActionSample;

/// Lifecycle of an agent embedded in an episode loop.
pub trait Agent: Send {
    /// Consume one environment step and return the next action, or `None`
    /// when the step was terminal and the episode is over.
    fn on_step(&mut self, step: Step) -> Result<Option<ActionSample>>;

    /// Episode boundary: flush any partial trace and reset per-episode state.
    fn on_episode_end(&mut self) -> Result<()>;

    /// Called once after the last episode of this agent's worker.
    fn on_training_end(&mut self);

    /// Drop all transient state (trace, pending transition, reward).
    fn reset(&mut self);

    /// Cumulative reward of the current (or just finished) episode.
    fn total_reward(&self) -> f32;
}
