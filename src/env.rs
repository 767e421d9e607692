//! Interfaces consumed from the simulation side.
//!
//! The simulator itself is an external collaborator; the trainer only sees a
//! synchronous stream of [`Step`] events. Environments and preprocessing must
//! be independently constructible/cloneable so each worker gets its own
//! instance with no shared state.

use ndarray::Array1;

use crate::error::Result;
use crate::memory::ActionSample;

/// One event from the environment: the new observation, the reward earned by
/// the previous action, the currently legal actions (if the environment
/// restricts them), and whether the episode ended.
#[derive(Clone, Debug)]
pub struct Step {
    pub observation: Array1<f32>,
    pub reward: f32,
    pub legal_actions: Option<Vec<usize>>,
    pub done: bool,
}

impl Step {
    pub fn new(observation: Array1<f32>, reward: f32, done: bool) -> Self {
        Step {
            observation,
            reward,
            legal_actions: None,
            done,
        }
    }
}

/// A simulated environment driven by one worker.
///
/// Calls are synchronous; a worker blocks inside them. Failures surface as
/// `EnvError` and are propagated unmodified.
pub trait Environment: Send {
    /// Reset to an initial state, returning the first step of the episode.
    fn reset(&mut self) -> Result<Step>;

    /// Apply an action and advance the simulation to the next decision epoch.
    fn apply(&mut self, action: &ActionSample) -> Result<Step>;

    /// Current simulation time, used to bound episode length.
    fn time(&self) -> f64;
}

/// Builds one environment instance per worker.
pub trait EnvironmentFactory: Send + Sync {
    fn create_instance(&self) -> Result<Box<dyn Environment>>;
}

/// Observation preprocessing applied before the agent sees a state.
///
/// Each worker owns a clone; implementations must not share state unless the
/// pooling is explicit on their side.
pub trait Preprocessing: Send {
    fn process(&mut self, observation: Array1<f32>) -> Array1<f32>;

    fn try_clone(&self) -> Result<Box<dyn Preprocessing>>;

    /// Called at episode boundaries for stateful preprocessors.
    fn reset(&mut self) {}
}

/// Pass-through preprocessing.
#[derive(Clone, Debug, Default)]
pub struct IdentityPreprocessing;

impl Preprocessing for IdentityPreprocessing {
    fn process(&mut self, observation: Array1<f32>) -> Array1<f32> {
        observation
    }

    fn try_clone(&self) -> Result<Box<dyn Preprocessing>> {
        Ok(Box::new(IdentityPreprocessing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity_preprocessing() {
        let mut pre = IdentityPreprocessing;
        let obs = array![1.0, 2.0, 3.0];
        assert_eq!(pre.process(obs.clone()), obs);
        assert!(pre.try_clone().is_ok());
    }

    #[test]
    fn test_step_defaults() {
        let step = Step::new(array![0.0], 1.5, false);
        assert!(step.legal_actions.is_none());
        assert!(!step.done);
        assert_eq!(step.reward, 1.5);
    }
}
