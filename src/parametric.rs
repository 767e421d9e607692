//! The parametric-function contract.
//!
//! Actor and critic internals (network architecture, optimizers, autodiff)
//! live behind these traits; the orchestrator only moves flat parameter and
//! gradient vectors around. [`linear`] provides closed-form reference
//! implementations so the training loop runs without any NN dependency.

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::Result;
use crate::memory::ActionSample;

pub mod linear;

/// Policy evaluation of a batch of (state, action) pairs, captured before an
/// update so later epochs can measure how far the policy has moved.
#[derive(Clone, Debug)]
pub struct PolicyOutput {
    /// Per-sample log probability of the taken action
    pub log_probs: Array1<f32>,
    /// Per-sample policy entropy
    pub entropy: Array1<f32>,
}

/// Policy side of the parametric-function pair.
pub trait Actor: Send {
    /// Evaluate the current policy on a batch of states and taken actions.
    fn output(&self, states: ArrayView2<f32>, actions: ArrayView2<f32>) -> PolicyOutput;

    /// Sample an action for a single state. `legal` restricts discrete
    /// policies to the listed action indices.
    fn action(&mut self, state: ArrayView1<f32>, legal: Option<&[usize]>) -> Result<ActionSample>;

    /// Compute a flat gradient vector for one pass over the batch.
    fn gradient(
        &mut self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
        advantages: &[f32],
        old_log_probs: ArrayView1<f32>,
    ) -> Array1<f32>;

    /// Apply a (possibly accumulated) gradient to the parameters.
    fn apply_gradient(&mut self, gradient: ArrayView1<f32>, batch_size: usize);

    /// Snapshot of the flat parameter vector.
    fn params(&self) -> Array1<f32>;

    /// Overwrite the parameters with a global snapshot.
    fn set_params(&mut self, params: ArrayView1<f32>) -> Result<()>;

    /// Approximate KL divergence between the policy before and after the most
    /// recent `gradient` call, used for epoch early stopping.
    fn approx_kl(&self) -> f32;

    fn try_clone(&self) -> Result<Box<dyn Actor>>;

    fn save_model(&self, path: &str) -> Result<()>;

    fn load_model(&mut self, path: &str) -> Result<()>;
}

/// Value side of the parametric-function pair.
pub trait Critic: Send {
    /// Value estimates for a batch of states.
    fn output(&self, states: ArrayView2<f32>) -> Array1<f32>;

    /// Flat gradient for one pass over the batch toward `returns`.
    /// `old_values` are the pre-update estimates, for implementations that
    /// clip the value update.
    fn gradient(
        &mut self,
        states: ArrayView2<f32>,
        old_values: &[f32],
        returns: &[f32],
    ) -> Array1<f32>;

    fn apply_gradient(&mut self, gradient: ArrayView1<f32>, batch_size: usize);

    fn params(&self) -> Array1<f32>;

    fn set_params(&mut self, params: ArrayView1<f32>) -> Result<()>;

    fn try_clone(&self) -> Result<Box<dyn Critic>>;

    fn save_model(&self, path: &str) -> Result<()>;

    fn load_model(&mut self, path: &str) -> Result<()>;
}
