//! Return and advantage estimation over a finished trace.
//!
//! The sequential estimators walk the trace backward with f64 running
//! accumulators and treat the value past the end of the trace as zero; the
//! continuation mask (1 = continue, 0 = terminal) cuts accumulation at
//! episode boundaries. Replayed samples instead get independent one-step
//! targets, since a uniform sample carries no temporal order.

use serde::{Deserialize, Serialize};

use crate::error::{HermesError, Result};

/// Config-selected advantage estimation strategy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum AdvantageEstimator {
    /// Generalized Advantage Estimation with discount `gamma` and mixing
    /// factor `lambda` (`lambda = 1` is Monte-Carlo, `lambda = 0` one-step TD).
    Gae { gamma: f32, lambda: f32 },
    /// Discounted n-step return with `advantage[t] = return[t] - V[t]`,
    /// the estimator used by the plain actor-critic family.
    NStepReturn { gamma: f32 },
}

impl AdvantageEstimator {
    /// Compute `(returns, advantages)` for a trace.
    ///
    /// `values` are the critic's pre-update estimates `V[0..T-1]`, `rewards`
    /// the (normalized) rewards, `mask` the continuation mask. All three must
    /// have equal, nonzero length.
    pub fn estimate(
        &self,
        values: &[f32],
        rewards: &[f32],
        mask: &[f32],
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        if rewards.len() != values.len() || rewards.len() != mask.len() {
            return Err(HermesError::dimension_mismatch(
                format!("rewards/values/mask of equal length {}", rewards.len()),
                format!("values {} mask {}", values.len(), mask.len()),
            ));
        }
        if rewards.is_empty() {
            return Err(HermesError::EmptyBuffer(
                "cannot estimate advantages on an empty trace".to_string(),
            ));
        }

        match *self {
            AdvantageEstimator::Gae { gamma, lambda } => {
                Ok(gae(values, rewards, mask, gamma as f64, lambda as f64))
            }
            AdvantageEstimator::NStepReturn { gamma } => {
                Ok(n_step(values, rewards, mask, gamma as f64))
            }
        }
    }

    /// Compute `(returns, advantages)` for uniformly replayed transitions.
    ///
    /// Replay samples have no temporal order, so nothing may chain across
    /// positions: each target bootstraps only from its own successor state,
    /// `return[t] = R[t] + gamma * V(s'[t]) * M[t]`, and is therefore
    /// invariant to sample order. `next_values` are the critic's estimates
    /// for the successor states.
    pub fn one_step_targets(
        &self,
        values: &[f32],
        next_values: &[f32],
        rewards: &[f32],
        mask: &[f32],
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        if rewards.len() != values.len()
            || rewards.len() != next_values.len()
            || rewards.len() != mask.len()
        {
            return Err(HermesError::dimension_mismatch(
                format!("rewards/values/next_values/mask of equal length {}", rewards.len()),
                format!(
                    "values {} next_values {} mask {}",
                    values.len(),
                    next_values.len(),
                    mask.len()
                ),
            ));
        }
        if rewards.is_empty() {
            return Err(HermesError::EmptyBuffer(
                "cannot compute targets for an empty sample".to_string(),
            ));
        }

        let gamma = self.gamma() as f64;
        let n = rewards.len();
        let mut returns = vec![0.0f32; n];
        let mut advantages = vec![0.0f32; n];
        for t in 0..n {
            let ret = rewards[t] as f64 + gamma * next_values[t] as f64 * mask[t] as f64;
            returns[t] = ret as f32;
            advantages[t] = (ret - values[t] as f64) as f32;
        }
        Ok((returns, advantages))
    }

    fn gamma(&self) -> f32 {
        match *self {
            AdvantageEstimator::Gae { gamma, .. } => gamma,
            AdvantageEstimator::NStepReturn { gamma } => gamma,
        }
    }
}

fn gae(
    values: &[f32],
    rewards: &[f32],
    mask: &[f32],
    gamma: f64,
    lambda: f64,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    let mut returns = vec![0.0f32; n];
    let mut advantages = vec![0.0f32; n];

    let mut running_return = 0.0f64;
    let mut next_value = 0.0f64; // V[T] = 0
    let mut running_advantage = 0.0f64;

    for t in (0..n).rev() {
        let r = rewards[t] as f64;
        let v = values[t] as f64;
        let m = mask[t] as f64;

        running_return = r + gamma * running_return * m;
        let delta = r + gamma * next_value * m - v;
        running_advantage = delta + gamma * lambda * running_advantage * m;

        returns[t] = running_return as f32;
        advantages[t] = running_advantage as f32;
        next_value = v;
    }

    (returns, advantages)
}

fn n_step(values: &[f32], rewards: &[f32], mask: &[f32], gamma: f64) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    let mut returns = vec![0.0f32; n];
    let mut advantages = vec![0.0f32; n];

    let mut running_return = 0.0f64;
    for t in (0..n).rev() {
        running_return = rewards[t] as f64 + gamma * running_return * mask[t] as f64;
        returns[t] = running_return as f32;
        advantages[t] = (running_return - values[t] as f64) as f32;
    }

    (returns, advantages)
}
