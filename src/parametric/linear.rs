//! Linear reference implementations of the parametric-function contract.
//!
//! A softmax-linear discrete actor, a fixed-std Gaussian actor with tanh
//! squashing, and a linear critic. Gradients are computed in closed form and
//! already carry the learning rate, so `apply_gradient` is a plain
//! `params -= gradient` — the same convention the contract assumes of real
//! network-backed implementations.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{HermesError, Result};
use crate::memory::ActionSample;
use crate::parametric::{Actor, Critic, PolicyOutput};

const LOG_2PI: f32 = 1.837_877_1;

fn check_dims(name: &str, obs_dim: usize, learning_rate: f32) -> Result<()> {
    if obs_dim == 0 {
        return Err(HermesError::config_error(
            format!("{} obs_dim", name),
            "observation dimension must be greater than zero".to_string(),
        ));
    }
    if learning_rate <= 0.0 {
        return Err(HermesError::config_error(
            format!("{} learning_rate", name),
            format!("must be positive, got {}", learning_rate),
        ));
    }
    Ok(())
}

/// Append a bias feature of 1.0 to a state row.
fn with_bias(state: ArrayView1<f32>) -> Array1<f32> {
    let mut features = Array1::ones(state.len() + 1);
    features.slice_mut(ndarray::s![..state.len()]).assign(&state);
    features
}

fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_logits = logits.mapv(|x| (x - max_logit).exp());
    let sum_exp = exp_logits.sum();
    exp_logits / sum_exp
}

/// Linear state-value function with MSE gradient.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearCritic {
    weights: Array1<f32>, // obs_dim weights + trailing bias
    learning_rate: f32,
    obs_dim: usize,
}

impl LinearCritic {
    pub fn new(obs_dim: usize, learning_rate: f32) -> Result<Self> {
        check_dims("LinearCritic", obs_dim, learning_rate)?;
        let bound = 1.0 / (obs_dim as f32).sqrt();
        Ok(LinearCritic {
            weights: Array1::random(obs_dim + 1, Uniform::new(-bound, bound)),
            learning_rate,
            obs_dim,
        })
    }

    fn value(&self, state: ArrayView1<f32>) -> f32 {
        self.weights.dot(&with_bias(state))
    }
}

impl Critic for LinearCritic {
    fn output(&self, states: ArrayView2<f32>) -> Array1<f32> {
        Array1::from_iter(states.axis_iter(Axis(0)).map(|row| self.value(row)))
    }

    fn gradient(
        &mut self,
        states: ArrayView2<f32>,
        _old_values: &[f32],
        returns: &[f32],
    ) -> Array1<f32> {
        let n = states.nrows() as f32;
        let mut grad = Array1::zeros(self.weights.len());
        for (row, &ret) in states.axis_iter(Axis(0)).zip(returns.iter()) {
            let features = with_bias(row);
            let residual = self.weights.dot(&features) - ret;
            grad.scaled_add(residual, &features);
        }
        grad * (self.learning_rate / n)
    }

    fn apply_gradient(&mut self, gradient: ArrayView1<f32>, _batch_size: usize) {
        self.weights -= &gradient;
    }

    fn params(&self) -> Array1<f32> {
        self.weights.clone()
    }

    fn set_params(&mut self, params: ArrayView1<f32>) -> Result<()> {
        if params.len() != self.weights.len() {
            return Err(HermesError::dimension_mismatch(
                format!("{} critic params", self.weights.len()),
                format!("{}", params.len()),
            ));
        }
        self.weights.assign(&params);
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Critic>> {
        Ok(Box::new(self.clone()))
    }

    fn save_model(&self, path: &str) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn load_model(&mut self, path: &str) -> Result<()> {
        let bytes = std::fs::read(path)?;
        *self = bincode::deserialize(&bytes)?;
        Ok(())
    }
}

/// Softmax-linear policy over a discrete action space.
///
/// Sampling is inverse-CDF over the categorical probabilities; when the
/// environment restricts legal actions the distribution is masked and
/// renormalized before sampling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearDiscreteActor {
    weights: Array2<f32>, // action_dim x (obs_dim + 1)
    learning_rate: f32,
    entropy_coeff: f32,
    obs_dim: usize,
    action_dim: usize,
    #[serde(skip)]
    approx_kl: f32,
}

impl LinearDiscreteActor {
    pub fn new(
        obs_dim: usize,
        action_dim: usize,
        learning_rate: f32,
        entropy_coeff: f32,
    ) -> Result<Self> {
        check_dims("LinearDiscreteActor", obs_dim, learning_rate)?;
        if action_dim == 0 {
            return Err(HermesError::config_error(
                "LinearDiscreteActor action_dim",
                "action dimension must be greater than zero",
            ));
        }
        let bound = 1.0 / (obs_dim as f32).sqrt();
        Ok(LinearDiscreteActor {
            weights: Array2::random((action_dim, obs_dim + 1), Uniform::new(-bound, bound)),
            learning_rate,
            entropy_coeff,
            obs_dim,
            action_dim,
            approx_kl: 0.0,
        })
    }

    fn probs(&self, state: ArrayView1<f32>) -> Array1<f32> {
        softmax(&self.weights.dot(&with_bias(state)))
    }

    fn masked_probs(&self, state: ArrayView1<f32>, legal: Option<&[usize]>) -> Array1<f32> {
        let mut probs = self.probs(state);
        if let Some(legal) = legal {
            let mut masked = Array1::zeros(probs.len());
            for &a in legal {
                if a < probs.len() {
                    masked[a] = probs[a];
                }
            }
            let total = masked.sum();
            if total > 0.0 {
                probs = masked / total;
            }
        }
        probs
    }
}

impl Actor for LinearDiscreteActor {
    fn output(&self, states: ArrayView2<f32>, actions: ArrayView2<f32>) -> PolicyOutput {
        let n = states.nrows();
        let mut log_probs = Array1::zeros(n);
        let mut entropy = Array1::zeros(n);
        for i in 0..n {
            let probs = self.probs(states.row(i));
            let action = actions[[i, 0]] as usize;
            log_probs[i] = probs[action.min(self.action_dim - 1)].max(1e-8).ln();
            entropy[i] = -probs.iter().map(|&p| if p > 1e-8 { p * p.ln() } else { 0.0 }).sum::<f32>();
        }
        PolicyOutput { log_probs, entropy }
    }

    fn action(&mut self, state: ArrayView1<f32>, legal: Option<&[usize]>) -> Result<ActionSample> {
        let probs = self.masked_probs(state, legal);
        let mut rng = rand::thread_rng();
        let rand_val: f32 = rng.gen();
        let mut cumsum = 0.0;
        for (i, &p) in probs.iter().enumerate() {
            cumsum += p;
            if rand_val < cumsum {
                return Ok(ActionSample::Discrete(i));
            }
        }
        // numerical fallback
        Ok(ActionSample::Discrete(probs.len() - 1))
    }

    fn gradient(
        &mut self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
        advantages: &[f32],
        old_log_probs: ArrayView1<f32>,
    ) -> Array1<f32> {
        let n = states.nrows() as f32;
        let mut grad = Array2::<f32>::zeros(self.weights.dim());
        let mut kl_sum = 0.0;

        for (i, &adv) in advantages.iter().enumerate() {
            let features = with_bias(states.row(i));
            let probs = self.probs(states.row(i));
            let action = (actions[[i, 0]] as usize).min(self.action_dim - 1);

            kl_sum += old_log_probs[i] - probs[action].max(1e-8).ln();

            // d(-log pi(a|s) * adv)/d logits = (probs - onehot_a) * adv,
            // with an entropy bonus pushing logits toward uniformity
            for a in 0..self.action_dim {
                let indicator = if a == action { 1.0 } else { 0.0 };
                let d_logit = (probs[a] - indicator) * adv
                    + self.entropy_coeff * probs[a] * (probs[a].max(1e-8).ln() + entropy_of(&probs));
                grad.row_mut(a).scaled_add(d_logit, &features);
            }
        }

        self.approx_kl = kl_sum / n;
        let flat: Vec<f32> = grad.iter().copied().collect();
        Array1::from_vec(flat) * (self.learning_rate / n)
    }

    fn apply_gradient(&mut self, gradient: ArrayView1<f32>, _batch_size: usize) {
        for (w, g) in self.weights.iter_mut().zip(gradient.iter()) {
            *w -= g;
        }
    }

    fn params(&self) -> Array1<f32> {
        Array1::from_iter(self.weights.iter().copied())
    }

    fn set_params(&mut self, params: ArrayView1<f32>) -> Result<()> {
        if params.len() != self.weights.len() {
            return Err(HermesError::dimension_mismatch(
                format!("{} actor params", self.weights.len()),
                format!("{}", params.len()),
            ));
        }
        for (w, p) in self.weights.iter_mut().zip(params.iter()) {
            *w = *p;
        }
        Ok(())
    }

    fn approx_kl(&self) -> f32 {
        self.approx_kl
    }

    fn try_clone(&self) -> Result<Box<dyn Actor>> {
        Ok(Box::new(self.clone()))
    }

    fn save_model(&self, path: &str) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn load_model(&mut self, path: &str) -> Result<()> {
        let bytes = std::fs::read(path)?;
        *self = bincode::deserialize(&bytes)?;
        Ok(())
    }
}

fn entropy_of(probs: &Array1<f32>) -> f32 {
    -probs
        .iter()
        .map(|&p| if p > 1e-8 { p * p.ln() } else { 0.0 })
        .sum::<f32>()
}

/// Gaussian policy with a linear mean head and fixed log-std.
///
/// Samples are tanh-squashed and scaled to the action bound before being
/// handed to the environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearGaussianActor {
    weights: Array2<f32>, // action_dim x (obs_dim + 1)
    log_std: f32,
    action_bound: f32,
    learning_rate: f32,
    obs_dim: usize,
    action_dim: usize,
    #[serde(skip)]
    approx_kl: f32,
}

impl LinearGaussianActor {
    pub fn new(
        obs_dim: usize,
        action_dim: usize,
        learning_rate: f32,
        action_bound: f32,
    ) -> Result<Self> {
        check_dims("LinearGaussianActor", obs_dim, learning_rate)?;
        if action_dim == 0 {
            return Err(HermesError::config_error(
                "LinearGaussianActor action_dim",
                "action dimension must be greater than zero",
            ));
        }
        let bound = 1.0 / (obs_dim as f32).sqrt();
        Ok(LinearGaussianActor {
            weights: Array2::random((action_dim, obs_dim + 1), Uniform::new(-bound, bound)),
            log_std: -0.5,
            action_bound,
            learning_rate,
            obs_dim,
            action_dim,
            approx_kl: 0.0,
        })
    }

    fn mean(&self, state: ArrayView1<f32>) -> Array1<f32> {
        self.weights.dot(&with_bias(state))
    }

    fn log_prob(&self, mean: &Array1<f32>, action: ArrayView1<f32>) -> f32 {
        let std = self.log_std.exp();
        let var = std * std;
        action
            .iter()
            .zip(mean.iter())
            .map(|(&a, &m)| -((a - m).powi(2)) / (2.0 * var) - self.log_std - 0.5 * LOG_2PI)
            .sum()
    }
}

impl Actor for LinearGaussianActor {
    fn output(&self, states: ArrayView2<f32>, actions: ArrayView2<f32>) -> PolicyOutput {
        let n = states.nrows();
        let per_dim_entropy = self.log_std + 0.5 + 0.5 * LOG_2PI;
        let mut log_probs = Array1::zeros(n);
        for i in 0..n {
            let mean = self.mean(states.row(i));
            log_probs[i] = self.log_prob(&mean, actions.row(i));
        }
        PolicyOutput {
            log_probs,
            entropy: Array1::from_elem(n, per_dim_entropy * self.action_dim as f32),
        }
    }

    fn action(&mut self, state: ArrayView1<f32>, _legal: Option<&[usize]>) -> Result<ActionSample> {
        let mean = self.mean(state);
        let std = self.log_std.exp();
        let mut rng = rand::thread_rng();
        let sample = mean.mapv(|m| {
            let noise: f32 = rng.sample(StandardNormal);
            let raw = m + std * noise;
            raw.tanh() * self.action_bound
        });
        Ok(ActionSample::Continuous(sample))
    }

    fn gradient(
        &mut self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
        advantages: &[f32],
        old_log_probs: ArrayView1<f32>,
    ) -> Array1<f32> {
        let n = states.nrows() as f32;
        let std = self.log_std.exp();
        let var = std * std;
        let mut grad = Array2::<f32>::zeros(self.weights.dim());
        let mut kl_sum = 0.0;

        for (i, &adv) in advantages.iter().enumerate() {
            let features = with_bias(states.row(i));
            let mean = self.mean(states.row(i));
            kl_sum += old_log_probs[i] - self.log_prob(&mean, actions.row(i));

            // d(-log pi)/d mean = -(a - mean) / var, scaled by the advantage
            for d in 0..self.action_dim {
                let d_mean = -(actions[[i, d]] - mean[d]) / var * adv;
                grad.row_mut(d).scaled_add(d_mean, &features);
            }
        }

        self.approx_kl = kl_sum / n;
        let flat: Vec<f32> = grad.iter().copied().collect();
        Array1::from_vec(flat) * (self.learning_rate / n)
    }

    fn apply_gradient(&mut self, gradient: ArrayView1<f32>, _batch_size: usize) {
        for (w, g) in self.weights.iter_mut().zip(gradient.iter()) {
            *w -= g;
        }
    }

    fn params(&self) -> Array1<f32> {
        Array1::from_iter(self.weights.iter().copied())
    }

    fn set_params(&mut self, params: ArrayView1<f32>) -> Result<()> {
        if params.len() != self.weights.len() {
            return Err(HermesError::dimension_mismatch(
                format!("{} actor params", self.weights.len()),
                format!("{}", params.len()),
            ));
        }
        for (w, p) in self.weights.iter_mut().zip(params.iter()) {
            *w = *p;
        }
        Ok(())
    }

    fn approx_kl(&self) -> f32 {
        self.approx_kl
    }

    fn try_clone(&self) -> Result<Box<dyn Actor>> {
        Ok(Box::new(self.clone()))
    }

    fn save_model(&self, path: &str) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn load_model(&mut self, path: &str) -> Result<()> {
        let bytes = std::fs::read(path)?;
        *self = bincode::deserialize(&bytes)?;
        Ok(())
    }
}
