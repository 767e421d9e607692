//! Training configuration.
//!
//! Validated at construction: a bad hyperparameter fails with `ConfigError`
//! before any thread is spawned.

use serde::{Deserialize, Serialize};

use crate::advantage::AdvantageEstimator;
use crate::error::{HermesError, Result};

/// Whether the reward scaler is pooled across workers or owned per worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalerSharing {
    /// One scaler instance shared by all workers (global reward statistics)
    Shared,
    /// Each worker fits its own scaler
    PerWorker,
}

/// Reward normalization settings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScalerConfig {
    pub use_mean: bool,
    pub use_std: bool,
    pub sharing: ScalerSharing,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        ScalerConfig {
            use_mean: true,
            use_std: true,
            sharing: ScalerSharing::Shared,
        }
    }
}

/// Hyperparameters for the concurrent trainer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Discount factor gamma
    pub discount_factor: f32,
    /// GAE mixing factor lambda
    pub lambda_gae: f32,
    /// Transitions collected before an on-policy training trigger
    pub horizon: usize,
    /// Passes over each batch before the gradient is enqueued
    pub epochs: usize,
    /// Early-stop threshold: epochs stop once approx KL > 1.5 * target_kl
    pub target_kl: Option<f32>,
    /// Episodes each worker runs before reporting done
    pub episodes_per_worker: usize,
    /// Simulated-time ceiling per episode
    pub episode_max_sim_time: f64,
    /// Reward normalization
    pub scaler: ScalerConfig,
    /// Monte-Carlo/TD mixture used for returns and advantages
    pub estimator: EstimatorKind,
}

/// Which advantage estimator the workers build from gamma/lambda.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimatorKind {
    Gae,
    NStepReturn,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            discount_factor: 0.99,
            lambda_gae: 0.96,
            horizon: 100,
            epochs: 1,
            target_kl: None,
            episodes_per_worker: 10,
            episode_max_sim_time: 3000.0,
            scaler: ScalerConfig::default(),
            estimator: EstimatorKind::Gae,
        }
    }
}

impl TrainerConfig {
    pub fn builder() -> TrainerConfigBuilder {
        TrainerConfigBuilder {
            config: TrainerConfig::default(),
        }
    }

    /// Build the advantage estimator selected by this configuration.
    pub fn advantage_estimator(&self) -> AdvantageEstimator {
        match self.estimator {
            EstimatorKind::Gae => AdvantageEstimator::Gae {
                gamma: self.discount_factor,
                lambda: self.lambda_gae,
            },
            EstimatorKind::NStepReturn => AdvantageEstimator::NStepReturn {
                gamma: self.discount_factor,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(HermesError::config_error(
                "horizon",
                "must be greater than zero",
            ));
        }
        if self.epochs == 0 {
            return Err(HermesError::config_error(
                "epochs",
                "must be greater than zero",
            ));
        }
        if self.episodes_per_worker == 0 {
            return Err(HermesError::config_error(
                "episodes_per_worker",
                "must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(HermesError::config_error(
                "discount_factor",
                format!("must be in [0, 1], got {}", self.discount_factor),
            ));
        }
        if !(0.0..=1.0).contains(&self.lambda_gae) {
            return Err(HermesError::config_error(
                "lambda_gae",
                format!("must be in [0, 1], got {}", self.lambda_gae),
            ));
        }
        if let Some(kl) = self.target_kl {
            if kl <= 0.0 {
                return Err(HermesError::config_error(
                    "target_kl",
                    format!("must be positive, got {}", kl),
                ));
            }
        }
        if self.episode_max_sim_time <= 0.0 {
            return Err(HermesError::config_error(
                "episode_max_sim_time",
                format!("must be positive, got {}", self.episode_max_sim_time),
            ));
        }
        Ok(())
    }
}

/// Builder for [`TrainerConfig`].
pub struct TrainerConfigBuilder {
    config: TrainerConfig,
}

impl TrainerConfigBuilder {
    pub fn discount_factor(mut self, gamma: f32) -> Self {
        self.config.discount_factor = gamma;
        self
    }

    pub fn lambda_gae(mut self, lambda: f32) -> Self {
        self.config.lambda_gae = lambda;
        self
    }

    pub fn horizon(mut self, horizon: usize) -> Self {
        self.config.horizon = horizon;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    pub fn target_kl(mut self, target_kl: f32) -> Self {
        self.config.target_kl = Some(target_kl);
        self
    }

    pub fn episodes_per_worker(mut self, episodes: usize) -> Self {
        self.config.episodes_per_worker = episodes;
        self
    }

    pub fn episode_max_sim_time(mut self, time: f64) -> Self {
        self.config.episode_max_sim_time = time;
        self
    }

    pub fn scaler(mut self, scaler: ScalerConfig) -> Self {
        self.config.scaler = scaler;
        self
    }

    pub fn estimator(mut self, kind: EstimatorKind) -> Self {
        self.config.estimator = kind;
        self
    }

    pub fn build(self) -> Result<TrainerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
