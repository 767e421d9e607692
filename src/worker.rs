//! The per-thread training worker.
//!
//! A [`Worker`] owns private clones of the actor and critic, collects
//! transitions into a horizon-bounded trace (on-policy) or a shared replay
//! buffer (off-policy), computes gradients locally, and hands them to the
//! aggregator through a channel. After each enqueue it refreshes its clones
//! from the global parameters, except for the very first time: the warmup
//! update is computed against the initial parameters and pulling immediately
//! would discard the only exploration signal gathered so far.

use std::sync::mpsc::Sender;

use ndarray::Array1;

use crate::advantage::AdvantageEstimator;
use crate::agent::Agent;
use crate::env::{Preprocessing, Step};
use crate::error::{HermesError, Result};
use crate::memory::{ActionSample, Batch, Trace, Transition};
use crate::parametric::{Actor, Critic};
use crate::replay_buffer::SharedReplayBuffer;
use crate::scaler::ScalerHandle;
use crate::trainer::{GlobalNetsHandle, GradientUpdate};

/// Whether the worker has completed its first gradient enqueue yet.
///
/// `Warmup` skips exactly one post-enqueue parameter pull, then the worker
/// moves to `Steady` and pulls after every update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullState {
    Warmup,
    Steady,
}

/// How a worker turns collected experience into updates.
#[derive(Clone)]
pub enum UpdateMode {
    /// Train on the worker's own trace every time it fills the horizon, with
    /// multiple epochs per batch and optional KL-based early stopping.
    OnPolicy {
        epochs: usize,
        target_kl: Option<f32>,
    },
    /// Feed transitions into a shared replay buffer and train on uniform
    /// samples once `min_size` transitions have accumulated.
    OffPolicy {
        buffer: SharedReplayBuffer,
        batch_size: usize,
        min_size: usize,
    },
}

/// One worker of the concurrent trainer.
pub struct Worker {
    id: usize,
    actor: Box<dyn Actor>,
    critic: Box<dyn Critic>,
    preprocessing: Box<dyn Preprocessing>,
    trace: Trace,
    pending: Option<Transition>,
    scaler: ScalerHandle,
    estimator: AdvantageEstimator,
    mode: UpdateMode,
    globals: GlobalNetsHandle,
    tx: Sender<GradientUpdate>,
    pull_state: PullState,
    total_reward: f32,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        actor: Box<dyn Actor>,
        critic: Box<dyn Critic>,
        preprocessing: Box<dyn Preprocessing>,
        scaler: ScalerHandle,
        estimator: AdvantageEstimator,
        mode: UpdateMode,
        horizon: usize,
        globals: GlobalNetsHandle,
        tx: Sender<GradientUpdate>,
    ) -> Self {
        Worker {
            id,
            actor,
            critic,
            preprocessing,
            trace: Trace::new(horizon),
            pending: None,
            scaler,
            estimator,
            mode,
            globals,
            tx,
            pull_state: PullState::Warmup,
            total_reward: 0.0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run one training update from whatever experience is currently
    /// available. A no-op when there is nothing to train on.
    pub fn train(&mut self) -> Result<()> {
        let mode = self.mode.clone();
        match mode {
            UpdateMode::OnPolicy { epochs, target_kl } => {
                if self.trace.is_empty() {
                    return Ok(());
                }
                let batch = self.trace.to_batch()?;
                self.update_from_batch(&batch, epochs, target_kl, false)?;
                self.trace.clear();
            }
            UpdateMode::OffPolicy {
                buffer,
                batch_size,
                min_size,
            } => {
                if buffer.len() < min_size {
                    return Ok(());
                }
                let samples = buffer.sample(batch_size);
                if samples.is_empty() {
                    return Ok(());
                }
                let batch = Batch::from_transitions(&samples)?;
                self.update_from_batch(&batch, 1, None, true)?;
            }
        }
        Ok(())
    }

    /// One training update over `batch`. `replayed` selects independent
    /// one-step bootstrapped targets (replay samples have no temporal order)
    /// instead of the sequential trace estimator.
    fn update_from_batch(
        &mut self,
        batch: &Batch,
        epochs: usize,
        target_kl: Option<f32>,
        replayed: bool,
    ) -> Result<()> {
        let rewards = self.scaler.partial_fit_transform(&batch.rewards);
        let old_values = self.critic.output(batch.states.view()).to_vec();
        let old_policy = self.actor.output(batch.states.view(), batch.actions.view());
        let (returns, advantages) = if replayed {
            let next_values = self.critic.output(batch.next_states.view()).to_vec();
            self.estimator
                .one_step_targets(&old_values, &next_values, &rewards, &batch.mask)?
        } else {
            self.estimator.estimate(&old_values, &rewards, &batch.mask)?
        };

        let mut actor_sum = Array1::<f32>::zeros(self.actor.params().len());
        let mut critic_sum = Array1::<f32>::zeros(self.critic.params().len());

        for epoch in 0..epochs {
            let actor_grad = self.actor.gradient(
                batch.states.view(),
                batch.actions.view(),
                &advantages,
                old_policy.log_probs.view(),
            );
            let critic_grad = self.critic.gradient(batch.states.view(), &old_values, &returns);

            self.actor.apply_gradient(actor_grad.view(), batch.len());
            self.critic.apply_gradient(critic_grad.view(), batch.len());

            actor_sum += &actor_grad;
            critic_sum += &critic_grad;

            // the epoch that trips the threshold still contributes its
            // gradient to the enqueued sum
            if let Some(kl_limit) = target_kl {
                let kl = self.actor.approx_kl();
                if kl > 1.5 * kl_limit {
                    log::debug!(
                        "worker {}: early stop after {} epochs, approx KL {:.5}",
                        self.id,
                        epoch + 1,
                        kl
                    );
                    break;
                }
            }
        }

        self.tx
            .send(GradientUpdate {
                worker_id: self.id,
                actor_gradient: actor_sum,
                critic_gradient: critic_sum,
                batch_size: batch.len(),
            })
            .map_err(|_| {
                HermesError::TrainingError(
                    "gradient queue closed before training finished".to_string(),
                )
            })?;

        match self.pull_state {
            PullState::Warmup => self.pull_state = PullState::Steady,
            PullState::Steady => {
                let (actor_params, critic_params) = self.globals.params();
                self.actor.set_params(actor_params.view())?;
                self.critic.set_params(critic_params.view())?;
            }
        }
        Ok(())
    }
}

impl Agent for Worker {
    fn on_step(&mut self, step: Step) -> Result<Option<ActionSample>> {
        self.total_reward += step.reward;
        let state = self.preprocessing.process(step.observation);

        if let Some(mut pending) = self.pending.take() {
            pending.finalize(step.reward, state.clone(), step.done);
            match &self.mode {
                UpdateMode::OnPolicy { .. } => self.trace.push(pending)?,
                UpdateMode::OffPolicy { buffer, .. } => {
                    buffer.add(pending);
                }
            }
        }

        let should_train = match &self.mode {
            UpdateMode::OnPolicy { .. } => self.trace.is_full(),
            UpdateMode::OffPolicy {
                buffer, min_size, ..
            } => buffer.len() >= *min_size,
        };
        if should_train {
            self.train()?;
        }

        if step.done {
            return Ok(None);
        }

        let action = self.actor.action(state.view(), step.legal_actions.as_deref())?;
        self.pending = Some(Transition::pending(state, action.clone()));
        Ok(Some(action))
    }

    fn on_episode_end(&mut self) -> Result<()> {
        // a transition left open by a time-limit cutoff was never finalized
        self.pending = None;
        if matches!(self.mode, UpdateMode::OnPolicy { .. }) {
            self.train()?;
        }
        self.preprocessing.reset();
        Ok(())
    }

    fn on_training_end(&mut self) {
        log::debug!("worker {} finished training", self.id);
    }

    fn reset(&mut self) {
        self.pending = None;
        self.trace.clear();
        self.total_reward = 0.0;
        self.preprocessing.reset();
    }

    fn total_reward(&self) -> f32 {
        self.total_reward
    }
}
