//! The concurrent trainer: worker threads plus one gradient aggregator.
//!
//! Workers push [`GradientUpdate`]s into an unbounded channel; a dedicated
//! aggregator thread blocks on the receiving end and applies them FIFO to the
//! global parameters. The channel closes only after every worker has dropped
//! its sender AND the queue has drained, so updates enqueued by the last
//! worker right before finishing are never lost. The global actor/critic pair
//! sits behind one mutex: a parameter pull always sees both networks from the
//! same update, never a torn pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use ndarray::Array1;

use crate::agent::Agent;
use crate::config::{ScalerSharing, TrainerConfig};
use crate::env::{Environment, EnvironmentFactory, Preprocessing};
use crate::error::{HermesError, Result};
use crate::parametric::{Actor, Critic};
use crate::replay_buffer::SharedReplayBuffer;
use crate::scaler::{RunningScaler, ScalerHandle};
use crate::stats::ExperimentResult;
use crate::worker::{UpdateMode, Worker};

/// One worker's accumulated gradients for a single training trigger.
pub struct GradientUpdate {
    pub worker_id: usize,
    pub actor_gradient: Array1<f32>,
    pub critic_gradient: Array1<f32>,
    pub batch_size: usize,
}

struct GlobalNets {
    actor: Box<dyn Actor>,
    critic: Box<dyn Critic>,
}

/// Shared handle to the global actor/critic pair.
///
/// All access goes through one mutex so readers never observe the critic from
/// one update paired with the actor from another.
#[derive(Clone)]
pub struct GlobalNetsHandle {
    inner: Arc<Mutex<GlobalNets>>,
}

impl GlobalNetsHandle {
    pub fn new(actor: Box<dyn Actor>, critic: Box<dyn Critic>) -> Self {
        GlobalNetsHandle {
            inner: Arc::new(Mutex::new(GlobalNets { actor, critic })),
        }
    }

    /// Consistent snapshot of both parameter vectors.
    pub fn params(&self) -> (Array1<f32>, Array1<f32>) {
        let nets = self.inner.lock().expect("global nets lock poisoned");
        (nets.actor.params(), nets.critic.params())
    }

    /// Apply one worker update to both networks, critic first.
    pub fn apply(&self, update: &GradientUpdate) {
        let mut nets = self.inner.lock().expect("global nets lock poisoned");
        nets.critic
            .apply_gradient(update.critic_gradient.view(), update.batch_size);
        nets.actor
            .apply_gradient(update.actor_gradient.view(), update.batch_size);
    }

    /// Clone both networks, e.g. to seed a fresh worker.
    pub fn clone_nets(&self) -> Result<(Box<dyn Actor>, Box<dyn Critic>)> {
        let nets = self.inner.lock().expect("global nets lock poisoned");
        Ok((nets.actor.try_clone()?, nets.critic.try_clone()?))
    }

    pub fn save_models(&self, actor_path: &str, critic_path: &str) -> Result<()> {
        let nets = self.inner.lock().expect("global nets lock poisoned");
        nets.actor.save_model(actor_path)?;
        nets.critic.save_model(critic_path)
    }
}

/// Orchestrates a full training run.
pub struct Trainer {
    config: TrainerConfig,
    factory: Arc<dyn EnvironmentFactory>,
    preprocessing: Box<dyn Preprocessing>,
    globals: GlobalNetsHandle,
    mode: UpdateMode,
    shared_scaler: Arc<Mutex<RunningScaler>>,
    results: Arc<Mutex<ExperimentResult>>,
}

impl Trainer {
    pub fn new(
        config: TrainerConfig,
        factory: Arc<dyn EnvironmentFactory>,
        preprocessing: Box<dyn Preprocessing>,
        actor: Box<dyn Actor>,
        critic: Box<dyn Critic>,
        mode: UpdateMode,
    ) -> Self {
        let scaler = RunningScaler::new(config.scaler.use_mean, config.scaler.use_std);
        Trainer {
            config,
            factory,
            preprocessing,
            globals: GlobalNetsHandle::new(actor, critic),
            mode,
            shared_scaler: Arc::new(Mutex::new(scaler)),
            results: Arc::new(Mutex::new(ExperimentResult::new())),
        }
    }

    /// Trainer whose workers run multi-epoch on-policy updates on their own
    /// traces, using the epoch and KL settings from `config`.
    pub fn on_policy(
        config: TrainerConfig,
        factory: Arc<dyn EnvironmentFactory>,
        preprocessing: Box<dyn Preprocessing>,
        actor: Box<dyn Actor>,
        critic: Box<dyn Critic>,
    ) -> Self {
        let mode = UpdateMode::OnPolicy {
            epochs: config.epochs,
            target_kl: config.target_kl,
        };
        Trainer::new(config, factory, preprocessing, actor, critic, mode)
    }

    /// Trainer whose workers feed a shared replay buffer and train on uniform
    /// samples of `batch_size` once `min_size` transitions exist.
    pub fn off_policy(
        config: TrainerConfig,
        factory: Arc<dyn EnvironmentFactory>,
        preprocessing: Box<dyn Preprocessing>,
        actor: Box<dyn Actor>,
        critic: Box<dyn Critic>,
        capacity: usize,
        batch_size: usize,
        min_size: usize,
    ) -> Result<Self> {
        let mode = UpdateMode::OffPolicy {
            buffer: SharedReplayBuffer::new(capacity)?,
            batch_size,
            min_size,
        };
        Ok(Trainer::new(config, factory, preprocessing, actor, critic, mode))
    }

    pub fn globals(&self) -> GlobalNetsHandle {
        self.globals.clone()
    }

    /// Statistics collected so far (or by the finished run).
    pub fn results(&self) -> ExperimentResult {
        self.results.lock().expect("results lock poisoned").clone()
    }

    pub fn save_statistics(&self, path: &str) -> Result<()> {
        self.results().save(path)
    }

    /// Run `num_workers` workers to completion and return the collected
    /// episode statistics. Blocks until every worker and the aggregator have
    /// finished; the first worker failure aborts the remaining episodes and
    /// is returned after all threads have been joined.
    pub fn start_training(&mut self, num_workers: usize) -> Result<ExperimentResult> {
        if num_workers == 0 {
            return Err(HermesError::config_error(
                "num_workers",
                "must be greater than zero",
            ));
        }
        self.config.validate()?;

        let (tx, rx) = mpsc::channel::<GradientUpdate>();
        let running = Arc::new(AtomicBool::new(true));
        let estimator = self.config.advantage_estimator();

        let mut prepared = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let (actor, critic) = self.globals.clone_nets().map_err(|e| {
                HermesError::config_error("actor/critic", format!("clone for worker {}: {}", id, e))
            })?;
            let preprocessing = self.preprocessing.try_clone().map_err(|e| {
                HermesError::config_error(
                    "preprocessing",
                    format!("clone for worker {}: {}", id, e),
                )
            })?;
            let env = self.factory.create_instance()?;
            let scaler = match self.config.scaler.sharing {
                ScalerSharing::Shared => ScalerHandle::Shared(Arc::clone(&self.shared_scaler)),
                ScalerSharing::PerWorker => ScalerHandle::Local(RunningScaler::new(
                    self.config.scaler.use_mean,
                    self.config.scaler.use_std,
                )),
            };
            let worker = Worker::new(
                id,
                actor,
                critic,
                preprocessing,
                scaler,
                estimator,
                self.mode.clone(),
                self.config.horizon,
                self.globals.clone(),
                tx.clone(),
            );
            prepared.push((worker, env));
        }
        // the aggregator's receive loop must end once the workers are done
        drop(tx);

        let aggregator = {
            let globals = self.globals.clone();
            thread::Builder::new()
                .name("hermes-aggregator".to_string())
                .spawn(move || run_aggregator(rx, globals))
                .map_err(|e| HermesError::TrainingError(format!("spawn aggregator: {}", e)))?
        };

        let mut handles = Vec::with_capacity(num_workers);
        for (worker, env) in prepared {
            let id = worker.id();
            let config = self.config.clone();
            let results = Arc::clone(&self.results);
            let running = Arc::clone(&running);
            let handle = thread::Builder::new()
                .name(format!("hermes-worker-{}", id))
                .spawn(move || {
                    let outcome = run_episodes(worker, env, &config, &results, &running);
                    if outcome.is_err() {
                        running.store(false, Ordering::SeqCst);
                    }
                    outcome
                })
                .map_err(|e| {
                    HermesError::TrainingError(format!("spawn worker {}: {}", id, e))
                })?;
            handles.push((id, handle));
        }

        let mut first_err: Option<HermesError> = None;
        for (id, handle) in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("worker {} failed: {}", id, e);
                    first_err.get_or_insert(e);
                }
                Err(_) => {
                    first_err.get_or_insert(HermesError::TrainingError(format!(
                        "worker {} panicked",
                        id
                    )));
                }
            }
        }

        let applied = aggregator
            .join()
            .map_err(|_| HermesError::TrainingError("gradient aggregator panicked".to_string()))?;

        if let Some(e) = first_err {
            return Err(e);
        }

        let results = self.results();
        log::info!(
            "training complete: {} episodes, {} gradient updates, last average reward {:.3}",
            results.episode_count(),
            applied,
            results.last_average_reward()
        );
        Ok(results)
    }
}

/// Drain the gradient channel, applying updates in arrival order. Returns the
/// number of updates applied.
fn run_aggregator(rx: Receiver<GradientUpdate>, globals: GlobalNetsHandle) -> usize {
    let mut applied = 0usize;
    while let Ok(update) = rx.recv() {
        globals.apply(&update);
        applied += 1;
        log::trace!(
            "applied update {} from worker {} (batch {})",
            applied,
            update.worker_id,
            update.batch_size
        );
    }
    applied
}

fn run_episodes(
    mut worker: Worker,
    mut env: Box<dyn Environment>,
    config: &TrainerConfig,
    results: &Mutex<ExperimentResult>,
    running: &AtomicBool,
) -> Result<()> {
    for episode in 0..config.episodes_per_worker {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        worker.reset();
        let started = Instant::now();
        let mut step = env.reset()?;
        loop {
            let action = match worker.on_step(step)? {
                Some(action) => action,
                None => break,
            };
            if env.time() >= config.episode_max_sim_time || !running.load(Ordering::SeqCst) {
                break;
            }
            step = env.apply(&action)?;
        }
        let elapsed = started.elapsed().as_millis() as u64;
        // record before the end-of-episode flush so a training failure
        // cannot lose a finished episode
        results
            .lock()
            .expect("results lock poisoned")
            .add_result(worker.total_reward(), elapsed);
        worker.on_episode_end()?;
        log::debug!(
            "worker {} episode {} finished, reward {:.3}",
            worker.id(),
            episode,
            worker.total_reward()
        );
    }
    worker.on_training_end();
    Ok(())
}
