//! End-to-end tests of the concurrent trainer through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ndarray::{array, Array1, ArrayView1, ArrayView2};

use hermes::config::{ScalerConfig, ScalerSharing, TrainerConfig};
use hermes::env::{Environment, EnvironmentFactory, IdentityPreprocessing, Step};
use hermes::error::{HermesError, Result};
use hermes::memory::ActionSample;
use hermes::parametric::linear::{LinearCritic, LinearDiscreteActor};
use hermes::parametric::{Actor, Critic, PolicyOutput};
use hermes::trainer::{GlobalNetsHandle, GradientUpdate, Trainer};

/// Walk right to reach the goal, reward 1 at the end, small step penalty.
struct ChainEnv {
    position: usize,
    length: usize,
    steps: u64,
}

impl Environment for ChainEnv {
    fn reset(&mut self) -> Result<Step> {
        self.position = 0;
        self.steps = 0;
        Ok(Step::new(array![0.0], 0.0, false))
    }

    fn apply(&mut self, action: &ActionSample) -> Result<Step> {
        self.steps += 1;
        match action {
            ActionSample::Discrete(1) => self.position += 1,
            ActionSample::Discrete(_) => self.position = self.position.saturating_sub(1),
            other => {
                return Err(HermesError::EnvError(format!(
                    "unsupported action {:?}",
                    other
                )))
            }
        }
        let done = self.position >= self.length;
        let reward = if done { 1.0 } else { -0.01 };
        Ok(Step::new(
            array![self.position as f32 / self.length as f32],
            reward,
            done,
        ))
    }

    fn time(&self) -> f64 {
        self.steps as f64
    }
}

struct ChainFactory {
    length: usize,
}

impl EnvironmentFactory for ChainFactory {
    fn create_instance(&self) -> Result<Box<dyn Environment>> {
        Ok(Box::new(ChainEnv {
            position: 0,
            length: self.length,
            steps: 0,
        }))
    }
}

/// Runs exactly `length` decision steps, then terminates.
struct FixedLenEnv {
    count: usize,
    length: usize,
}

impl Environment for FixedLenEnv {
    fn reset(&mut self) -> Result<Step> {
        self.count = 0;
        Ok(Step::new(array![0.0], 0.0, false))
    }

    fn apply(&mut self, _action: &ActionSample) -> Result<Step> {
        self.count += 1;
        Ok(Step::new(
            array![self.count as f32],
            1.0,
            self.count == self.length,
        ))
    }

    fn time(&self) -> f64 {
        self.count as f64
    }
}

struct FixedLenFactory {
    length: usize,
}

impl EnvironmentFactory for FixedLenFactory {
    fn create_instance(&self) -> Result<Box<dyn Environment>> {
        Ok(Box::new(FixedLenEnv {
            count: 0,
            length: self.length,
        }))
    }
}

/// Actor whose every gradient is a vector of ones, so the global parameter
/// value counts applied updates exactly.
struct CountingActor {
    params: Array1<f32>,
}

impl CountingActor {
    fn boxed() -> Box<dyn Actor> {
        Box::new(CountingActor {
            params: Array1::zeros(1),
        })
    }
}

impl Actor for CountingActor {
    fn output(&self, states: ArrayView2<f32>, _actions: ArrayView2<f32>) -> PolicyOutput {
        PolicyOutput {
            log_probs: Array1::zeros(states.nrows()),
            entropy: Array1::zeros(states.nrows()),
        }
    }

    fn action(&mut self, _state: ArrayView1<f32>, _legal: Option<&[usize]>) -> Result<ActionSample> {
        Ok(ActionSample::Discrete(0))
    }

    fn gradient(
        &mut self,
        _states: ArrayView2<f32>,
        _actions: ArrayView2<f32>,
        _advantages: &[f32],
        _old_log_probs: ArrayView1<f32>,
    ) -> Array1<f32> {
        Array1::ones(1)
    }

    fn apply_gradient(&mut self, gradient: ArrayView1<f32>, _batch_size: usize) {
        self.params -= &gradient;
    }

    fn params(&self) -> Array1<f32> {
        self.params.clone()
    }

    fn set_params(&mut self, params: ArrayView1<f32>) -> Result<()> {
        self.params = params.to_owned();
        Ok(())
    }

    fn approx_kl(&self) -> f32 {
        0.0
    }

    fn try_clone(&self) -> Result<Box<dyn Actor>> {
        Ok(Box::new(CountingActor {
            params: self.params.clone(),
        }))
    }

    fn save_model(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn load_model(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }
}

struct CountingCritic {
    params: Array1<f32>,
}

impl CountingCritic {
    fn boxed() -> Box<dyn Critic> {
        Box::new(CountingCritic {
            params: Array1::zeros(1),
        })
    }
}

impl Critic for CountingCritic {
    fn output(&self, states: ArrayView2<f32>) -> Array1<f32> {
        Array1::zeros(states.nrows())
    }

    fn gradient(
        &mut self,
        _states: ArrayView2<f32>,
        _old_values: &[f32],
        _returns: &[f32],
    ) -> Array1<f32> {
        Array1::ones(1)
    }

    fn apply_gradient(&mut self, gradient: ArrayView1<f32>, _batch_size: usize) {
        self.params -= &gradient;
    }

    fn params(&self) -> Array1<f32> {
        self.params.clone()
    }

    fn set_params(&mut self, params: ArrayView1<f32>) -> Result<()> {
        self.params = params.to_owned();
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Critic>> {
        Ok(Box::new(CountingCritic {
            params: self.params.clone(),
        }))
    }

    fn save_model(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn load_model(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_full_training_run_on_chain_env() {
    let workers = num_cpus::get().clamp(2, 4);
    let episodes = 5;
    let config = TrainerConfig::builder()
        .horizon(16)
        .epochs(3)
        .target_kl(0.05)
        .episodes_per_worker(episodes)
        .episode_max_sim_time(100.0)
        .scaler(ScalerConfig {
            use_mean: true,
            use_std: true,
            sharing: ScalerSharing::Shared,
        })
        .build()
        .unwrap();

    let mut trainer = Trainer::on_policy(
        config,
        Arc::new(ChainFactory { length: 5 }),
        Box::new(IdentityPreprocessing),
        Box::new(LinearDiscreteActor::new(1, 2, 0.01, 0.001).unwrap()),
        Box::new(LinearCritic::new(1, 0.05).unwrap()),
    );

    let results = trainer.start_training(workers).unwrap();
    assert_eq!(results.episode_count(), workers * episodes);
    assert!(results
        .rewards()
        .iter()
        .all(|r| r.is_finite()));

    // statistics survive a save/load round trip
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");
    trainer.save_statistics(path.to_str().unwrap()).unwrap();
    let loaded = hermes::stats::ExperimentResult::load(&path).unwrap();
    assert_eq!(loaded.episode_count(), results.episode_count());
}

#[test]
fn test_every_gradient_update_is_applied() {
    // 5 decision steps per episode with horizon 2: two horizon triggers plus
    // one end-of-episode flush, so 3 updates per episode per worker
    let workers = 3;
    let episodes = 4;
    let updates_per_episode = 3;

    let config = TrainerConfig::builder()
        .horizon(2)
        .epochs(1)
        .episodes_per_worker(episodes)
        .build()
        .unwrap();

    let mut trainer = Trainer::on_policy(
        config,
        Arc::new(FixedLenFactory { length: 5 }),
        Box::new(IdentityPreprocessing),
        CountingActor::boxed(),
        CountingCritic::boxed(),
    );

    trainer.start_training(workers).unwrap();

    let expected = (workers * episodes * updates_per_episode) as f32;
    let (actor_params, critic_params) = trainer.globals().params();
    assert_eq!(actor_params[0], -expected);
    assert_eq!(critic_params[0], -expected);
}

#[test]
fn test_parameter_snapshots_are_never_torn() {
    // every applied update moves both networks by the same amount, so any
    // consistent snapshot has equal actor and critic values
    let globals = GlobalNetsHandle::new(CountingActor::boxed(), CountingCritic::boxed());

    let writer = {
        let globals = globals.clone();
        thread::spawn(move || {
            for _ in 0..5_000 {
                globals.apply(&GradientUpdate {
                    worker_id: 0,
                    actor_gradient: Array1::ones(1),
                    critic_gradient: Array1::ones(1),
                    batch_size: 1,
                });
            }
        })
    };

    let torn = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let globals = globals.clone();
            let torn = Arc::clone(&torn);
            thread::spawn(move || {
                for _ in 0..5_000 {
                    let (actor, critic) = globals.params();
                    if actor[0] != critic[0] {
                        torn.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(torn.load(Ordering::SeqCst), 0);

    let (actor, critic) = globals.params();
    assert_eq!(actor[0], -5_000.0);
    assert_eq!(critic[0], -5_000.0);
}

#[test]
fn test_per_worker_scaler_isolated_runs() {
    let config = TrainerConfig::builder()
        .horizon(8)
        .episodes_per_worker(2)
        .episode_max_sim_time(50.0)
        .scaler(ScalerConfig {
            use_mean: true,
            use_std: false,
            sharing: ScalerSharing::PerWorker,
        })
        .build()
        .unwrap();

    let mut trainer = Trainer::on_policy(
        config,
        Arc::new(ChainFactory { length: 4 }),
        Box::new(IdentityPreprocessing),
        Box::new(LinearDiscreteActor::new(1, 2, 0.01, 0.001).unwrap()),
        Box::new(LinearCritic::new(1, 0.05).unwrap()),
    );

    let results = trainer.start_training(2).unwrap();
    assert_eq!(results.episode_count(), 4);
}

#[test]
fn test_model_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let actor_path = dir.path().join("actor.bin");
    let critic_path = dir.path().join("critic.bin");

    let config = TrainerConfig::builder()
        .horizon(8)
        .episodes_per_worker(2)
        .episode_max_sim_time(50.0)
        .build()
        .unwrap();
    let mut trainer = Trainer::on_policy(
        config,
        Arc::new(ChainFactory { length: 4 }),
        Box::new(IdentityPreprocessing),
        Box::new(LinearDiscreteActor::new(1, 2, 0.01, 0.001).unwrap()),
        Box::new(LinearCritic::new(1, 0.05).unwrap()),
    );
    trainer.start_training(2).unwrap();

    trainer
        .globals()
        .save_models(
            actor_path.to_str().unwrap(),
            critic_path.to_str().unwrap(),
        )
        .unwrap();

    let (_, critic_params) = trainer.globals().params();
    let mut restored = LinearCritic::new(1, 0.05).unwrap();
    restored.load_model(critic_path.to_str().unwrap()).unwrap();
    assert_eq!(restored.params(), critic_params);
}
