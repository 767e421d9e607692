//! # Hermes
//!
//! A concurrent reinforcement-learning trainer for discrete-event
//! simulations. Worker threads drive independent environment instances,
//! collect traces, and compute gradients against private actor/critic
//! clones; a single aggregator thread applies those gradients FIFO to the
//! global parameters, which workers pull back after every update.
//!
//! The crate is organized around a few seams:
//!
//! - [`env`]: the synchronous simulation interface ([`env::Environment`],
//!   [`env::EnvironmentFactory`], [`env::Preprocessing`])
//! - [`parametric`]: the [`parametric::Actor`] / [`parametric::Critic`]
//!   contract, with closed-form linear reference implementations
//! - [`worker`]: the per-thread agent combining trace collection, reward
//!   normalization, advantage estimation, and local updates
//! - [`trainer`]: thread orchestration, the gradient channel, and the
//!   mutex-guarded global parameter pair
//! - [`replay_buffer`], [`scaler`], [`advantage`], [`memory`]: the building
//!   blocks the worker composes
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hermes::config::TrainerConfig;
//! use hermes::env::IdentityPreprocessing;
//! use hermes::parametric::linear::{LinearCritic, LinearDiscreteActor};
//! use hermes::trainer::Trainer;
//! # use hermes::env::{Environment, EnvironmentFactory};
//! # use hermes::error::Result;
//! # struct MyFactory;
//! # impl EnvironmentFactory for MyFactory {
//! #     fn create_instance(&self) -> Result<Box<dyn Environment>> { unimplemented!() }
//! # }
//!
//! # fn main() -> hermes::error::Result<()> {
//! let config = TrainerConfig::builder()
//!     .horizon(64)
//!     .epochs(4)
//!     .target_kl(0.01)
//!     .episodes_per_worker(100)
//!     .build()?;
//!
//! let mut trainer = Trainer::on_policy(
//!     config,
//!     Arc::new(MyFactory),
//!     Box::new(IdentityPreprocessing),
//!     Box::new(LinearDiscreteActor::new(8, 4, 0.001, 0.01)?),
//!     Box::new(LinearCritic::new(8, 0.01)?),
//! );
//!
//! let results = trainer.start_training(4)?;
//! println!("average reward: {}", results.last_average_reward());
//! # Ok(())
//! # }
//! ```

pub mod advantage;
pub mod agent;
pub mod config;
pub mod env;
pub mod error;
pub mod memory;
pub mod parametric;
pub mod replay_buffer;
pub mod scaler;
pub mod stats;
pub mod trainer;
pub mod worker;
