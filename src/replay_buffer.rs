//! Uniform-sampling experience replay with a fixed-capacity ring layout.
//!
//! When the capacity is reached the oldest element is overwritten, with the
//! write cursor wrapping at `capacity`. Off-policy workers share one buffer
//! through [`SharedReplayBuffer`], which serializes `add` against `sample`.

use rand::Rng;
use std::sync::{Arc, Mutex};

use crate::error::{HermesError, Result};
use crate::memory::Transition;

/// Fixed-capacity ring buffer of transition copies with uniform sampling.
#[derive(Clone, Debug)]
pub struct ExperienceReplayBuffer {
    memory: Vec<Transition>,
    capacity: usize,
    next_idx: usize,
}

impl ExperienceReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HermesError::config_error(
                "replay capacity",
                "must be greater than zero",
            ));
        }
        Ok(ExperienceReplayBuffer {
            memory: Vec::with_capacity(capacity),
            capacity,
            next_idx: 0,
        })
    }

    /// Append while under capacity, otherwise overwrite the slot at the write
    /// cursor. Returns the index the element was written to.
    pub fn add(&mut self, transition: Transition) -> usize {
        if self.next_idx >= self.memory.len() {
            self.memory.push(transition);
        } else {
            self.memory[self.next_idx] = transition;
        }
        let written = self.next_idx;
        self.next_idx = (self.next_idx + 1) % self.capacity;
        written
    }

    /// Draw `n` elements IID with replacement, uniformly over current
    /// contents. Returns only `len()` elements when `n > len()`; never errors.
    pub fn sample(&self, n: usize) -> Vec<Transition> {
        let mut rng = rand::thread_rng();
        let count = n.min(self.memory.len());
        (0..count)
            .map(|_| self.memory[rng.gen_range(0..self.memory.len())].clone())
            .collect()
    }

    pub fn get(&self, idx: usize) -> Option<&Transition> {
        self.memory.get(idx)
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.memory.clear();
        self.next_idx = 0;
    }
}

/// Replay buffer shared across workers. One mutex covers both `add` and
/// `sample`, which keeps them mutually exclusive.
#[derive(Clone, Debug)]
pub struct SharedReplayBuffer {
    inner: Arc<Mutex<ExperienceReplayBuffer>>,
}

impl SharedReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(SharedReplayBuffer {
            inner: Arc::new(Mutex::new(ExperienceReplayBuffer::new(capacity)?)),
        })
    }

    pub fn add(&self, transition: Transition) -> usize {
        self.inner
            .lock()
            .expect("replay buffer lock poisoned")
            .add(transition)
    }

    pub fn sample(&self, n: usize) -> Vec<Transition> {
        self.inner
            .lock()
            .expect("replay buffer lock poisoned")
            .sample(n)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("replay buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
