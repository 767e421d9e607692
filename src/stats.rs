//! Per-run training statistics.
//!
//! Every worker reports episode outcomes into a shared [`ExperimentResult`];
//! the trainer exposes it after the run and can persist it as JSON.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HermesError, Result};

/// Number of most recent episodes the rolling average is taken over.
const AVERAGE_WINDOW: usize = 100;

/// Episode-level results of a training run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Total reward of each finished episode, in completion order
    rewards: Vec<f32>,
    /// Wall-clock duration of each episode in milliseconds
    durations_ms: Vec<u64>,
}

impl ExperimentResult {
    pub fn new() -> Self {
        ExperimentResult::default()
    }

    /// Record one finished episode.
    pub fn add_result(&mut self, reward: f32, duration_ms: u64) {
        self.rewards.push(reward);
        self.durations_ms.push(duration_ms);
    }

    pub fn episode_count(&self) -> usize {
        self.rewards.len()
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn durations_ms(&self) -> &[u64] {
        &self.durations_ms
    }

    /// Mean reward over the last [`AVERAGE_WINDOW`] episodes, or all of them
    /// if fewer have finished. Returns 0.0 before any episode completes.
    pub fn last_average_reward(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        let start = self.rewards.len().saturating_sub(AVERAGE_WINDOW);
        let window = &self.rewards[start..];
        window.iter().sum::<f32>() / window.len() as f32
    }

    /// Mean reward over the whole run.
    pub fn average_reward(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        self.rewards.iter().sum::<f32>() / self.rewards.len() as f32
    }

    /// Best single-episode reward so far.
    pub fn best_reward(&self) -> Option<f32> {
        self.rewards
            .iter()
            .copied()
            .fold(None, |best, r| match best {
                Some(b) if b >= r => Some(b),
                _ => Some(r),
            })
    }

    /// Write the results as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| HermesError::SerializationError(e.to_string()))
    }

    /// Load results previously written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| HermesError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result() {
        let result = ExperimentResult::new();
        assert_eq!(result.episode_count(), 0);
        assert_eq!(result.last_average_reward(), 0.0);
        assert!(result.best_reward().is_none());
    }

    #[test]
    fn test_add_and_average() {
        let mut result = ExperimentResult::new();
        result.add_result(1.0, 10);
        result.add_result(3.0, 12);
        assert_eq!(result.episode_count(), 2);
        assert!((result.last_average_reward() - 2.0).abs() < 1e-6);
        assert_eq!(result.best_reward(), Some(3.0));
    }

    #[test]
    fn test_rolling_window() {
        let mut result = ExperimentResult::new();
        // 150 episodes: first 50 at reward 0, last 100 at reward 2
        for _ in 0..50 {
            result.add_result(0.0, 1);
        }
        for _ in 0..100 {
            result.add_result(2.0, 1);
        }
        assert!((result.last_average_reward() - 2.0).abs() < 1e-6);
        assert!((result.average_reward() - 200.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut result = ExperimentResult::new();
        result.add_result(5.5, 42);
        result.add_result(-1.0, 7);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        result.save(&path).unwrap();

        let loaded = ExperimentResult::load(&path).unwrap();
        assert_eq!(loaded.rewards(), result.rewards());
        assert_eq!(loaded.durations_ms(), result.durations_ms());
    }
}
