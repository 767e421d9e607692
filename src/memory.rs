//! Per-step transition records and the bounded per-worker trace.
//!
//! A [`Transition`] is created *pending* when the agent commits to an action,
//! before the environment's reaction is known, and finalized in place when the
//! next [`crate::env::Step`] arrives. Finalized transitions are appended to a
//! horizon-bounded [`Trace`] (on-policy) or copied into the replay buffer
//! (off-policy), then materialized column-wise as a [`Batch`] for training.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{HermesError, Result};

/// Action drawn from a policy, tagged by representation.
///
/// Batch materialization is per-variant: `Discrete` becomes a single column
/// holding the index, `OneHot` and `Continuous` become row vectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionSample {
    /// Index into a discrete action space
    Discrete(usize),
    /// One-hot encoded discrete action
    OneHot(Array1<f32>),
    /// Continuous action vector
    Continuous(Array1<f32>),
}

impl ActionSample {
    /// Width of this action's row in a batch matrix.
    pub fn dim(&self) -> usize {
        match self {
            ActionSample::Discrete(_) => 1,
            ActionSample::OneHot(v) => v.len(),
            ActionSample::Continuous(v) => v.len(),
        }
    }

    /// Materialize this action as a batch row.
    pub fn to_row(&self) -> Array1<f32> {
        match self {
            ActionSample::Discrete(idx) => Array1::from_vec(vec![*idx as f32]),
            ActionSample::OneHot(v) => v.clone(),
            ActionSample::Continuous(v) => v.clone(),
        }
    }
}

/// One decision epoch: state, action, and (once known) the outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transition {
    pub state: Array1<f32>,
    pub action: ActionSample,
    pub next_state: Option<Array1<f32>>,
    pub reward: f32,
    pub done: bool,
}

impl Transition {
    /// Open a pending transition for `(state, action)`. Reward accumulates
    /// from zero and the next state is unknown until `finalize`.
    pub fn pending(state: Array1<f32>, action: ActionSample) -> Self {
        Transition {
            state,
            action,
            next_state: None,
            reward: 0.0,
            done: false,
        }
    }

    /// Complete the transition in place once the environment's reaction is
    /// known. The reward adds onto whatever has already accumulated.
    pub fn finalize(&mut self, reward: f32, next_state: Array1<f32>, done: bool) {
        self.reward += reward;
        self.next_state = Some(next_state);
        self.done = done;
    }

    pub fn is_pending(&self) -> bool {
        self.next_state.is_none()
    }
}

/// Append-only per-worker transition sequence bounded by a horizon.
///
/// `0 <= len() <= horizon` always holds; the trace is cleared after each
/// training trigger.
#[derive(Clone, Debug)]
pub struct Trace {
    transitions: Vec<Transition>,
    horizon: usize,
}

impl Trace {
    pub fn new(horizon: usize) -> Self {
        Trace {
            transitions: Vec::with_capacity(horizon),
            horizon,
        }
    }

    pub fn push(&mut self, transition: Transition) -> Result<()> {
        if self.transitions.len() >= self.horizon {
            return Err(HermesError::TrainingError(format!(
                "trace exceeded horizon {}",
                self.horizon
            )));
        }
        self.transitions.push(transition);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.transitions.len() == self.horizon
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Materialize the trace as a columnar batch.
    pub fn to_batch(&self) -> Result<Batch> {
        Batch::from_transitions(&self.transitions)
    }
}

/// Columnar view over a set of transitions: states, next states, and actions
/// as matrices, rewards and continuation mask as vectors (mask 1 = continue,
/// 0 = terminal). Next states carry the bootstrap values for one-step targets.
#[derive(Clone, Debug)]
pub struct Batch {
    pub states: Array2<f32>,
    pub next_states: Array2<f32>,
    pub actions: Array2<f32>,
    pub rewards: Vec<f32>,
    pub mask: Vec<f32>,
}

impl Batch {
    /// Build a batch, failing fast with `DimensionMismatch` if any transition
    /// disagrees on state or action width, or is still pending.
    pub fn from_transitions(transitions: &[Transition]) -> Result<Batch> {
        if transitions.is_empty() {
            return Err(HermesError::EmptyBuffer(
                "cannot build a batch from an empty trace".to_string(),
            ));
        }

        let state_dim = transitions[0].state.len();
        let action_dim = transitions[0].action.dim();

        let mut states = Array2::zeros((transitions.len(), state_dim));
        let mut next_states = Array2::zeros((transitions.len(), state_dim));
        let mut actions = Array2::zeros((transitions.len(), action_dim));
        let mut rewards = Vec::with_capacity(transitions.len());
        let mut mask = Vec::with_capacity(transitions.len());

        for (i, t) in transitions.iter().enumerate() {
            let next_state = match &t.next_state {
                Some(next_state) => next_state,
                None => {
                    return Err(HermesError::TrainingError(format!(
                        "transition {} is still pending",
                        i
                    )))
                }
            };
            if t.state.len() != state_dim {
                return Err(HermesError::dimension_mismatch(
                    format!("state dim {}", state_dim),
                    format!("state dim {} at row {}", t.state.len(), i),
                ));
            }
            if next_state.len() != state_dim {
                return Err(HermesError::dimension_mismatch(
                    format!("state dim {}", state_dim),
                    format!("next state dim {} at row {}", next_state.len(), i),
                ));
            }
            if t.action.dim() != action_dim {
                return Err(HermesError::dimension_mismatch(
                    format!("action dim {}", action_dim),
                    format!("action dim {} at row {}", t.action.dim(), i),
                ));
            }
            states.row_mut(i).assign(&t.state);
            next_states.row_mut(i).assign(next_state);
            actions.row_mut(i).assign(&t.action.to_row());
            rewards.push(t.reward);
            mask.push(if t.done { 0.0 } else { 1.0 });
        }

        Ok(Batch {
            states,
            next_states,
            actions,
            rewards,
            mask,
        })
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn finalized(state: Array1<f32>, action: ActionSample, reward: f32, done: bool) -> Transition {
        let mut t = Transition::pending(state.clone(), action);
        t.finalize(reward, state, done);
        t
    }

    #[test]
    fn test_pending_lifecycle() {
        let mut t = Transition::pending(array![1.0, 2.0], ActionSample::Discrete(1));
        assert!(t.is_pending());
        assert_eq!(t.reward, 0.0);

        t.finalize(0.5, array![2.0, 3.0], false);
        assert!(!t.is_pending());
        assert_eq!(t.reward, 0.5);

        // reward accumulates
        t.reward += 0.25;
        assert_eq!(t.reward, 0.75);
    }

    #[test]
    fn test_trace_bounded_by_horizon() {
        let mut trace = Trace::new(2);
        trace
            .push(finalized(array![0.0], ActionSample::Discrete(0), 1.0, false))
            .unwrap();
        trace
            .push(finalized(array![1.0], ActionSample::Discrete(1), 1.0, false))
            .unwrap();
        assert!(trace.is_full());
        assert!(trace
            .push(finalized(array![2.0], ActionSample::Discrete(0), 1.0, false))
            .is_err());

        trace.clear();
        assert!(trace.is_empty());
    }

    #[test]
    fn test_batch_discrete_actions_one_column() {
        let transitions = vec![
            finalized(array![0.0, 1.0], ActionSample::Discrete(2), 1.0, false),
            finalized(array![1.0, 0.0], ActionSample::Discrete(0), -1.0, true),
        ];
        let batch = Batch::from_transitions(&transitions).unwrap();
        assert_eq!(batch.states.shape(), &[2, 2]);
        assert_eq!(batch.next_states.shape(), &[2, 2]);
        assert_eq!(batch.next_states.row(0), batch.states.row(0));
        assert_eq!(batch.actions.shape(), &[2, 1]);
        assert_eq!(batch.actions[[0, 0]], 2.0);
        assert_eq!(batch.rewards, vec![1.0, -1.0]);
        assert_eq!(batch.mask, vec![1.0, 0.0]);
    }

    #[test]
    fn test_batch_one_hot_actions_row_vectors() {
        let transitions = vec![
            finalized(
                array![0.0],
                ActionSample::OneHot(array![0.0, 1.0, 0.0]),
                0.0,
                false,
            ),
            finalized(
                array![1.0],
                ActionSample::OneHot(array![1.0, 0.0, 0.0]),
                0.0,
                false,
            ),
        ];
        let batch = Batch::from_transitions(&transitions).unwrap();
        assert_eq!(batch.actions.shape(), &[2, 3]);
        assert_eq!(batch.actions[[0, 1]], 1.0);
    }

    #[test]
    fn test_batch_rejects_mixed_dimensions() {
        let transitions = vec![
            finalized(array![0.0, 1.0], ActionSample::Discrete(0), 0.0, false),
            finalized(array![0.0], ActionSample::Discrete(0), 0.0, false),
        ];
        let err = Batch::from_transitions(&transitions).unwrap_err();
        assert!(matches!(err, HermesError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_batch_rejects_pending_transition() {
        let transitions = vec![Transition::pending(array![0.0], ActionSample::Discrete(0))];
        assert!(Batch::from_transitions(&transitions).is_err());
    }
}
