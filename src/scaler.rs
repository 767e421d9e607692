//! Online reward normalization.
//!
//! `RunningScaler` keeps Welford-style running statistics so rewards can be
//! standardized as they stream in, without ever holding the full history.
//! A single instance may be pooled across all workers or each worker may own
//! its own copy; that choice lives in [`crate::config::ScalerSharing`] and the
//! shared case is reached through [`ScalerHandle`] — never through a global.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Welford online mean/variance estimator used for reward standardization.
///
/// State is `(n, mean, s)` where `s` is the running sum of squared deviations.
/// `n` never decreases. All accumulators are f64; inputs and outputs are the
/// f32 rewards used everywhere else in the crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunningScaler {
    n: f64,
    mean: f64,
    s: f64,
    use_mean: bool,
    use_std: bool,
}

impl RunningScaler {
    /// Create a scaler. The flags select whether centering and/or scaling are
    /// applied in `transform`; a disabled statistic is treated as zero.
    pub fn new(use_mean: bool, use_std: bool) -> Self {
        RunningScaler {
            n: 0.0,
            mean: 0.0,
            s: 0.0,
            use_mean,
            use_std,
        }
    }

    /// Compute the mean and std of `values` from scratch, discarding any
    /// previously accumulated state.
    pub fn fit(&mut self, values: &[f32]) {
        self.n = values.len() as f64;
        self.mean = if values.is_empty() {
            0.0
        } else {
            values.iter().map(|&v| v as f64).sum::<f64>() / self.n
        };
        self.s = values
            .iter()
            .map(|&v| (v as f64 - self.mean).powi(2))
            .sum();
    }

    /// Online update of mean and std with a new batch of values.
    pub fn partial_fit(&mut self, values: &[f32]) {
        for &v in values {
            let v = v as f64;
            let mean_prev = self.mean;
            self.n += 1.0;
            self.mean = mean_prev + (v - mean_prev) / self.n;
            self.s += (v - mean_prev) * (v - self.mean);
        }
    }

    /// Standardize `values` by centering and scaling with the accumulated
    /// statistics. With zero accumulated variance this degrades to
    /// mean-centering only, so it never divides by zero.
    pub fn transform(&self, values: &[f32]) -> Vec<f32> {
        let mean = if self.use_mean { self.mean } else { 0.0 };
        values
            .iter()
            .map(|&v| {
                let centered = v as f64 - mean;
                if self.use_std && self.s > 0.0 {
                    (centered / (self.s / self.n).sqrt()) as f32
                } else {
                    centered as f32
                }
            })
            .collect()
    }

    /// Fit to `values`, then transform them.
    pub fn fit_transform(&mut self, values: &[f32]) -> Vec<f32> {
        self.fit(values);
        self.transform(values)
    }

    /// Online update with `values`, then transform them.
    pub fn partial_fit_transform(&mut self, values: &[f32]) -> Vec<f32> {
        self.partial_fit(values);
        self.transform(values)
    }

    pub fn count(&self) -> f64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        if self.n > 0.0 {
            (self.s / self.n).sqrt()
        } else {
            0.0
        }
    }
}

/// Worker-side access to a reward scaler.
///
/// `Shared` pools one scaler across all workers; the fit+transform pair runs
/// under one lock acquisition so concurrent workers cannot interleave between
/// the update and the read.
#[derive(Clone, Debug)]
pub enum ScalerHandle {
    Local(RunningScaler),
    Shared(Arc<Mutex<RunningScaler>>),
}

impl ScalerHandle {
    pub fn partial_fit_transform(&mut self, values: &[f32]) -> Vec<f32> {
        match self {
            ScalerHandle::Local(scaler) => scaler.partial_fit_transform(values),
            ScalerHandle::Shared(scaler) => {
                let mut guard = scaler.lock().expect("reward scaler lock poisoned");
                guard.partial_fit_transform(values)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V: [f32; 4] = [1.0, 1.0, -1.0, -1.0];

    #[test]
    fn test_fit() {
        let mut ss = RunningScaler::new(true, true);
        ss.fit(&V);
        assert_eq!(ss.mean(), 0.0);
        assert_eq!(ss.std(), 1.0);
    }

    #[test]
    fn test_partial_fit() {
        let mut ss = RunningScaler::new(true, true);
        ss.partial_fit(&V);
        assert!(ss.mean().abs() < 1e-12);
        assert!((ss.std() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_transform_is_identity_on_standard_data() {
        let mut ss = RunningScaler::new(true, true);
        let out = ss.fit_transform(&V);
        for (o, v) in out.iter().zip(V.iter()) {
            assert!((o - v).abs() < 1e-6);
        }
    }

    #[test]
    fn test_partial_fit_matches_batch_fit() {
        let v1 = [2.0f32, 4.0, 4.0];
        let v2 = [4.0f32, 5.0, 5.0, 7.0, 9.0];
        let mut all = Vec::new();
        all.extend_from_slice(&v1);
        all.extend_from_slice(&v2);

        let mut online = RunningScaler::new(true, true);
        online.partial_fit(&v1);
        online.partial_fit(&v2);

        let mut batch = RunningScaler::new(true, true);
        batch.fit(&all);

        assert!((online.mean() - batch.mean()).abs() < 1e-9);
        assert!((online.std() - batch.std()).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_degrades_to_centering() {
        let mut ss = RunningScaler::new(true, true);
        let out = ss.partial_fit_transform(&[3.0, 3.0, 3.0]);
        // std is zero: output must be centered, finite, and not NaN
        for o in out {
            assert!(o.is_finite());
            assert_eq!(o, 0.0);
        }
    }

    #[test]
    fn test_disabled_flags_zero_the_statistics() {
        let mut ss = RunningScaler::new(false, false);
        ss.partial_fit(&[10.0, 12.0, 14.0]);
        let out = ss.transform(&[10.0]);
        assert_eq!(out[0], 10.0);
    }

    #[test]
    fn test_count_never_decreases() {
        let mut ss = RunningScaler::new(true, true);
        ss.partial_fit(&[1.0, 2.0]);
        assert_eq!(ss.count(), 2.0);
        ss.partial_fit(&[3.0]);
        assert_eq!(ss.count(), 3.0);
    }

    #[test]
    fn test_shared_handle_fit_transform() {
        let shared = Arc::new(Mutex::new(RunningScaler::new(true, true)));
        let mut h1 = ScalerHandle::Shared(Arc::clone(&shared));
        let mut h2 = ScalerHandle::Shared(Arc::clone(&shared));
        h1.partial_fit_transform(&[1.0, -1.0]);
        h2.partial_fit_transform(&[1.0, -1.0]);
        assert_eq!(shared.lock().unwrap().count(), 4.0);
    }
}
