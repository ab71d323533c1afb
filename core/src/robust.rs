//! Robust Estimation Module
//!
//! Provides a generic RANSAC implementation that can be used for any model estimation task.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Configuration for robust estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustConfig {
    /// A sample is an inlier when its distance is strictly below this value.
    pub threshold: f64,
    pub max_iterations: usize,
    /// Stop early once this fraction of the data agrees with a model.
    pub confidence: f64,
    /// Smallest consensus set that counts as a successful fit.
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            max_iterations: 1000,
            confidence: 0.99,
            min_inliers: 0,
            seed: 0xB00F,
        }
    }
}

impl RobustConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_min_inliers(mut self, min_inliers: usize) -> Self {
        self.min_inliers = min_inliers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Mean distance over the inliers.
    pub residual: f64,
}

impl<M> RobustResult<M> {
    fn failed(n: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
        }
    }

    /// Copies out the data flagged as inliers.
    pub fn inlier_set<D: Clone>(&self, data: &[D]) -> Vec<D> {
        data.iter()
            .zip(self.inliers.iter())
            .filter(|(_, &keep)| keep)
            .map(|(d, _)| d.clone())
            .collect()
    }
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a minimal sample
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Every model consistent with a minimal sample. Generators with more
    /// than one solution override this, consensus scores each of them.
    fn estimate_all(&self, data: &[&D]) -> Vec<Self::Model> {
        self.estimate(data).into_iter().collect()
    }

    /// Non-negative error of a single data point against the model. Geometrically
    /// invalid configurations return `f64::MAX`.
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &RobustConfig {
        &self.config
    }

    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();
        let min_inliers = self.config.min_inliers.max(k);

        if n < k || k == 0 {
            tracing::debug!(samples = n, required = k, "too few samples for consensus");
            return RobustResult::failed(n);
        }

        let mut best_model = None;
        let mut best_inliers = vec![false; n];
        let mut best_num_inliers = 0;
        let mut best_residual = f64::INFINITY;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..n).collect();

        'search: for _ in 0..self.config.max_iterations {
            // 1. Sample
            indices.shuffle(&mut rng);
            let sample: Vec<&D> = indices[..k].iter().map(|&i| &data[i]).collect();

            // 2. Estimate
            for model in estimator.estimate_all(&sample) {
                // 3. Score
                let mut inliers = vec![false; n];
                let mut num_inliers = 0;
                let mut total_error = 0.0;

                for (j, d) in data.iter().enumerate() {
                    let err = estimator.compute_error(&model, d);
                    if err < self.config.threshold {
                        inliers[j] = true;
                        num_inliers += 1;
                        total_error += err;
                    }
                }

                let residual = if num_inliers > 0 {
                    total_error / num_inliers as f64
                } else {
                    f64::INFINITY
                };

                if num_inliers > best_num_inliers
                    || (num_inliers == best_num_inliers && residual < best_residual)
                {
                    best_num_inliers = num_inliers;
                    best_inliers = inliers;
                    best_model = Some(model);
                    best_residual = residual;

                    // Early exit check
                    if num_inliers as f64 >= n as f64 * self.config.confidence {
                        break 'search;
                    }
                }
            }
        }

        if best_num_inliers < min_inliers {
            tracing::debug!(
                inliers = best_num_inliers,
                required = min_inliers,
                "no consensus set found"
            );
            return RobustResult::failed(n);
        }

        tracing::trace!(
            inliers = best_num_inliers,
            samples = n,
            residual = best_residual,
            "consensus found"
        );

        RobustResult {
            model: best_model,
            inliers: best_inliers,
            num_inliers: best_num_inliers,
            residual: best_residual,
        }
    }
}
