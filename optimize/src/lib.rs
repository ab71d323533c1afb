//! Dense Levenberg-Marquardt over a small parameter vector.
//!
//! The Jacobian is estimated with forward differences, one column per
//! parameter evaluated in parallel. Steps are only taken when they lower the
//! sum of squared residuals, so the returned cost never exceeds the initial one.

use cv_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LMConfig {
    pub max_iters: usize,
    /// Initial damping.
    pub lambda: f64,
    /// Stop when the relative cost decrease or the step norm falls below this.
    pub tolerance: f64,
}

impl Default for LMConfig {
    fn default() -> Self {
        Self {
            max_iters: 50,
            lambda: 0.001,
            tolerance: 1e-10,
        }
    }
}

impl LMConfig {
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Maps a model to and from its parameter vector.
pub trait ModelCodec<M>: Sync {
    fn param_len(&self) -> usize;

    fn encode(&self, model: &M) -> DVector<f64>;

    fn decode(&self, params: &DVector<f64>) -> M;
}

#[derive(Debug, Clone)]
pub struct LMOutcome {
    pub params: DVector<f64>,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl LMOutcome {
    pub fn improved(&self) -> bool {
        self.final_cost < self.initial_cost
    }
}

const JACOBIAN_EPS: f64 = 1e-7;

pub struct LevenbergMarquardt {
    pub config: LMConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LMConfig) -> Self {
        Self { config }
    }

    /// Minimizes the squared norm of `residuals(params, out)`, which writes
    /// `num_residuals` values into `out`.
    pub fn minimize<F>(
        &self,
        initial: DVector<f64>,
        num_residuals: usize,
        residuals: F,
    ) -> Result<LMOutcome>
    where
        F: Fn(&DVector<f64>, &mut [f64]) + Sync,
    {
        let n_params = initial.len();
        if n_params == 0 || num_residuals == 0 {
            return Err(Error::InvalidArgument(
                "least squares needs at least one parameter and one residual".to_string(),
            ));
        }

        let eval = |p: &DVector<f64>| {
            let mut r = DVector::zeros(num_residuals);
            residuals(p, r.as_mut_slice());
            r
        };

        let mut params = initial;
        let mut r = eval(&params);
        let mut current_err = r.norm_squared();
        if !current_err.is_finite() {
            return Err(Error::Numerical(
                "initial residuals are not finite".to_string(),
            ));
        }

        let initial_cost = current_err;
        let mut lambda = self.config.lambda;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.config.max_iters {
            iterations += 1;

            let columns: Vec<DVector<f64>> = (0..n_params)
                .into_par_iter()
                .map(|k| {
                    let mut perturbed = params.clone();
                    perturbed[k] += JACOBIAN_EPS;
                    (eval(&perturbed) - &r) / JACOBIAN_EPS
                })
                .collect();
            let jac = DMatrix::from_columns(&columns);

            let jtj = jac.transpose() * &jac;
            let jtr = jac.transpose() * &r;

            let mut lhs = jtj.clone();
            for i in 0..n_params {
                lhs[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }

            let Some(delta) = lhs.lu().solve(&jtr) else {
                lambda *= 10.0;
                continue;
            };

            let next_params = &params - &delta;
            let next_r = eval(&next_params);
            let next_err = next_r.norm_squared();

            if next_err.is_finite() && next_err < current_err {
                let decrease = (current_err - next_err) / current_err.max(f64::MIN_POSITIVE);
                params = next_params;
                r = next_r;
                current_err = next_err;
                lambda /= 10.0;
                if decrease < self.config.tolerance || delta.norm() < self.config.tolerance {
                    converged = true;
                    break;
                }
            } else {
                lambda *= 10.0;
                if lambda > 1e16 {
                    converged = true;
                    break;
                }
            }
        }

        tracing::trace!(
            initial_cost,
            final_cost = current_err,
            iterations,
            converged,
            "levenberg-marquardt finished"
        );

        Ok(LMOutcome {
            params,
            initial_cost,
            final_cost: current_err,
            iterations,
            converged,
        })
    }

    /// Refines a model through its codec. Returns the model decoded from the
    /// best parameters found and the outcome.
    pub fn minimize_model<M, C, F>(
        &self,
        codec: &C,
        initial: &M,
        num_residuals: usize,
        residuals: F,
    ) -> Result<(M, LMOutcome)>
    where
        C: ModelCodec<M>,
        F: Fn(&M, &mut [f64]) + Sync,
    {
        let start = codec.encode(initial);
        if start.len() != codec.param_len() {
            return Err(Error::InvalidArgument(format!(
                "codec produced {} parameters, expected {}",
                start.len(),
                codec.param_len()
            )));
        }
        let outcome = self.minimize(start, num_residuals, |p, out| {
            residuals(&codec.decode(p), out)
        })?;
        Ok((codec.decode(&outcome.params), outcome))
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new(LMConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn exp_samples() -> Vec<(f64, f64)> {
        (0..20)
            .map(|i| {
                let x = i as f64 * 0.1;
                (x, 2.0 * (-1.5 * x).exp() + 0.5)
            })
            .collect()
    }

    #[test]
    fn fits_exponential_decay() {
        let data = exp_samples();
        let lm = LevenbergMarquardt::new(LMConfig::default().with_max_iters(100));
        let outcome = lm
            .minimize(DVector::from_vec(vec![1.0, -0.5, 0.0]), data.len(), |p, out| {
                for (o, (x, y)) in out.iter_mut().zip(data.iter()) {
                    *o = p[0] * (p[1] * x).exp() + p[2] - y;
                }
            })
            .unwrap();

        assert!(outcome.improved());
        assert!(outcome.final_cost < 1e-10);
        assert_relative_eq!(outcome.params[0], 2.0, epsilon = 1e-3);
        assert_relative_eq!(outcome.params[1], -1.5, epsilon = 1e-3);
        assert_relative_eq!(outcome.params[2], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn never_worsens_at_optimum() {
        let lm = LevenbergMarquardt::new(LMConfig::default().with_max_iters(5));
        let outcome = lm
            .minimize(DVector::from_vec(vec![3.0]), 2, |p, out| {
                out[0] = p[0] - 3.0;
                out[1] = 2.0 * (p[0] - 3.0);
            })
            .unwrap();
        assert!(outcome.final_cost <= outcome.initial_cost);
        assert_relative_eq!(outcome.params[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_non_finite_start() {
        let lm = LevenbergMarquardt::default();
        let result = lm.minimize(DVector::from_vec(vec![0.0]), 1, |_, out| out[0] = f64::NAN);
        assert!(result.is_err());
    }

    struct LineCodec;

    impl ModelCodec<(f64, f64)> for LineCodec {
        fn param_len(&self) -> usize {
            2
        }

        fn encode(&self, model: &(f64, f64)) -> DVector<f64> {
            DVector::from_vec(vec![model.0, model.1])
        }

        fn decode(&self, params: &DVector<f64>) -> (f64, f64) {
            (params[0], params[1])
        }
    }

    #[test]
    fn refines_through_codec() {
        let points = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
        let lm = LevenbergMarquardt::default();
        let (line, outcome) = lm
            .minimize_model(&LineCodec, &(0.0, 0.0), points.len(), |m, out| {
                for (o, (x, y)) in out.iter_mut().zip(points.iter()) {
                    *o = m.0 * x + m.1 - y;
                }
            })
            .unwrap();
        assert!(outcome.improved());
        assert_relative_eq!(line.0, 2.0, epsilon = 1e-6);
        assert_relative_eq!(line.1, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn config_loads_with_defaults() {
        let config: LMConfig = serde_json::from_str(r#"{ "max_iters": 7 }"#).unwrap();
        assert_eq!(config.max_iters, 7);
        assert_eq!(config.lambda, 0.001);
    }
}
