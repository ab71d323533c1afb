//! Sample consensus motion estimation followed by optional refinement.

use crate::distance::DistanceSe3SymmetricSq;
use crate::models::{AffineModel, HomographyModel, Se3Model};
use crate::refine::{AffineResiduals, HomographyResiduals, LmRefiner, ModelFitter, Se3Residuals};
use cv_core::{AssociatedPair, Ransac, RobustConfig, RobustModel};
use cv_optimize::LMConfig;
use serde::{Deserialize, Serialize};

/// Consensus and refinement settings of a motion estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub robust: RobustConfig,
    /// `None` disables refinement.
    pub refine: Option<LMConfig>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            robust: RobustConfig::default(),
            refine: Some(LMConfig::default()),
        }
    }
}

impl MotionConfig {
    pub fn with_robust(mut self, robust: RobustConfig) -> Self {
        self.robust = robust;
        self
    }

    pub fn with_refine(mut self, refine: Option<LMConfig>) -> Self {
        self.refine = refine;
        self
    }
}

/// Outcome of one successful estimation.
#[derive(Debug, Clone)]
pub struct MotionEstimate<M> {
    pub model: M,
    /// Parallel to the input pairs.
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Mean inlier distance of `model`.
    pub residual: f64,
    /// Mean inlier distance of the consensus model before refinement.
    pub unrefined_residual: f64,
    pub refined: bool,
}

impl<M> MotionEstimate<M> {
    pub fn inlier_pairs(&self, pairs: &[AssociatedPair]) -> Vec<AssociatedPair> {
        pairs
            .iter()
            .zip(self.inliers.iter())
            .filter(|(_, &keep)| keep)
            .map(|(p, _)| *p)
            .collect()
    }
}

/// Estimator without a refinement stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefinement;

impl<M> ModelFitter<M> for NoRefinement {
    fn fit(&self, _initial: &M, _pairs: &[AssociatedPair]) -> Option<M> {
        None
    }
}

/// Fits a motion model to associated pairs with RANSAC and then polishes it
/// over the consensus set.
///
/// Refinement never changes the inlier set. A refined model replaces the
/// consensus model only when its mean inlier distance is lower.
pub struct RobustMotionEstimator<R: RobustModel<AssociatedPair>, F = NoRefinement> {
    model: R,
    ransac: Ransac<AssociatedPair, R>,
    refiner: F,
}

impl<R: RobustModel<AssociatedPair>> RobustMotionEstimator<R, NoRefinement> {
    pub fn new(model: R, config: RobustConfig) -> Self {
        Self {
            model,
            ransac: Ransac::new(config),
            refiner: NoRefinement,
        }
    }
}

impl<R, F> RobustMotionEstimator<R, F>
where
    R: RobustModel<AssociatedPair>,
    F: ModelFitter<R::Model>,
{
    pub fn with_refiner<G: ModelFitter<R::Model>>(self, refiner: G) -> RobustMotionEstimator<R, G> {
        RobustMotionEstimator {
            model: self.model,
            ransac: self.ransac,
            refiner,
        }
    }

    pub fn config(&self) -> &RobustConfig {
        self.ransac.config()
    }

    pub fn model(&self) -> &R {
        &self.model
    }

    /// Access to the model generator, e.g. to change its distance between frames.
    pub fn model_mut(&mut self) -> &mut R {
        &mut self.model
    }

    pub fn refiner(&self) -> &F {
        &self.refiner
    }

    /// `None` when no consensus set reaches the configured minimum.
    pub fn process(&self, pairs: &[AssociatedPair]) -> Option<MotionEstimate<R::Model>> {
        let result = self.ransac.run(&self.model, pairs);
        let Some(model) = result.model else {
            tracing::debug!(pairs = pairs.len(), "motion estimation failed");
            return None;
        };

        let mut estimate = MotionEstimate {
            model,
            inliers: result.inliers,
            num_inliers: result.num_inliers,
            residual: result.residual,
            unrefined_residual: result.residual,
            refined: false,
        };

        let inlier_pairs = estimate.inlier_pairs(pairs);
        if let Some(refined) = self.refiner.fit(&estimate.model, &inlier_pairs) {
            let residual = self.mean_distance(&refined, &inlier_pairs);
            if residual < estimate.unrefined_residual {
                estimate.model = refined;
                estimate.residual = residual;
                estimate.refined = true;
            } else {
                tracing::trace!(
                    before = estimate.unrefined_residual,
                    after = residual,
                    "refined model rejected"
                );
            }
        }

        tracing::debug!(
            pairs = pairs.len(),
            inliers = estimate.num_inliers,
            residual = estimate.residual,
            refined = estimate.refined,
            "motion estimated"
        );
        Some(estimate)
    }

    fn mean_distance(&self, model: &R::Model, pairs: &[AssociatedPair]) -> f64 {
        if pairs.is_empty() {
            return f64::INFINITY;
        }
        let total: f64 = pairs.iter().map(|p| self.model.compute_error(model, p)).sum();
        total / pairs.len() as f64
    }
}

pub type AffineEstimator = RobustMotionEstimator<AffineModel, Option<LmRefiner<AffineResiduals>>>;
pub type HomographyEstimator =
    RobustMotionEstimator<HomographyModel, Option<LmRefiner<HomographyResiduals>>>;
pub type Se3Estimator = RobustMotionEstimator<Se3Model, Option<LmRefiner<Se3Residuals>>>;

pub fn affine_estimator(config: &MotionConfig) -> AffineEstimator {
    RobustMotionEstimator::new(AffineModel, config.robust.clone())
        .with_refiner(config.refine.clone().map(|lm| LmRefiner::new(AffineResiduals, lm)))
}

pub fn homography_estimator(config: &MotionConfig) -> HomographyEstimator {
    RobustMotionEstimator::new(HomographyModel, config.robust.clone())
        .with_refiner(config.refine.clone().map(|lm| LmRefiner::new(HomographyResiduals, lm)))
}

/// Rigid body motion between normalized image coordinates, scored by the
/// symmetric reprojection error `distance`.
pub fn se3_estimator(config: &MotionConfig, distance: DistanceSe3SymmetricSq) -> Se3Estimator {
    RobustMotionEstimator::new(Se3Model::new(distance), config.robust.clone()).with_refiner(
        config
            .refine
            .clone()
            .map(|lm| LmRefiner::new(Se3Residuals::new(distance), lm)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cv_core::Affine2D;
    use nalgebra::Point2;

    fn affine_pairs(truth: &Affine2D) -> Vec<AssociatedPair> {
        (0..12)
            .map(|i| {
                let p = Point2::new((i % 4) as f64 * 20.0, (i / 4) as f64 * 15.0 + (i % 3) as f64);
                AssociatedPair::new(p, truth.transform_point(&p))
            })
            .collect()
    }

    #[test]
    fn affine_consensus_ignores_outliers() {
        let truth = Affine2D::new(0.98, 0.03, -0.02, 1.01, 5.0, -2.0);
        let mut pairs = affine_pairs(&truth);
        pairs[3].p2.x += 40.0;
        pairs[7].p2.y -= 25.0;

        let config = MotionConfig::default()
            .with_robust(RobustConfig::default().with_threshold(0.5).with_max_iterations(300));
        let estimate = affine_estimator(&config).process(&pairs).unwrap();

        assert_eq!(estimate.num_inliers, 10);
        assert!(!estimate.inliers[3]);
        assert!(!estimate.inliers[7]);
        assert!(estimate.residual <= estimate.unrefined_residual);
        assert_relative_eq!(estimate.model.a, truth.a, epsilon = 1e-6);
        assert_relative_eq!(estimate.model.t, truth.t, epsilon = 1e-4);
    }

    #[test]
    fn refinement_does_not_change_consensus() {
        let truth = Affine2D::new(1.0, 0.0, 0.0, 1.0, 3.0, 1.0);
        let mut pairs = affine_pairs(&truth);
        for (i, p) in pairs.iter_mut().enumerate() {
            p.p2.x += if i % 2 == 0 { 0.05 } else { -0.05 };
        }

        let config = MotionConfig::default()
            .with_robust(RobustConfig::default().with_threshold(1.0).with_max_iterations(50));
        let unrefined = affine_estimator(&config.clone().with_refine(None))
            .process(&pairs)
            .unwrap();
        let refined = affine_estimator(&config).process(&pairs).unwrap();

        assert!(!unrefined.refined);
        assert_eq!(unrefined.residual, unrefined.unrefined_residual);
        assert_eq!(refined.inliers, unrefined.inliers);
        assert!(refined.refined);
        assert!(refined.residual < unrefined.residual);
    }

    #[test]
    fn too_few_pairs_fail() {
        let pairs = vec![AssociatedPair::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)); 3];
        assert!(homography_estimator(&MotionConfig::default())
            .process(&pairs)
            .is_none());
        assert!(RobustMotionEstimator::new(AffineModel, RobustConfig::default())
            .process(&[])
            .is_none());
    }

    #[test]
    fn config_without_refinement_loads() {
        let config: MotionConfig =
            serde_json::from_str(r#"{ "robust": { "threshold": 2.0 }, "refine": null }"#).unwrap();
        assert_eq!(config.robust.threshold, 2.0);
        assert!(config.refine.is_none());
    }
}
