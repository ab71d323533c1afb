//! Nonlinear refinement of a motion model over its consensus set.

use crate::distance::DistanceSe3SymmetricSq;
use cv_core::{Affine2D, AssociatedPair, Homography2D, Se3};
use cv_optimize::{LMConfig, LevenbergMarquardt, ModelCodec};
use nalgebra::{DVector, Matrix3, Rotation3, Unit, Vector3};

/// Fits a model to a set of pairs starting from an initial estimate.
pub trait ModelFitter<M> {
    /// `None` when fitting fails or does not improve on `initial`.
    fn fit(&self, initial: &M, pairs: &[AssociatedPair]) -> Option<M>;
}

/// `None` stands for "no refinement configured".
impl<M, F: ModelFitter<M>> ModelFitter<M> for Option<F> {
    fn fit(&self, initial: &M, pairs: &[AssociatedPair]) -> Option<M> {
        self.as_ref()?.fit(initial, pairs)
    }
}

/// Per-pair residuals of a model and how to parameterize it.
pub trait ResidualModel<M>: Sync {
    type Codec: ModelCodec<M>;

    fn codec(&self, initial: &M) -> Self::Codec;

    fn residuals_per_pair(&self) -> usize;

    fn residuals(&self, model: &M, pair: &AssociatedPair, out: &mut [f64]);
}

/// Levenberg-Marquardt refinement of any [`ResidualModel`].
pub struct LmRefiner<R> {
    residual: R,
    lm: LevenbergMarquardt,
}

impl<R> LmRefiner<R> {
    pub fn new(residual: R, config: LMConfig) -> Self {
        Self {
            residual,
            lm: LevenbergMarquardt::new(config),
        }
    }
}

impl<M, R: ResidualModel<M>> ModelFitter<M> for LmRefiner<R> {
    fn fit(&self, initial: &M, pairs: &[AssociatedPair]) -> Option<M> {
        let k = self.residual.residuals_per_pair();
        let codec = self.residual.codec(initial);
        let result = self
            .lm
            .minimize_model(&codec, initial, pairs.len() * k, |model, out| {
                for (pair, chunk) in pairs.iter().zip(out.chunks_mut(k)) {
                    self.residual.residuals(model, pair, chunk);
                }
            });

        match result {
            Ok((model, outcome)) if outcome.improved() => {
                tracing::trace!(
                    before = outcome.initial_cost,
                    after = outcome.final_cost,
                    iterations = outcome.iterations,
                    "refinement accepted"
                );
                Some(model)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "refinement failed");
                None
            }
        }
    }
}

/// Parameters `[a11, a12, a21, a22, tx, ty]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AffineCodec;

impl ModelCodec<Affine2D> for AffineCodec {
    fn param_len(&self) -> usize {
        6
    }

    fn encode(&self, m: &Affine2D) -> DVector<f64> {
        DVector::from_vec(vec![m.a[(0, 0)], m.a[(0, 1)], m.a[(1, 0)], m.a[(1, 1)], m.t.x, m.t.y])
    }

    fn decode(&self, p: &DVector<f64>) -> Affine2D {
        Affine2D::new(p[0], p[1], p[2], p[3], p[4], p[5])
    }
}

/// Transfer error of `p1` onto `p2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AffineResiduals;

impl ResidualModel<Affine2D> for AffineResiduals {
    type Codec = AffineCodec;

    fn codec(&self, _initial: &Affine2D) -> AffineCodec {
        AffineCodec
    }

    fn residuals_per_pair(&self) -> usize {
        2
    }

    fn residuals(&self, model: &Affine2D, pair: &AssociatedPair, out: &mut [f64]) {
        let d = model.transform_point(&pair.p1) - pair.p2;
        out[0] = d.x;
        out[1] = d.y;
    }
}

/// The eight entries of a homography with `h33` fixed to one.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyCodec;

impl ModelCodec<Homography2D> for HomographyCodec {
    fn param_len(&self) -> usize {
        8
    }

    fn encode(&self, m: &Homography2D) -> DVector<f64> {
        let h = m.normalized().h;
        DVector::from_iterator(8, h.transpose().iter().take(8).copied())
    }

    fn decode(&self, p: &DVector<f64>) -> Homography2D {
        Homography2D::new(Matrix3::new(p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], 1.0))
    }
}

const INVALID_RESIDUAL: f64 = 1e3;

#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyResiduals;

impl ResidualModel<Homography2D> for HomographyResiduals {
    type Codec = HomographyCodec;

    fn codec(&self, _initial: &Homography2D) -> HomographyCodec {
        HomographyCodec
    }

    fn residuals_per_pair(&self) -> usize {
        2
    }

    fn residuals(&self, model: &Homography2D, pair: &AssociatedPair, out: &mut [f64]) {
        match model.transform_point(&pair.p1) {
            Some(p) => {
                out[0] = p.x - pair.p2.x;
                out[1] = p.y - pair.p2.y;
            }
            None => out.fill(INVALID_RESIDUAL),
        }
    }
}

/// Rigid body motion with known translation norm.
///
/// Parameters are the rotation vector followed by two coordinates on the plane
/// tangent to the initial translation direction, so scale is not a free
/// parameter.
#[derive(Debug, Clone, Copy)]
pub struct Se3Codec {
    scale: f64,
    base: Vector3<f64>,
    b1: Vector3<f64>,
    b2: Vector3<f64>,
}

impl Se3Codec {
    /// Parameterizes around `direction`. A zero direction falls back to the optical axis.
    pub fn around(direction: &Vector3<f64>, scale: f64) -> Self {
        let base = Unit::try_new(*direction, 1e-12)
            .map(|u| u.into_inner())
            .unwrap_or_else(Vector3::z);
        let helper = if base.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let b1 = base.cross(&helper).normalize();
        let b2 = base.cross(&b1);
        Self {
            scale,
            base,
            b1,
            b2,
        }
    }

    pub fn for_model(model: &Se3) -> Self {
        let norm = model.translation.norm();
        Self::around(&model.translation, if norm > 1e-12 { norm } else { 1.0 })
    }
}

impl ModelCodec<Se3> for Se3Codec {
    fn param_len(&self) -> usize {
        5
    }

    fn encode(&self, m: &Se3) -> DVector<f64> {
        let omega = m.rotation_vector();
        let u = Unit::try_new(m.translation, 1e-12)
            .map(|u| u.into_inner())
            .unwrap_or(self.base);
        let along = u.dot(&self.base).max(1e-12);
        DVector::from_vec(vec![
            omega.x,
            omega.y,
            omega.z,
            u.dot(&self.b1) / along,
            u.dot(&self.b2) / along,
        ])
    }

    fn decode(&self, p: &DVector<f64>) -> Se3 {
        let dir = (self.base + self.b1 * p[3] + self.b2 * p[4]).normalize();
        Se3::new(
            Rotation3::new(Vector3::new(p[0], p[1], p[2])).into_inner(),
            dir * self.scale,
        )
    }
}

/// Symmetric reprojection residuals of the triangulated point, in pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Se3Residuals {
    pub distance: DistanceSe3SymmetricSq,
}

impl Se3Residuals {
    pub fn new(distance: DistanceSe3SymmetricSq) -> Self {
        Self { distance }
    }
}

impl ResidualModel<Se3> for Se3Residuals {
    type Codec = Se3Codec;

    fn codec(&self, initial: &Se3) -> Se3Codec {
        Se3Codec::for_model(initial)
    }

    fn residuals_per_pair(&self) -> usize {
        4
    }

    fn residuals(&self, model: &Se3, pair: &AssociatedPair, out: &mut [f64]) {
        match self.distance.residuals(model, pair) {
            Some(r) => out.copy_from_slice(&r),
            None => out.fill(INVALID_RESIDUAL),
        }
    }
}

/// Sampson approximation of the epipolar error of a pair under `E = [t]x R`.
pub fn sampson_error(motion: &Se3, pair: &AssociatedPair) -> f64 {
    let e = cv_core::skew_symmetric(&motion.translation) * motion.rotation;
    let x1 = pair.p1.to_homogeneous();
    let x2 = pair.p2.to_homogeneous();
    let ex1 = e * x1;
    let etx2 = e.transpose() * x2;
    let denom = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;
    if denom <= f64::EPSILON {
        return 0.0;
    }
    x2.dot(&ex1) / denom.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Point3};

    #[test]
    fn se3_codec_round_trips() {
        let m = Se3::from_rotation_vector(Vector3::new(0.1, -0.05, 0.2), Vector3::new(0.3, -0.4, 1.2));
        let codec = Se3Codec::around(&Vector3::new(0.0, 0.0, 1.0), m.translation.norm());
        let back = codec.decode(&codec.encode(&m));
        assert_relative_eq!(back.rotation, m.rotation, epsilon = 1e-9);
        assert_relative_eq!(back.translation, m.translation, epsilon = 1e-9);
    }

    #[test]
    fn homography_codec_round_trips() {
        let h = Homography2D::new(Matrix3::new(1.1, 0.1, 5.0, -0.05, 0.9, 2.0, 1e-3, 2e-3, 1.0));
        let back = HomographyCodec.decode(&HomographyCodec.encode(&h));
        assert_relative_eq!(back.h, h.h, epsilon = 1e-12);
    }

    #[test]
    fn affine_refinement_reduces_error() {
        let truth = Affine2D::new(1.05, 0.02, -0.03, 0.97, 2.0, -1.0);
        let pairs: Vec<AssociatedPair> = (0..10)
            .map(|i| {
                let p = Point2::new(i as f64 * 3.0, (i * i) as f64 * 0.7);
                AssociatedPair::new(p, truth.transform_point(&p))
            })
            .collect();
        let start = Affine2D::new(1.0, 0.0, 0.0, 1.0, 1.5, -0.5);

        let refiner = LmRefiner::new(AffineResiduals, LMConfig::default());
        let fitted = refiner.fit(&start, &pairs).unwrap();
        assert_relative_eq!(fitted.a, truth.a, epsilon = 1e-6);
        assert_relative_eq!(fitted.t, truth.t, epsilon = 1e-5);
    }

    #[test]
    fn refinement_at_optimum_reports_no_improvement() {
        let truth = Affine2D::new(1.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let pairs: Vec<AssociatedPair> = (0..4)
            .map(|i| {
                let p = Point2::new(i as f64, 2.0 * i as f64 + 1.0);
                AssociatedPair::new(p, truth.transform_point(&p))
            })
            .collect();
        let refiner = LmRefiner::new(AffineResiduals, LMConfig::default());
        assert!(refiner.fit(&truth, &pairs).is_none());

        let absent: Option<LmRefiner<AffineResiduals>> = None;
        assert!(absent.fit(&truth, &pairs).is_none());
    }

    #[test]
    fn sampson_vanishes_on_epipolar_pairs() {
        let motion = Se3::from_rotation_vector(Vector3::new(0.02, 0.01, 0.0), Vector3::new(1.0, 0.0, 0.1));
        let x = Point3::new(0.3, -0.2, 4.0);
        let c = motion.transform_point(&x);
        let pair = AssociatedPair::new(Point2::new(x.x / x.z, x.y / x.z), Point2::new(c.x / c.z, c.y / c.z));
        assert!(sampson_error(&motion, &pair).abs() < 1e-12);

        let off = AssociatedPair::new(pair.p1, Point2::new(pair.p2.x, pair.p2.y + 0.01));
        assert!(sampson_error(&motion, &off).abs() > 1e-4);
    }
}
