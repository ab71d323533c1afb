//! Per-pair error of a motion model, used to score consensus.

use crate::triangulation::triangulate_two_views;
use cv_core::{Affine2D, AssociatedPair, Homography2D, Se3};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Converts a normalized image coordinate error into pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelScale {
    pub fx: f64,
    pub fy: f64,
    pub skew: f64,
}

impl PixelScale {
    pub fn new(fx: f64, fy: f64, skew: f64) -> Self {
        Self { fx, fy, skew }
    }

    /// Squared pixel distance between two normalized points.
    pub fn error_sq(&self, observed: &Point2<f64>, predicted: &Point2<f64>) -> f64 {
        let (dx, dy) = self.error(observed, predicted);
        dx * dx + dy * dy
    }

    pub fn error(&self, observed: &Point2<f64>, predicted: &Point2<f64>) -> (f64, f64) {
        let dx = observed.x - predicted.x;
        let dy = observed.y - predicted.y;
        (self.fx * dx + self.skew * dy, self.fy * dy)
    }
}

impl Default for PixelScale {
    fn default() -> Self {
        Self::new(1.0, 1.0, 0.0)
    }
}

/// Symmetric squared reprojection error of a pair under a rigid body motion.
///
/// The pair is triangulated in the key frame and reprojected into both views.
/// A point behind either camera scores `f64::MAX`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DistanceSe3SymmetricSq {
    pub key: PixelScale,
    pub curr: PixelScale,
}

impl DistanceSe3SymmetricSq {
    pub fn new(key: PixelScale, curr: PixelScale) -> Self {
        Self { key, curr }
    }

    /// Reprojection residuals `[key_dx, key_dy, curr_dx, curr_dy]` in pixels,
    /// or `None` when the point cannot be triangulated in front of both views.
    pub fn residuals(&self, key_to_curr: &Se3, pair: &AssociatedPair) -> Option<[f64; 4]> {
        let p = triangulate_two_views(&pair.p1, &pair.p2, key_to_curr).ok()?;
        if p.z <= 0.0 {
            return None;
        }
        let (kx, ky) = self.key.error(&pair.p1, &Point2::new(p.x / p.z, p.y / p.z));

        let c = key_to_curr.transform_point(&p);
        if c.z <= 0.0 {
            return None;
        }
        let (cx, cy) = self.curr.error(&pair.p2, &Point2::new(c.x / c.z, c.y / c.z));
        Some([kx, ky, cx, cy])
    }

    pub fn distance(&self, key_to_curr: &Se3, pair: &AssociatedPair) -> f64 {
        match self.residuals(key_to_curr, pair) {
            Some(r) => r.iter().map(|v| v * v).sum(),
            None => f64::MAX,
        }
    }
}

/// Squared transfer error of `p1` mapped onto `p2`.
pub fn affine_distance_sq(model: &Affine2D, pair: &AssociatedPair) -> f64 {
    (model.transform_point(&pair.p1) - pair.p2).norm_squared()
}

/// Squared transfer error of `p1` mapped onto `p2`, `f64::MAX` if it maps to infinity.
pub fn homography_distance_sq(model: &Homography2D, pair: &AssociatedPair) -> f64 {
    match model.transform_point(&pair.p1) {
        Some(p) => (p - pair.p2).norm_squared(),
        None => f64::MAX,
    }
}
