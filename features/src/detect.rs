//! Interest point detection contract.

use crate::Result;
use cv_core::AnyImage;
use nalgebra::Point2;

/// Automatic interest point detection with optional scale and orientation.
///
/// Results of the last [`detect`](InterestPointDetector::detect) call are
/// addressed by index until the next call.
pub trait InterestPointDetector {
    /// Detects interest points inside the image. Zero sized or unsupported
    /// images are an error.
    fn detect(&mut self, image: &AnyImage) -> Result<()>;

    /// Number of interest points found by the last detection.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Center of the feature in image pixels.
    fn location(&self, index: usize) -> Point2<f64>;

    /// Size relative to [`canonical_radius`](InterestPointDetector::canonical_radius).
    /// Detectors without scale return 1.
    fn scale(&self, _index: usize) -> f64 {
        1.0
    }

    /// Orientation in radians. Detectors without orientation return 0.
    fn orientation(&self, _index: usize) -> f64 {
        0.0
    }

    /// Radius in pixels of a feature at scale one.
    fn canonical_radius(&self) -> f64;

    fn has_scale(&self) -> bool {
        false
    }

    fn has_orientation(&self) -> bool {
        false
    }
}

/// Detections handed over directly by the caller, e.g. from an external detector.
#[derive(Debug, Clone, Default)]
pub struct PresetDetections {
    pub points: Vec<Point2<f64>>,
    pub radius: f64,
}

impl PresetDetections {
    pub fn new(points: Vec<Point2<f64>>) -> Self {
        Self { points, radius: 1.0 }
    }

    pub fn set_points(&mut self, points: Vec<Point2<f64>>) {
        self.points = points;
    }
}

impl InterestPointDetector for PresetDetections {
    fn detect(&mut self, image: &AnyImage) -> Result<()> {
        image.ensure_not_empty()?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn location(&self, index: usize) -> Point2<f64> {
        self.points[index]
    }

    fn canonical_radius(&self) -> f64 {
        self.radius
    }
}
