use crate::detect::InterestPointDetector;
use crate::{FeatureError, Result};
use cv_core::{AnyImage, KeyPoint, KeyPoints};
use image::GrayImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

const CIRCLE_OFFSETS: [(i32, i32); 12] = [
    (-3, 0),
    (-2, 1),
    (-1, 2),
    (0, 3),
    (1, 2),
    (2, 1),
    (3, 0),
    (2, -1),
    (1, -2),
    (0, -3),
    (-1, -2),
    (-2, -1),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastConfig {
    pub threshold: u8,
    /// Minimum number of circle pixels brighter or darker than the center.
    pub min_count: u32,
    pub max_keypoints: usize,
}

impl Default for FastConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            min_count: 9,
            max_keypoints: 500,
        }
    }
}

pub fn fast_detect(image: &GrayImage, config: &FastConfig) -> KeyPoints {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let mut keypoints = KeyPoints::new();

    for y in 3..height - 3 {
        for x in 3..width - 3 {
            let score = fast_score(image, x, y, config.threshold);
            if score >= config.min_count {
                keypoints.push(KeyPoint::new(x as f64, y as f64).with_response(score as f64));
            }
        }
    }

    keypoints.retain_strongest(config.max_keypoints);
    keypoints
}

/// Larger of the number of circle pixels brighter or darker than the center.
pub fn fast_score(image: &GrayImage, x: i32, y: i32, threshold: u8) -> u32 {
    let p = image.get_pixel(x as u32, y as u32)[0];

    let mut brighter = 0u32;
    let mut darker = 0u32;

    for &(dx, dy) in &CIRCLE_OFFSETS {
        let px = x + dx;
        let py = y + dy;

        if px >= 0 && px < image.width() as i32 && py >= 0 && py < image.height() as i32 {
            let val = image.get_pixel(px as u32, py as u32)[0];

            if val > p.saturating_add(threshold) {
                brighter += 1;
            } else if val < p.saturating_sub(threshold) {
                darker += 1;
            }
        }
    }

    brighter.max(darker)
}

/// FAST corners exposed through the detector contract. Requires 8-bit gray input.
pub struct FastDetector {
    config: FastConfig,
    found: KeyPoints,
}

impl FastDetector {
    pub fn new(config: FastConfig) -> Self {
        Self {
            config,
            found: KeyPoints::new(),
        }
    }

    pub fn keypoints(&self) -> &KeyPoints {
        &self.found
    }
}

impl InterestPointDetector for FastDetector {
    fn detect(&mut self, image: &AnyImage) -> Result<()> {
        if !(1..=CIRCLE_OFFSETS.len() as u32).contains(&self.config.min_count) {
            return Err(FeatureError::DetectionError(format!(
                "FAST arc length must be within 1..={}, got {}",
                CIRCLE_OFFSETS.len(),
                self.config.min_count
            )));
        }
        image.ensure_not_empty()?;
        let gray = image.as_gray_u8()?;
        self.found = fast_detect(gray, &self.config);
        tracing::trace!(corners = self.found.len(), "fast detection");
        Ok(())
    }

    fn len(&self) -> usize {
        self.found.len()
    }

    fn location(&self, index: usize) -> Point2<f64> {
        self.found.keypoints[index].pt()
    }

    fn canonical_radius(&self) -> f64 {
        3.0
    }
}
