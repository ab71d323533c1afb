//! Region description contract and a pixel-region NCC describer.

use crate::Result;
use cv_core::{AnyImage, NccFeature, TupleDesc};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Computes a fixed-shape description of the region around a point.
///
/// `describe` borrows the image immutably so candidates can be described in parallel.
pub trait DescribeRegionPoint: Sync {
    type Descriptor: TupleDesc;

    /// Checks the image once per frame before any region is described.
    fn validate(&self, image: &AnyImage) -> Result<()> {
        image.ensure_not_empty()?;
        Ok(())
    }

    /// `None` when the region cannot be described, e.g. it falls outside the image.
    fn describe(
        &self,
        image: &AnyImage,
        location: Point2<f64>,
        scale: f64,
        orientation: f64,
    ) -> Option<Self::Descriptor>;

    /// Number of elements in every descriptor produced.
    fn descriptor_length(&self) -> usize;

    fn requires_scale(&self) -> bool {
        false
    }

    fn requires_orientation(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelRegionConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for PixelRegionConfig {
    fn default() -> Self {
        Self {
            width: 5,
            height: 5,
        }
    }
}

/// Describes a rectangular pixel region for normalized cross correlation.
pub struct PixelRegionNcc {
    config: PixelRegionConfig,
}

impl PixelRegionNcc {
    pub fn new(config: PixelRegionConfig) -> Self {
        Self { config }
    }

    fn radius(&self) -> (i64, i64) {
        (self.config.width as i64 / 2, self.config.height as i64 / 2)
    }
}

impl DescribeRegionPoint for PixelRegionNcc {
    type Descriptor = NccFeature;

    fn describe(
        &self,
        image: &AnyImage,
        location: Point2<f64>,
        _scale: f64,
        _orientation: f64,
    ) -> Option<NccFeature> {
        let (rx, ry) = self.radius();
        let cx = location.x.round() as i64;
        let cy = location.y.round() as i64;
        let (w, h) = (image.width() as i64, image.height() as i64);
        if cx - rx < 0 || cy - ry < 0 || cx + rx >= w || cy + ry >= h {
            return None;
        }

        let mut raw = Vec::with_capacity(self.descriptor_length());
        for y in (cy - ry)..=(cy + ry) {
            for x in (cx - rx)..=(cx + rx) {
                raw.push(image.intensity(x as u32, y as u32) as f64);
            }
        }
        Some(NccFeature::from_intensities(&raw))
    }

    fn descriptor_length(&self) -> usize {
        let (rx, ry) = self.radius();
        ((2 * rx + 1) * (2 * ry + 1)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gradient_image() -> AnyImage {
        let mut img = GrayImage::new(20, 20);
        for y in 0..20 {
            for x in 0..20 {
                img.put_pixel(x, y, Luma([(x * 10 + y) as u8]));
            }
        }
        AnyImage::from(img)
    }

    #[test]
    fn region_has_configured_length() {
        let alg = PixelRegionNcc::new(PixelRegionConfig::default());
        let desc = alg
            .describe(&gradient_image(), Point2::new(10.0, 10.0), 1.0, 0.0)
            .unwrap();
        assert_eq!(desc.value.len(), 25);
        assert_eq!(alg.descriptor_length(), 25);
    }

    #[test]
    fn region_outside_image_is_skipped() {
        let alg = PixelRegionNcc::new(PixelRegionConfig::default());
        assert!(alg
            .describe(&gradient_image(), Point2::new(1.0, 10.0), 1.0, 0.0)
            .is_none());
        assert!(alg
            .describe(&gradient_image(), Point2::new(10.0, 18.0), 1.0, 0.0)
            .is_none());
    }

    #[test]
    fn empty_image_fails_validation() {
        let alg = PixelRegionNcc::new(PixelRegionConfig::default());
        assert!(alg.validate(&AnyImage::from(GrayImage::new(0, 0))).is_err());
    }
}
