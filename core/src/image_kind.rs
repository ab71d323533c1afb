//! Closed set of image representations accepted by the tracking pipeline.
//!
//! Every image handed to a detector or describer is one of a small number of
//! pixel-type × channel-layout combinations. Algorithms match on [`AnyImage`]
//! once instead of dispatching per pair of concrete types.

use crate::{Error, Result};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLayout {
    Gray,
    Rgb,
}

/// Single band image with floating point intensities.
pub type GrayImageF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    pub layout: ColorLayout,
}

impl ImageInfo {
    pub fn channels(&self) -> u8 {
        match self.layout {
            ColorLayout::Gray => 1,
            ColorLayout::Rgb => 3,
        }
    }

    pub fn is_gray(&self) -> bool {
        self.layout == ColorLayout::Gray
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone)]
pub enum AnyImage {
    GrayU8(GrayImage),
    GrayF32(GrayImageF32),
    RgbU8(RgbImage),
}

impl AnyImage {
    pub fn info(&self) -> ImageInfo {
        let (width, height, pixel_type, layout) = match self {
            AnyImage::GrayU8(img) => (img.width(), img.height(), PixelType::U8, ColorLayout::Gray),
            AnyImage::GrayF32(img) => {
                (img.width(), img.height(), PixelType::F32, ColorLayout::Gray)
            }
            AnyImage::RgbU8(img) => (img.width(), img.height(), PixelType::U8, ColorLayout::Rgb),
        };
        ImageInfo {
            width,
            height,
            pixel_type,
            layout,
        }
    }

    pub fn width(&self) -> u32 {
        self.info().width
    }

    pub fn height(&self) -> u32 {
        self.info().height
    }

    pub fn is_inside(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width() as f64 && y < self.height() as f64
    }

    /// Fails for a zero sized image.
    pub fn ensure_not_empty(&self) -> Result<()> {
        let info = self.info();
        if info.is_empty() {
            return Err(Error::ImageShape(format!(
                "image has zero size ({}x{})",
                info.width, info.height
            )));
        }
        Ok(())
    }

    /// Borrows the image as 8-bit gray, failing for every other layout.
    pub fn as_gray_u8(&self) -> Result<&GrayImage> {
        match self {
            AnyImage::GrayU8(img) => Ok(img),
            other => {
                let info = other.info();
                Err(Error::ImageShape(format!(
                    "expected a single band u8 image, got {:?} with {} channel(s)",
                    info.pixel_type,
                    info.channels()
                )))
            }
        }
    }

    /// Gray intensity at an integer pixel. RGB pixels are averaged.
    pub fn intensity(&self, x: u32, y: u32) -> f32 {
        match self {
            AnyImage::GrayU8(img) => img.get_pixel(x, y)[0] as f32,
            AnyImage::GrayF32(img) => img.get_pixel(x, y)[0],
            AnyImage::RgbU8(img) => {
                let p = img.get_pixel(x, y);
                (p[0] as f32 + p[1] as f32 + p[2] as f32) / 3.0
            }
        }
    }

    /// Gray intensity with zero outside the image.
    pub fn intensity_or_zero(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            0.0
        } else {
            self.intensity(x as u32, y as u32)
        }
    }

    pub fn fill(&mut self, value: f32) {
        match self {
            AnyImage::GrayU8(img) => {
                let v = value.clamp(0.0, 255.0) as u8;
                img.pixels_mut().for_each(|p| p[0] = v);
            }
            AnyImage::GrayF32(img) => img.pixels_mut().for_each(|p| p[0] = value),
            AnyImage::RgbU8(img) => {
                let v = value.clamp(0.0, 255.0) as u8;
                img.pixels_mut().for_each(|p| p.0 = [v, v, v]);
            }
        }
    }
}

impl From<GrayImage> for AnyImage {
    fn from(img: GrayImage) -> Self {
        AnyImage::GrayU8(img)
    }
}

impl From<GrayImageF32> for AnyImage {
    fn from(img: GrayImageF32) -> Self {
        AnyImage::GrayF32(img)
    }
}

impl From<RgbImage> for AnyImage {
    fn from(img: RgbImage) -> Self {
        AnyImage::RgbU8(img)
    }
}
