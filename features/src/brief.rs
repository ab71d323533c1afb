use crate::describe::DescribeRegionPoint;
use crate::{FeatureError, Result};
use cv_core::{AnyImage, TupleDescBinary};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefConfig {
    pub bytes: usize,
    /// Side of the square region the test pairs are drawn from.
    pub patch_size: i32,
    pub seed: u64,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            bytes: 32,
            patch_size: 32,
            seed: 0xB41E,
        }
    }
}

/// Binary intensity comparison describer. The sampling pattern is fixed by the seed
/// so descriptors from different instances with the same config are comparable.
pub struct Brief {
    bytes: usize,
    radius: i32,
    pattern: Vec<[(i32, i32); 2]>,
}

impl Brief {
    pub fn new(config: BriefConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let half = config.patch_size.max(2) / 2;
        let mut sample = || (rng.gen_range(-half..=half), rng.gen_range(-half..=half));

        let pattern = (0..config.bytes * 8)
            .map(|_| [sample(), sample()])
            .collect();

        Self {
            bytes: config.bytes,
            radius: half,
            pattern,
        }
    }

    fn compute_single(&self, image: &AnyImage, x: i64, y: i64) -> TupleDescBinary {
        let mut descriptor = TupleDescBinary::zeros(self.bytes);

        for (i, pair) in self.pattern.iter().enumerate() {
            let v1 = image.intensity_or_zero(x + pair[0].0 as i64, y + pair[0].1 as i64);
            let v2 = image.intensity_or_zero(x + pair[1].0 as i64, y + pair[1].1 as i64);

            if v1 > v2 {
                descriptor.set_bit(i);
            }
        }

        descriptor
    }
}

impl DescribeRegionPoint for Brief {
    type Descriptor = TupleDescBinary;

    fn validate(&self, image: &AnyImage) -> Result<()> {
        if self.bytes == 0 {
            return Err(FeatureError::DescriptorError(
                "BRIEF descriptor needs at least one byte".to_string(),
            ));
        }
        image.ensure_not_empty()?;
        Ok(())
    }

    fn describe(
        &self,
        image: &AnyImage,
        location: Point2<f64>,
        _scale: f64,
        _orientation: f64,
    ) -> Option<TupleDescBinary> {
        let x = location.x.round() as i64;
        let y = location.y.round() as i64;
        let r = self.radius as i64;
        if x - r < 0 || y - r < 0 || x + r >= image.width() as i64 || y + r >= image.height() as i64 {
            return None;
        }
        Some(self.compute_single(image, x, y))
    }

    fn descriptor_length(&self) -> usize {
        self.bytes * 8
    }
}
