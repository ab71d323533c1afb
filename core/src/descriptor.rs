//! Fixed-shape feature descriptors.

use serde::{Deserialize, Serialize};

/// A descriptor whose shape is fixed by the algorithm that produced it.
pub trait TupleDesc: Clone + Send + Sync {
    /// Number of elements (values or bits) in the descriptor.
    fn size(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleDescF64 {
    pub value: Vec<f64>,
}

impl TupleDescF64 {
    pub fn new(value: Vec<f64>) -> Self {
        Self { value }
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            value: vec![0.0; len],
        }
    }
}

impl TupleDesc for TupleDescF64 {
    fn size(&self) -> usize {
        self.value.len()
    }
}

/// Binary descriptor packed into bytes, compared with the Hamming distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleDescBinary {
    pub data: Vec<u8>,
}

impl TupleDescBinary {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn zeros(bytes: usize) -> Self {
        Self {
            data: vec![0; bytes],
        }
    }

    pub fn set_bit(&mut self, bit: usize) {
        self.data[bit / 8] |= 1 << (bit % 8);
    }

    pub fn is_bit_set(&self, bit: usize) -> bool {
        self.data[bit / 8] & (1 << (bit % 8)) != 0
    }

    pub fn hamming_distance(&self, other: &TupleDescBinary) -> u32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl TupleDesc for TupleDescBinary {
    fn size(&self) -> usize {
        self.data.len() * 8
    }
}

/// Region description for normalized cross correlation. Values have the
/// mean pixel intensity already removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NccFeature {
    pub value: Vec<f64>,
    pub mean: f64,
    pub sigma: f64,
}

impl NccFeature {
    /// Builds the feature from raw intensities.
    pub fn from_intensities(raw: &[f64]) -> Self {
        let n = raw.len().max(1) as f64;
        let mean = raw.iter().sum::<f64>() / n;
        let value: Vec<f64> = raw.iter().map(|v| v - mean).collect();
        let sigma = (value.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
        Self { value, mean, sigma }
    }

    /// Correlation in [-1, 1]. Zero when either region is flat.
    pub fn correlation(&self, other: &NccFeature) -> f64 {
        let denom = self.sigma * other.sigma * self.value.len() as f64;
        if denom <= f64::EPSILON {
            return 0.0;
        }
        let dot: f64 = self
            .value
            .iter()
            .zip(other.value.iter())
            .map(|(a, b)| a * b)
            .sum();
        dot / denom
    }
}

impl TupleDesc for NccFeature {
    fn size(&self) -> usize {
        self.value.len()
    }
}
