//! Association scores. Lower is always a better fit.

use cv_core::{NccFeature, TupleDescBinary, TupleDescF64};

/// Scores how well two descriptors fit. Lower is better and may be negative.
pub trait ScoreAssociation<D>: Sync {
    fn score(&self, a: &D, b: &D) -> f64;
}

/// Euclidean distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreEuclidean;

impl ScoreAssociation<TupleDescF64> for ScoreEuclidean {
    fn score(&self, a: &TupleDescF64, b: &TupleDescF64) -> f64 {
        ScoreEuclideanSq.score(a, b).sqrt()
    }
}

/// Squared Euclidean distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreEuclideanSq;

impl ScoreAssociation<TupleDescF64> for ScoreEuclideanSq {
    fn score(&self, a: &TupleDescF64, b: &TupleDescF64) -> f64 {
        a.value
            .iter()
            .zip(b.value.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum()
    }
}

/// Sum of absolute differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreSad;

impl ScoreAssociation<TupleDescF64> for ScoreSad {
    fn score(&self, a: &TupleDescF64, b: &TupleDescF64) -> f64 {
        a.value
            .iter()
            .zip(b.value.iter())
            .map(|(x, y)| (x - y).abs())
            .sum()
    }
}

/// Number of differing bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreHamming;

impl ScoreAssociation<TupleDescBinary> for ScoreHamming {
    fn score(&self, a: &TupleDescBinary, b: &TupleDescBinary) -> f64 {
        a.hamming_distance(b) as f64
    }
}

/// Negated normalized cross correlation, so a perfect match scores -1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreNcc;

impl ScoreAssociation<NccFeature> for ScoreNcc {
    fn score(&self, a: &NccFeature, b: &NccFeature) -> f64 {
        -a.correlation(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_family() {
        let a = TupleDescF64::new(vec![1.0, 2.0, 3.0]);
        let b = TupleDescF64::new(vec![1.0, 4.0, 2.0]);
        assert_eq!(ScoreEuclideanSq.score(&a, &b), 5.0);
        assert!((ScoreEuclidean.score(&a, &b) - 5f64.sqrt()).abs() < 1e-12);
        assert_eq!(ScoreSad.score(&a, &b), 3.0);
    }

    #[test]
    fn hamming_counts_bits() {
        let a = TupleDescBinary::new(vec![0b1010_1010, 0xFF]);
        let b = TupleDescBinary::new(vec![0b1010_1000, 0x0F]);
        assert_eq!(ScoreHamming.score(&a, &b), 5.0);
    }

    #[test]
    fn ncc_prefers_correlated_regions() {
        let a = NccFeature::from_intensities(&[1.0, 5.0, 2.0, 8.0]);
        let same = NccFeature::from_intensities(&[11.0, 15.0, 12.0, 18.0]);
        let inverted = NccFeature::from_intensities(&[8.0, 2.0, 5.0, 1.0]);
        assert!((ScoreNcc.score(&a, &same) + 1.0).abs() < 1e-12);
        assert!(ScoreNcc.score(&a, &same) < ScoreNcc.score(&a, &inverted));
    }
}
