//! Greedy descriptor association.

use crate::score::ScoreAssociation;
use crate::Result;
use cv_core::{AssociatedIndex, Error, TupleDesc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Associates a source set of descriptors with a destination set.
///
/// After [`associate`](Associate::associate), `pairs()[i]` is the index into
/// the destination set matched to source `i`, or `-1`.
pub trait Associate<D> {
    fn associate(&mut self, src: &[&D], dst: &[&D]) -> Result<()>;

    fn pairs(&self) -> &[i32];

    /// Score of each pair. Only meaningful where `pairs()[i] >= 0`.
    fn fit_quality(&self) -> &[f64];

    fn matches(&self) -> Vec<AssociatedIndex> {
        self.pairs()
            .iter()
            .zip(self.fit_quality())
            .enumerate()
            .filter(|(_, (dst, _))| **dst >= 0)
            .map(|(src, (&dst, &fit))| AssociatedIndex::new(src, dst as usize, fit))
            .collect()
    }

    /// Destination indices no source was matched to.
    fn unassociated_dst(&self, num_dst: usize) -> Vec<usize> {
        let mut used = vec![false; num_dst];
        for &dst in self.pairs() {
            if dst >= 0 {
                used[dst as usize] = true;
            }
        }
        (0..num_dst).filter(|&j| !used[j]).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociateConfig {
    /// Pairs scoring above this are rejected.
    pub max_fit_error: f64,
    /// Keep a pair only if no other source scores as well against its destination.
    pub backwards_validation: bool,
    /// Destinations are claimed first come first served in source order.
    pub exclusive: bool,
    /// Lowe's ratio test on best / second best. Assumes non-negative scores.
    pub ratio_test: Option<f64>,
    /// Keep only the best scoring pairs. Zero means unbounded.
    pub max_matches: usize,
}

impl Default for AssociateConfig {
    fn default() -> Self {
        Self {
            max_fit_error: f64::MAX,
            backwards_validation: false,
            exclusive: false,
            ratio_test: None,
            max_matches: 0,
        }
    }
}

impl AssociateConfig {
    pub fn with_max_fit_error(mut self, max_fit_error: f64) -> Self {
        self.max_fit_error = max_fit_error;
        self
    }

    pub fn with_backwards_validation(mut self) -> Self {
        self.backwards_validation = true;
        self
    }

    pub fn with_exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn with_ratio_test(mut self, ratio: f64) -> Self {
        self.ratio_test = Some(ratio);
        self
    }

    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches;
        self
    }
}

/// Matches every source to its lowest scoring destination.
///
/// Ties go to the later destination. With `exclusive` set a destination
/// stays with the lowest scoring source claiming it, ties to the earlier source.
pub struct AssociateGreedy<D, S> {
    score: S,
    config: AssociateConfig,
    pairs: Vec<i32>,
    fit_quality: Vec<f64>,
    score_matrix: Vec<f64>,
    _phantom: PhantomData<fn(&D)>,
}

impl<D, S> AssociateGreedy<D, S>
where
    D: TupleDesc,
    S: ScoreAssociation<D>,
{
    pub fn new(score: S, config: AssociateConfig) -> Self {
        Self {
            score,
            config,
            pairs: Vec::new(),
            fit_quality: Vec::new(),
            score_matrix: Vec::new(),
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &AssociateConfig {
        &self.config
    }

    pub fn set_max_fit_error(&mut self, max_fit_error: f64) {
        self.config.max_fit_error = max_fit_error;
    }

    /// Row-major `src x dst` scores from the last call.
    pub fn score_matrix(&self) -> &[f64] {
        &self.score_matrix
    }

    fn reject(&mut self, i: usize) {
        self.pairs[i] = -1;
        self.fit_quality[i] = f64::MAX;
    }
}

fn check_shape<D: TupleDesc>(expected: usize, set: &[&D]) -> Result<()> {
    for d in set {
        if d.size() != expected {
            return Err(Error::DescriptorShape {
                expected,
                actual: d.size(),
            }
            .into());
        }
    }
    Ok(())
}

impl<D, S> Associate<D> for AssociateGreedy<D, S>
where
    D: TupleDesc,
    S: ScoreAssociation<D>,
{
    fn associate(&mut self, src: &[&D], dst: &[&D]) -> Result<()> {
        let m = src.len();
        let n = dst.len();

        if let Some(first) = src.first().or(dst.first()) {
            let expected = first.size();
            check_shape(expected, src)?;
            check_shape(expected, dst)?;
        }

        self.pairs.clear();
        self.pairs.resize(m, -1);
        self.fit_quality.clear();
        self.fit_quality.resize(m, f64::MAX);
        self.score_matrix.clear();
        self.score_matrix.resize(m * n, 0.0);

        if m == 0 || n == 0 {
            return Ok(());
        }

        let score = &self.score;
        self.score_matrix
            .par_chunks_mut(n)
            .zip(src.par_iter())
            .for_each(|(row, a)| {
                for (cell, b) in row.iter_mut().zip(dst.iter()) {
                    *cell = score.score(a, b);
                }
            });

        for i in 0..m {
            let row = &self.score_matrix[i * n..(i + 1) * n];
            let mut best = self.config.max_fit_error;
            let mut best_index = -1i32;
            let mut second = f64::MAX;
            for (j, &fit) in row.iter().enumerate() {
                if fit <= best {
                    if best_index >= 0 {
                        second = second.min(best);
                    }
                    best = fit;
                    best_index = j as i32;
                } else if fit < second {
                    second = fit;
                }
            }
            self.pairs[i] = best_index;
            self.fit_quality[i] = best;
            if best_index < 0 {
                self.fit_quality[i] = f64::MAX;
                continue;
            }

            if let Some(ratio) = self.config.ratio_test {
                if second < f64::MAX && second > 0.0 && best / second > ratio {
                    self.reject(i);
                }
            }
        }

        if self.config.backwards_validation {
            for i in 0..m {
                let j = self.pairs[i];
                if j < 0 {
                    continue;
                }
                let j = j as usize;
                let to_beat = self.score_matrix[i * n + j];
                let beaten = (0..m).any(|k| k != i && self.score_matrix[k * n + j] <= to_beat);
                if beaten {
                    self.reject(i);
                }
            }
        }

        if self.config.exclusive {
            let mut owner: Vec<Option<usize>> = vec![None; n];
            for i in 0..m {
                let j = self.pairs[i];
                if j < 0 {
                    continue;
                }
                let j = j as usize;
                match owner[j] {
                    Some(prev) if self.fit_quality[i] < self.fit_quality[prev] => {
                        self.reject(prev);
                        owner[j] = Some(i);
                    }
                    Some(_) => self.reject(i),
                    None => owner[j] = Some(i),
                }
            }
        }

        let max_matches = self.config.max_matches;
        if max_matches > 0 {
            let mut matched: Vec<usize> = (0..m).filter(|&i| self.pairs[i] >= 0).collect();
            if matched.len() > max_matches {
                matched.sort_by(|&a, &b| self.fit_quality[a].total_cmp(&self.fit_quality[b]));
                for &i in &matched[max_matches..] {
                    self.reject(i);
                }
            }
        }

        tracing::trace!(
            src = m,
            dst = n,
            matched = self.pairs.iter().filter(|&&p| p >= 0).count(),
            "greedy association"
        );
        Ok(())
    }

    fn pairs(&self) -> &[i32] {
        &self.pairs
    }

    fn fit_quality(&self) -> &[f64] {
        &self.fit_quality
    }
}
