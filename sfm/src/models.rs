//! Minimal-sample motion model generators for sample consensus.

use crate::distance::{affine_distance_sq, homography_distance_sq, DistanceSe3SymmetricSq};
use crate::refine::sampson_error;
use cv_core::{Affine2D, AssociatedPair, Homography2D, RobustModel, Se3};
use nalgebra::{Complex, DMatrix, Matrix3, Point2, Schur, Vector3};
use std::f64::consts::TAU;
use std::ops::{Add, Mul, Sub};

/// Affine motion from three non-collinear pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AffineModel;

impl RobustModel<AssociatedPair> for AffineModel {
    type Model = Affine2D;

    fn min_sample_size(&self) -> usize {
        3
    }

    fn estimate(&self, data: &[&AssociatedPair]) -> Option<Affine2D> {
        if data.len() < 3 {
            return None;
        }
        let m = Matrix3::new(
            data[0].p1.x, data[0].p1.y, 1.0,
            data[1].p1.x, data[1].p1.y, 1.0,
            data[2].p1.x, data[2].p1.y, 1.0,
        );
        let inv = m.try_inverse()?;
        let row_x = inv * Vector3::new(data[0].p2.x, data[1].p2.x, data[2].p2.x);
        let row_y = inv * Vector3::new(data[0].p2.y, data[1].p2.y, data[2].p2.y);
        Some(Affine2D::new(
            row_x[0], row_x[1], row_y[0], row_y[1], row_x[2], row_y[2],
        ))
    }

    fn compute_error(&self, model: &Affine2D, data: &AssociatedPair) -> f64 {
        affine_distance_sq(model, data)
    }
}

/// Homography from four pairs with the normalized DLT.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyModel;

impl RobustModel<AssociatedPair> for HomographyModel {
    type Model = Homography2D;

    fn min_sample_size(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[&AssociatedPair]) -> Option<Homography2D> {
        let src: Vec<Point2<f64>> = data.iter().map(|p| p.p1).collect();
        let dst: Vec<Point2<f64>> = data.iter().map(|p| p.p2).collect();
        let (src_n, t1) = normalize_points_hartley(&src)?;
        let (dst_n, t2) = normalize_points_hartley(&dst)?;

        let h_n = solve_dlt_homography(&src_n, &dst_n)?;
        let h = t2.try_inverse()? * h_n * t1;
        if h.determinant().abs() < 1e-12 {
            return None;
        }
        Some(Homography2D::new(h).normalized())
    }

    fn compute_error(&self, model: &Homography2D, data: &AssociatedPair) -> f64 {
        homography_distance_sq(model, data)
    }
}

/// Translate to the centroid and scale to a mean distance of sqrt(2).
fn normalize_points_hartley(pts: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    if pts.len() < 2 {
        return None;
    }

    let n = pts.len() as f64;
    let mx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let my = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - mx).powi(2) + (p.y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= 1e-12 {
        return None;
    }

    let s = 2.0f64.sqrt() / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| Point2::new(s * (p.x - mx), s * (p.y - my)))
        .collect();
    Some((out, t))
}

fn solve_dlt_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let rows = (src.len() * 2).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);

    for (i, (p1, p2)) in src.iter().zip(dst.iter()).enumerate() {
        let (x1, y1, x2, y2) = (p1.x, p1.y, p2.x, p2.y);
        let r = 2 * i;
        a.row_mut(r)
            .copy_from_slice(&[-x1, -y1, -1.0, 0.0, 0.0, 0.0, x2 * x1, x2 * y1, x2]);
        a.row_mut(r + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, -x1, -y1, -1.0, y2 * x1, y2 * y1, y2]);
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let h = v_t.row(svd.singular_values.imin());

    Some(Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], h[8],
    ))
}

/// Largest Sampson error, in normalized image units, a five point solution
/// may leave on its own sample.
const MINIMAL_SAMPSON: f64 = 1e-6;

/// Points on the unit circle the hidden variable determinant is sampled at.
const DETERMINANT_SAMPLES: usize = 16;

/// Exponents of `(x, y, z)` for every monomial of degree at most three.
const MONOMIALS: [[u8; 3]; 20] = [
    [0, 0, 0],
    [1, 0, 0], [0, 1, 0], [0, 0, 1],
    [2, 0, 0], [1, 1, 0], [1, 0, 1], [0, 2, 0], [0, 1, 1], [0, 0, 2],
    [3, 0, 0], [2, 1, 0], [2, 0, 1], [1, 2, 0], [1, 1, 1],
    [1, 0, 2], [0, 3, 0], [0, 2, 1], [0, 1, 2], [0, 0, 3],
];

/// Monomials in `(x, y)` once `z` is hidden. The last three are `x`, `y` and `1`.
const HIDDEN_COLUMNS: [[u8; 2]; 10] = [
    [3, 0], [2, 1], [1, 2], [0, 3],
    [2, 0], [1, 1], [0, 2],
    [1, 0], [0, 1],
    [0, 0],
];

fn monomial_index(exponents: [u8; 3]) -> Option<usize> {
    MONOMIALS.iter().position(|m| *m == exponents)
}

/// Polynomial of degree at most three in `(x, y, z)`. Terms above degree
/// three are dropped, products are only formed between factors whose
/// degrees add up to three or less.
#[derive(Debug, Clone, Copy)]
struct Cubic([f64; 20]);

impl Cubic {
    fn linear(x: f64, y: f64, z: f64, w: f64) -> Self {
        let mut c = [0.0; 20];
        c[0] = w;
        c[1] = x;
        c[2] = y;
        c[3] = z;
        Self(c)
    }
}

impl Add for Cubic {
    type Output = Cubic;

    fn add(mut self, rhs: Cubic) -> Cubic {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a += b;
        }
        self
    }
}

impl Sub for Cubic {
    type Output = Cubic;

    fn sub(self, rhs: Cubic) -> Cubic {
        self + rhs * -1.0
    }
}

impl Mul<f64> for Cubic {
    type Output = Cubic;

    fn mul(mut self, rhs: f64) -> Cubic {
        self.0.iter_mut().for_each(|a| *a *= rhs);
        self
    }
}

impl Mul for Cubic {
    type Output = Cubic;

    fn mul(self, rhs: Cubic) -> Cubic {
        let mut out = [0.0; 20];
        for (a, ea) in self.0.iter().zip(MONOMIALS.iter()) {
            if *a == 0.0 {
                continue;
            }
            for (b, eb) in rhs.0.iter().zip(MONOMIALS.iter()) {
                if *b == 0.0 {
                    continue;
                }
                let e = [ea[0] + eb[0], ea[1] + eb[1], ea[2] + eb[2]];
                if let Some(i) = monomial_index(e) {
                    out[i] += a * b;
                }
            }
        }
        Cubic(out)
    }
}

fn horner<T>(coeffs: &[f64; 4], z: T) -> T
where
    T: Copy + From<f64> + Add<Output = T> + Mul<Output = T>,
{
    coeffs
        .iter()
        .rev()
        .fold(T::from(0.0), |acc, &c| acc * z + T::from(c))
}

/// Four matrices spanning the essential matrices consistent with five pairs.
fn epipolar_null_space(data: &[&AssociatedPair]) -> Option<[Matrix3<f64>; 4]> {
    let mut a = DMatrix::<f64>::zeros(9, 9);
    for (i, pair) in data.iter().take(5).enumerate() {
        let (x1, y1, x2, y2) = (pair.p1.x, pair.p1.y, pair.p2.x, pair.p2.y);
        a.row_mut(i)
            .copy_from_slice(&[x2 * x1, x2 * y1, x2, y2 * x1, y2 * y1, y2, x1, y1, 1.0]);
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));

    let basis = |k: usize| {
        let e = v_t.row(order[k]);
        Matrix3::new(e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7], e[8])
    };
    Some([basis(0), basis(1), basis(2), basis(3)])
}

/// The ten cubic constraints `det(E) = 0` and `2 E E^T E - tr(E E^T) E = 0`
/// on `E = x X + y Y + z Z + W`, with `z` hidden in the coefficients.
///
/// Entry `[r][c]` holds the coefficients, lowest power of `z` first, of
/// constraint `r` on monomial `HIDDEN_COLUMNS[c]`.
fn hidden_variable_constraints(basis: &[Matrix3<f64>; 4]) -> [[[f64; 4]; 10]; 10] {
    let [bx, by, bz, bw] = basis;
    let e: [[Cubic; 3]; 3] = std::array::from_fn(|r| {
        std::array::from_fn(|c| Cubic::linear(bx[(r, c)], by[(r, c)], bz[(r, c)], bw[(r, c)]))
    });

    let mut constraints = Vec::with_capacity(10);
    constraints.push(
        e[0][0] * (e[1][1] * e[2][2] - e[1][2] * e[2][1])
            - e[0][1] * (e[1][0] * e[2][2] - e[1][2] * e[2][0])
            + e[0][2] * (e[1][0] * e[2][1] - e[1][1] * e[2][0]),
    );

    let eet: [[Cubic; 3]; 3] = std::array::from_fn(|i| {
        std::array::from_fn(|j| {
            e[i][0] * e[j][0] + e[i][1] * e[j][1] + e[i][2] * e[j][2]
        })
    });
    let trace = eet[0][0] + eet[1][1] + eet[2][2];
    for i in 0..3 {
        for j in 0..3 {
            let eete = eet[i][0] * e[0][j] + eet[i][1] * e[1][j] + eet[i][2] * e[2][j];
            constraints.push(eete * 2.0 - trace * e[i][j]);
        }
    }

    let mut table = [[[0.0; 4]; 10]; 10];
    for (row, constraint) in table.iter_mut().zip(constraints.iter()) {
        for (entry, [a, b]) in row.iter_mut().zip(HIDDEN_COLUMNS.iter()) {
            for k in 0..=(3 - a - b) {
                if let Some(i) = monomial_index([*a, *b, k]) {
                    entry[k as usize] = constraint.0[i];
                }
            }
        }
    }
    table
}

/// Coefficients of `det(C(z))`, lowest power first, recovered from samples
/// on the unit circle.
fn determinant_polynomial(table: &[[[f64; 4]; 10]; 10]) -> Vec<f64> {
    let n = DETERMINANT_SAMPLES as f64;
    let values: Vec<Complex<f64>> = (0..DETERMINANT_SAMPLES)
        .map(|s| {
            let z = Complex::from_polar(1.0, TAU * s as f64 / n);
            DMatrix::from_fn(10, 10, |r, c| horner(&table[r][c], z)).determinant()
        })
        .collect();

    (0..=10)
        .map(|m| {
            let sum: Complex<f64> = values
                .iter()
                .enumerate()
                .map(|(s, v)| *v * Complex::from_polar(1.0, -TAU * (s * m) as f64 / n))
                .sum();
            sum.re / n
        })
        .collect()
}

/// Real roots of a polynomial from the eigenvalues of its companion matrix.
fn real_roots(coeffs: &[f64]) -> Vec<f64> {
    let scale = coeffs.iter().fold(0.0f64, |m, c| m.max(c.abs()));
    if !scale.is_finite() || scale == 0.0 {
        return Vec::new();
    }
    let degree = match coeffs.iter().rposition(|c| c.abs() > scale * 1e-12) {
        Some(d) if d > 0 => d,
        _ => return Vec::new(),
    };

    let lead = coeffs[degree];
    let companion = DMatrix::from_fn(degree, degree, |r, c| {
        if r == 0 {
            -coeffs[degree - 1 - c] / lead
        } else if r == c + 1 {
            1.0
        } else {
            0.0
        }
    });
    let Some(schur) = Schur::try_new(companion, f64::EPSILON, 1000) else {
        return Vec::new();
    };
    schur
        .complex_eigenvalues()
        .iter()
        .filter(|z| z.im.abs() <= 1e-6 * z.re.abs().max(1.0))
        .map(|z| z.re)
        .collect()
}

/// The four rigid motions sharing an essential matrix, unit translation.
fn poses_from_essential(e: &Matrix3<f64>) -> Option<[Se3; 4]> {
    let svd = e.svd(true, true);
    let mut u = svd.u?;
    let mut v_t = svd.v_t?;
    if u.determinant() < 0.0 {
        u = -u;
    }
    if v_t.determinant() < 0.0 {
        v_t = -v_t;
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t: Vector3<f64> = u.column(2).into_owned();
    Some([
        Se3::new(r1, t),
        Se3::new(r1, -t),
        Se3::new(r2, t),
        Se3::new(r2, -t),
    ])
}

/// Rigid body motion from five pairs in normalized image coordinates.
///
/// Solves the five point essential matrix problem with the hidden variable
/// resultant: the epipolar constraints leave a four dimensional null space,
/// the cubic essential constraints on it reduce to a degree ten polynomial.
/// Every real root is split into its four poses and kept when all sampled
/// points triangulate in front of both views. Translation has unit norm.
#[derive(Debug, Clone, Default)]
pub struct Se3Model {
    pub distance: DistanceSe3SymmetricSq,
}

impl Se3Model {
    pub fn new(distance: DistanceSe3SymmetricSq) -> Self {
        Self { distance }
    }

    fn in_front(&self, model: &Se3, data: &[&AssociatedPair]) -> bool {
        data.iter()
            .all(|pair| self.distance.residuals(model, pair).is_some())
    }

    fn sample_error(&self, model: &Se3, data: &[&AssociatedPair]) -> f64 {
        data.iter()
            .map(|pair| self.distance.distance(model, pair))
            .sum()
    }
}

impl RobustModel<AssociatedPair> for Se3Model {
    type Model = Se3;

    fn min_sample_size(&self) -> usize {
        5
    }

    /// Extra pairs beyond the first five pick among the solutions.
    fn estimate(&self, data: &[&AssociatedPair]) -> Option<Se3> {
        self.estimate_all(data)
            .into_iter()
            .map(|model| (self.sample_error(&model, data), model))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, model)| model)
    }

    fn estimate_all(&self, data: &[&AssociatedPair]) -> Vec<Se3> {
        if data.len() < 5 {
            return Vec::new();
        }
        let Some(basis) = epipolar_null_space(data) else {
            return Vec::new();
        };
        let table = hidden_variable_constraints(&basis);
        let roots = real_roots(&determinant_polynomial(&table));

        let sample = &data[..5];
        let mut solutions = Vec::new();
        for z in roots {
            let c = DMatrix::from_fn(10, 10, |r, col| horner(&table[r][col], z));
            let svd = c.svd(false, true);
            let Some(v_t) = svd.v_t else {
                continue;
            };
            let v = v_t.row(svd.singular_values.imin());
            if v[9].abs() < 1e-12 {
                continue;
            }
            let (x, y) = (v[7] / v[9], v[8] / v[9]);
            let e = basis[0] * x + basis[1] * y + basis[2] * z + basis[3];

            let Some(poses) = poses_from_essential(&e) else {
                continue;
            };
            if sample
                .iter()
                .any(|pair| sampson_error(&poses[0], pair).abs() > MINIMAL_SAMPSON)
            {
                continue;
            }
            solutions.extend(poses.into_iter().filter(|pose| self.in_front(pose, data)));
        }

        tracing::trace!(solutions = solutions.len(), "five point solutions");
        solutions
    }

    fn compute_error(&self, model: &Se3, data: &AssociatedPair) -> f64 {
        self.distance.distance(model, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn affine_from_three_pairs() {
        let truth = Affine2D::new(0.9, 0.1, -0.2, 1.1, 4.0, -3.0);
        let pairs: Vec<AssociatedPair> = [(0.0, 0.0), (10.0, 2.0), (3.0, 8.0)]
            .iter()
            .map(|&(x, y)| {
                let p = Point2::new(x, y);
                AssociatedPair::new(p, truth.transform_point(&p))
            })
            .collect();
        let refs: Vec<&AssociatedPair> = pairs.iter().collect();
        let found = AffineModel.estimate(&refs).unwrap();
        assert_relative_eq!(found.a, truth.a, epsilon = 1e-10);
        assert_relative_eq!(found.t, truth.t, epsilon = 1e-10);
    }

    #[test]
    fn collinear_affine_sample_is_rejected() {
        let pairs: Vec<AssociatedPair> = (0..3)
            .map(|i| {
                let p = Point2::new(i as f64, i as f64);
                AssociatedPair::new(p, p)
            })
            .collect();
        let refs: Vec<&AssociatedPair> = pairs.iter().collect();
        assert!(AffineModel.estimate(&refs).is_none());
    }

    #[test]
    fn homography_from_four_pairs() {
        let truth = Homography2D::new(Matrix3::new(1.02, 0.05, 3.0, -0.04, 0.98, -2.0, 1e-4, -2e-4, 1.0));
        let pairs: Vec<AssociatedPair> = [(10.0, 10.0), (200.0, 15.0), (190.0, 180.0), (20.0, 170.0)]
            .iter()
            .map(|&(x, y)| {
                let p = Point2::new(x, y);
                AssociatedPair::new(p, truth.transform_point(&p).unwrap())
            })
            .collect();
        let refs: Vec<&AssociatedPair> = pairs.iter().collect();
        let found = HomographyModel.estimate(&refs).unwrap();
        assert_relative_eq!(found.h, truth.normalized().h, epsilon = 1e-8);
        for pair in &pairs {
            assert!(HomographyModel.compute_error(&found, pair) < 1e-12);
        }
    }

    fn five_views(truth: &Se3) -> Vec<AssociatedPair> {
        [
            Point3::new(-0.8, 0.5, 4.0),
            Point3::new(0.6, -0.4, 5.0),
            Point3::new(0.1, 0.9, 6.5),
            Point3::new(-0.3, -0.7, 3.5),
            Point3::new(0.9, 0.3, 7.0),
        ]
        .iter()
        .map(|x| {
            let c = truth.transform_point(x);
            AssociatedPair::new(Point2::new(x.x / x.z, x.y / x.z), Point2::new(c.x / c.z, c.y / c.z))
        })
        .collect()
    }

    #[test]
    fn se3_from_five_pairs() {
        let truth = Se3::from_rotation_vector(
            Vector3::new(0.02, -0.03, 0.01),
            Vector3::new(0.8, 0.1, 0.2).normalize(),
        );
        let pairs = five_views(&truth);
        let refs: Vec<&AssociatedPair> = pairs.iter().collect();

        let model = Se3Model::default();
        let found = model.estimate(&refs).unwrap();
        for pair in &pairs {
            assert!(model.compute_error(&found, pair) < 1e-10);
        }
        assert_relative_eq!(found.translation.norm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn five_point_solutions_contain_true_motion() {
        let truth = Se3::from_rotation_vector(
            Vector3::new(-0.05, 0.04, 0.02),
            Vector3::new(-0.3, 0.9, -0.1).normalize(),
        );
        let pairs = five_views(&truth);
        let refs: Vec<&AssociatedPair> = pairs.iter().collect();

        let solutions = Se3Model::default().estimate_all(&refs);
        assert!(!solutions.is_empty());
        assert!(solutions.iter().any(|s| {
            (s.rotation - truth.rotation).norm() < 1e-6
                && (s.translation - truth.translation).norm() < 1e-6
        }));
    }

    #[test]
    fn sixth_pair_selects_true_motion() {
        let truth = Se3::from_rotation_vector(
            Vector3::new(0.03, 0.01, -0.02),
            Vector3::new(0.5, -0.2, 0.8).normalize(),
        );
        let mut pairs = five_views(&truth);
        let x = Point3::new(-0.6, -0.5, 6.0);
        let c = truth.transform_point(&x);
        pairs.push(AssociatedPair::new(
            Point2::new(x.x / x.z, x.y / x.z),
            Point2::new(c.x / c.z, c.y / c.z),
        ));
        let refs: Vec<&AssociatedPair> = pairs.iter().collect();

        let found = Se3Model::default().estimate(&refs).unwrap();
        assert_relative_eq!(found.rotation, truth.rotation, epsilon = 1e-6);
        assert_relative_eq!(found.translation, truth.translation, epsilon = 1e-6);
    }

    #[test]
    fn five_point_needs_five_pairs() {
        let pairs = five_views(&Se3::from_rotation_vector(Vector3::zeros(), Vector3::x()));
        let refs: Vec<&AssociatedPair> = pairs.iter().take(4).collect();
        assert!(Se3Model::default().estimate_all(&refs).is_empty());
        assert!(Se3Model::default().estimate(&refs).is_none());
    }

    #[test]
    fn real_roots_of_cubic() {
        // (z - 1)(z + 2)(z^2 + 1)
        let mut roots = real_roots(&[-2.0, 1.0, -1.0, 1.0, 1.0]);
        roots.sort_by(f64::total_cmp);
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots[0], -2.0, epsilon = 1e-9);
        assert_relative_eq!(roots[1], 1.0, epsilon = 1e-9);
    }
}
