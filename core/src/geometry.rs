use nalgebra::{Matrix2, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Transform that can be chained and undone.
///
/// `a.concat(&b)` is the transform that applies `a` first and `b` second,
/// so `world_to_key.concat(&key_to_curr)` is `world_to_curr`.
pub trait InvertibleTransform: Clone + std::fmt::Debug + Send + Sync {
    fn identity() -> Self;

    fn concat(&self, next: &Self) -> Self;

    /// `None` when the transform is singular.
    fn invert(&self) -> Option<Self>;
}

/// Observation of the same feature in two views, typically key frame then current frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssociatedPair {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
}

impl AssociatedPair {
    pub fn new(p1: Point2<f64>, p2: Point2<f64>) -> Self {
        Self { p1, p2 }
    }
}

/// Rigid body motion. Maps a point in the source frame into the destination frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Se3 {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Se3 {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rotation_vector(omega: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: Rotation3::new(omega).into_inner(),
            translation,
        }
    }

    pub fn rotation_vector(&self) -> Vector3<f64> {
        Rotation3::from_matrix(&self.rotation).scaled_axis()
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * point.coords + self.translation)
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// `[R | t]` projection matrix for normalized image coordinates.
    pub fn projection(&self) -> Matrix3x4<f64> {
        let mut p = Matrix3x4::zeros();
        p.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        p.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        p
    }
}

impl Default for Se3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl InvertibleTransform for Se3 {
    fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    fn concat(&self, next: &Self) -> Self {
        Self {
            rotation: next.rotation * self.rotation,
            translation: next.rotation * self.translation + next.translation,
        }
    }

    fn invert(&self) -> Option<Self> {
        let r_inv = self.rotation.transpose();
        Some(Self {
            rotation: r_inv,
            translation: -(r_inv * self.translation),
        })
    }
}

/// `p' = A p + t`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine2D {
    pub a: Matrix2<f64>,
    pub t: Vector2<f64>,
}

impl Affine2D {
    pub fn new(a11: f64, a12: f64, a21: f64, a22: f64, tx: f64, ty: f64) -> Self {
        Self {
            a: Matrix2::new(a11, a12, a21, a22),
            t: Vector2::new(tx, ty),
        }
    }

    pub fn transform_point(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from(self.a * p.coords + self.t)
    }
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl InvertibleTransform for Affine2D {
    fn identity() -> Self {
        Self {
            a: Matrix2::identity(),
            t: Vector2::zeros(),
        }
    }

    fn concat(&self, next: &Self) -> Self {
        Self {
            a: next.a * self.a,
            t: next.a * self.t + next.t,
        }
    }

    fn invert(&self) -> Option<Self> {
        let a_inv = self.a.try_inverse()?;
        Some(Self {
            a: a_inv,
            t: -(a_inv * self.t),
        })
    }
}

/// Planar projective transform acting on homogeneous pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography2D {
    pub h: Matrix3<f64>,
}

impl Homography2D {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Scales the matrix so `h[(2, 2)] == 1` when possible.
    pub fn normalized(&self) -> Self {
        let s = self.h[(2, 2)];
        if s.abs() > 1e-12 {
            Self { h: self.h / s }
        } else {
            Self { h: self.h / self.h.norm() }
        }
    }

    /// `None` when the point maps to infinity.
    pub fn transform_point(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() <= 1e-12 {
            return None;
        }
        Some(Point2::new(v[0] / v[2], v[1] / v[2]))
    }
}

impl Default for Homography2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl InvertibleTransform for Homography2D {
    fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
        }
    }

    fn concat(&self, next: &Self) -> Self {
        Self { h: next.h * self.h }.normalized()
    }

    fn invert(&self) -> Option<Self> {
        self.h.try_inverse().map(|h| Self { h }.normalized())
    }
}

pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v[2], v[1], v[2], 0.0, -v[0], -v[1], v[0], 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_se3() -> Se3 {
        Se3::from_rotation_vector(Vector3::new(0.1, -0.2, 0.05), Vector3::new(0.5, -1.0, 2.0))
    }

    #[test]
    fn se3_concat_matches_sequential_application() {
        let a = sample_se3();
        let b = Se3::from_rotation_vector(Vector3::new(-0.3, 0.0, 0.1), Vector3::new(1.0, 0.0, 0.0));
        let p = Point3::new(0.3, 0.7, 4.0);

        let expected = b.transform_point(&a.transform_point(&p));
        let actual = a.concat(&b).transform_point(&p);
        assert_relative_eq!(expected, actual, epsilon = 1e-12);
    }

    #[test]
    fn se3_inverse_round_trips() {
        let a = sample_se3();
        let id = a.concat(&a.invert().unwrap());
        assert_relative_eq!(id.rotation, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn se3_rotation_vector_recovered() {
        let omega = Vector3::new(0.1, -0.2, 0.05);
        let a = Se3::from_rotation_vector(omega, Vector3::zeros());
        assert_relative_eq!(a.rotation_vector(), omega, epsilon = 1e-9);
    }

    #[test]
    fn affine_concat_and_invert() {
        let a = Affine2D::new(1.1, 0.1, -0.2, 0.9, 3.0, -2.0);
        let b = Affine2D::new(0.8, 0.0, 0.0, 1.2, -1.0, 5.0);
        let p = Point2::new(4.0, 7.0);

        let expected = b.transform_point(&a.transform_point(&p));
        assert_relative_eq!(a.concat(&b).transform_point(&p), expected, epsilon = 1e-12);

        let back = a.invert().unwrap().transform_point(&a.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-12);
    }

    #[test]
    fn singular_affine_has_no_inverse() {
        let a = Affine2D::new(1.0, 2.0, 2.0, 4.0, 0.0, 0.0);
        assert!(a.invert().is_none());
    }

    #[test]
    fn homography_concat_and_invert() {
        let a = Homography2D::new(Matrix3::new(1.0, 0.1, 5.0, -0.05, 1.1, 2.0, 1e-4, 2e-4, 1.0));
        let b = Homography2D::new(Matrix3::new(0.9, 0.0, -3.0, 0.0, 0.9, 1.0, 0.0, 0.0, 1.0));
        let p = Point2::new(10.0, 20.0);

        let expected = b.transform_point(&a.transform_point(&p).unwrap()).unwrap();
        let actual = a.concat(&b).transform_point(&p).unwrap();
        assert_relative_eq!(actual, expected, epsilon = 1e-9);

        let back = a.invert().unwrap().transform_point(&a.transform_point(&p).unwrap()).unwrap();
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }

    #[test]
    fn skew_matches_cross_product() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(-2.0, 0.5, 4.0);
        assert_relative_eq!(skew_symmetric(&a) * b, a.cross(&b), epsilon = 1e-12);
    }
}
