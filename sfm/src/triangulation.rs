use crate::{Result, SfmError};
use cv_core::Se3;
use nalgebra::{Matrix3x4, Point2, Point3};

/// Triangulate a single 3D point from two views.
///
/// Uses the DLT (Direct Linear Transformation) algorithm.
/// p1, p2 are the 2D points in normalized image coordinates.
/// P1, P2 are the 3x4 projection matrices for each view.
pub fn triangulate_point_dlt(
    p1: &Point2<f64>,
    p2: &Point2<f64>,
    proj1: &Matrix3x4<f64>,
    proj2: &Matrix3x4<f64>,
) -> Result<Point3<f64>> {
    let mut a = nalgebra::Matrix4::<f64>::zeros();

    for j in 0..4 {
        a[(0, j)] = p1.x * proj1[(2, j)] - proj1[(0, j)];
        a[(1, j)] = p1.y * proj1[(2, j)] - proj1[(1, j)];
        a[(2, j)] = p2.x * proj2[(2, j)] - proj2[(0, j)];
        a[(3, j)] = p2.y * proj2[(2, j)] - proj2[(1, j)];
    }

    // Solve using SVD: Ax = 0
    let svd = a.svd(false, true);
    let vt = svd
        .v_t
        .ok_or_else(|| SfmError::TriangulationFailed("SVD failed".to_string()))?;

    // Right singular vector of the smallest singular value
    let row = vt.row(svd.singular_values.imin());

    let w = row[3];
    if w.abs() < 1e-12 {
        return Err(SfmError::TriangulationFailed(
            "Point at infinity".to_string(),
        ));
    }

    Ok(Point3::new(row[0] / w, row[1] / w, row[2] / w))
}

/// Triangulates an observation pair in the key frame given the motion from
/// the key frame to the current frame.
pub fn triangulate_two_views(
    key: &Point2<f64>,
    curr: &Point2<f64>,
    key_to_curr: &Se3,
) -> Result<Point3<f64>> {
    triangulate_point_dlt(key, curr, &Se3::default().projection(), &key_to_curr.projection())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_triangulation_simple() {
        let p1 = Matrix3x4::<f64>::identity();
        let p2 = Matrix3x4::<f64>::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0);

        let pt1 = Point2::new(0.0, 0.0);
        let pt2 = Point2::new(-0.2, 0.0);

        let triangulated = triangulate_point_dlt(&pt1, &pt2, &p1, &p2).unwrap();

        assert!((triangulated.x - 0.0).abs() < 1e-6);
        assert!((triangulated.y - 0.0).abs() < 1e-6);
        assert!((triangulated.z - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_view_recovers_point() {
        let motion = Se3::from_rotation_vector(Vector3::new(0.02, -0.05, 0.01), Vector3::new(-0.5, 0.1, 0.05));
        let x = Point3::new(0.4, -0.3, 6.0);
        let xc = motion.transform_point(&x);

        let key = Point2::new(x.x / x.z, x.y / x.z);
        let curr = Point2::new(xc.x / xc.z, xc.y / xc.z);
        let found = triangulate_two_views(&key, &curr, &motion).unwrap();

        assert!((found - x).norm() < 1e-8);
    }

    #[test]
    fn test_point_behind_camera_has_negative_depth() {
        let motion = Se3::from_rotation_vector(Vector3::zeros(), Vector3::new(-1.0, 0.0, 0.0));
        let x = Point3::new(0.5, 0.2, -4.0);
        let xc = motion.transform_point(&x);

        let key = Point2::new(x.x / x.z, x.y / x.z);
        let curr = Point2::new(xc.x / xc.z, xc.y / xc.z);
        let found = triangulate_two_views(&key, &curr, &motion).unwrap();

        assert!(found.z < 0.0);
    }

}
