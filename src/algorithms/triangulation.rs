use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, RowVector4, Vector3};

/// Camera matrix `[R | t]` on the normalized image plane.
fn projection(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix3x4<f64> {
    Matrix3x4::from_iterator(rotation.iter().chain(translation.iter()).copied())
}

/// Linear (DLT) triangulation of a single correspondence.
///
/// The first camera is `[I | 0]` and the second `[R | t]`, both on the normalized
/// image plane. The returned point is in the first camera's frame, `None` when
/// it lies at infinity.
pub fn triangulate_point(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    previous: &Point2<f64>,
    current: &Point2<f64>,
) -> Option<Point3<f64>> {
    let camera_matrix1 = projection(&Matrix3::identity(), &Vector3::zeros());
    let camera_matrix2 = projection(rotation, translation);

    let rows = |x: &Point2<f64>, p: &Matrix3x4<f64>| -> [RowVector4<f64>; 2] {
        [
            x.y * p.row(2) - p.row(1),
            x.x * p.row(2) - p.row(0),
        ]
    };
    let [a0, a1] = rows(previous, &camera_matrix1);
    let [a2, a3] = rows(current, &camera_matrix2);
    let matrix_a: Matrix4<f64> = Matrix4::from_rows(&[a0, a1, a2, a3]);

    // the solution is the right singular vector of the smallest singular value
    let svd = matrix_a.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd.singular_values.imin();
    let homogeneous = v_t.row(smallest);

    let w = homogeneous[3];
    if w.abs() < 1e-12 {
        return None;
    }
    let point = Point3::new(homogeneous[0] / w, homogeneous[1] / w, homogeneous[2] / w);
    point.coords.iter().all(|v| v.is_finite()).then_some(point)
}
