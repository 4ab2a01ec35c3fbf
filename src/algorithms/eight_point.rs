use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use sample_consensus::{Estimator, Model};

/// A correspondence on the normalized image plane (pixels multiplied by `K^-1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedMatch {
    pub previous: Point2<f64>,
    pub current: Point2<f64>,
}

/// Essential matrix `E` with `current^T * E * previous = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EssentialMatrix(pub Matrix3<f64>);

impl EssentialMatrix {
    /// Squared Sampson distance, a first order approximation of the
    /// reprojection error of the correspondence.
    pub fn sampson_distance(&self, data: &NormalizedMatch) -> f64 {
        let previous = data.previous.to_homogeneous();
        let current = data.current.to_homogeneous();
        let e_prev = self.0 * previous;
        let et_curr = self.0.transpose() * current;
        let numerator = current.dot(&e_prev);

        let denominator = e_prev.x * e_prev.x
            + e_prev.y * e_prev.y
            + et_curr.x * et_curr.x
            + et_curr.y * et_curr.y;

        if denominator < 1e-30 {
            return f64::MAX;
        }
        numerator * numerator / denominator
    }
}

impl Model<NormalizedMatch> for EssentialMatrix {
    /// Sampson distance in normalized image units.
    fn residual(&self, data: &NormalizedMatch) -> f64 {
        self.sampson_distance(data).sqrt()
    }
}

/// Normalized eight-point algorithm (Hartley 1997).
///
/// Rejects point sets whose epipolar constraint has more than one solution,
/// which is what zero parallax (pure rotation, static camera) produces.
#[derive(Debug, Clone, Copy)]
pub struct EightPoint {
    /// Smallest accepted ratio between the second-smallest and largest
    /// singular value of the constraint matrix.
    pub degeneracy_threshold: f64,
}

impl EightPoint {
    pub fn new(degeneracy_threshold: f64) -> Self {
        Self {
            degeneracy_threshold,
        }
    }

    /// Fits `E` to eight or more correspondences. `None` when ill-conditioned.
    pub fn fit<I>(&self, data: I) -> Option<EssentialMatrix>
    where
        I: Iterator<Item = NormalizedMatch> + Clone,
    {
        let (t_prev, t_curr) = hartley_transforms(data.clone())?;

        // Setup homogeneous linear equation as current^T * E * previous = 0,
        // accumulated as the 9x9 normal matrix A^T * A.
        let mut normal = SMatrix::<f64, 9, 9>::zeros();
        let mut count = 0;
        for NormalizedMatch { previous, current } in data {
            let p = t_prev * previous.to_homogeneous();
            let c = t_curr * current.to_homogeneous();
            let row = SVector::<f64, 9>::from_column_slice(&[
                c.x * p.x,
                c.x * p.y,
                c.x,
                c.y * p.x,
                c.y * p.y,
                c.y,
                p.x,
                p.y,
                1.0,
            ]);
            normal += row * row.transpose();
            count += 1;
        }
        if count < 8 {
            return None;
        }

        let eigen = normal.symmetric_eigen();
        let mut order: Vec<usize> = (0..9).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        // eigenvalues of A^T A are the squared singular values of A
        let singular = |i: usize| eigen.eigenvalues[order[i]].max(0.0).sqrt();
        let largest = singular(8);
        if !(largest > 0.0) || singular(1) / largest < self.degeneracy_threshold {
            return None;
        }

        let null_vector = eigen.eigenvectors.column(order[0]);
        let normalized = Matrix3::from_row_iterator(null_vector.iter().copied());

        // undo Hartley conditioning then project onto the essential manifold
        let essential = t_curr.transpose() * normalized * t_prev;
        let (u, _, v_t) = sorted_svd(&essential)?;
        let projected = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 0.0)) * v_t;

        if projected.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(EssentialMatrix(projected))
    }
}

impl Estimator<NormalizedMatch> for EightPoint {
    const MIN_SAMPLES: usize = 8;
    type Model = EssentialMatrix;
    type ModelIter = Option<EssentialMatrix>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = NormalizedMatch> + Clone,
    {
        self.fit(data)
    }
}

/// Similarity transforms moving each point set's centroid to the origin with
/// a mean distance of sqrt(2).
fn hartley_transforms<I>(data: I) -> Option<(Matrix3<f64>, Matrix3<f64>)>
where
    I: Iterator<Item = NormalizedMatch> + Clone,
{
    let mut count = 0.0;
    let mut prev_centroid = Vector3::zeros();
    let mut curr_centroid = Vector3::zeros();
    for m in data.clone() {
        prev_centroid += m.previous.to_homogeneous();
        curr_centroid += m.current.to_homogeneous();
        count += 1.0;
    }
    if count == 0.0 {
        return None;
    }
    prev_centroid /= count;
    curr_centroid /= count;

    let (mut prev_spread, mut curr_spread) = (0.0, 0.0);
    for m in data {
        prev_spread += (m.previous.to_homogeneous() - prev_centroid).norm();
        curr_spread += (m.current.to_homogeneous() - curr_centroid).norm();
    }

    let transform = |centroid: Vector3<f64>, spread: f64| {
        let mean = spread / count;
        let scale = if mean > 1e-15 {
            std::f64::consts::SQRT_2 / mean
        } else {
            1.0
        };
        Matrix3::new(
            scale, 0.0, -scale * centroid.x, //
            0.0, scale, -scale * centroid.y, //
            0.0, 0.0, 1.0,
        )
    };

    Some((
        transform(prev_centroid, prev_spread),
        transform(curr_centroid, curr_spread),
    ))
}

/// SVD of a 3x3 matrix with singular values in descending order.
pub(crate) fn sorted_svd(
    matrix: &Matrix3<f64>,
) -> Option<(Matrix3<f64>, Vector3<f64>, Matrix3<f64>)> {
    let svd = matrix.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let values = svd.singular_values;

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    Some((
        Matrix3::from_columns(&order.map(|i| u.column(i).into_owned())),
        Vector3::from_iterator(order.iter().map(|&i| values[i])),
        Matrix3::from_rows(&order.map(|i| v_t.row(i).into_owned())),
    ))
}
