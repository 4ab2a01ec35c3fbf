//! Five-point relative pose (Nister 2004, in the action matrix form of
//! Stewenius, Engels and Nister 2006).
//!
//! Five correspondences leave a four dimensional nullspace of the epipolar
//! constraint, `E = x E_0 + y E_1 + z E_2 + E_3`. The cubic constraints
//! `det(E) = 0` and `2 E E^T E - tr(E E^T) E = 0` give ten equations in the
//! twenty monomials of `x, y, z` up to degree three. Eliminating the ten cubic
//! monomials leaves a 10x10 action matrix for multiplication by `x`, whose
//! real eigenvectors hold the monomial vector of each solution.

use nalgebra::{linalg::Schur, Matrix3, SMatrix, SVector, Vector3, Vector4};
use sample_consensus::Estimator;

use crate::algorithms::eight_point::{sorted_svd, EssentialMatrix, NormalizedMatch};

type Nullspace = SMatrix<f64, 9, 4>;
type Constraints = SMatrix<f64, 10, 20>;
type Square10 = SMatrix<f64, 10, 10>;
/// Coefficients over the monomials below.
type Polynomial = SVector<f64, 20>;

// cubic monomials, eliminated
const XXX: usize = 0;
const XXY: usize = 1;
const XYY: usize = 2;
const YYY: usize = 3;
const XXZ: usize = 4;
const XYZ: usize = 5;
const YYZ: usize = 6;
const XZZ: usize = 7;
const YZZ: usize = 8;
const ZZZ: usize = 9;
// action matrix basis
const XX: usize = 10;
const XY: usize = 11;
const YY: usize = 12;
const XZ: usize = 13;
const YZ: usize = 14;
const ZZ: usize = 15;
const X: usize = 16;
const Y: usize = 17;
const Z: usize = 18;
const ONE: usize = 19;

/// Squared singular value ratio below which the five constraints are treated
/// as linearly dependent.
const RANK_TOLERANCE: f64 = 1e-20;
/// Relative imaginary part up to which an eigenvalue counts as real.
const REAL_TOLERANCE: f64 = 1e-9;
const SCHUR_ITERATIONS: usize = 1000;

/// Minimal solver for the essential matrix. Returns up to ten solutions per
/// sample, each projected onto singular values `(1, 1, 0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FivePoint;

impl FivePoint {
    pub fn solve(&self, sample: &[NormalizedMatch]) -> Vec<EssentialMatrix> {
        if sample.len() < 5 {
            return Vec::new();
        }
        let basis = match nullspace(&sample[..5]) {
            Some(basis) => basis,
            None => return Vec::new(),
        };

        let constraints = polynomial_constraints(&basis);
        let cubic = constraints.fixed_slice::<10, 10>(0, 0).into_owned();
        let rest = constraints.fixed_slice::<10, 10>(0, 10).into_owned();
        let elimination = match cubic.full_piv_lu().solve(&rest) {
            Some(elimination) => elimination,
            None => return Vec::new(),
        };

        solutions(&action_matrix(&elimination), &basis)
    }
}

impl Estimator<NormalizedMatch> for FivePoint {
    const MIN_SAMPLES: usize = 5;
    type Model = EssentialMatrix;
    type ModelIter = Vec<EssentialMatrix>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = NormalizedMatch> + Clone,
    {
        let sample: Vec<NormalizedMatch> = data.take(5).collect();
        self.solve(&sample)
    }
}

/// Right nullspace of the 5x9 constraint matrix, entry `3 i + j` is `E_ij`.
fn nullspace(sample: &[NormalizedMatch]) -> Option<Nullspace> {
    let mut normal = SMatrix::<f64, 9, 9>::zeros();
    for m in sample {
        let p = m.previous.to_homogeneous();
        let c = m.current.to_homogeneous();
        let row = SVector::<f64, 9>::from_iterator((0..9).map(|k| c[k / 3] * p[k % 3]));
        normal += row * row.transpose();
    }

    let eigen = normal.symmetric_eigen();
    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let largest = eigen.eigenvalues[order[8]];
    if !(largest > 0.0) || eigen.eigenvalues[order[4]] < RANK_TOLERANCE * largest {
        return None;
    }

    let columns: Vec<SVector<f64, 9>> = order[..4]
        .iter()
        .map(|&i| eigen.eigenvectors.column(i).into_owned())
        .collect();
    Some(Nullspace::from_columns(&columns))
}

/// Product of two polynomials of degree one, `(x, y, z, 1)` coefficients each.
fn mul_linear(a: &Vector4<f64>, b: &Vector4<f64>) -> Polynomial {
    let mut out = Polynomial::zeros();
    out[XX] = a.x * b.x;
    out[XY] = a.x * b.y + a.y * b.x;
    out[YY] = a.y * b.y;
    out[XZ] = a.x * b.z + a.z * b.x;
    out[YZ] = a.y * b.z + a.z * b.y;
    out[ZZ] = a.z * b.z;
    out[X] = a.x * b.w + a.w * b.x;
    out[Y] = a.y * b.w + a.w * b.y;
    out[Z] = a.z * b.w + a.w * b.z;
    out[ONE] = a.w * b.w;
    out
}

/// Product of a polynomial of degree two with one of degree one.
fn mul_quadratic(a: &Polynomial, b: &Vector4<f64>) -> Polynomial {
    let mut out = Polynomial::zeros();
    out[XXX] = a[XX] * b.x;
    out[XXY] = a[XX] * b.y + a[XY] * b.x;
    out[XYY] = a[XY] * b.y + a[YY] * b.x;
    out[YYY] = a[YY] * b.y;
    out[XXZ] = a[XX] * b.z + a[XZ] * b.x;
    out[XYZ] = a[XY] * b.z + a[XZ] * b.y + a[YZ] * b.x;
    out[YYZ] = a[YY] * b.z + a[YZ] * b.y;
    out[XZZ] = a[XZ] * b.z + a[ZZ] * b.x;
    out[YZZ] = a[YZ] * b.z + a[ZZ] * b.y;
    out[ZZZ] = a[ZZ] * b.z;
    out[XX] = a[XX] * b.w + a[X] * b.x;
    out[XY] = a[XY] * b.w + a[X] * b.y + a[Y] * b.x;
    out[YY] = a[YY] * b.w + a[Y] * b.y;
    out[XZ] = a[XZ] * b.w + a[X] * b.z + a[Z] * b.x;
    out[YZ] = a[YZ] * b.w + a[Y] * b.z + a[Z] * b.y;
    out[ZZ] = a[ZZ] * b.w + a[Z] * b.z;
    out[X] = a[X] * b.w + a[ONE] * b.x;
    out[Y] = a[Y] * b.w + a[ONE] * b.y;
    out[Z] = a[Z] * b.w + a[ONE] * b.z;
    out[ONE] = a[ONE] * b.w;
    out
}

/// The ten cubic constraints on `(x, y, z)`: one determinant row followed by
/// the nine entries of the trace constraint.
fn polynomial_constraints(basis: &Nullspace) -> Constraints {
    let e = |i: usize, j: usize| -> Vector4<f64> { basis.row(3 * i + j).transpose() };

    let mut constraints = Constraints::zeros();

    // det(E), expanded along the last row
    let minor = |a: (usize, usize), b: (usize, usize), c: (usize, usize), d: (usize, usize)| {
        mul_linear(&e(a.0, a.1), &e(b.0, b.1)) - mul_linear(&e(c.0, c.1), &e(d.0, d.1))
    };
    let det = mul_quadratic(&minor((0, 1), (1, 2), (0, 2), (1, 1)), &e(2, 0))
        + mul_quadratic(&minor((0, 2), (1, 0), (0, 0), (1, 2)), &e(2, 1))
        + mul_quadratic(&minor((0, 0), (1, 1), (0, 1), (1, 0)), &e(2, 2));
    constraints.row_mut(0).copy_from(&det.transpose());

    // L = E E^T - tr(E E^T) / 2, then L E = 0
    let sum = |terms: [Polynomial; 3]| terms[0] + terms[1] + terms[2];
    let mut lambda: [[Polynomial; 3]; 3] = std::array::from_fn(|i| {
        std::array::from_fn(|j| sum(std::array::from_fn(|k| mul_linear(&e(i, k), &e(j, k)))))
    });
    let half_trace = (lambda[0][0] + lambda[1][1] + lambda[2][2]) * 0.5;
    for (i, row) in lambda.iter_mut().enumerate() {
        row[i] -= half_trace;
    }

    for i in 0..3 {
        for j in 0..3 {
            let entry = sum(std::array::from_fn(|k| mul_quadratic(&lambda[i][k], &e(k, j))));
            constraints.row_mut(1 + 3 * i + j).copy_from(&entry.transpose());
        }
    }

    constraints
}

/// Multiplication by `x` over the basis `(xx, xy, yy, xz, yz, zz, x, y, z, 1)`.
///
/// `elimination` expresses each cubic monomial as `-elimination * basis`.
fn action_matrix(elimination: &Square10) -> Square10 {
    let mut action = Square10::zeros();
    // x * (xx, xy, yy, xz, yz, zz) are the cubics xxx, xxy, xyy, xxz, xyz, xzz
    for (row, cubic) in [XXX, XXY, XYY, XXZ, XYZ, XZZ].into_iter().enumerate() {
        action.row_mut(row).copy_from(&(-elimination.row(cubic).into_owned()));
    }
    // x * (x, y, z, 1) stay inside the basis
    for (row, monomial) in [XX, XY, XZ, X].into_iter().enumerate() {
        action[(6 + row, monomial - XX)] = 1.0;
    }
    action
}

fn solutions(action: &Square10, basis: &Nullspace) -> Vec<EssentialMatrix> {
    let schur = match Schur::try_new(*action, f64::EPSILON, SCHUR_ITERATIONS) {
        Some(schur) => schur,
        None => return Vec::new(),
    };

    let mut out = Vec::new();
    for eigenvalue in schur.complex_eigenvalues().iter() {
        if eigenvalue.im.abs() > REAL_TOLERANCE * (1.0 + eigenvalue.re.abs()) {
            continue;
        }

        // the eigenvector is the basis evaluated at the solution
        let svd = (action - Square10::from_diagonal_element(eigenvalue.re)).svd(false, true);
        let v_t = match svd.v_t {
            Some(v_t) => v_t,
            None => continue,
        };
        let monomials = v_t.row(svd.singular_values.imin());
        let coefficients = Vector4::new(
            monomials[X - XX],
            monomials[Y - XX],
            monomials[Z - XX],
            monomials[ONE - XX],
        );

        let flat = basis * coefficients;
        let essential = Matrix3::from_row_slice(flat.as_slice());
        if let Some(projected) = project(&essential) {
            out.push(EssentialMatrix(projected));
        }
    }
    out
}

fn project(essential: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let (u, _, v_t) = sorted_svd(essential)?;
    let projected = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 0.0)) * v_t;
    projected.iter().all(|v| v.is_finite()).then_some(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Rotation3};
    use sample_consensus::Model;

    fn skew(t: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(0.0, -t.z, t.y, t.z, 0.0, -t.x, -t.y, t.x, 0.0)
    }

    /// Correspondences with `X_curr = r * X_prev + t`.
    fn matches(r: &Matrix3<f64>, t: &Vector3<f64>, count: usize) -> Vec<NormalizedMatch> {
        (0..count)
            .map(|i| {
                let f = i as f64;
                let point = Vector3::new((f * 1.3).sin() * 1.5, (f * 0.7).cos(), 5.0 + f * 1.7);
                let moved = r * point + t;
                NormalizedMatch {
                    previous: Point2::new(point.x / point.z, point.y / point.z),
                    current: Point2::new(moved.x / moved.z, moved.y / moved.z),
                }
            })
            .collect()
    }

    #[test]
    fn multiplying_polynomials_matches_evaluation() {
        let a = Vector4::new(0.3, -1.2, 0.5, 2.0);
        let b = Vector4::new(-0.7, 0.4, 1.1, -0.2);
        let c = Vector4::new(0.9, 0.1, -0.6, 0.8);
        let product = mul_quadratic(&mul_linear(&a, &b), &c);

        let eval = |p: &Polynomial, x: f64, y: f64, z: f64| {
            let monomials = [
                x * x * x, x * x * y, x * y * y, y * y * y, x * x * z,
                x * y * z, y * y * z, x * z * z, y * z * z, z * z * z,
                x * x, x * y, y * y, x * z, y * z, z * z, x, y, z, 1.0,
            ];
            p.iter().zip(monomials).map(|(c, m)| c * m).sum::<f64>()
        };
        let linear = |v: &Vector4<f64>, x: f64, y: f64, z: f64| v.x * x + v.y * y + v.z * z + v.w;

        for (x, y, z) in [(1.0, 2.0, -1.0), (-0.5, 0.25, 3.0), (0.0, -2.0, 0.7)] {
            let expected = linear(&a, x, y, z) * linear(&b, x, y, z) * linear(&c, x, y, z);
            assert!((eval(&product, x, y, z) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn one_solution_is_the_true_motion() {
        let r = *Rotation3::from_euler_angles(0.03, -0.08, 0.02).matrix();
        let t = Vector3::new(0.4, -0.1, -1.0).normalize();
        let sample = matches(&r, &t, 5);

        let solutions = FivePoint.solve(&sample);
        assert!(!solutions.is_empty());
        assert!(solutions.len() <= 10);

        let truth = skew(&t) * r;
        let truth = truth / truth.norm();
        let closest = solutions
            .iter()
            .map(|e| {
                let e = e.0 / e.0.norm();
                (e - truth).norm().min((e + truth).norm())
            })
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 1e-5, "{closest}");
    }

    #[test]
    fn every_solution_satisfies_the_sample() {
        let r = *Rotation3::from_euler_angles(-0.02, 0.05, 0.0).matrix();
        let t = Vector3::new(1.0, 0.2, 0.3);
        let sample = matches(&r, &t, 5);

        for essential in FivePoint.solve(&sample) {
            for m in &sample {
                assert!(essential.residual(m) < 1e-6);
            }
        }
    }

    #[test]
    fn needs_five_matches() {
        let sample = matches(&Matrix3::identity(), &Vector3::new(0.0, 0.0, 1.0), 4);
        assert!(FivePoint.solve(&sample).is_empty());
        assert!(FivePoint.estimate(sample.into_iter()).is_empty());
    }
}
