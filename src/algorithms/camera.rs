use nalgebra::{Matrix3, Point2, RowVector3, Vector3};

use crate::algorithms::eight_point::{sorted_svd, NormalizedMatch};
use crate::algorithms::triangulation::triangulate_point;

pub const NUM_CONFIGURATIONS: usize = 4;

/// One of the motions an essential matrix admits: `X_2 = R * X_1 + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseCandidate {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

/// Number of points a candidate places in front of both cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheiralityVote {
    pub index: usize,
    pub votes: usize,
}

/// Convert from Essential Matrix to Rt (Rotation and Translation).
///
/// With `E = U diag(1, 1, 0) V^T` the rotations are `U W V^T` and `U W^T V^T`,
/// the translation is `±u_3`. Returns the four combinations.
pub fn extract_pose_configurations(
    essential: &Matrix3<f64>,
) -> Option<[PoseCandidate; NUM_CONFIGURATIONS]> {
    let matrix_w = Matrix3::from_rows(&[
        RowVector3::new(0.0, -1.0, 0.0),
        RowVector3::new(1.0, 0.0, 0.0),
        RowVector3::new(0.0, 0.0, 1.0),
    ]);

    let (matrix_u, _, matrix_v_t) = sorted_svd(essential)?;

    let rotation1 = matrix_u * matrix_w * matrix_v_t;
    let rotation2 = matrix_u * matrix_w.transpose() * matrix_v_t;

    // t = u_3 where: U[u_1, u_2, u_3]
    let camera_t = matrix_u.column(2).normalize();

    // keep det(R) = +1
    let sign1 = rotation1.determinant().signum();
    let sign2 = rotation2.determinant().signum();

    let candidate = |rotation: Matrix3<f64>, translation: Vector3<f64>| PoseCandidate {
        rotation,
        translation,
    };
    Some([
        candidate(rotation1 * sign1, camera_t),
        candidate(rotation1 * sign1, -camera_t),
        candidate(rotation2 * sign2, camera_t),
        candidate(rotation2 * sign2, -camera_t),
    ])
}

/// Determines which Camera Pose is correct by evaluating the [Cheirality Condition](http://users.cecs.anu.edu.au/~hartley/Papers/cheiral/revision/cheiral.pdf),
/// which is defined as when the transformed point lies in front of the camera.
///
/// Every match is triangulated under each candidate. A point votes for the
/// candidate when it has positive depth in both views and lies within
/// `max_depth` baselines of the first camera. Ties go to the earlier candidate.
pub fn disambiguate_camera_pose(
    candidates: &[PoseCandidate; NUM_CONFIGURATIONS],
    matches: &[NormalizedMatch],
    max_depth: f64,
) -> CheiralityVote {
    let mut max_satisfied = CheiralityVote { index: 0, votes: 0 };
    for (index, candidate) in candidates.iter().enumerate() {
        let votes = matches
            .iter()
            .filter(|m| in_front_of_both(candidate, &m.previous, &m.current, max_depth))
            .count();

        if votes > max_satisfied.votes {
            max_satisfied = CheiralityVote { index, votes };
        }
    }
    max_satisfied
}

fn in_front_of_both(
    candidate: &PoseCandidate,
    previous: &Point2<f64>,
    current: &Point2<f64>,
    max_depth: f64,
) -> bool {
    match triangulate_point(&candidate.rotation, &candidate.translation, previous, current) {
        // X_3 > 0 in the first camera, r_3 * X + t_3 > 0 in the second
        Some(x) => {
            let x_prime = candidate.rotation * x.coords + candidate.translation;
            x.z > 0.0 && x_prime.z > 0.0 && x.coords.norm() < max_depth
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn skew(t: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(0.0, -t.z, t.y, t.z, 0.0, -t.x, -t.y, t.x, 0.0)
    }

    #[test]
    fn candidates_are_proper_rotations() {
        let rotation = *Rotation3::from_euler_angles(0.1, -0.2, 0.05).matrix();
        let essential = skew(&Vector3::new(0.0, 0.0, 1.0)) * rotation;

        for candidate in extract_pose_configurations(&essential).unwrap() {
            let r = candidate.rotation;
            assert!((r.transpose() * r - Matrix3::identity()).norm() < 1e-9);
            assert!((r.determinant() - 1.0).abs() < 1e-9);
            assert!((candidate.translation.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn cheirality_selects_the_true_motion() {
        let rotation = *Rotation3::from_euler_angles(0.02, 0.08, -0.01).matrix();
        let translation = Vector3::new(0.2, -0.1, -1.0).normalize();
        let essential = skew(&translation) * rotation;

        let matches: Vec<NormalizedMatch> = (0..20)
            .map(|i| {
                let f = i as f64;
                let point = Vector3::new(f.sin() * 3.0, (f * 0.7).cos(), 8.0 + f);
                let moved = rotation * point + translation;
                NormalizedMatch {
                    previous: Point2::new(point.x / point.z, point.y / point.z),
                    current: Point2::new(moved.x / moved.z, moved.y / moved.z),
                }
            })
            .collect();

        let candidates = extract_pose_configurations(&essential).unwrap();
        let vote = disambiguate_camera_pose(&candidates, &matches, 100.0);
        let winner = candidates[vote.index];

        assert_eq!(vote.votes, matches.len());
        assert!((winner.rotation - rotation).norm() < 1e-9);
        assert!((winner.translation - translation).norm() < 1e-9);
    }

    #[test]
    fn distant_points_do_not_vote() {
        let translation = Vector3::new(1.0, 0.0, 0.0);
        let essential = skew(&translation);
        let point = Vector3::new(0.0, 0.0, 500.0);
        let matches = [NormalizedMatch {
            previous: Point2::new(0.0, 0.0),
            current: Point2::new((point.x + 1.0) / point.z, 0.0),
        }];

        let candidates = extract_pose_configurations(&essential).unwrap();
        assert_eq!(disambiguate_camera_pose(&candidates, &matches, 100.0).votes, 0);
        assert_eq!(disambiguate_camera_pose(&candidates, &matches, 1000.0).votes, 1);
    }
}
