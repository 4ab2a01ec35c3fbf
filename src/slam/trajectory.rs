use nalgebra::{Matrix3, Vector3};

use crate::slam::pose::Pose;

/// Accumulated orientation and position of the camera in the frame of the
/// first image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryState {
    pub rotation: Matrix3<f64>,
    pub position: Vector3<f64>,
}

impl Default for TrajectoryState {
    fn default() -> Self {
        Self {
            rotation: Matrix3::identity(),
            position: Vector3::zeros(),
        }
    }
}

impl TrajectoryState {
    /// Chains a relative pose onto the state.
    ///
    /// The translation is rotated with the orientation from *before* this
    /// step, then the orientation is updated.
    pub fn integrate(&self, pose: &Pose, scale: f64) -> Self {
        Self {
            position: self.position + self.rotation * (scale * pose.translation),
            rotation: pose.rotation * self.rotation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub frame_index: usize,
    pub position: Vector3<f64>,
    pub rotation: Matrix3<f64>,
}

/// Angle between estimated and ground truth orientation of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationErrorSample {
    pub frame_index: usize,
    pub degrees: f64,
}

/// Everything a run produced, in frame order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
    pub rotation_errors: Vec<RotationErrorSample>,
}

impl Trajectory {
    pub fn push(&mut self, frame_index: usize, state: &TrajectoryState) {
        self.points.push(TrajectoryPoint {
            frame_index,
            position: state.position,
            rotation: state.rotation,
        });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Rotation angle of `R_a^T * R_b` in degrees.
pub fn rotation_angle(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    let relative = a.transpose() * b;
    let cos = ((relative.trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;
    use std::f64::consts::FRAC_PI_2;

    fn rz90() -> Matrix3<f64> {
        *Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2).matrix()
    }

    #[test]
    fn integration_uses_the_previous_rotation() {
        let start = TrajectoryState::default();
        let first = start.integrate(
            &Pose {
                rotation: Matrix3::identity(),
                translation: Vector3::new(0.0, 0.0, 1.0),
            },
            1.0,
        );
        assert_eq!(first.position, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(first.rotation, Matrix3::identity());

        let second = first.integrate(
            &Pose {
                rotation: rz90(),
                translation: Vector3::new(1.0, 0.0, 0.0),
            },
            1.0,
        );
        assert!((second.position - Vector3::new(1.0, 0.0, 1.0)).norm() < 1e-12);
        assert!((second.rotation - rz90()).norm() < 1e-12);
    }

    #[test]
    fn scale_stretches_the_step() {
        let state = TrajectoryState::default().integrate(
            &Pose {
                rotation: Matrix3::identity(),
                translation: Vector3::new(0.0, 0.6, 0.8),
            },
            2.5,
        );
        assert!((state.position.norm() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn rotation_stays_orthonormal_over_many_steps() {
        let step = Pose {
            rotation: *Rotation3::from_euler_angles(0.01, 0.03, -0.02).matrix(),
            translation: Vector3::new(0.0, 0.0, 1.0),
        };
        let state = (0..1000).fold(TrajectoryState::default(), |state, _| {
            state.integrate(&step, 1.0)
        });

        let r = state.rotation;
        assert!((r.transpose() * r - Matrix3::identity()).norm() < 1e-6);
        assert!((r.determinant() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rotation_angle_of_a_quarter_turn() {
        assert!((rotation_angle(&Matrix3::identity(), &rz90()) - 90.0).abs() < 1e-9);
        assert!(rotation_angle(&rz90(), &rz90()) < 1e-5);
    }
}
