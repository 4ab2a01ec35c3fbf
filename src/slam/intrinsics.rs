use nalgebra::{Matrix3, Point2};

use crate::error::ConfigError;

/// Pinhole calibration of the camera. Lens distortion is assumed corrected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Left grayscale camera of KITTI odometry sequence 00.
    pub const KITTI_DEFAULT: CameraIntrinsics = CameraIntrinsics {
        fx: 718.8560,
        fy: 718.8560,
        cx: 607.1928,
        cy: 185.2157,
    };

    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, ConfigError> {
        let valid = [fx, fy, cx, cy].iter().all(|v| v.is_finite()) && fx > 0.0 && fy > 0.0;
        if !valid {
            return Err(ConfigError::InvalidIntrinsics { fx, fy, cx, cy });
        }

        Ok(Self { fx, fy, cx, cy })
    }

    /// Reads the intrinsics back out of a 3x3 calibration (or the left block of a 3x4 projection).
    pub fn from_matrix(k: &Matrix3<f64>) -> Result<Self, ConfigError> {
        Self::new(k.m11, k.m22, k.m13, k.m23)
    }

    /// The calibration matrix `K`.
    pub fn calibration_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Pixel coordinates to the normalized image plane (`K^-1 * p`).
    pub fn normalize(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    /// Normalized image plane coordinates to pixels (`K * p`).
    pub fn project(&self, normalized: &Point2<f64>) -> Point2<f64> {
        Point2::new(
            normalized.x * self.fx + self.cx,
            normalized.y * self.fy + self.cy,
        )
    }

    /// Converts a distance in pixels into normalized image units.
    pub fn mean_focal(&self) -> f64 {
        0.5 * (self.fx + self.fy)
    }
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self::KITTI_DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_inverts_project() {
        let camera = CameraIntrinsics::new(500.0, 480.0, 320.0, 240.0).unwrap();
        let pixel = Point2::new(123.5, 401.25);
        let back = camera.project(&camera.normalize(&pixel));
        assert!((back - pixel).norm() < 1e-12);

        let k_inv = camera.calibration_matrix().try_inverse().unwrap();
        let normalized = k_inv * pixel.to_homogeneous();
        assert!((camera.normalize(&pixel).coords - normalized.xy()).norm() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_focal_length() {
        assert!(CameraIntrinsics::new(0.0, 1.0, 0.0, 0.0).is_err());
        assert!(CameraIntrinsics::new(1.0, f64::NAN, 0.0, 0.0).is_err());
    }
}
