use image::GrayImage;
use nalgebra::Point2;

use crate::algorithms::pyramid::{sample_bilinear, FloatImage, Pyramid};
use crate::config::TrackerConfig;
use crate::slam::features::Keypoint;

/// A keypoint from the previous frame and where it was found in the current one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub previous: Point2<f32>,
    pub current: Point2<f32>,
    /// False when the search diverged, did not converge or left the image.
    pub valid: bool,
    /// Mean absolute intensity difference over the window at the final position.
    pub error: f32,
}

/// Result of the Lucas-Kanade iterations on a single pyramid level.
enum LevelResult {
    Converged(f32, f32),
    MaxIterations(f32, f32),
    /// The window has too little texture at this level.
    Untrackable,
    Diverged,
}

/// Pyramidal Lucas-Kanade sparse optical flow.
///
/// Template gradients are taken once per level around the previous position,
/// so the 2x2 normal matrix stays constant while the displacement is refined
/// against the current image.
#[derive(Debug, Clone, Copy)]
pub struct PointTracker {
    config: TrackerConfig,
}

impl PointTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Tracks every keypoint from `previous` into `current`.
    ///
    /// The output has one entry per keypoint, in the same order.
    pub fn track(
        &self,
        previous: &GrayImage,
        keypoints: &[Keypoint],
        current: &GrayImage,
    ) -> Vec<Correspondence> {
        let prev_pyramid = self.pyramid(previous);
        let curr_pyramid = self.pyramid(current);
        self.track_pyramids(&prev_pyramid, keypoints, &curr_pyramid)
    }

    pub fn pyramid(&self, image: &GrayImage) -> Pyramid {
        Pyramid::build(image, self.config.pyramid_levels, self.config.pyramid_sigma)
    }

    pub fn track_pyramids(
        &self,
        previous: &Pyramid,
        keypoints: &[Keypoint],
        current: &Pyramid,
    ) -> Vec<Correspondence> {
        let num_levels = previous.num_levels().min(current.num_levels());
        keypoints
            .iter()
            .map(|keypoint| self.track_point(previous, current, keypoint, num_levels))
            .collect()
    }

    fn track_point(
        &self,
        previous: &Pyramid,
        current: &Pyramid,
        keypoint: &Keypoint,
        num_levels: usize,
    ) -> Correspondence {
        let origin = Point2::new(keypoint.x, keypoint.y);
        let lost = |dx: f32, dy: f32| Correspondence {
            previous: origin,
            current: Point2::new(keypoint.x + dx, keypoint.y + dy),
            valid: false,
            error: f32::INFINITY,
        };

        let (mut dx, mut dy) = (0.0f32, 0.0f32);
        for level in (0..num_levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let result = self.refine(
                &previous.levels[level],
                &current.levels[level],
                keypoint.x * scale,
                keypoint.y * scale,
                dx,
                dy,
            );

            match result {
                LevelResult::Converged(x, y) => {
                    dx = x;
                    dy = y;
                }
                // the next finer level corrects residual motion, only the finest must converge
                LevelResult::MaxIterations(x, y) if level > 0 => {
                    dx = x;
                    dy = y;
                }
                LevelResult::MaxIterations(x, y) => return lost(x, y),
                // keep the coarser estimate and let a finer level try
                LevelResult::Untrackable if level > 0 => {}
                LevelResult::Untrackable | LevelResult::Diverged => {
                    return lost(dx / scale, dy / scale)
                }
            }

            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let position = Point2::new(keypoint.x + dx, keypoint.y + dy);
        let (width, height) = current.levels[0].dimensions();
        let inside = position.x >= 0.0
            && position.y >= 0.0
            && position.x <= (width - 1) as f32
            && position.y <= (height - 1) as f32;
        if !inside {
            return lost(dx, dy);
        }

        Correspondence {
            previous: origin,
            current: position,
            valid: true,
            error: self.window_error(
                &previous.levels[0],
                &current.levels[0],
                keypoint.x,
                keypoint.y,
                dx,
                dy,
            ),
        }
    }

    /// Gauss-Newton refinement of the displacement `(dx, dy)` on one level.
    fn refine(
        &self,
        previous: &FloatImage,
        current: &FloatImage,
        x: f32,
        y: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LevelResult {
        let half = (self.config.window_size / 2) as isize;
        let area = (self.config.window_size * self.config.window_size) as f32;

        let mut template = Vec::with_capacity(area as usize);
        let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -half..=half {
            for wx in -half..=half {
                let (ox, oy) = (wx as f32, wy as f32);
                let (tx, ty) = (x + ox, y + oy);
                let value = sample_bilinear(previous, tx, ty);
                let gx = 0.5
                    * (sample_bilinear(previous, tx + 1.0, ty)
                        - sample_bilinear(previous, tx - 1.0, ty));
                let gy = 0.5
                    * (sample_bilinear(previous, tx, ty + 1.0)
                        - sample_bilinear(previous, tx, ty - 1.0));

                h00 += gx * gx;
                h01 += gx * gy;
                h11 += gy * gy;
                template.push((ox, oy, value, gx, gy));
            }
        }

        // smallest eigenvalue of the structure tensor, per pixel and in unit intensities
        let trace = h00 + h11;
        let root = ((h00 - h11) * (h00 - h11) + 4.0 * h01 * h01).sqrt();
        let min_eigen = 0.5 * (trace - root) / (area * 255.0 * 255.0);
        let det = h00 * h11 - h01 * h01;
        if min_eigen < self.config.min_eigen_threshold || det.abs() < f32::EPSILON {
            return LevelResult::Untrackable;
        }

        for _ in 0..self.config.max_iterations {
            let (mut b0, mut b1) = (0.0f32, 0.0f32);
            for &(ox, oy, value, gx, gy) in &template {
                let residual = value - sample_bilinear(current, x + dx + ox, y + dy + oy);
                b0 += gx * residual;
                b1 += gy * residual;
            }

            let step_x = (h11 * b0 - h01 * b1) / det;
            let step_y = (h00 * b1 - h01 * b0) / det;
            dx += step_x;
            dy += step_y;

            if !dx.is_finite() || !dy.is_finite() {
                return LevelResult::Diverged;
            }
            if step_x * step_x + step_y * step_y < self.config.epsilon * self.config.epsilon {
                return LevelResult::Converged(dx, dy);
            }
        }

        LevelResult::MaxIterations(dx, dy)
    }

    fn window_error(
        &self,
        previous: &FloatImage,
        current: &FloatImage,
        x: f32,
        y: f32,
        dx: f32,
        dy: f32,
    ) -> f32 {
        let half = (self.config.window_size / 2) as isize;
        let mut total = 0.0f32;
        for wy in -half..=half {
            for wx in -half..=half {
                let (px, py) = (x + wx as f32, y + wy as f32);
                total += (sample_bilinear(previous, px, py)
                    - sample_bilinear(current, px + dx, py + dy))
                    .abs();
            }
        }
        total / (self.config.window_size * self.config.window_size) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Smooth blobs so the intensity surface is differentiable everywhere.
    fn blob_scene(shift_x: f32, shift_y: f32) -> GrayImage {
        let centers = [(40.0, 40.0), (90.0, 45.0), (60.0, 95.0), (100.0, 100.0)];
        GrayImage::from_fn(140, 140, |x, y| {
            let value = centers.iter().fold(20.0f32, |acc, &(cx, cy)| {
                let ddx = x as f32 - cx - shift_x;
                let ddy = y as f32 - cy - shift_y;
                acc + 200.0 * (-(ddx * ddx + ddy * ddy) / 60.0).exp()
            });
            Luma([value.min(255.0) as u8])
        })
    }

    fn keypoints() -> Vec<Keypoint> {
        [(36.0, 36.0), (94.0, 41.0), (56.0, 99.0), (104.0, 96.0)]
            .iter()
            .map(|&(x, y)| Keypoint { x, y, response: 1.0 })
            .collect()
    }

    #[test]
    fn recovers_a_known_shift() {
        let tracker = PointTracker::new(TrackerConfig::default());
        let correspondences =
            tracker.track(&blob_scene(0.0, 0.0), &keypoints(), &blob_scene(3.0, -2.0));

        assert_eq!(correspondences.len(), 4);
        for c in &correspondences {
            assert!(c.valid, "lost {c:?}");
            let motion = c.current - c.previous;
            assert!((motion.x - 3.0).abs() < 0.5, "{c:?}");
            assert!((motion.y + 2.0).abs() < 0.5, "{c:?}");
        }
    }

    #[test]
    fn identical_frames_have_zero_flow() {
        let tracker = PointTracker::new(TrackerConfig::default());
        let image = blob_scene(0.0, 0.0);
        for c in tracker.track(&image, &keypoints(), &image) {
            assert!(c.valid);
            assert_eq!(c.previous, c.current);
            assert_eq!(c.error, 0.0);
        }
    }

    #[test]
    fn textureless_window_is_invalid() {
        let tracker = PointTracker::new(TrackerConfig::default());
        let flat = GrayImage::from_pixel(80, 80, Luma([90]));
        let keypoint = Keypoint { x: 40.0, y: 40.0, response: 1.0 };
        let correspondences = tracker.track(&flat, &[keypoint], &flat);

        assert_eq!(correspondences.len(), 1);
        assert!(!correspondences[0].valid);
    }
}
