use image::GrayImage;
use imageproc::corners::{corners_fast9, Corner};
use imageproc::suppress::local_maxima;

use crate::config::FeatureConfig;

/// A detected corner with sub-pixel capable coordinates and its FAST score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub response: f32,
}

impl From<Corner> for Keypoint {
    fn from(Corner { x, y, score }: Corner) -> Self {
        Keypoint {
            x: x as f32,
            y: y as f32,
            response: score,
        }
    }
}

/// Uses FAST (Features from Accelerated Segment Test)
/// as a keypoint detector for corners in a grayscale image
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Detects the strongest corners, ordered by descending response and
    /// capped at `max_features`.
    pub fn detect(&self, image: &GrayImage) -> Vec<Keypoint> {
        let corners = corners_fast9(image, self.config.fast_threshold);

        // collapse clusters of adjacent detections onto their strongest member
        let corners = if self.config.nms_radius > 0 {
            local_maxima(&corners, self.config.nms_radius)
        } else {
            corners
        };

        let mut keypoints: Vec<Keypoint> = corners.into_iter().map(Keypoint::from).collect();

        // stable, so equal responses keep raster order and runs stay reproducible
        keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
        keypoints.truncate(self.config.max_features);
        keypoints
    }

    /// Whether a detection result is too small to estimate motion from.
    pub fn is_starved(&self, keypoints: &[Keypoint]) -> bool {
        keypoints.len() < self.config.min_features
    }
}
