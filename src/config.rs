//! Tunable parameters of the odometry pipeline.
//!
//! Every option has a default matching the classic KITTI monocular setup,
//! so a settings file only needs to list the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// All settings of a run, grouped by pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OdometryConfig {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
}

impl OdometryConfig {
    /// Loads settings from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file)).map_err(
            |source| ConfigError::Settings {
                path: path.to_owned(),
                source,
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make a stage meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(name: &'static str, reason: &str) -> ConfigError {
            ConfigError::InvalidParameter {
                name,
                reason: reason.to_owned(),
            }
        }

        if self.features.max_features == 0 {
            return Err(invalid("max_features", "must be at least 1"));
        }
        if self.features.min_features > self.features.max_features {
            return Err(invalid("min_features", "must not exceed max_features"));
        }
        if self.tracker.window_size < 3 || self.tracker.window_size % 2 == 0 {
            return Err(invalid("window_size", "must be odd and at least 3"));
        }
        if self.tracker.pyramid_levels == 0 {
            return Err(invalid("pyramid_levels", "must be at least 1"));
        }
        if !(self.tracker.pyramid_sigma > 0.0) {
            return Err(invalid("pyramid_sigma", "must be positive"));
        }
        if self.tracker.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        if !(self.tracker.epsilon > 0.0) {
            return Err(invalid("epsilon", "must be positive"));
        }
        if !(self.pose.inlier_threshold > 0.0) {
            return Err(invalid("inlier_threshold", "must be positive"));
        }
        if !(self.pose.confidence > 0.0 && self.pose.confidence < 1.0) {
            return Err(invalid("confidence", "must lie in (0, 1)"));
        }
        if self.pose.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        if !(self.pose.max_depth > 0.0) {
            return Err(invalid("max_depth", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.pose.min_cheirality_ratio) {
            return Err(invalid("min_cheirality_ratio", "must lie in [0, 1]"));
        }
        Ok(())
    }
}

/// Corner detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Intensity difference for the FAST segment test.
    #[serde(default = "default_fast_threshold")]
    pub fast_threshold: u8,
    /// Half size of the non-maximum suppression block. Zero disables suppression.
    #[serde(default = "default_nms_radius")]
    pub nms_radius: u32,
    /// Keep only this many of the strongest corners.
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// Frames with fewer corners are feature-starved and skipped.
    #[serde(default = "default_min_features")]
    pub min_features: usize,
}

fn default_fast_threshold() -> u8 {
    25
}

fn default_nms_radius() -> u32 {
    1
}

fn default_max_features() -> usize {
    1000
}

fn default_min_features() -> usize {
    10
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: default_fast_threshold(),
            nms_radius: default_nms_radius(),
            max_features: default_max_features(),
            min_features: default_min_features(),
        }
    }
}

/// Pyramidal Lucas-Kanade settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Side length of the square search window in pixels. Must be odd.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Number of pyramid levels including full resolution.
    #[serde(default = "default_pyramid_levels")]
    pub pyramid_levels: usize,
    /// Gaussian blur applied before each 2x downsample.
    #[serde(default = "default_pyramid_sigma")]
    pub pyramid_sigma: f32,
    /// Gauss-Newton iterations per level.
    #[serde(default = "default_tracker_iterations")]
    pub max_iterations: usize,
    /// Stop iterating once the update is shorter than this many pixels.
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    /// Smallest eigenvalue of the normalized structure tensor accepted as trackable.
    #[serde(default = "default_min_eigen_threshold")]
    pub min_eigen_threshold: f32,
}

fn default_window_size() -> usize {
    21
}

fn default_pyramid_levels() -> usize {
    4
}

fn default_pyramid_sigma() -> f32 {
    1.0
}

fn default_tracker_iterations() -> usize {
    30
}

fn default_epsilon() -> f32 {
    0.03
}

fn default_min_eigen_threshold() -> f32 {
    1e-4
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            pyramid_levels: default_pyramid_levels(),
            pyramid_sigma: default_pyramid_sigma(),
            max_iterations: default_tracker_iterations(),
            epsilon: default_epsilon(),
            min_eigen_threshold: default_min_eigen_threshold(),
        }
    }
}

/// Which sample consensus algorithm fits the essential matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusMethod {
    /// Classic RANSAC with adaptive stopping at the configured confidence.
    Ransac,
    /// Adaptive real-time random sample consensus.
    Arrsac,
}

/// Relative pose estimation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseConfig {
    /// Maximum Sampson distance of an inlier, in pixels.
    #[serde(default = "default_inlier_threshold")]
    pub inlier_threshold: f64,
    /// Probability that RANSAC has drawn at least one outlier-free sample.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Upper bound on RANSAC hypotheses.
    #[serde(default = "default_pose_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_consensus")]
    pub consensus: ConsensusMethod,
    /// Seed of the sampling generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Smallest accepted ratio between the second-smallest and the largest
    /// singular value of the epipolar constraint matrix.
    #[serde(default = "default_degeneracy_threshold")]
    pub degeneracy_threshold: f64,
    /// Triangulated points farther than this many baselines do not vote.
    #[serde(default = "default_max_depth")]
    pub max_depth: f64,
    /// Fraction of inliers the winning pose candidate must place in front of both views.
    #[serde(default = "default_min_cheirality_ratio")]
    pub min_cheirality_ratio: f64,
}

fn default_inlier_threshold() -> f64 {
    1.0
}

fn default_confidence() -> f64 {
    0.999
}

fn default_pose_iterations() -> usize {
    1000
}

fn default_consensus() -> ConsensusMethod {
    ConsensusMethod::Ransac
}

fn default_seed() -> u64 {
    42
}

fn default_degeneracy_threshold() -> f64 {
    1e-5
}

fn default_max_depth() -> f64 {
    100.0
}

fn default_min_cheirality_ratio() -> f64 {
    0.5
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            inlier_threshold: default_inlier_threshold(),
            confidence: default_confidence(),
            max_iterations: default_pose_iterations(),
            consensus: default_consensus(),
            seed: default_seed(),
            degeneracy_threshold: default_degeneracy_threshold(),
            max_depth: default_max_depth(),
            min_cheirality_ratio: default_min_cheirality_ratio(),
        }
    }
}

/// Scale correction of the unit-norm translations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Use the ground truth step length as scale when ground truth is available.
    #[serde(default)]
    pub ground_truth_scale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{ "features": { "max_features": 500 }, "pose": { "consensus": "arrsac" } }"#;
        let config: OdometryConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.features.max_features, 500);
        assert_eq!(config.features.fast_threshold, 25);
        assert_eq!(config.pose.consensus, ConsensusMethod::Arrsac);
        assert_eq!(config.tracker, TrackerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn even_window_is_rejected() {
        let mut config = OdometryConfig::default();
        config.tracker.window_size = 20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { name: "window_size", .. })
        ));
    }

    #[test]
    fn confidence_must_be_a_probability() {
        let mut config = OdometryConfig::default();
        config.pose.confidence = 1.0;
        assert!(config.validate().is_err());
    }
}
