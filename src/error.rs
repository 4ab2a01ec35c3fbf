use std::path::PathBuf;

use thiserror::Error;

/// Problems with the run setup. These are reported before any frame is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The input path does not exist or is not usable.
    #[error("input path {0} does not exist")]
    MissingPath(PathBuf),
    /// The input directory contained no readable images.
    #[error("no images found in {0}")]
    NoImages(PathBuf),
    /// Dataset identifier is not one of the known layouts.
    #[error("unknown dataset `{0}`, expected `kitti` or `images`")]
    UnknownDataset(String),
    /// Focal lengths must be positive and every parameter finite.
    #[error("invalid camera intrinsics: fx={fx}, fy={fy}, cx={cx}, cy={cy}")]
    InvalidIntrinsics { fx: f64, fy: f64, cx: f64, cy: f64 },
    /// A calibration file was present but could not be parsed.
    #[error("malformed calibration in {path}: {reason}")]
    MalformedCalibration { path: PathBuf, reason: String },
    /// A ground truth file was present but could not be parsed.
    #[error("malformed ground truth in {path} at line {line}")]
    MalformedGroundTruth { path: PathBuf, line: usize },
    /// A tunable parameter is out of its valid range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// The configuration file could not be decoded.
    #[error("could not parse configuration file {path}: {source}")]
    Settings {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Recoverable failures of the relative pose estimator.
///
/// A frame that fails with one of these is skipped, the run continues.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoseError {
    /// Not enough valid correspondences to fit an essential matrix.
    #[error("insufficient correspondences: need at least {required}, got {found}")]
    InsufficientCorrespondences { required: usize, found: usize },
    /// Zero parallax, planar/collinear structure or no consensus.
    #[error("degenerate configuration: {0}")]
    Degenerate(DegeneracyKind),
}

/// Which degeneracy test rejected the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegeneracyKind {
    /// The epipolar constraint has more than one solution.
    IllConditioned,
    /// Robust fitting did not produce any model.
    NoConsensus,
    /// No pose candidate puts a majority of points in front of both views.
    Cheirality,
}

impl std::fmt::Display for DegeneracyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegeneracyKind::IllConditioned => write!(f, "ill-conditioned essential matrix"),
            DegeneracyKind::NoConsensus => write!(f, "no consensus model"),
            DegeneracyKind::Cheirality => write!(f, "ambiguous cheirality"),
        }
    }
}

/// Failures while emitting the trajectory and plots.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not encode image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}
