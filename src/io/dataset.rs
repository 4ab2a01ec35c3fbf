//! Dataset layouts: where the images are, and which calibration and
//! ground truth come with them.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use nalgebra::{Matrix3, Matrix3x4, Vector3};

use crate::error::ConfigError;
use crate::slam::intrinsics::CameraIntrinsics;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "pgm", "tiff"];

/// Camera pose in the world frame of a ground truth file
/// (`X_world = rotation * X_camera + position`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruthPose {
    pub rotation: Matrix3<f64>,
    pub position: Vector3<f64>,
}

/// An input sequence with optional calibration and ground truth.
pub trait Dataset {
    /// Number of frames in the sequence.
    fn image_count(&self) -> usize;

    /// Frame files in playback order.
    fn image_paths(&self) -> &[PathBuf];

    /// One pose per frame when the sequence has ground truth.
    fn ground_truth(&self) -> Option<&[GroundTruthPose]>;

    /// Calibration shipped with the sequence.
    fn camera_matrix(&self) -> Option<CameraIntrinsics>;
}

/// Creates the dataset named `name` rooted at `path`.
///
/// Known names are `kitti` and `images`.
pub fn create_dataset(name: &str, path: &Path) -> Result<Box<dyn Dataset>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingPath(path.to_owned()));
    }

    match name.to_ascii_lowercase().as_str() {
        "kitti" => Ok(Box::new(KittiSequence::open(path)?)),
        "images" => Ok(Box::new(ImageDirectory::open(path)?)),
        _ => Err(ConfigError::UnknownDataset(name.to_owned())),
    }
}

/// A KITTI odometry sequence directory.
///
/// ```plain
/// sequences/00/calib.txt      P0: row gives the left grayscale camera
/// sequences/00/image_0/*.png
/// sequences/00/poses.txt      or poses/00.txt next to sequences/
/// ```
#[derive(Debug, Clone)]
pub struct KittiSequence {
    images: Vec<PathBuf>,
    calibration: Option<CameraIntrinsics>,
    ground_truth: Option<Vec<GroundTruthPose>>,
}

impl KittiSequence {
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let image_dir = path.join("image_0");
        let images = if image_dir.is_dir() {
            list_images(&image_dir)?
        } else {
            list_images(path)?
        };

        let calib_path = path.join("calib.txt");
        let calibration = if calib_path.is_file() {
            Some(parse_calibration(&read(&calib_path)?, &calib_path)?)
        } else {
            warn!("no calib.txt in {}, using the default camera", path.display());
            None
        };

        let ground_truth = match ground_truth_path(path) {
            Some(poses_path) => {
                let poses = parse_poses(&read(&poses_path)?, &poses_path)?;
                info!("ground truth: {} poses from {}", poses.len(), poses_path.display());
                Some(poses)
            }
            None => None,
        };

        Ok(Self {
            images,
            calibration,
            ground_truth,
        })
    }
}

impl Dataset for KittiSequence {
    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn image_paths(&self) -> &[PathBuf] {
        &self.images
    }

    fn ground_truth(&self) -> Option<&[GroundTruthPose]> {
        self.ground_truth.as_deref()
    }

    fn camera_matrix(&self) -> Option<CameraIntrinsics> {
        self.calibration
    }
}

/// A plain directory of images without calibration or ground truth.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    images: Vec<PathBuf>,
}

impl ImageDirectory {
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            images: list_images(path)?,
        })
    }
}

impl Dataset for ImageDirectory {
    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn image_paths(&self) -> &[PathBuf] {
        &self.images
    }

    fn ground_truth(&self) -> Option<&[GroundTruthPose]> {
        None
    }

    fn camera_matrix(&self) -> Option<CameraIntrinsics> {
        None
    }
}

/// Image files in `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_owned(),
        source,
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| {
                    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                })
        })
        .collect();
    images.sort();

    if images.is_empty() {
        return Err(ConfigError::NoImages(dir.to_owned()));
    }
    Ok(images)
}

/// Reads the intrinsics of the left grayscale camera from the `P0:` row
/// of a KITTI calibration file.
pub fn parse_calibration(text: &str, path: &Path) -> Result<CameraIntrinsics, ConfigError> {
    let malformed = |reason: &str| ConfigError::MalformedCalibration {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };

    let row = text
        .lines()
        .find_map(|line| line.trim().strip_prefix("P0:"))
        .ok_or_else(|| malformed("missing P0 row"))?;

    let values = parse_floats(row).ok_or_else(|| malformed("P0 row is not numeric"))?;
    if values.len() != 12 {
        return Err(malformed("P0 row must have 12 values"));
    }

    let projection = Matrix3x4::from_row_slice(&values);
    CameraIntrinsics::from_matrix(&projection.fixed_columns::<3>(0).into_owned())
}

/// Parses one `3x4` row-major `[R | t]` pose per line. Blank lines are skipped.
pub fn parse_poses(text: &str, path: &Path) -> Result<Vec<GroundTruthPose>, ConfigError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let malformed = || ConfigError::MalformedGroundTruth {
                path: path.to_owned(),
                line: index + 1,
            };
            let values = parse_floats(line).ok_or_else(malformed)?;
            if values.len() != 12 {
                return Err(malformed());
            }

            let pose = Matrix3x4::from_row_slice(&values);
            Ok(GroundTruthPose {
                rotation: pose.fixed_columns::<3>(0).into_owned(),
                position: pose.column(3).into_owned(),
            })
        })
        .collect()
}

fn parse_floats(text: &str) -> Option<Vec<f64>> {
    text.split_whitespace()
        .map(|value| value.parse::<f64>().ok())
        .collect()
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })
}

/// `poses.txt` inside the sequence, or `poses/<sequence>.txt` of the
/// KITTI odometry tree the sequence lives in.
fn ground_truth_path(sequence: &Path) -> Option<PathBuf> {
    let local = sequence.join("poses.txt");
    if local.is_file() {
        return Some(local);
    }

    let name = sequence.file_name()?;
    let root = sequence.parent()?.parent()?;
    let shared = root.join("poses").join(name).with_extension("txt");
    shared.is_file().then_some(shared)
}
