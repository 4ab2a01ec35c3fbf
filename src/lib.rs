//! Monocular visual odometry.
//!
//! Frames go through FAST corner detection, pyramidal Lucas-Kanade tracking
//! and robust essential matrix estimation. The recovered relative poses are
//! chained into a trajectory that is known up to scale.
//!
//! ```no_run
//! use monovo::{CameraIntrinsics, FrameSource, ImageSequence, OdometryConfig, System};
//!
//! let paths = monovo::io::dataset::list_images(std::path::Path::new("sequences/00/image_0"))?;
//! let mut source = ImageSequence::new(paths);
//! let mut slam = System::new(&OdometryConfig::default(), CameraIntrinsics::KITTI_DEFAULT);
//!
//! // Main loop
//! while let Some(image) = source.read() {
//!     // Pass the image to the SLAM system
//!     slam.track_monocular(&image);
//! }
//!
//! let trajectory = slam.shutdown();
//! println!("{} poses", trajectory.len());
//! # Ok::<(), monovo::ConfigError>(())
//! ```

pub mod algorithms;
pub mod config;
pub mod error;
pub mod io;
pub mod slam;

pub use config::{ConsensusMethod, OdometryConfig};
pub use error::{ConfigError, DegeneracyKind, OutputError, PoseError};
pub use io::{
    dataset::{create_dataset, Dataset, GroundTruthPose},
    source::{FrameSource, ImageSequence, VecSource},
};
pub use slam::{
    intrinsics::CameraIntrinsics,
    pose::{Pose, PoseEstimate, PoseEstimator},
    system::System,
    tracker::{FrameOutcome, RunStats, Tracker, TrackingState},
    trajectory::{Trajectory, TrajectoryState},
};
