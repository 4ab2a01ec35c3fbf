use std::time::Instant;

use image::GrayImage;
use log::{debug, info, warn};
use nalgebra::Vector3;

use crate::{
    config::{OdometryConfig, ScaleConfig},
    error::PoseError,
    io::dataset::GroundTruthPose,
    slam::{
        features::FeatureExtractor,
        flow::PointTracker,
        frame::Frame,
        intrinsics::CameraIntrinsics,
        pose::PoseEstimator,
        trajectory::{rotation_angle, RotationErrorSample, Trajectory, TrajectoryState},
    },
};

/// Tracking states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// No reference frame yet.
    #[default]
    Bootstrap,
    /// Every new frame is estimated against the previous one.
    Tracking,
    /// The stream ended, further frames are ignored.
    Done,
}

/// What happened to a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The frame became the first reference.
    Bootstrapped,
    /// Too few keypoints. The reference frame is left untouched.
    FeatureStarved { keypoints: usize },
    /// Motion could not be estimated. The frame still becomes the reference.
    PoseRejected(PoseError),
    /// The relative pose was chained onto the trajectory.
    Integrated { position: Vector3<f64> },
    /// The tracker was already finished.
    Ignored,
}

/// Frame counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: usize,
    pub integrated: usize,
    pub feature_starved: usize,
    pub rejected: usize,
}

/// Per-frame state machine of the odometry pipeline.
///
/// Owns the reference frame, the accumulated pose and the trajectory log.
pub struct Tracker {
    state: TrackingState,
    extractor: FeatureExtractor,
    point_tracker: PointTracker,
    estimator: PoseEstimator,
    /// Camera Intrinsic `3x3` Matrix known as `K`,
    /// which is made up of a 2D Translation, 2D Scaling, and 2D Shear
    intrinsics: CameraIntrinsics,
    scale: ScaleConfig,
    ground_truth: Option<Vec<GroundTruthPose>>,
    /// The previous frame
    last_frame: Option<Frame>,
    current: TrajectoryState,
    trajectory: Trajectory,
    stats: RunStats,
}

impl Tracker {
    pub fn new(config: &OdometryConfig, intrinsics: CameraIntrinsics) -> Self {
        Self {
            state: TrackingState::default(),
            extractor: FeatureExtractor::new(config.features),
            point_tracker: PointTracker::new(config.tracker),
            estimator: PoseEstimator::new(config.pose),
            intrinsics,
            scale: config.scale,
            ground_truth: None,
            last_frame: None,
            current: TrajectoryState::default(),
            trajectory: Trajectory::default(),
            stats: RunStats::default(),
        }
    }

    /// Ground truth poses indexed by frame, used for rotation error and
    /// optionally for scale.
    pub fn with_ground_truth(mut self, poses: Vec<GroundTruthPose>) -> Self {
        self.ground_truth = Some(poses);
        self
    }

    /// Runs the pipeline on the next frame of the stream.
    pub fn process(&mut self, image: GrayImage) -> FrameOutcome {
        if self.state == TrackingState::Done {
            warn!("tracker is finished, ignoring frame");
            return FrameOutcome::Ignored;
        }

        let index = self.stats.frames;
        self.stats.frames += 1;
        let start = Instant::now();

        let keypoints = self.extractor.detect(&image);
        if self.extractor.is_starved(&keypoints) {
            warn!(
                "frame {index}: feature-starved with {} keypoints, skipping",
                keypoints.len()
            );
            self.stats.feature_starved += 1;
            return FrameOutcome::FeatureStarved {
                keypoints: keypoints.len(),
            };
        }

        let pyramid = self.point_tracker.pyramid(&image);
        let frame = Frame {
            index,
            keypoints,
            pyramid,
        };

        let outcome = match self.last_frame.take() {
            None => {
                debug!("frame {index}: reference with {} keypoints", frame.keypoints.len());
                self.state = TrackingState::Tracking;
                FrameOutcome::Bootstrapped
            }
            Some(last_frame) => self.estimate_motion(&last_frame, &frame),
        };

        self.last_frame = Some(frame);
        debug!("frame {index}: processed in {:?}", start.elapsed());
        outcome
    }

    fn estimate_motion(&mut self, last_frame: &Frame, frame: &Frame) -> FrameOutcome {
        let correspondences = self.point_tracker.track_pyramids(
            &last_frame.pyramid,
            &last_frame.keypoints,
            &frame.pyramid,
        );

        let estimate = match self
            .estimator
            .estimate_correspondences(&correspondences, &self.intrinsics)
        {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!("frame {}: pose rejected: {e}", frame.index);
                self.stats.rejected += 1;
                return FrameOutcome::PoseRejected(e);
            }
        };

        let scale = self.scale_between(last_frame.index, frame.index);
        self.current = self.current.integrate(&estimate.pose, scale);
        self.trajectory.push(frame.index, &self.current);
        self.stats.integrated += 1;

        // The estimate is left-composed per frame while the ground truth is world-from-camera,
        // so the error also holds the composition order difference when rotations do not commute.
        if let Some(truth) = self.ground_truth_at(frame.index) {
            let degrees = rotation_angle(&truth.rotation, &self.current.rotation);
            self.trajectory.rotation_errors.push(RotationErrorSample {
                frame_index: frame.index,
                degrees,
            });
        }

        debug!(
            "frame {}: {} inliers, position {:?}",
            frame.index,
            estimate.num_inliers(),
            self.current.position.as_slice()
        );
        FrameOutcome::Integrated {
            position: self.current.position,
        }
    }

    /// Ground truth step length when enabled and available, else 1.
    fn scale_between(&self, from: usize, to: usize) -> f64 {
        if !self.scale.ground_truth_scale {
            return 1.0;
        }
        match (self.ground_truth_at(from), self.ground_truth_at(to)) {
            (Some(a), Some(b)) => (b.position - a.position).norm(),
            _ => 1.0,
        }
    }

    fn ground_truth_at(&self, index: usize) -> Option<&GroundTruthPose> {
        self.ground_truth.as_ref()?.get(index)
    }

    /// Ends the run and logs a summary.
    pub fn finish(&mut self) -> RunStats {
        self.state = TrackingState::Done;
        let stats = self.stats;
        info!(
            "{} frames: {} integrated, {} feature-starved, {} rejected",
            stats.frames, stats.integrated, stats.feature_starved, stats.rejected
        );
        stats
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn into_trajectory(self) -> Trajectory {
        self.trajectory
    }

    /// Accumulated rotation and position after the last integrated frame.
    pub fn current_state(&self) -> &TrajectoryState {
        &self.current
    }

    /// Index of the frame the next one will be tracked against.
    pub fn reference_index(&self) -> Option<usize> {
        self.last_frame.as_ref().map(|frame| frame.index)
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }
}
