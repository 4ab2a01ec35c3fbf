use image::{imageops::grayscale, DynamicImage};
use log::info;

use crate::{
    config::OdometryConfig,
    io::{dataset::GroundTruthPose, source::FrameSource},
    slam::{
        intrinsics::CameraIntrinsics,
        tracker::{FrameOutcome, RunStats, Tracker},
        trajectory::Trajectory,
    },
};

pub struct System {
    /// Tracker. It receives a frame and computes the associated camera pose.
    pub tracker: Tracker,
}

impl System {
    pub fn new(config: &OdometryConfig, intrinsics: CameraIntrinsics) -> Self {
        Self {
            tracker: Tracker::new(config, intrinsics),
        }
    }

    pub fn with_ground_truth(self, poses: Vec<GroundTruthPose>) -> Self {
        Self {
            tracker: self.tracker.with_ground_truth(poses),
        }
    }

    /// Converts a frame to grayscale and passes it to the tracker.
    pub fn track_monocular(&mut self, image: &DynamicImage) -> FrameOutcome {
        self.tracker.process(grayscale(image))
    }

    /// Pulls frames from `source` until it is exhausted.
    pub fn run<S>(&mut self, source: &mut S) -> RunStats
    where
        S: FrameSource + ?Sized,
    {
        while let Some(image) = source.read() {
            self.track_monocular(&image);
        }
        info!("frame source exhausted");
        self.tracker.finish()
    }

    pub fn trajectory(&self) -> &Trajectory {
        self.tracker.trajectory()
    }

    // Run any important cleanup procedures then SLAM instance is no longer in use
    pub fn shutdown(mut self) -> Trajectory {
        self.tracker.finish();
        self.tracker.into_trajectory()
    }
}
