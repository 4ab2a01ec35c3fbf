//! The odometry pipeline proper: from grayscale frames to an integrated
//! camera trajectory.

pub mod features;
pub mod flow;
pub mod frame;
pub mod intrinsics;
pub mod pose;
pub mod system;
pub mod tracker;
pub mod trajectory;
