//! Collection of general geometric and image algorithms used by the
//! odometry pipeline, kept free of any pipeline state.

pub mod camera;
pub mod consensus;
pub mod eight_point;
pub mod five_point;
pub mod pyramid;
pub mod triangulation;
