use crate::algorithms::pyramid::Pyramid;
use crate::slam::features::Keypoint;

/// A processed image kept as the reference for the next one.
pub struct Frame {
    /// Position of the image in the input stream.
    pub index: usize,
    pub keypoints: Vec<Keypoint>,
    /// Built once so the next frame can track against it without rebuilding.
    pub pyramid: Pyramid,
}
