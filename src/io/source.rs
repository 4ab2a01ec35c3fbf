use std::collections::VecDeque;
use std::path::PathBuf;

use image::DynamicImage;
use log::error;

/// Pull-based supplier of frames. `None` ends the stream.
pub trait FrameSource {
    fn read(&mut self) -> Option<DynamicImage>;
}

/// Frames decoded one at a time from a list of image files.
///
/// A file that cannot be decoded is logged and ends the stream.
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageSequence {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }
}

impl FrameSource for ImageSequence {
    fn read(&mut self) -> Option<DynamicImage> {
        let path = self.paths.next()?;
        match image::open(&path) {
            Ok(image) => Some(image),
            Err(e) => {
                error!("could not read frame {}: {e}", path.display());
                self.paths = Vec::new().into_iter();
                None
            }
        }
    }
}

/// Frames already held in memory.
#[derive(Default)]
pub struct VecSource {
    frames: VecDeque<DynamicImage>,
}

impl FrameSource for VecSource {
    fn read(&mut self) -> Option<DynamicImage> {
        self.frames.pop_front()
    }
}

impl From<Vec<DynamicImage>> for VecSource {
    fn from(frames: Vec<DynamicImage>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FromIterator<DynamicImage> for VecSource {
    fn from_iter<I: IntoIterator<Item = DynamicImage>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn unreadable_file_ends_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("000000.png");
        let bad = dir.path().join("000001.png");
        let after = dir.path().join("000002.png");
        GrayImage::from_pixel(8, 8, Luma([7])).save(&good).unwrap();
        std::fs::write(&bad, b"not a png").unwrap();
        GrayImage::from_pixel(8, 8, Luma([9])).save(&after).unwrap();

        let mut source = ImageSequence::new(vec![good, bad, after]);
        assert_eq!(source.read().map(|frame| frame.to_luma8().get_pixel(0, 0).0), Some([7]));
        assert!(source.read().is_none());
        assert!(source.read().is_none());
    }

    #[test]
    fn vec_source_yields_in_order() {
        let mut source: VecSource = (1..=3u8)
            .map(|v| DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([v]))))
            .collect();

        for expected in 1..=3u8 {
            assert_eq!(source.read().unwrap().to_luma8().get_pixel(1, 1).0, [expected]);
        }
        assert!(source.read().is_none());
    }
}
