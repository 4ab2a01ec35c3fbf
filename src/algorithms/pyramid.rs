//! Gaussian image pyramid with bilinear sampling, the backbone of
//! coarse-to-fine point tracking.

use image::{GrayImage, ImageBuffer, Luma};

/// Single channel floating point image used inside the pyramid.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// `levels[0]` is full resolution, `levels[n]` is roughly `1 / 2^n` of it.
pub struct Pyramid {
    pub levels: Vec<FloatImage>,
}

impl Pyramid {
    /// Blur with `sigma` then keep every other pixel, `num_levels` times.
    ///
    /// Stops early when a level would shrink below the size of a tracking
    /// window, so `num_levels()` may be smaller than requested.
    pub fn build(image: &GrayImage, num_levels: usize, sigma: f32) -> Self {
        const MIN_LEVEL_SIZE: u32 = 16;

        let mut levels = Vec::with_capacity(num_levels.max(1));
        levels.push(to_float(image));

        let mut current = image.clone();
        for _ in 1..num_levels {
            let (width, height) = (current.width() / 2, current.height() / 2);
            if width < MIN_LEVEL_SIZE || height < MIN_LEVEL_SIZE {
                break;
            }

            let blurred = imageproc::filter::gaussian_blur_f32(&current, sigma);
            current = GrayImage::from_fn(width, height, |x, y| *blurred.get_pixel(2 * x, 2 * y));
            levels.push(to_float(&current));
        }

        Pyramid { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

fn to_float(image: &GrayImage) -> FloatImage {
    FloatImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y).0[0] as f32])
    })
}

/// Samples `image` at a sub-pixel location, clamping to the border.
pub fn sample_bilinear(image: &FloatImage, x: f32, y: f32) -> f32 {
    let max_x = (image.width() - 1) as f32;
    let max_y = (image.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let ax = x - x0;
    let ay = y - y0;

    let (x0, y0) = (x0 as u32, y0 as u32);
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);

    let p = |x, y| image.get_pixel(x, y).0[0];
    let top = p(x0, y0) * (1.0 - ax) + p(x1, y0) * ax;
    let bottom = p(x0, y1) * (1.0 - ax) + p(x1, y1) * ax;
    top * (1.0 - ay) + bottom * ay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_halve_in_size() {
        let image = GrayImage::from_fn(160, 128, |x, y| Luma([((x + y) % 256) as u8]));
        let pyramid = Pyramid::build(&image, 4, 1.0);

        assert_eq!(pyramid.num_levels(), 4);
        assert_eq!(pyramid.levels[1].dimensions(), (80, 64));
        assert_eq!(pyramid.levels[3].dimensions(), (20, 16));
    }

    #[test]
    fn small_images_get_fewer_levels() {
        let image = GrayImage::new(40, 40);
        assert_eq!(Pyramid::build(&image, 5, 1.0).num_levels(), 2);
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let image = FloatImage::from_fn(4, 4, |x, _| Luma([x as f32 * 10.0]));
        assert!((sample_bilinear(&image, 1.5, 2.0) - 15.0).abs() < 1e-6);
        assert!((sample_bilinear(&image, -3.0, 0.0) - 0.0).abs() < 1e-6);
        assert!((sample_bilinear(&image, 9.0, 9.0) - 30.0).abs() < 1e-6);
    }
}
