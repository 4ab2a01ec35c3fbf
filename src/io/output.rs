//! Trajectory CSV and the two diagnostic plots.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Pixel, Rgb, RgbImage};
use imageproc::drawing;
use imageproc::rect::Rect;
use log::info;
use once_cell::sync::Lazy;

use crate::error::OutputError;
use crate::slam::trajectory::Trajectory;

pub const TRAJECTORY_FILE: &str = "output_data.csv";
pub const POSITION_PLOT_FILE: &str = "position_plot.png";
pub const ERROR_PLOT_FILE: &str = "error.png";

const PLOT_SIZE: u32 = 640;
const MARGIN: f32 = 40.0;

static WHITE: Lazy<Rgb<u8>> = Lazy::new(|| *Rgb::from_slice(&[255, 255, 255]));
static BLACK: Lazy<Rgb<u8>> = Lazy::new(|| *Rgb::from_slice(&[0, 0, 0]));
static BLUE: Lazy<Rgb<u8>> = Lazy::new(|| *Rgb::from_slice(&[31, 119, 180]));

/// Where [`write_outputs`] put its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub trajectory: PathBuf,
    pub position_plot: PathBuf,
    pub error_plot: PathBuf,
}

/// One `x, z` line per integrated frame: lateral then forward position.
pub fn format_trajectory(trajectory: &Trajectory) -> String {
    trajectory
        .points
        .iter()
        .map(|point| format!("{}, {}\n", point.position.x, point.position.z))
        .collect()
}

pub fn write_trajectory_csv(path: &Path, trajectory: &Trajectory) -> Result<(), OutputError> {
    fs::write(path, format_trajectory(trajectory)).map_err(|source| OutputError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Top-down scatter of the positions, X to the right and Z upwards, equal aspect.
pub fn render_position_plot(trajectory: &Trajectory) -> RgbImage {
    let mut canvas = blank_canvas();

    let positions: Vec<(f64, f64)> = trajectory
        .points
        .iter()
        .map(|point| (point.position.x, point.position.z))
        .collect();

    let bounds = positions.iter().fold(
        (0.0f64, 0.0f64, 0.0f64, 0.0f64),
        |(min_x, max_x, min_z, max_z), &(x, z)| {
            (min_x.min(x), max_x.max(x), min_z.min(z), max_z.max(z))
        },
    );
    let (min_x, max_x, min_z, max_z) = bounds;
    let extent = (max_x - min_x).max(max_z - min_z).max(1e-9);
    let usable = PLOT_SIZE as f64 - 2.0 * MARGIN as f64;
    let scale = usable / extent;

    let to_pixel = |x: f64, z: f64| {
        let px = MARGIN as f64 + (x - min_x) * scale;
        let py = PLOT_SIZE as f64 - MARGIN as f64 - (z - min_z) * scale;
        (px as f32, py as f32)
    };

    // axes through the origin
    let (origin_x, origin_y) = to_pixel(0.0, 0.0);
    let far = PLOT_SIZE as f32 - MARGIN;
    drawing::draw_line_segment_mut(&mut canvas, (origin_x, MARGIN), (origin_x, far), *BLACK);
    drawing::draw_line_segment_mut(&mut canvas, (MARGIN, origin_y), (far, origin_y), *BLACK);

    for &(x, z) in &positions {
        let (px, py) = to_pixel(x, z);
        let center = (px.round() as i32, py.round() as i32);
        drawing::draw_filled_circle_mut(&mut canvas, center, 2, *BLUE);
    }

    canvas
}

/// Bar chart of the rotation error per frame. Without samples only the axes are drawn.
pub fn render_rotation_error_plot(trajectory: &Trajectory) -> RgbImage {
    let mut canvas = blank_canvas();
    let (bottom, right) = (PLOT_SIZE as f32 - MARGIN, PLOT_SIZE as f32 - MARGIN);
    let usable = PLOT_SIZE as f32 - 2.0 * MARGIN;

    drawing::draw_line_segment_mut(&mut canvas, (MARGIN, MARGIN), (MARGIN, bottom), *BLACK);
    drawing::draw_line_segment_mut(&mut canvas, (MARGIN, bottom), (right, bottom), *BLACK);

    let samples = &trajectory.rotation_errors;
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return canvas,
    };

    let max_degrees = samples.iter().map(|s| s.degrees).fold(0.0f64, f64::max).max(1e-9);
    let span = (last.frame_index - first.frame_index + 1) as f32;
    let bar_width = ((usable / span).floor() as u32).max(1);

    for sample in samples {
        let offset = (sample.frame_index - first.frame_index) as f32 / span * usable;
        let height = ((sample.degrees / max_degrees) as f32 * usable).round() as u32;
        if height == 0 {
            continue;
        }
        let rect = Rect::at((MARGIN + offset) as i32, (bottom - height as f32) as i32)
            .of_size(bar_width, height);
        drawing::draw_filled_rect_mut(&mut canvas, rect, *BLUE);
    }

    canvas
}

/// Writes the trajectory CSV and both plots into `dir`.
pub fn write_outputs(dir: &Path, trajectory: &Trajectory) -> Result<OutputPaths, OutputError> {
    fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_owned(),
        source,
    })?;

    let paths = OutputPaths {
        trajectory: dir.join(TRAJECTORY_FILE),
        position_plot: dir.join(POSITION_PLOT_FILE),
        error_plot: dir.join(ERROR_PLOT_FILE),
    };

    write_trajectory_csv(&paths.trajectory, trajectory)?;
    save(&render_position_plot(trajectory), &paths.position_plot)?;
    save(&render_rotation_error_plot(trajectory), &paths.error_plot)?;

    info!(
        "wrote {} trajectory points to {}",
        trajectory.len(),
        paths.trajectory.display()
    );
    Ok(paths)
}

fn blank_canvas() -> RgbImage {
    RgbImage::from_pixel(PLOT_SIZE, PLOT_SIZE, *WHITE)
}

fn save(image: &RgbImage, path: &Path) -> Result<(), OutputError> {
    image.save(path).map_err(|source| OutputError::Image {
        path: path.to_owned(),
        source,
    })
}
