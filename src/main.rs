use std::path::PathBuf;

use anyhow::{Context, Result};
use log::*;
use monovo::{
    create_dataset, io::output::write_outputs, CameraIntrinsics, ConsensusMethod, ImageSequence,
    OdometryConfig, System,
};
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(name = "monovo", about = "Monocular visual odometry on an image sequence")]
struct Opt {
    /// Dataset layout of `path`: `kitti` or `images`.
    #[structopt(long, default_value = "kitti")]
    dataset: String,
    /// Sequence directory, e.g. `dataset/sequences/00` for KITTI.
    #[structopt(long, parse(from_os_str))]
    path: PathBuf,
    /// JSON file with pipeline settings.
    ///
    /// This is in the format of `monovo::OdometryConfig`, missing fields take defaults.
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// Directory receiving the trajectory CSV and plots.
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    output_dir: PathBuf,
    /// The x focal length
    #[structopt(long)]
    fx: Option<f64>,
    /// The y focal length
    #[structopt(long)]
    fy: Option<f64>,
    /// The x optical center coordinate
    #[structopt(long)]
    cx: Option<f64>,
    /// The y optical center coordinate
    #[structopt(long)]
    cy: Option<f64>,
    /// FAST segment test threshold
    #[structopt(long)]
    fast_threshold: Option<u8>,
    /// Strongest corners kept per frame
    #[structopt(long)]
    max_features: Option<usize>,
    /// Frames with fewer corners are skipped
    #[structopt(long)]
    min_features: Option<usize>,
    /// Lucas-Kanade window side in pixels
    #[structopt(long)]
    window_size: Option<usize>,
    /// Pyramid levels including full resolution
    #[structopt(long)]
    pyramid_levels: Option<usize>,
    /// Essential matrix inlier threshold in pixels
    #[structopt(long)]
    inlier_threshold: Option<f64>,
    /// RANSAC confidence
    #[structopt(long)]
    confidence: Option<f64>,
    /// Use ARRSAC instead of RANSAC
    #[structopt(long)]
    arrsac: bool,
    /// Seed of the consensus sampler
    #[structopt(long)]
    seed: Option<u64>,
    /// Scale each step by the ground truth step length
    #[structopt(long)]
    ground_truth_scale: bool,
}

impl Opt {
    fn odometry_config(&self) -> Result<OdometryConfig> {
        let mut config = match &self.config {
            Some(path) => OdometryConfig::from_json_file(path)?,
            None => OdometryConfig::default(),
        };

        macro_rules! override_with {
            ($($field:ident => $target:expr),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    $target = value;
                })*
            };
        }
        override_with! {
            fast_threshold => config.features.fast_threshold,
            max_features => config.features.max_features,
            min_features => config.features.min_features,
            window_size => config.tracker.window_size,
            pyramid_levels => config.tracker.pyramid_levels,
            inlier_threshold => config.pose.inlier_threshold,
            confidence => config.pose.confidence,
            seed => config.pose.seed,
        }
        if self.arrsac {
            config.pose.consensus = ConsensusMethod::Arrsac;
        }
        if self.ground_truth_scale {
            config.scale.ground_truth_scale = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Explicit values win over the dataset calibration, which wins over the default camera.
    fn intrinsics(&self, dataset: Option<CameraIntrinsics>) -> Result<CameraIntrinsics> {
        let base = dataset.unwrap_or_default();
        Ok(CameraIntrinsics::new(
            self.fx.unwrap_or(base.fx),
            self.fy.unwrap_or(base.fy),
            self.cx.unwrap_or(base.cx),
            self.cy.unwrap_or(base.cy),
        )?)
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();

    let config = opt.odometry_config().context("invalid configuration")?;
    let dataset = create_dataset(&opt.dataset, &opt.path)
        .with_context(|| format!("could not open dataset at {}", opt.path.display()))?;
    let intrinsics = opt.intrinsics(dataset.camera_matrix())?;

    info!("{} images found.", dataset.image_count());
    debug!("camera: {:?}", intrinsics);

    let mut system = System::new(&config, intrinsics);
    if let Some(poses) = dataset.ground_truth() {
        system = system.with_ground_truth(poses.to_vec());
    }

    let mut source = ImageSequence::new(dataset.image_paths().to_vec());
    system.run(&mut source);

    let trajectory = system.shutdown();
    let paths = write_outputs(&opt.output_dir, &trajectory).context("could not write results")?;
    info!(
        "results in {}, {} and {}",
        paths.trajectory.display(),
        paths.position_plot.display(),
        paths.error_plot.display()
    );

    Ok(())
}
