// Integration tests for the frame-by-frame odometry pipeline.

use std::fs;

use image::{DynamicImage, GrayImage, Luma};
use monovo::io::output::write_outputs;
use monovo::{
    CameraIntrinsics, ConsensusMethod, FrameOutcome, OdometryConfig, System, TrackingState,
    TrajectoryState, VecSource,
};
use nalgebra::{Point3, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

fn camera() -> CameraIntrinsics {
    CameraIntrinsics::new(300.0, 300.0, 160.0, 120.0).unwrap()
}

/// Random points in front of the first camera.
fn landmarks() -> Vec<Point3<f64>> {
    let camera = camera();
    let mut rng = StdRng::seed_from_u64(99);
    (0..70)
        .map(|_| {
            let pixel =
                nalgebra::Point2::new(rng.gen_range(20.0..300.0), rng.gen_range(20.0..220.0));
            let depth = rng.gen_range(3.0..12.0);
            Point3::from(camera.normalize(&pixel).to_homogeneous() * depth)
        })
        .collect()
}

/// Renders every landmark as a small Gaussian blob, seen from a camera
/// centred at `position` looking down +Z.
fn render(landmarks: &[Point3<f64>], position: &Vector3<f64>) -> GrayImage {
    const SIGMA: f64 = 1.5;
    let camera = camera();
    let mut buffer = vec![20.0f64; (WIDTH * HEIGHT) as usize];

    for landmark in landmarks {
        let local = landmark.coords - position;
        if local.z <= 0.5 {
            continue;
        }
        let center = camera.project(&nalgebra::Point2::new(local.x / local.z, local.y / local.z));
        let (x0, y0) = (center.x.round() as i64, center.y.round() as i64);
        for y in (y0 - 5)..=(y0 + 5) {
            for x in (x0 - 5)..=(x0 + 5) {
                if x < 0 || y < 0 || x >= WIDTH as i64 || y >= HEIGHT as i64 {
                    continue;
                }
                let (dx, dy) = (x as f64 - center.x, y as f64 - center.y);
                buffer[(y * WIDTH as i64 + x) as usize] +=
                    180.0 * (-(dx * dx + dy * dy) / (2.0 * SIGMA * SIGMA)).exp();
            }
        }
    }

    GrayImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Luma([buffer[(y * WIDTH + x) as usize].min(255.0) as u8])
    })
}

/// Camera moving right and forward, one step per frame.
fn moving_sequence(frames: usize) -> Vec<DynamicImage> {
    let landmarks = landmarks();
    let step = Vector3::new(0.08, 0.0, 0.2);
    (0..frames)
        .map(|i| DynamicImage::ImageLuma8(render(&landmarks, &(step * i as f64))))
        .collect()
}

#[test]
fn static_scene_does_not_drift() {
    let image = DynamicImage::ImageLuma8(render(&landmarks(), &Vector3::zeros()));
    let mut system = System::new(&OdometryConfig::default(), camera());

    let outcomes: Vec<FrameOutcome> = (0..8).map(|_| system.track_monocular(&image)).collect();

    assert_eq!(outcomes[0], FrameOutcome::Bootstrapped);
    for outcome in &outcomes[1..] {
        assert!(
            matches!(outcome, FrameOutcome::PoseRejected(_)),
            "{outcome:?}"
        );
    }
    assert_eq!(*system.tracker.current_state(), TrajectoryState::default());
    assert!(system.trajectory().is_empty());
}

#[test]
fn starved_frame_keeps_the_previous_reference() {
    let frames = moving_sequence(5);
    let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(WIDTH, HEIGHT, Luma([80])));
    let mut system = System::new(&OdometryConfig::default(), camera());

    for frame in &frames[..4] {
        system.track_monocular(frame);
    }
    assert!(!system.trajectory().is_empty(), "{:?}", system.tracker.stats());

    let state = *system.tracker.current_state();
    let length = system.trajectory().len();
    assert_eq!(
        system.track_monocular(&flat),
        FrameOutcome::FeatureStarved { keypoints: 0 }
    );
    assert_eq!(*system.tracker.current_state(), state);
    assert_eq!(system.trajectory().len(), length);
    assert_eq!(system.tracker.reference_index(), Some(3));

    let outcome = system.track_monocular(&frames[4]);
    assert!(
        matches!(
            outcome,
            FrameOutcome::Integrated { .. } | FrameOutcome::PoseRejected(_)
        ),
        "{outcome:?}"
    );
    assert_eq!(system.tracker.reference_index(), Some(5));
    assert_eq!(system.tracker.stats().feature_starved, 1);
}

#[test]
fn moving_camera_advances_forward() {
    let mut source = VecSource::from(moving_sequence(6));
    let mut system = System::new(&OdometryConfig::default(), camera());

    let stats = system.run(&mut source);
    assert_eq!(stats.frames, 6);
    assert!(stats.integrated > 0, "{stats:?}");
    assert_eq!(system.tracker.state(), TrackingState::Done);

    let last = system.trajectory().points.last().unwrap();
    assert!(last.position.z > 0.0, "{:?}", last.position);
    assert!(last.position.x > 0.0, "{:?}", last.position);
}

#[test]
fn identical_runs_write_identical_files() {
    for consensus in [ConsensusMethod::Ransac, ConsensusMethod::Arrsac] {
        let mut config = OdometryConfig::default();
        config.pose.consensus = consensus;

        let run = || {
            let mut system = System::new(&config, camera());
            system.run(&mut VecSource::from(moving_sequence(5)));
            let dir = tempfile::tempdir().unwrap();
            let paths = write_outputs(dir.path(), &system.shutdown()).unwrap();
            let csv = fs::read(&paths.trajectory).unwrap();
            let plot = fs::read(&paths.position_plot).unwrap();
            (csv, plot)
        };

        let (first_csv, first_plot) = run();
        let (second_csv, second_plot) = run();
        assert_eq!(first_csv, second_csv, "{consensus:?}");
        assert_eq!(first_plot, second_plot, "{consensus:?}");
    }
}
