use arrsac::Arrsac;
use log::debug;
use nalgebra::{Matrix3, Point2, Vector3};
use rand::{rngs::StdRng, SeedableRng};
use sample_consensus::{Consensus, Estimator, Model};

use crate::algorithms::camera::{
    disambiguate_camera_pose, extract_pose_configurations, CheiralityVote, PoseCandidate,
    NUM_CONFIGURATIONS,
};
use crate::algorithms::consensus::Ransac;
use crate::algorithms::eight_point::{EightPoint, EssentialMatrix, NormalizedMatch};
use crate::algorithms::five_point::FivePoint;
use crate::config::{ConsensusMethod, PoseConfig};
use crate::error::{DegeneracyKind, PoseError};
use crate::slam::flow::Correspondence;
use crate::slam::intrinsics::CameraIntrinsics;

/// Smallest support the least-squares refit accepts.
const MIN_REFIT: usize = <EightPoint as Estimator<NormalizedMatch>>::MIN_SAMPLES;

/// Relative motion between two consecutive frames.
///
/// `rotation` is the orientation of the current camera and `translation` the
/// direction to its centre, both in previous-camera coordinates:
/// `X_prev = rotation * X_curr + translation`. Monocular motion has no scale,
/// so `translation` always has unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

/// A pose and which of the input correspondences support it.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    pub pose: Pose,
    /// Aligned with the estimator input.
    pub inliers: Vec<bool>,
}

impl PoseEstimate {
    pub fn num_inliers(&self) -> usize {
        self.inliers.iter().filter(|&&inlier| inlier).count()
    }
}

/// Robust essential matrix estimation followed by pose recovery.
#[derive(Debug, Clone, Copy)]
pub struct PoseEstimator {
    config: PoseConfig,
}

impl PoseEstimator {
    /// The minimal sample of the five-point solver.
    pub const MIN_CORRESPONDENCES: usize = <FivePoint as Estimator<NormalizedMatch>>::MIN_SAMPLES;

    pub fn new(config: PoseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    /// Estimates the motion between `previous` and `current` pixel positions.
    ///
    /// Entries at the same index are one correspondence.
    pub fn estimate(
        &self,
        previous: &[Point2<f64>],
        current: &[Point2<f64>],
        intrinsics: &CameraIntrinsics,
    ) -> Result<PoseEstimate, PoseError> {
        let found = previous.len().min(current.len());
        if found < Self::MIN_CORRESPONDENCES {
            return Err(PoseError::InsufficientCorrespondences {
                required: Self::MIN_CORRESPONDENCES,
                found,
            });
        }

        let matches: Vec<NormalizedMatch> = previous
            .iter()
            .zip(current)
            .map(|(p, c)| NormalizedMatch {
                previous: intrinsics.normalize(p),
                current: intrinsics.normalize(c),
            })
            .collect();

        // pixels to normalized image units
        let threshold = self.config.inlier_threshold / intrinsics.mean_focal();
        let eight_point = EightPoint::new(self.config.degeneracy_threshold);

        // zero parallax leaves more than one solution for the whole constraint matrix
        if matches.len() >= MIN_REFIT && eight_point.fit(matches.iter().copied()).is_none() {
            return Err(PoseError::Degenerate(DegeneracyKind::IllConditioned));
        }

        let (model, inliers) = self
            .consensus(&matches, threshold)
            .ok_or(PoseError::Degenerate(DegeneracyKind::NoConsensus))?;

        // Refit on the consensus set, keep the sampled model if the refit loses support.
        // A support too small for the refit lets every minimal solution of it compete.
        let hypotheses = if inliers.len() >= MIN_REFIT {
            let refit = eight_point
                .fit(inliers.iter().map(|&i| matches[i]))
                .ok_or(PoseError::Degenerate(DegeneracyKind::IllConditioned))?;
            vec![refit, model]
        } else {
            let support: Vec<NormalizedMatch> = inliers.iter().map(|&i| matches[i]).collect();
            let mut solutions = FivePoint.solve(&support);
            solutions.push(model);
            solutions
        };

        let mut best: Option<Hypothesis> = None;
        for essential in &hypotheses {
            let hypothesis = match self.hypothesis(essential, &matches, threshold) {
                Some(hypothesis) => hypothesis,
                None => continue,
            };
            if best.as_ref().map_or(true, |b| hypothesis.score() > b.score()) {
                best = Some(hypothesis);
            }
        }
        let Hypothesis {
            candidates,
            inliers,
            vote,
        } = best.ok_or(PoseError::Degenerate(DegeneracyKind::IllConditioned))?;

        debug!(
            "essential matrix supported by {} of {} correspondences",
            inliers.len(),
            matches.len()
        );

        let ratio = vote.votes as f64 / inliers.len().max(1) as f64;
        if ratio < self.config.min_cheirality_ratio {
            debug!(
                "best pose candidate has {} of {} points in front of both views",
                vote.votes,
                inliers.len()
            );
            return Err(PoseError::Degenerate(DegeneracyKind::Cheirality));
        }

        // candidates map previous into current coordinates, invert to get the camera motion
        let winner = candidates[vote.index];
        let rotation = winner.rotation.transpose();
        let translation = (-(rotation * winner.translation)).normalize();

        let mut mask = vec![false; found];
        for i in inliers {
            mask[i] = true;
        }

        Ok(PoseEstimate {
            pose: Pose {
                rotation,
                translation,
            },
            inliers: mask,
        })
    }

    /// Same as [`PoseEstimator::estimate`] for tracker output. Invalid
    /// correspondences are skipped and never reported as inliers.
    pub fn estimate_correspondences(
        &self,
        correspondences: &[Correspondence],
        intrinsics: &CameraIntrinsics,
    ) -> Result<PoseEstimate, PoseError> {
        let valid: Vec<usize> = correspondences
            .iter()
            .enumerate()
            .filter(|(_, c)| c.valid)
            .map(|(i, _)| i)
            .collect();

        let to_f64 = |p: &Point2<f32>| Point2::new(p.x as f64, p.y as f64);
        let previous: Vec<Point2<f64>> = valid
            .iter()
            .map(|&i| to_f64(&correspondences[i].previous))
            .collect();
        let current: Vec<Point2<f64>> = valid
            .iter()
            .map(|&i| to_f64(&correspondences[i].current))
            .collect();

        let estimate = self.estimate(&previous, &current, intrinsics)?;

        let mut inliers = vec![false; correspondences.len()];
        for (&index, &inlier) in valid.iter().zip(&estimate.inliers) {
            inliers[index] = inlier;
        }
        Ok(PoseEstimate {
            pose: estimate.pose,
            inliers,
        })
    }

    /// Support and cheirality vote of one essential matrix.
    fn hypothesis(
        &self,
        essential: &EssentialMatrix,
        matches: &[NormalizedMatch],
        threshold: f64,
    ) -> Option<Hypothesis> {
        let candidates = extract_pose_configurations(&essential.0)?;
        let inliers = inliers_of(essential, matches, threshold);
        let supported: Vec<NormalizedMatch> = inliers.iter().map(|&i| matches[i]).collect();
        let vote = disambiguate_camera_pose(&candidates, &supported, self.config.max_depth);
        Some(Hypothesis {
            candidates,
            inliers,
            vote,
        })
    }

    fn consensus(
        &self,
        matches: &[NormalizedMatch],
        threshold: f64,
    ) -> Option<(EssentialMatrix, Vec<usize>)> {
        let rng = StdRng::seed_from_u64(self.config.seed);
        match self.config.consensus {
            ConsensusMethod::Ransac => Ransac::new(
                threshold,
                self.config.confidence,
                self.config.max_iterations,
                rng,
            )
            .model_inliers(&FivePoint, matches.iter().copied()),
            // This is an ARRSAC (Adaptive Real-Time Random Sample Consensus) package,
            // which could perform as well or better than RANSAC.
            // https://people.inf.ethz.ch/pomarc/pubs/RaguramECCV08.pdf
            ConsensusMethod::Arrsac => {
                Arrsac::new(threshold, rng).model_inliers(&FivePoint, matches.iter().copied())
            }
        }
    }
}

/// An essential matrix after decomposition.
struct Hypothesis {
    candidates: [PoseCandidate; NUM_CONFIGURATIONS],
    inliers: Vec<usize>,
    vote: CheiralityVote,
}

impl Hypothesis {
    /// Support first, cheirality second.
    fn score(&self) -> (usize, usize) {
        (self.inliers.len(), self.vote.votes)
    }
}

fn inliers_of(model: &EssentialMatrix, matches: &[NormalizedMatch], threshold: f64) -> Vec<usize> {
    matches
        .iter()
        .enumerate()
        .filter(|(_, m)| model.residual(m) < threshold)
        .map(|(i, _)| i)
        .collect()
}
