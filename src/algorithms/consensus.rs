use rand::{seq::index, RngCore};
use sample_consensus::{Consensus, Estimator, Model};

/// Random Sample Consensus with adaptive stopping.
///
/// After every improvement the number of required hypotheses is lowered to
/// `ln(1 - confidence) / ln(1 - w^m)`, with `w` the inlier ratio of the best
/// model so far and `m` the minimal sample size.
pub struct Ransac<R> {
    threshold: f64,
    confidence: f64,
    max_iterations: usize,
    rng: R,
}

impl<R> Ransac<R>
where
    R: RngCore,
{
    /// `threshold` is compared against `Model::residual`.
    pub fn new(threshold: f64, confidence: f64, max_iterations: usize, rng: R) -> Self {
        Self {
            threshold,
            confidence,
            max_iterations,
            rng,
        }
    }

    fn required_iterations(&self, inliers: usize, total: usize, sample_size: usize) -> usize {
        let ratio = inliers as f64 / total as f64;
        let all_inliers = ratio.powi(sample_size as i32);
        if all_inliers >= 1.0 {
            return 1;
        }
        let failure = (1.0 - all_inliers).max(f64::MIN_POSITIVE);
        let needed = (1.0 - self.confidence).ln() / failure.ln();
        if needed.is_finite() {
            (needed.ceil() as usize).clamp(1, self.max_iterations)
        } else {
            self.max_iterations
        }
    }
}

impl<E, R, Data> Consensus<E, Data> for Ransac<R>
where
    E: Estimator<Data>,
    R: RngCore,
    Data: Clone,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = Data> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = Data> + Clone,
    {
        let data: Vec<Data> = data.collect();
        let total = data.len();
        if total < E::MIN_SAMPLES {
            return None;
        }

        let mut best: Option<(E::Model, Vec<usize>)> = None;
        let mut required = self.max_iterations;
        let mut iteration = 0;

        while iteration < required {
            iteration += 1;

            let sample = index::sample(&mut self.rng, total, E::MIN_SAMPLES).into_vec();
            for model in estimator.estimate(sample.iter().map(|&i| data[i].clone())) {
                let inliers: Vec<usize> = data
                    .iter()
                    .enumerate()
                    .filter(|(_, d)| model.residual(d) < self.threshold)
                    .map(|(i, _)| i)
                    .collect();

                let improves = best
                    .as_ref()
                    .map_or(true, |(_, best_inliers)| inliers.len() > best_inliers.len());
                if improves && !inliers.is_empty() {
                    required = self.required_iterations(inliers.len(), total, E::MIN_SAMPLES);
                    best = Some((model, inliers));
                }
            }
        }

        log::trace!("ransac stopped after {iteration} hypotheses");
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// Line through the origin `y = slope * x`.
    struct Slope(f64);

    impl Model<(f64, f64)> for Slope {
        fn residual(&self, &(x, y): &(f64, f64)) -> f64 {
            (y - self.0 * x).abs()
        }
    }

    struct SlopeEstimator;

    impl Estimator<(f64, f64)> for SlopeEstimator {
        const MIN_SAMPLES: usize = 1;
        type Model = Slope;
        type ModelIter = Option<Slope>;

        fn estimate<I>(&self, mut data: I) -> Self::ModelIter
        where
            I: Iterator<Item = (f64, f64)> + Clone,
        {
            data.next()
                .filter(|&(x, _)| x.abs() > 1e-9)
                .map(|(x, y)| Slope(y / x))
        }
    }

    #[test]
    fn finds_the_dominant_line() {
        let mut data: Vec<(f64, f64)> = (1..=40).map(|i| (i as f64, 2.0 * i as f64)).collect();
        data.extend((1..=15).map(|i| (i as f64, -3.0 * i as f64 + 7.0)));

        let mut ransac = Ransac::new(1e-6, 0.999, 500, StdRng::seed_from_u64(7));
        let (model, inliers) = ransac
            .model_inliers(&SlopeEstimator, data.iter().copied())
            .unwrap();

        assert!((model.0 - 2.0).abs() < 1e-12);
        assert_eq!(inliers, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn too_little_data_gives_nothing() {
        let mut ransac = Ransac::new(1.0, 0.99, 10, StdRng::seed_from_u64(7));
        let empty: Vec<(f64, f64)> = Vec::new();
        assert!(ransac.model(&SlopeEstimator, empty.into_iter()).is_none());
    }

    #[test]
    fn adaptive_stopping_shrinks_with_inlier_ratio() {
        let ransac = Ransac::new(1.0, 0.999, 10_000, StdRng::seed_from_u64(0));
        let clean = ransac.required_iterations(95, 100, 8);
        let dirty = ransac.required_iterations(50, 100, 8);
        assert!(clean < dirty);
        assert_eq!(ransac.required_iterations(100, 100, 8), 1);
        assert!(dirty <= 10_000);
    }
}
