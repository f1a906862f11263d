use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::algorithms::homography::{fit_dlt, Homography, Point};
use crate::analysis::metrics::rms_reprojection_error;
use crate::config::RansacConfig;
use crate::error::AlignmentFailure;

const SAMPLE_SIZE: usize = 4;
/// Twice the triangle area (px^2) under which three sample points count as collinear.
const COLLINEAR_AREA_EPSILON: f64 = 1e-6;

/// A matched point pair: `target` is in the image being aligned,
/// `reference` in the reference image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    pub target: Point,
    pub reference: Point,
}

impl PointPair {
    pub fn new(target: (f64, f64), reference: (f64, f64)) -> Self {
        Self {
            target: Point::new(target.0, target.1),
            reference: Point::new(reference.0, reference.1),
        }
    }
}

/// Result of RANSAC estimation
#[derive(Debug, Clone)]
pub struct HomographyEstimate {
    pub homography: Homography,
    /// Indices into the input pairs, ascending.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    /// RMS transfer error over the inliers, in pixels.
    pub rms_error: f64,
}

/// Seeded RANSAC homography estimator.
///
/// The same pairs and configuration always produce the same estimate.
#[derive(Debug, Clone)]
pub struct RansacEstimator {
    config: RansacConfig,
}

impl Default for RansacEstimator {
    fn default() -> Self {
        Self::new(RansacConfig::default())
    }
}

impl RansacEstimator {
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Estimate the homography mapping target points onto reference points.
    ///
    /// Fails with `InsufficientCorrespondences` unless strictly more than
    /// `min_correspondences` pairs are given, and with `EstimationFailure`
    /// unless the best model has strictly more than `min_inliers` inliers.
    pub fn estimate(&self, pairs: &[PointPair]) -> Result<HomographyEstimate, AlignmentFailure> {
        let config = &self.config;
        let n = pairs.len();
        if n <= config.min_correspondences || n < SAMPLE_SIZE {
            return Err(AlignmentFailure::InsufficientCorrespondences {
                found: n,
                required: config.min_correspondences,
            });
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut best: Option<(Homography, Vec<usize>)> = None;
        let mut budget = config.max_iterations;
        let mut iterations = 0;

        while iterations < budget {
            iterations += 1;

            let sample = index::sample(&mut rng, n, SAMPLE_SIZE).into_vec();
            if is_degenerate_sample(pairs, &sample) {
                continue;
            }

            let (target, reference) = split(pairs, &sample);
            let Some(candidate) = fit_dlt(&target, &reference) else {
                continue;
            };

            let inliers = self.collect_inliers(&candidate, pairs);
            let best_count = best.as_ref().map_or(0, |(_, b)| b.len());
            if inliers.len() > best_count {
                trace!(iteration = iterations, inliers = inliers.len(), "New best model");
                budget = budget.min(adaptive_iterations(inliers.len(), n, config.confidence).max(iterations));
                best = Some((candidate, inliers));
            }
        }

        let Some((mut homography, mut inliers)) = best else {
            debug!(pairs = n, iterations = iterations, "No non-degenerate sample found");
            return Err(AlignmentFailure::EstimationFailure {
                inliers: 0,
                required: config.min_inliers,
            });
        };

        if config.refine && inliers.len() > SAMPLE_SIZE {
            let (target, reference) = split(pairs, &inliers);
            if let Some(refined) = fit_dlt(&target, &reference) {
                let refined_inliers = self.collect_inliers(&refined, pairs);
                if refined_inliers.len() >= inliers.len() {
                    homography = refined;
                    inliers = refined_inliers;
                }
            }
        }

        if inliers.len() <= config.min_inliers {
            debug!(
                pairs = n,
                inliers = inliers.len(),
                required = config.min_inliers,
                "Best model has too little support"
            );
            return Err(AlignmentFailure::EstimationFailure {
                inliers: inliers.len(),
                required: config.min_inliers,
            });
        }

        let (target, reference) = split(pairs, &inliers);
        let rms_error = rms_reprojection_error(&homography, &target, &reference);

        debug!(
            pairs = n,
            inliers = inliers.len(),
            iterations = iterations,
            rms_error = rms_error,
            "RANSAC converged"
        );

        Ok(HomographyEstimate {
            homography,
            inliers,
            iterations,
            rms_error,
        })
    }

    fn collect_inliers(&self, homography: &Homography, pairs: &[PointPair]) -> Vec<usize> {
        pairs
            .iter()
            .enumerate()
            .filter(|(_, pair)| {
                homography.transfer_error(&pair.target, &pair.reference) <= self.config.inlier_threshold
            })
            .map(|(i, _)| i)
            .collect()
    }
}

/// Iterations needed to draw one all-inlier sample with probability
/// `confidence`, given the current inlier fraction.
pub fn adaptive_iterations(inliers: usize, total: usize, confidence: f64) -> usize {
    if total == 0 || inliers == 0 {
        return usize::MAX;
    }
    let inlier_fraction = inliers as f64 / total as f64;
    let all_inlier_probability = inlier_fraction.powi(SAMPLE_SIZE as i32);
    if all_inlier_probability >= 1.0 {
        return 1;
    }

    let denominator = (1.0 - all_inlier_probability).ln();
    if denominator >= 0.0 || !denominator.is_finite() {
        return usize::MAX;
    }

    let k = (1.0 - confidence).ln() / denominator;
    if k.is_finite() && k >= 0.0 {
        k.ceil() as usize
    } else {
        usize::MAX
    }
}

fn split(pairs: &[PointPair], indices: &[usize]) -> (Vec<Point>, Vec<Point>) {
    indices.iter().map(|&i| (pairs[i].target, pairs[i].reference)).unzip()
}

/// A sample is unusable when any three of its points are (nearly) collinear
/// in either image.
fn is_degenerate_sample(pairs: &[PointPair], sample: &[usize]) -> bool {
    let target: Vec<Point> = sample.iter().map(|&i| pairs[i].target).collect();
    let reference: Vec<Point> = sample.iter().map(|&i| pairs[i].reference).collect();
    has_collinear_triple(&target) || has_collinear_triple(&reference)
}

fn has_collinear_triple(points: &[Point]) -> bool {
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            for k in j + 1..points.len() {
                let (a, b, c) = (points[i], points[j], points[k]);
                let twice_area = ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs();
                if twice_area < COLLINEAR_AREA_EPSILON {
                    return true;
                }
            }
        }
    }
    false
}
