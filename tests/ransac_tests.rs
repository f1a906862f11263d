use photo_align::algorithms::{Homography, Point};
use photo_align::analysis::corner_displacement;
use photo_align::config::RansacConfig;
use photo_align::data::synthetic::correspondences_under;
use photo_align::utils::ransac::{PointPair, RansacEstimator};
use photo_align::AlignmentFailure;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn truth() -> Homography {
    Homography::from_rows([[1.02, -0.08, 15.0], [0.07, 0.98, -9.0], [2e-5, -1e-5, 1.0]]).unwrap()
}

/// Exact pairs whose target points are at least 20px apart.
fn well_spread_pairs(h: &Homography, count: usize, seed: u64) -> Vec<PointPair> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut targets: Vec<Point> = Vec::with_capacity(count);
    while targets.len() < count {
        let candidate = Point::new(rng.gen_range(0.0..400.0), rng.gen_range(0.0..300.0));
        if targets.iter().all(|p| (p - candidate).norm() >= 20.0) {
            targets.push(candidate);
        }
    }
    targets
        .into_iter()
        .map(|target| PointPair {
            target,
            reference: h.apply(&target).unwrap(),
        })
        .collect()
}

/// Cyclically shift the reference points of the first `k` pairs, turning
/// them into outliers.
fn corrupt_first(pairs: &[PointPair], k: usize) -> Vec<PointPair> {
    let mut corrupted = pairs.to_vec();
    for i in 0..k {
        corrupted[i].reference = pairs[(i + 1) % k].reference;
    }
    corrupted
}

#[test]
fn test_exact_homography_recovered() {
    let pairs = well_spread_pairs(&truth(), 40, 1);
    let estimate = RansacEstimator::default().estimate(&pairs).unwrap();

    assert_eq!(estimate.inliers.len(), 40);
    assert!(estimate.homography.max_abs_difference(&truth()) < 1e-6);
    assert!(estimate.rms_error < 1e-6);
}

#[test]
fn test_noisy_correspondences() {
    let pairs = correspondences_under(&truth(), 60, 0.5, 3);
    let estimate = RansacEstimator::default().estimate(&pairs).unwrap();

    assert!(estimate.inliers.len() >= 55);
    assert!(corner_displacement(&estimate.homography, &truth(), 400, 300) < 1.5);
}

#[test]
fn test_monotonic_degradation() {
    let pairs = well_spread_pairs(&truth(), 40, 2);
    let estimator = RansacEstimator::default();

    for k in [10, 20, 29] {
        let estimate = estimator
            .estimate(&corrupt_first(&pairs, k))
            .unwrap_or_else(|e| panic!("{} outliers should still align: {}", k, e));
        assert_eq!(estimate.inliers, (k..40).collect::<Vec<_>>());
    }

    for k in [30, 35, 40] {
        match estimator.estimate(&corrupt_first(&pairs, k)) {
            Err(AlignmentFailure::EstimationFailure { inliers, required }) => {
                assert!(inliers <= 10, "{} outliers left {} inliers", k, inliers);
                assert_eq!(required, 10);
            }
            other => panic!("{} outliers must not produce a transform: {:?}", k, other.map(|e| e.inliers)),
        }
    }
}

#[test]
fn test_too_few_correspondences() {
    let pairs = well_spread_pairs(&truth(), 11, 4);
    let estimator = RansacEstimator::default();

    assert_eq!(
        estimator.estimate(&pairs[..10]).unwrap_err(),
        AlignmentFailure::InsufficientCorrespondences {
            found: 10,
            required: 10
        }
    );
    assert!(estimator.estimate(&pairs).is_ok());
}

#[test]
fn test_collinear_points_fail() {
    let pairs: Vec<PointPair> = (0..20)
        .map(|i| {
            let v = i as f64 * 10.0;
            PointPair::new((v, v), (v + 5.0, v + 5.0))
        })
        .collect();

    assert_eq!(
        RansacEstimator::default().estimate(&pairs).unwrap_err(),
        AlignmentFailure::EstimationFailure {
            inliers: 0,
            required: 10
        }
    );
}

#[test]
fn test_seed_changes_sampling_not_result() {
    let pairs = corrupt_first(&well_spread_pairs(&truth(), 40, 5), 15);
    let a = RansacEstimator::new(RansacConfig {
        seed: 1,
        ..RansacConfig::default()
    })
    .estimate(&pairs)
    .unwrap();
    let b = RansacEstimator::new(RansacConfig {
        seed: 2,
        ..RansacConfig::default()
    })
    .estimate(&pairs)
    .unwrap();

    assert_eq!(a.inliers, b.inliers);
    assert!(a.homography.max_abs_difference(&b.homography) < 1e-6);
}
