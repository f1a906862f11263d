use crate::algorithms::homography::{Homography, Point};

/// Per-pair transfer error of `H * target` against `reference`.
pub fn reprojection_errors(homography: &Homography, target: &[Point], reference: &[Point]) -> Vec<f64> {
    target
        .iter()
        .zip(reference)
        .map(|(t, r)| homography.transfer_error(t, r))
        .collect()
}

pub fn rms_reprojection_error(homography: &Homography, target: &[Point], reference: &[Point]) -> f64 {
    let errors = reprojection_errors(homography, target, reference);
    if errors.is_empty() {
        return 0.0;
    }
    (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt()
}

/// Largest distance between where `estimated` and `truth` send the corners of
/// a `width` x `height` image.
pub fn corner_displacement(estimated: &Homography, truth: &Homography, width: u32, height: u32) -> f64 {
    let (w, h) = (width as f64, height as f64);
    [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
        .iter()
        .map(|&(x, y)| {
            let corner = Point::new(x, y);
            match (estimated.apply(&corner), truth.apply(&corner)) {
                (Some(a), Some(b)) => (a - b).norm(),
                _ => f64::INFINITY,
            }
        })
        .fold(0.0, f64::max)
}

/// Fraction of good matches supporting the homography.
pub fn inlier_ratio(inliers: usize, good_matches: usize) -> f32 {
    if good_matches == 0 {
        0.0
    } else {
        inliers as f32 / good_matches as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_translation_offset() {
        let h = Homography::translation(3.0, 4.0);
        let target = [Point::new(0.0, 0.0), Point::new(10.0, 10.0)];
        let reference = [Point::new(0.0, 0.0), Point::new(10.0, 10.0)];
        assert!((rms_reprojection_error(&h, &target, &reference) - 5.0).abs() < 1e-12);
        assert_eq!(rms_reprojection_error(&h, &[], &[]), 0.0);
    }

    #[test]
    fn test_corner_displacement() {
        let a = Homography::identity();
        let b = Homography::translation(1.0, 0.0);
        assert!((corner_displacement(&a, &b, 100, 50) - 1.0).abs() < 1e-12);
        assert_eq!(corner_displacement(&a, &a, 100, 50), 0.0);
    }

    #[test]
    fn test_inlier_ratio() {
        assert_eq!(inlier_ratio(0, 0), 0.0);
        assert_eq!(inlier_ratio(30, 40), 0.75);
    }
}
