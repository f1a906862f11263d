use image::DynamicImage;
use tracing::debug;
use uuid::Uuid;

use crate::algorithms::{warp_perspective, RatioTestMatcher, SiftExtractor};
use crate::analysis::metrics::inlier_ratio;
use crate::config::AlignmentConfig;
use crate::error::AlignmentFailure;
use crate::logging::{get_correlation_id, AlignmentSpan};
use crate::pipeline::{Alignment, AlignmentResult, AlignmentStats, FeatureExtractor, ReferenceFrame};
use crate::utils::image_conversion::to_intensity;
use crate::utils::ransac::{PointPair, RansacEstimator};

/// Aligns target images onto a reference image.
///
/// Runs extraction, matching, estimation and warping in that order and stops
/// at the first stage that cannot proceed. Holds no per-image state, so one
/// instance can serve many targets concurrently.
pub struct Aligner {
    config: AlignmentConfig,
    extractor: Box<dyn FeatureExtractor>,
    matcher: RatioTestMatcher,
    estimator: RansacEstimator,
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(AlignmentConfig::default())
    }
}

impl Aligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            extractor: Box::new(SiftExtractor::new(config.sift.clone())),
            matcher: RatioTestMatcher::new(config.matcher.clone()),
            estimator: RansacEstimator::new(config.ransac.clone()),
            config,
        }
    }

    /// Replace the feature extractor
    pub fn with_extractor(mut self, extractor: Box<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    /// Extract the reference features once so a batch can reuse them.
    pub fn prepare_reference(&self, reference: &DynamicImage) -> ReferenceFrame {
        let features = self.extractor.extract(&to_intensity(reference));
        debug!(
            extractor = self.extractor.name(),
            width = reference.width(),
            height = reference.height(),
            keypoints = features.len(),
            "Reference prepared"
        );
        ReferenceFrame {
            width: reference.width(),
            height: reference.height(),
            features,
        }
    }

    /// Align `target` onto `reference`. The output has the reference's size.
    pub fn align(&self, reference: &DynamicImage, target: &DynamicImage) -> AlignmentResult {
        let frame = self.prepare_reference(reference);
        self.align_to(&frame, target)
    }

    pub fn align_to(&self, reference: &ReferenceFrame, target: &DynamicImage) -> AlignmentResult {
        self.align_named(reference, target, "target")
    }

    /// Like [`Aligner::align_to`], with `name` identifying the target in logs.
    pub fn align_named(&self, reference: &ReferenceFrame, target: &DynamicImage, name: &str) -> AlignmentResult {
        let correlation_id = get_correlation_id().unwrap_or_else(Uuid::new_v4);
        let span = AlignmentSpan::new(name, Some(correlation_id));
        let _enter = span.enter();

        let result = self.run(reference, target, &span);
        match &result {
            Ok(alignment) => span.record_success(&alignment.stats),
            Err(failure) => span.record_failure(failure),
        }
        result
    }

    fn run(&self, reference: &ReferenceFrame, target: &DynamicImage, span: &AlignmentSpan) -> AlignmentResult {
        let target_features = self.extractor.extract(&to_intensity(target));
        let reference_count = reference.features.len();
        let target_count = target_features.len();
        span.record_feature_detection(reference_count, target_count);

        let required = self.config.min_features;
        if reference_count < required || target_count < required {
            return Err(AlignmentFailure::InsufficientFeatures {
                reference: reference_count,
                target: target_count,
                required,
            });
        }

        let matches = self
            .matcher
            .match_descriptors(reference.features.descriptors.view(), target_features.descriptors.view());
        span.record_matching(matches.len());

        let pairs: Vec<PointPair> = matches
            .iter()
            .map(|m| {
                let t = &target_features.keypoints[m.target_index];
                let r = &reference.features.keypoints[m.reference_index];
                PointPair::new((t.x as f64, t.y as f64), (r.x as f64, r.y as f64))
            })
            .collect();

        let estimate = self.estimator.estimate(&pairs)?;
        span.record_ransac(estimate.iterations, estimate.inliers.len(), estimate.rms_error);

        let (width, height) = reference.dimensions();
        let warped = warp_perspective(target, &estimate.homography, width, height);

        let stats = AlignmentStats {
            reference_features: reference_count,
            target_features: target_count,
            good_matches: matches.len(),
            inliers: estimate.inliers.len(),
            ransac_iterations: estimate.iterations,
            inlier_ratio: inlier_ratio(estimate.inliers.len(), matches.len()),
            processing_time_ms: span.elapsed_ms(),
        };

        Ok(Alignment {
            homography: estimate.homography,
            warped,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{clear_correlation_id, set_correlation_id};
    use crate::pipeline::Features;
    use image::GrayImage;
    use tracing_test::traced_test;

    struct NoFeatures;

    impl FeatureExtractor for NoFeatures {
        fn name(&self) -> &str {
            "none"
        }

        fn extract(&self, _image: &GrayImage) -> Features {
            Features::empty()
        }
    }

    #[test]
    fn test_custom_extractor_is_used() {
        let aligner = Aligner::default().with_extractor(Box::new(NoFeatures));
        assert_eq!(aligner.extractor_name(), "none");

        let image = DynamicImage::ImageLuma8(GrayImage::new(32, 32));
        let err = aligner.align(&image, &image).unwrap_err();
        assert_eq!(
            err,
            AlignmentFailure::InsufficientFeatures {
                reference: 0,
                target: 0,
                required: 2,
            }
        );
    }

    #[traced_test]
    #[test]
    fn test_thread_correlation_id_reaches_alignment_logs() {
        let id = Uuid::new_v4();
        set_correlation_id(id);

        let aligner = Aligner::default().with_extractor(Box::new(NoFeatures));
        let image = DynamicImage::ImageLuma8(GrayImage::new(32, 32));
        let result = aligner.align_named(&aligner.prepare_reference(&image), &image, "IMG_0003.jpg");
        clear_correlation_id();

        assert!(result.is_err());
        assert!(logs_contain(&id.to_string()));
        assert!(logs_contain("IMG_0003.jpg"));
    }
}
