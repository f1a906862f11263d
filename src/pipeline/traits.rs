use image::GrayImage;

use crate::pipeline::types::Features;

/// Detects interest points and describes them.
///
/// Implementations must be deterministic: the same image always yields the
/// same keypoints in the same order. A blank image yields an empty set.
pub trait FeatureExtractor: Send + Sync {
    /// Returns the name of the extractor
    fn name(&self) -> &str;

    /// Extract keypoints and descriptors from a single-channel image
    fn extract(&self, image: &GrayImage) -> Features;
}
