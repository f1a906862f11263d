use image::DynamicImage;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::algorithms::Homography;
use crate::error::AlignmentFailure;

/// Length of every descriptor vector produced by the feature extractor.
pub const DESCRIPTOR_SIZE: usize = 128;

/// A detected interest point in the coordinate space of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the neighbourhood the descriptor was computed over.
    pub size: f32,
    /// Dominant gradient orientation in degrees, [0, 360).
    pub angle: f32,
    /// Interpolated contrast of the scale-space extremum.
    pub response: f32,
    pub octave: usize,
}

/// Keypoints of one image together with their descriptors.
///
/// Row `i` of `descriptors` belongs to `keypoints[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Array2<f32>,
}

impl Features {
    pub fn empty() -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Array2::zeros((0, DESCRIPTOR_SIZE)),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn descriptor(&self, index: usize) -> ArrayView1<'_, f32> {
        self.descriptors.row(index)
    }
}

/// A ratio-test survivor linking a reference keypoint to a target keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub reference_index: usize,
    pub target_index: usize,
    pub distance: f32,
}

/// Stages of a single target's alignment, in the order they complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStage {
    ExtractedReference,
    ExtractedBoth,
    Matched,
    Estimated,
    Warped,
}

impl AlignmentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractedReference => "extracted_reference",
            Self::ExtractedBoth => "extracted_both",
            Self::Matched => "matched",
            Self::Estimated => "estimated",
            Self::Warped => "warped",
        }
    }
}

/// Counters gathered while aligning one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentStats {
    pub reference_features: usize,
    pub target_features: usize,
    pub good_matches: usize,
    pub inliers: usize,
    pub ransac_iterations: usize,
    /// Fraction of good matches that support the final homography.
    pub inlier_ratio: f32,
    pub processing_time_ms: f32,
}

/// A successful alignment of one target onto the reference frame.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub homography: Homography,
    pub warped: DynamicImage,
    pub stats: AlignmentStats,
}

pub type AlignmentResult = std::result::Result<Alignment, AlignmentFailure>;

/// Reference image state shared read-only by every alignment in a batch.
#[derive(Debug, Clone)]
pub struct ReferenceFrame {
    pub width: u32,
    pub height: u32,
    pub features: Features,
}

impl ReferenceFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
