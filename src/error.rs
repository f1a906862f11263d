//! Per-image failure taxonomy.
//!
//! Every failure here is recoverable at the batch level: the failing image is
//! logged and skipped, and no variant ever carries a partial transform.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::AlignmentStage;

/// Reason a single target image could not be aligned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentFailure {
    /// The image file could not be read or decoded.
    #[error("failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// One of the two images produced too few keypoints to be matched.
    #[error("insufficient features (reference: {reference}, target: {target}, required: {required})")]
    InsufficientFeatures {
        reference: usize,
        target: usize,
        required: usize,
    },

    /// Too few correspondences survived the ratio test.
    #[error("insufficient correspondences: {found} good matches, more than {required} required")]
    InsufficientCorrespondences { found: usize, required: usize },

    /// The consensus search did not find a homography with enough support.
    #[error("homography estimation failed: best consensus had {inliers} inliers, more than {required} required")]
    EstimationFailure { inliers: usize, required: usize },
}

impl AlignmentFailure {
    /// Short machine-readable name of the failure kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode_failure",
            Self::InsufficientFeatures { .. } => "insufficient_features",
            Self::InsufficientCorrespondences { .. } => "insufficient_correspondences",
            Self::EstimationFailure { .. } => "estimation_failure",
        }
    }

    /// Last pipeline stage that completed before the failure.
    pub fn stage(&self) -> Option<AlignmentStage> {
        match self {
            Self::Decode { .. } => None,
            Self::InsufficientFeatures { .. } => Some(AlignmentStage::ExtractedReference),
            Self::InsufficientCorrespondences { .. } => Some(AlignmentStage::ExtractedBoth),
            Self::EstimationFailure { .. } => Some(AlignmentStage::Matched),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds_are_distinct() {
        let failures = [
            AlignmentFailure::Decode {
                path: PathBuf::from("a.jpg"),
                reason: "truncated".to_string(),
            },
            AlignmentFailure::InsufficientFeatures {
                reference: 0,
                target: 0,
                required: 2,
            },
            AlignmentFailure::InsufficientCorrespondences {
                found: 3,
                required: 10,
            },
            AlignmentFailure::EstimationFailure {
                inliers: 7,
                required: 10,
            },
        ];

        let mut kinds: Vec<&str> = failures.iter().map(|f| f.kind()).collect();
        kinds.dedup();
        assert_eq!(kinds.len(), 4);
    }

    #[test]
    fn test_failure_message_mentions_counts() {
        let failure = AlignmentFailure::InsufficientCorrespondences {
            found: 4,
            required: 10,
        };
        let message = failure.to_string();
        assert!(message.contains('4'));
        assert!(message.contains("10"));
        assert_eq!(failure.stage(), Some(AlignmentStage::ExtractedBoth));
    }
}
