//! Structured spans for hierarchical logging
//!
//! Pre-declared span fields keep the per-image and per-batch records
//! consistent, whichever stage an alignment stops at.

use instant::Instant;
use tracing::{field, info_span, Span};
use uuid::Uuid;

use crate::error::AlignmentFailure;
use crate::pipeline::{AlignmentStage, AlignmentStats};

/// Span covering the alignment of one target image
pub struct AlignmentSpan {
    span: Span,
    start_time: Instant,
}

impl AlignmentSpan {
    pub fn new(file_name: &str, correlation_id: Option<Uuid>) -> Self {
        let span = info_span!(
            "alignment",
            file = file_name,
            correlation_id = field::Empty,
            reference_features = field::Empty,
            target_features = field::Empty,
            good_matches = field::Empty,
            ransac_iterations = field::Empty,
            ransac_inliers = field::Empty,
            stage = field::Empty,
            success = field::Empty,
            execution_time_ms = field::Empty,
        );
        if let Some(id) = correlation_id {
            span.record("correlation_id", field::display(id));
        }

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// Record feature detection results
    pub fn record_feature_detection(&self, reference: usize, target: usize) {
        self.span.record("reference_features", reference);
        self.span.record("target_features", target);
        self.span.record("stage", AlignmentStage::ExtractedBoth.as_str());
        tracing::debug!(
            parent: &self.span,
            reference_features = reference,
            target_features = target,
            "Feature detection completed"
        );
    }

    /// Record matching results
    pub fn record_matching(&self, good_matches: usize) {
        self.span.record("good_matches", good_matches);
        self.span.record("stage", AlignmentStage::Matched.as_str());
        tracing::debug!(parent: &self.span, good_matches = good_matches, "Feature matching completed");
    }

    /// Record RANSAC estimation results
    pub fn record_ransac(&self, iterations: usize, inliers: usize, rms_error: f64) {
        self.span.record("ransac_iterations", iterations);
        self.span.record("ransac_inliers", inliers);
        self.span.record("stage", AlignmentStage::Estimated.as_str());
        tracing::debug!(
            parent: &self.span,
            iterations = iterations,
            inliers = inliers,
            rms_error = rms_error,
            "RANSAC estimation completed"
        );
    }

    /// Record a successful alignment
    pub fn record_success(&self, stats: &AlignmentStats) {
        let duration = self.start_time.elapsed();
        self.span.record("success", true);
        self.span.record("stage", AlignmentStage::Warped.as_str());
        self.span.record("execution_time_ms", duration.as_millis() as u64);
        tracing::info!(
            parent: &self.span,
            inliers = stats.inliers,
            good_matches = stats.good_matches,
            inlier_ratio = stats.inlier_ratio as f64,
            execution_time_ms = duration.as_millis() as u64,
            "Alignment succeeded"
        );
    }

    /// Record a failed alignment together with the stage it stopped after
    pub fn record_failure(&self, failure: &AlignmentFailure) {
        let duration = self.start_time.elapsed();
        self.span.record("success", false);
        if let Some(stage) = failure.stage() {
            self.span.record("stage", stage.as_str());
        }
        self.span.record("execution_time_ms", duration.as_millis() as u64);
        tracing::warn!(
            parent: &self.span,
            kind = failure.kind(),
            execution_time_ms = duration.as_millis() as u64,
            "Alignment failed: {}",
            failure
        );
    }

    pub fn elapsed_ms(&self) -> f32 {
        self.start_time.elapsed().as_secs_f32() * 1000.0
    }

    /// Get the underlying span for manual instrumentation
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Span covering one batch run over an input folder
pub struct BatchSpan {
    span: Span,
    start_time: Instant,
    session_id: Uuid,
}

impl BatchSpan {
    pub fn new(reference: &str, session_id: Uuid) -> Self {
        let span = info_span!(
            "batch",
            reference = reference,
            session_id = %session_id,
            total = field::Empty,
            aligned = field::Empty,
            duration_ms = field::Empty,
        );

        Self {
            span,
            start_time: Instant::now(),
            session_id,
        }
    }

    /// Record one processed file
    pub fn record_entry(&self, file_name: &str, success: bool) {
        tracing::debug!(parent: &self.span, file = file_name, success = success, "Batch entry processed");
    }

    /// Record batch completion
    pub fn record_completion(&self, total: usize, aligned: usize) {
        let duration = self.start_time.elapsed();
        self.span.record("total", total);
        self.span.record("aligned", aligned);
        self.span.record("duration_ms", duration.as_millis() as u64);

        tracing::info!(
            parent: &self.span,
            total = total,
            aligned = aligned,
            skipped = total - aligned,
            duration_ms = duration.as_millis() as u64,
            "Batch completed"
        );
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_alignment_span_success() {
        let span = AlignmentSpan::new("IMG_0001.jpg", Some(Uuid::new_v4()));
        let _enter = span.enter();
        span.record_feature_detection(420, 388);
        span.record_matching(57);
        span.record_ransac(112, 49, 0.8);
        span.record_success(&AlignmentStats {
            reference_features: 420,
            target_features: 388,
            good_matches: 57,
            inliers: 49,
            ransac_iterations: 112,
            inlier_ratio: 49.0 / 57.0,
            processing_time_ms: 12.0,
        });

        assert!(logs_contain("Alignment succeeded"));
    }

    #[traced_test]
    #[test]
    fn test_alignment_span_failure() {
        let span = AlignmentSpan::new("IMG_0002.jpg", None);
        let _enter = span.enter();
        span.record_failure(&AlignmentFailure::InsufficientCorrespondences {
            found: 3,
            required: 10,
        });

        assert!(logs_contain("insufficient_correspondences"));
    }

    #[traced_test]
    #[test]
    fn test_batch_span() {
        let span = BatchSpan::new("base.jpg", Uuid::new_v4());
        let _enter = span.enter();
        span.record_entry("a.jpg", true);
        span.record_entry("b.jpg", false);
        span.record_completion(2, 1);

        assert!(logs_contain("Batch completed"));
    }
}
