use std::fmt::Write;

use crate::algorithms::Homography;
use crate::pipeline::{AlignmentStats, BatchReport, EntryOutcome};

pub fn print_alignment(stats: &AlignmentStats, homography: &Homography) {
    println!("=== Alignment Result ===");
    println!("  Features: {} reference / {} target", stats.reference_features, stats.target_features);
    println!("  Good matches: {}", stats.good_matches);
    println!("  Inliers: {} ({:.1}%)", stats.inliers, stats.inlier_ratio * 100.0);
    println!("  RANSAC iterations: {}", stats.ransac_iterations);
    println!("  Processing Time: {:.2}ms", stats.processing_time_ms);
    println!("  Homography:");
    for row in homography.to_rows() {
        println!("    [{:>12.6} {:>12.6} {:>12.6}]", row[0], row[1], row[2]);
    }
}

/// Markdown-style table of a batch run, one row per input file.
pub fn format_batch_table(report: &BatchReport) -> String {
    let mut table = String::new();
    let _ = writeln!(table, "| File | Status | Matches | Inliers | Time (ms) |");
    let _ = writeln!(table, "|------|--------|---------|---------|-----------|");

    for entry in &report.entries {
        let _ = match &entry.outcome {
            EntryOutcome::Aligned { stats, .. } => writeln!(
                table,
                "| {} | aligned | {} | {} | {:.2} |",
                entry.file_name, stats.good_matches, stats.inliers, stats.processing_time_ms
            ),
            EntryOutcome::Failed { kind, .. } => {
                writeln!(table, "| {} | {} | - | - | - |", entry.file_name, kind)
            }
        };
    }

    let _ = write!(
        table,
        "{} of {} images aligned, {} skipped",
        report.aligned,
        report.total(),
        report.failed
    );
    table
}

pub fn print_batch_summary(report: &BatchReport) {
    println!("=== Batch Results ===");
    println!("{}", format_batch_table(report));
}
