//! Directory batch driver.
//!
//! `align_all` is the pure fold over in-memory targets; `BatchRunner` wraps it
//! with the filesystem: listing inputs, decoding, writing aligned and captioned
//! copies, and the JSON run report.

use ab_glyph::FontVec;
use anyhow::Context;
use image::{DynamicImage, ImageFormat};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::data::caption::{load_font, render_caption};
use crate::data::loader::{has_image_extension, load_image, save_image, save_image_as};
use crate::data::metadata::{format_timestamp, read_capture_date};
use crate::error::AlignmentFailure;
use crate::logging::{clear_correlation_id, new_correlation_id, BatchSpan};
use crate::pipeline::{Aligner, Alignment, AlignmentResult, AlignmentStats, ReferenceFrame};

pub const ALIGNED_DIR: &str = "aligned";
pub const DATED_DIR: &str = "dated";
pub const REPORT_FILE: &str = "report.json";

/// Align every target against one prepared reference.
///
/// Targets are processed in parallel; results come back in input order and a
/// failure never affects the other targets.
pub fn align_all(aligner: &Aligner, reference: &ReferenceFrame, targets: &[DynamicImage]) -> Vec<AlignmentResult> {
    targets
        .par_iter()
        .map(|target| aligner.align_to(reference, target))
        .collect()
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Aligned {
        aligned_path: PathBuf,
        dated_path: Option<PathBuf>,
        /// Row-major target-to-reference homography.
        homography: [[f64; 3]; 3],
        stats: AlignmentStats,
    },
    Failed {
        kind: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub file_name: String,
    /// Id carried by this file's log records.
    pub correlation_id: Uuid,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

impl BatchEntry {
    pub fn failed(file_name: impl Into<String>, correlation_id: Uuid, failure: &AlignmentFailure) -> Self {
        Self {
            file_name: file_name.into(),
            correlation_id,
            outcome: EntryOutcome::Failed {
                kind: failure.kind().to_string(),
                message: failure.to_string(),
            },
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self.outcome, EntryOutcome::Aligned { .. })
    }
}

/// Summary of one batch run, written as `aligned/report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub session_id: Uuid,
    pub reference: PathBuf,
    pub entries: Vec<BatchEntry>,
    pub aligned: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn new(session_id: Uuid, reference: PathBuf, entries: Vec<BatchEntry>) -> Self {
        let aligned = entries.iter().filter(|e| e.is_aligned()).count();
        let failed = entries.len() - aligned;
        Self {
            session_id,
            reference,
            entries,
            aligned,
            failed,
        }
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

/// Image files in `dir` with an accepted extension, sorted by name.
pub fn list_input_files(dir: &Path, extensions: &[String]) -> crate::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read input folder: {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Where a batch writes its outputs.
struct OutputLayout {
    aligned: PathBuf,
    dated: PathBuf,
}

impl OutputLayout {
    fn create(output_folder: &Path, with_dated: bool) -> crate::Result<Self> {
        let aligned = output_folder.join(ALIGNED_DIR);
        let dated = aligned.join(DATED_DIR);
        let required = if with_dated { &dated } else { &aligned };
        fs::create_dir_all(required)
            .with_context(|| format!("Failed to create output folder: {}", required.display()))?;
        Ok(Self { aligned, dated })
    }
}

/// Runs the whole tool: reference + input folder in, aligned files out.
pub struct BatchRunner {
    config: Config,
    aligner: Aligner,
}

impl BatchRunner {
    pub fn new(config: Config) -> Self {
        let aligner = Aligner::new(config.alignment.clone());
        Self { config, aligner }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self) -> crate::Result<BatchReport> {
        let batch = &self.config.batch;
        let reference_path = batch
            .reference_image
            .as_deref()
            .context("No reference image configured")?;
        let input_folder = batch.input_folder.as_deref().context("No input folder configured")?;
        let output_folder = batch.output_folder.as_deref().context("No output folder configured")?;

        let session = BatchSpan::new(&reference_path.display().to_string(), Uuid::new_v4());
        let _enter = session.enter();

        let reference_image = load_image(reference_path).context("Error loading base image")?;
        let reference = self.aligner.prepare_reference(&reference_image);
        info!(
            reference = %reference_path.display(),
            keypoints = reference.features.len(),
            "Reference image loaded"
        );

        let font = if self.config.caption.enabled {
            load_font(self.config.caption.font_path.as_deref())
        } else {
            None
        };
        let layout = OutputLayout::create(output_folder, font.is_some())?;

        let files = list_input_files(input_folder, &batch.extensions)?;
        info!(files = files.len(), input = %input_folder.display(), "Processing input folder");

        let parent = session.span().clone();
        let entries: Vec<BatchEntry> = files
            .par_iter()
            .map(|path| {
                let _guard = parent.enter();
                let entry = self.process_file(path, &reference, font.as_ref(), &layout);
                session.record_entry(&entry.file_name, entry.is_aligned());
                entry
            })
            .collect();

        let report = BatchReport::new(session.session_id(), reference_path.to_path_buf(), entries);
        session.record_completion(report.total(), report.aligned);

        if batch.write_report {
            let report_path = layout.aligned.join(REPORT_FILE);
            let json = serde_json::to_string_pretty(&report)?;
            fs::write(&report_path, json)
                .with_context(|| format!("Failed to write report: {}", report_path.display()))?;
            info!(report = %report_path.display(), "Batch report written");
        }

        Ok(report)
    }

    fn process_file(
        &self,
        path: &Path,
        reference: &ReferenceFrame,
        font: Option<&FontVec>,
        layout: &OutputLayout,
    ) -> BatchEntry {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        // Rayon reuses worker threads, so the id is cleared before returning.
        let correlation_id = new_correlation_id();
        let entry = self.process_named(path, file_name, correlation_id, reference, font, layout);
        clear_correlation_id();
        entry
    }

    fn process_named(
        &self,
        path: &Path,
        file_name: String,
        correlation_id: Uuid,
        reference: &ReferenceFrame,
        font: Option<&FontVec>,
        layout: &OutputLayout,
    ) -> BatchEntry {

        let target = match load_image(path) {
            Ok(image) => image,
            Err(failure) => {
                warn!(file = %file_name, correlation_id = %correlation_id, "Error loading image: {}", failure);
                return BatchEntry::failed(file_name, correlation_id, &failure);
            }
        };

        let alignment = match self.aligner.align_named(reference, &target, &file_name) {
            Ok(alignment) => alignment,
            Err(failure) => {
                warn!(file = %file_name, correlation_id = %correlation_id, "Skipping alignment: {}", failure);
                return BatchEntry::failed(file_name, correlation_id, &failure);
            }
        };

        match self.write_outputs(path, &file_name, &alignment, font, layout) {
            Ok(outcome) => BatchEntry {
                file_name,
                correlation_id,
                outcome,
            },
            Err(e) => {
                error!(file = %file_name, correlation_id = %correlation_id, "Failed to write outputs: {:#}", e);
                BatchEntry {
                    file_name,
                    correlation_id,
                    outcome: EntryOutcome::Failed {
                        kind: "write_failure".to_string(),
                        message: format!("{:#}", e),
                    },
                }
            }
        }
    }

    fn write_outputs(
        &self,
        source: &Path,
        file_name: &str,
        alignment: &Alignment,
        font: Option<&FontVec>,
        layout: &OutputLayout,
    ) -> crate::Result<EntryOutcome> {
        let aligned_path = layout.aligned.join(file_name);
        save_image(&alignment.warped, &aligned_path)?;
        info!(path = %aligned_path.display(), "Aligned image saved");

        let dated_path = match font {
            Some(font) => {
                let caption = &self.config.caption;
                let raw_date = read_capture_date(source);
                let text = format_timestamp(raw_date.as_deref(), &caption.date_format);
                let captioned = render_caption(&alignment.warped, &text, caption.position, font, caption.font_size);

                let dated_path = layout.dated.join(file_name);
                save_image_as(&captioned, &dated_path, ImageFormat::Jpeg)?;
                info!(path = %dated_path.display(), caption = %text, "Dated image saved");
                Some(dated_path)
            }
            None => None,
        };

        Ok(EntryOutcome::Aligned {
            aligned_path,
            dated_path,
            homography: alignment.homography.to_rows(),
            stats: alignment.stats.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let failure = AlignmentFailure::InsufficientCorrespondences {
            found: 4,
            required: 10,
        };
        let entries = vec![
            BatchEntry::failed("a.jpg", Uuid::new_v4(), &failure),
            BatchEntry {
                file_name: "b.jpg".to_string(),
                correlation_id: Uuid::new_v4(),
                outcome: EntryOutcome::Aligned {
                    aligned_path: PathBuf::from("out/aligned/b.jpg"),
                    dated_path: None,
                    homography: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                    stats: AlignmentStats::default(),
                },
            },
        ];
        let report = BatchReport::new(Uuid::nil(), PathBuf::from("base.jpg"), entries);
        assert_eq!((report.total(), report.aligned, report.failed), (2, 1, 1));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["status"], "failed");
        assert_eq!(json["entries"][0]["kind"], "insufficient_correspondences");
        assert_eq!(json["entries"][1]["status"], "aligned");
    }
}
