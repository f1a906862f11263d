pub mod algorithms;
pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod utils;
pub mod visualization;

pub use algorithms::{Homography, RatioTestMatcher, SiftExtractor};
pub use config::Config;
pub use error::AlignmentFailure;
pub use pipeline::{
    align_all, Aligner, Alignment, AlignmentResult, AlignmentStats, BatchReport, BatchRunner, Features,
    Keypoint, ReferenceFrame,
};

pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    // No unit tests in lib.rs - all tests are in tests/ directory
}
