// Pure-Rust feature pipeline: detection, matching, estimation support and warping
pub mod homography;
pub mod matcher;
pub mod resample;
pub mod sift;

pub use homography::{fit_dlt, Homography, Point};
pub use matcher::RatioTestMatcher;
pub use resample::{warp_buffer, warp_perspective};
pub use sift::SiftExtractor;
