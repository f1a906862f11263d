pub mod image_conversion;
pub mod ransac;

pub use image_conversion::*;
pub use ransac::*;
