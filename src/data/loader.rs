use anyhow::Context;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

use crate::error::AlignmentFailure;

/// Decode an image file. Every failure, including a missing file, is a
/// per-image `Decode` failure so a batch can skip it.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage, AlignmentFailure> {
    let path = path.as_ref();
    image::open(path).map_err(|e| AlignmentFailure::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Encode an image, picking the format from the file extension.
pub fn save_image<P: AsRef<Path>>(image: &DynamicImage, path: P) -> crate::Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("Unsupported output format: {}", path.display()))?;
    save_image_as(image, path, format)
}

/// Encode an image in an explicit format. JPEG output drops any alpha channel.
pub fn save_image_as<P: AsRef<Path>>(image: &DynamicImage, path: P, format: ImageFormat) -> crate::Result<()> {
    let path = path.as_ref();
    let result = match format {
        ImageFormat::Jpeg if image.color().has_alpha() => {
            DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format)
        }
        _ => image.save_with_format(path, format),
    };
    result.with_context(|| format!("Failed to write image: {}", path.display()))
}

/// True when `path` has one of `extensions` (compared case-insensitively).
pub fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
