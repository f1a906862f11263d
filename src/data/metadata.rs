//! Capture date lookup from EXIF data.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use tracing::{debug, warn};

/// EXIF dates look like `2023:06:14 09:30:00`.
pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Container type little_exif should parse, from the file extension.
fn exif_file_type(path: &Path) -> Option<FileExtension> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => Some(FileExtension::JPEG),
        Some("tif") | Some("tiff") => Some(FileExtension::TIFF),
        Some("png") => Some(FileExtension::PNG { as_zTXt_chunk: false }),
        _ => None,
    }
}

/// Raw capture date of an image file: `DateTimeOriginal` when present,
/// otherwise IFD0 `DateTime`. `None` when the file has no usable EXIF.
pub fn read_capture_date<P: AsRef<Path>>(path: P) -> Option<String> {
    let path = path.as_ref();
    let file_type = exif_file_type(path)?;
    let buffer = match std::fs::read(path) {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!(path = %path.display(), "Error reading EXIF data: {}", e);
            return None;
        }
    };

    let date = match Metadata::new_from_vec(&buffer, file_type) {
        Ok(metadata) => capture_date(&metadata),
        Err(e) => {
            debug!(path = %path.display(), "No EXIF data: {}", e);
            None
        }
    };
    debug!(path = %path.display(), date = ?date, "Capture date lookup");
    date
}

/// `DateTimeOriginal`, else `DateTime` (little_exif calls it `ModifyDate`).
pub fn capture_date(metadata: &Metadata) -> Option<String> {
    ascii_tag(metadata, &ExifTag::DateTimeOriginal(String::new()))
        .or_else(|| ascii_tag(metadata, &ExifTag::ModifyDate(String::new())))
}

fn ascii_tag(metadata: &Metadata, tag: &ExifTag) -> Option<String> {
    metadata.get_tag(tag).into_iter().find_map(|found| {
        let value = match found {
            ExifTag::DateTimeOriginal(value) | ExifTag::ModifyDate(value) => value,
            _ => return None,
        };
        let text = value.trim_end_matches('\0').trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

/// Caption text for a raw EXIF date, or `None` if it does not parse.
pub fn format_capture_date(raw: &str, format: &str) -> Option<String> {
    let parsed = NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATE_FORMAT).ok()?;
    let mut text = String::new();
    // An invalid format string surfaces as a fmt error rather than a panic.
    write!(text, "{}", parsed.format(format)).ok()?;
    Some(text)
}

/// Caption text for an image, falling back to today's date.
pub fn format_timestamp(raw: Option<&str>, format: &str) -> String {
    if let Some(text) = raw.and_then(|raw| format_capture_date(raw, format)) {
        return text;
    }

    let mut text = String::new();
    if write!(text, "{}", Local::now().format(format)).is_err() {
        text = Local::now().format("%B %d").to_string();
    }
    text
}
