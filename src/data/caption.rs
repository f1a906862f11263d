use ab_glyph::{Font, FontVec, PxScale};
use image::{DynamicImage, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::CaptionPosition;

/// Distance of a top caption from the top edge.
const TOP_MARGIN: i32 = 50;
/// Distance of a bottom caption from the bottom edge.
const BOTTOM_MARGIN: i32 = 100;
/// Padding of the background box around the text.
const BOX_PADDING: i32 = 10;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Fonts tried when no font path is configured.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Load the configured font, falling back to the first system font that loads.
///
/// Returns `None` when nothing loads; the caller then skips captions.
pub fn load_font(path: Option<&Path>) -> Option<FontVec> {
    load_font_from(path, FALLBACK_FONTS)
}

fn load_font_from(path: Option<&Path>, fallbacks: &[&str]) -> Option<FontVec> {
    let candidates: Vec<PathBuf> = path
        .map(Path::to_path_buf)
        .into_iter()
        .chain(fallbacks.iter().map(PathBuf::from))
        .collect();

    for (index, candidate) in candidates.iter().enumerate() {
        let configured = path.is_some() && index == 0;
        match std::fs::read(candidate).map(FontVec::try_from_vec) {
            Ok(Ok(font)) => {
                debug!(font = %candidate.display(), "Caption font loaded");
                return Some(font);
            }
            Ok(Err(e)) => warn!(font = %candidate.display(), "Invalid font file: {}", e),
            Err(e) if configured => {
                warn!(font = %candidate.display(), "Font not found, trying system fonts: {}", e)
            }
            Err(_) => {}
        }
    }

    warn!("No usable caption font; captions will be skipped");
    None
}

/// Placement of the caption text and its background box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionLayout {
    pub text_x: i32,
    pub text_y: i32,
    pub box_x: i32,
    pub box_y: i32,
    pub box_width: u32,
    pub box_height: u32,
}

impl CaptionLayout {
    /// Horizontally centred; 50 px from the top or 100 px above the bottom.
    pub fn compute(
        image_width: u32,
        image_height: u32,
        text_width: u32,
        text_height: u32,
        position: CaptionPosition,
    ) -> Self {
        let text_x = (image_width as i32 - text_width as i32).div_euclid(2);
        let text_y = match position {
            CaptionPosition::Top => TOP_MARGIN,
            CaptionPosition::Bottom => image_height as i32 - text_height as i32 - BOTTOM_MARGIN,
        };

        Self {
            text_x,
            text_y,
            box_x: text_x - BOX_PADDING,
            box_y: text_y - BOX_PADDING,
            box_width: text_width + 2 * BOX_PADDING as u32,
            box_height: text_height + 2 * BOX_PADDING as u32,
        }
    }
}

/// Draw `text` in white on a black box over a copy of `image`.
pub fn render_caption<F: Font>(
    image: &DynamicImage,
    text: &str,
    position: CaptionPosition,
    font: &F,
    font_size: f32,
) -> DynamicImage {
    let mut canvas = image.to_rgb8();
    let scale = PxScale::from(font_size);
    let (text_width, text_height) = text_size(scale, font, text);
    let layout = CaptionLayout::compute(canvas.width(), canvas.height(), text_width, text_height, position);

    draw_filled_rect_mut(
        &mut canvas,
        Rect::at(layout.box_x, layout.box_y).of_size(layout.box_width, layout.box_height),
        BOX_COLOR,
    );
    draw_text_mut(&mut canvas, TEXT_COLOR, layout.text_x, layout.text_y, scale, font, text);

    DynamicImage::ImageRgb8(canvas)
}
