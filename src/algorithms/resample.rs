//! Perspective warping of a target image into the reference frame.

use image::{DynamicImage, ImageBuffer, Pixel};
use rayon::prelude::*;

use super::homography::{Homography, Point};

/// Warp `image` by `homography` (target to reference coordinates) onto an
/// `width` x `height` canvas.
///
/// Every output pixel is mapped back through the inverse transform and
/// sampled bilinearly. Pixels whose source lies outside the target's pixel
/// footprint are black.
pub fn warp_perspective(image: &DynamicImage, homography: &Homography, width: u32, height: u32) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(buffer) => DynamicImage::ImageLuma8(warp_buffer(buffer, homography, width, height)),
        DynamicImage::ImageRgb8(buffer) => DynamicImage::ImageRgb8(warp_buffer(buffer, homography, width, height)),
        DynamicImage::ImageRgba8(buffer) => DynamicImage::ImageRgba8(warp_buffer(buffer, homography, width, height)),
        other => DynamicImage::ImageRgb8(warp_buffer(&other.to_rgb8(), homography, width, height)),
    }
}

/// Channel-generic warp over 8-bit buffers.
pub fn warp_buffer<P>(
    source: &ImageBuffer<P, Vec<u8>>,
    homography: &Homography,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let channels = P::CHANNEL_COUNT as usize;
    let (src_width, src_height) = source.dimensions();
    let sampler = BilinearSampler {
        data: source.as_raw(),
        width: src_width as usize,
        height: src_height as usize,
        channels,
    };
    let inverse = homography.inverse();

    let mut output = ImageBuffer::<P, Vec<u8>>::new(width, height);
    if width == 0 || height == 0 || src_width == 0 || src_height == 0 {
        return output;
    }

    let row_len = width as usize * channels;
    output.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        for x in 0..width as usize {
            let Some(src) = inverse.apply(&Point::new(x as f64, y as f64)) else {
                continue;
            };
            sampler.sample(src.x, src.y, &mut row[x * channels..(x + 1) * channels]);
        }
    });

    output
}

struct BilinearSampler<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    channels: usize,
}

impl BilinearSampler<'_> {
    /// Writes the interpolated pixel into `out`; leaves it untouched when
    /// `(x, y)` falls outside the image footprint.
    fn sample(&self, x: f64, y: f64, out: &mut [u8]) {
        let (w, h) = (self.width as f64, self.height as f64);
        if !(x > -0.5 && x < w - 0.5 && y > -0.5 && y < h - 0.5) {
            return;
        }

        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let clamp_x = |v: f64| v.clamp(0.0, w - 1.0) as usize;
        let clamp_y = |v: f64| v.clamp(0.0, h - 1.0) as usize;
        let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
        let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

        for (c, value) in out.iter_mut().enumerate() {
            let at = |px: usize, py: usize| self.data[(py * self.width + px) * self.channels + c] as f64;
            let top = at(xa, ya) * (1.0 - fx) + at(xb, ya) * fx;
            let bottom = at(xa, yb) * (1.0 - fx) + at(xb, yb) * fx;
            *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
    }
}
