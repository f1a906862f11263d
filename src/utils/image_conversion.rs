use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use ndarray::Array2;

/// Single-channel float image with intensities in [0, 1].
pub type LumaF32Image = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Single-channel intensity view of any decoded image.
pub fn to_intensity(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

pub fn gray_to_f32(image: &GrayImage) -> LumaF32Image {
    let (width, height) = image.dimensions();
    let data = image.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    LumaF32Image::from_raw(width, height, data).unwrap_or_else(|| LumaF32Image::new(width, height))
}

/// Row-major `(height, width)` array over the pixels of a float image.
pub fn f32_image_to_array(image: LumaF32Image) -> Array2<f32> {
    let (width, height) = image.dimensions();
    Array2::from_shape_vec((height as usize, width as usize), image.into_raw())
        .unwrap_or_else(|_| Array2::zeros((height as usize, width as usize)))
}

pub fn array_to_f32_image(array: &Array2<f32>) -> LumaF32Image {
    let (height, width) = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    LumaF32Image::from_raw(width as u32, height as u32, data)
        .unwrap_or_else(|| LumaF32Image::new(width as u32, height as u32))
}

/// Keep every second pixel in both directions, starting at (0, 0).
pub fn decimate(array: &Array2<f32>) -> Array2<f32> {
    let (height, width) = array.dim();
    Array2::from_shape_fn((height / 2, width / 2), |(y, x)| array[[2 * y, 2 * x]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_to_f32_scaling() {
        let gray = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let float = gray_to_f32(&gray);
        assert_eq!(float.get_pixel(0, 0)[0], 0.0);
        assert_eq!(float.get_pixel(1, 0)[0], 1.0);
    }

    #[test]
    fn test_array_layout_is_row_major() {
        let gray = GrayImage::from_fn(3, 2, |x, y| Luma([(10 * y + x) as u8]));
        let array = f32_image_to_array(gray_to_f32(&gray));
        assert_eq!(array.dim(), (2, 3));
        assert!((array[[1, 2]] - 12.0 / 255.0).abs() < 1e-6);

        let back = array_to_f32_image(&array);
        assert_eq!(back.dimensions(), (3, 2));
    }

    #[test]
    fn test_decimate_halves_dimensions() {
        let array = Array2::from_shape_fn((5, 7), |(y, x)| (y * 10 + x) as f32);
        let half = decimate(&array);
        assert_eq!(half.dim(), (2, 3));
        assert_eq!(half[[1, 2]], 24.0);
    }
}
