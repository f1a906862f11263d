//! Scale-invariant feature extraction.
//!
//! Difference-of-Gaussians detector with sub-pixel refinement, dominant
//! orientation assignment and the 4x4x8 gradient-histogram descriptor.
//! Keypoint coordinates are reported in pixels of the input image.

use std::f32::consts::{PI, SQRT_2};

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use nalgebra::{Matrix3, Vector3};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config::SiftConfig;
use crate::pipeline::{FeatureExtractor, Features, Keypoint, DESCRIPTOR_SIZE};
use crate::utils::image_conversion::{array_to_f32_image, decimate, f32_image_to_array, gray_to_f32};

/// Blur already present in a camera image, in pixels.
const ASSUMED_INPUT_BLUR: f32 = 0.5;
/// Extrema closer than this to an octave edge are ignored.
const IMAGE_BORDER: usize = 5;
/// Octaves stop once the shorter side drops below this.
const MIN_OCTAVE_SIZE: usize = 16;
const MAX_INTERPOLATION_STEPS: usize = 5;

const ORIENTATION_BINS: usize = 36;
const ORIENTATION_SIGMA_FACTOR: f32 = 1.5;
const ORIENTATION_RADIUS_FACTOR: f32 = 3.0;
const ORIENTATION_PEAK_RATIO: f32 = 0.8;

const DESCRIPTOR_WIDTH: usize = 4;
const DESCRIPTOR_BINS: usize = 8;
const DESCRIPTOR_SCALE_FACTOR: f32 = 3.0;
const DESCRIPTOR_MAGNITUDE_CAP: f32 = 0.2;

/// Gaussian images of one octave and their pairwise differences.
struct Octave {
    gaussians: Vec<Array2<f32>>,
    dogs: Vec<Array2<f32>>,
}

/// A refined extremum in the pixel grid of its octave.
#[derive(Debug, Clone, Copy)]
struct ScaleSpacePoint {
    octave: usize,
    /// Gaussian layer the gradients are sampled from.
    layer: usize,
    x: f32,
    y: f32,
    /// Scale relative to the octave's pixel grid.
    sigma: f32,
    response: f32,
    /// Dominant orientation in radians.
    angle: f32,
}

impl ScaleSpacePoint {
    fn to_keypoint(self) -> Keypoint {
        let scale = (1usize << self.octave) as f32;
        // rem_euclid can round up to exactly 360.
        let degrees = self.angle.to_degrees().rem_euclid(360.0);
        Keypoint {
            x: self.x * scale,
            y: self.y * scale,
            size: 2.0 * self.sigma * scale,
            angle: if degrees >= 360.0 { 0.0 } else { degrees },
            response: self.response,
            octave: self.octave,
        }
    }
}

/// Deterministic DoG feature extractor.
pub struct SiftExtractor {
    config: SiftConfig,
}

impl Default for SiftExtractor {
    fn default() -> Self {
        Self::new(SiftConfig::default())
    }
}

impl SiftExtractor {
    pub fn new(config: SiftConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    /// Number of octaves that fit an image of the given size.
    pub fn octave_count(width: u32, height: u32) -> usize {
        let mut size = width.min(height) as usize;
        let mut count = 0;
        while size >= MIN_OCTAVE_SIZE {
            count += 1;
            size /= 2;
        }
        count
    }

    fn build_scale_space(&self, image: &GrayImage) -> Vec<Octave> {
        let (width, height) = image.dimensions();
        let octave_count = Self::octave_count(width, height);
        if octave_count == 0 {
            return Vec::new();
        }

        let layers = self.config.n_octave_layers;
        let sigma = self.config.sigma;
        let k = 2f32.powf(1.0 / layers as f32);

        // Blur to add on top of layer i - 1 to reach sigma * k^i.
        let increments: Vec<f32> = (1..layers + 3)
            .map(|i| {
                let previous = sigma * k.powi(i as i32 - 1);
                let total = previous * k;
                (total * total - previous * previous).sqrt()
            })
            .collect();

        let seed_sigma = (sigma * sigma - ASSUMED_INPUT_BLUR * ASSUMED_INPUT_BLUR)
            .max(0.01)
            .sqrt();
        let seed = f32_image_to_array(gaussian_blur_f32(&gray_to_f32(image), seed_sigma));

        let mut octaves: Vec<Octave> = Vec::with_capacity(octave_count);
        for _ in 0..octave_count {
            let first = match octaves.last() {
                None => seed.clone(),
                // Layer `layers` carries twice the base blur of its octave.
                Some(previous) => decimate(&previous.gaussians[layers]),
            };

            let mut gaussians = Vec::with_capacity(layers + 3);
            gaussians.push(first);
            for &increment in &increments {
                let blurred = blur(&gaussians[gaussians.len() - 1], increment);
                gaussians.push(blurred);
            }

            let dogs = gaussians.windows(2).map(|pair| &pair[1] - &pair[0]).collect();
            octaves.push(Octave { gaussians, dogs });
        }

        octaves
    }

    fn detect_in_octave(&self, octave_index: usize, octave: &Octave) -> Vec<ScaleSpacePoint> {
        let layers = self.config.n_octave_layers;
        let threshold = 0.5 * self.config.contrast_threshold / layers as f32;
        let (height, width) = octave.dogs[0].dim();

        let mut points = Vec::new();
        for layer in 1..=layers {
            let stack = [&octave.dogs[layer - 1], &octave.dogs[layer], &octave.dogs[layer + 1]];
            for y in IMAGE_BORDER..height - IMAGE_BORDER {
                for x in IMAGE_BORDER..width - IMAGE_BORDER {
                    let value = stack[1][[y, x]];
                    if value.abs() <= threshold || !is_local_extremum(&stack, y, x, value) {
                        continue;
                    }
                    if let Some(point) = self.refine_extremum(octave_index, octave, layer, x, y) {
                        points.extend(self.assign_orientations(octave, point));
                    }
                }
            }
        }

        trace!(
            octave = octave_index,
            width = width,
            height = height,
            keypoints = points.len(),
            "Octave scanned"
        );
        points
    }

    /// Fit a quadratic around a discrete extremum and apply the contrast and
    /// edge-response tests to the refined location.
    fn refine_extremum(
        &self,
        octave_index: usize,
        octave: &Octave,
        layer: usize,
        x: usize,
        y: usize,
    ) -> Option<ScaleSpacePoint> {
        let layers = self.config.n_octave_layers as isize;
        let (height, width) = octave.dogs[0].dim();
        let border = IMAGE_BORDER as isize;

        let (mut xi, mut yi, mut li) = (x as isize, y as isize, layer as isize);
        let mut converged = None;

        for _ in 0..MAX_INTERPOLATION_STEPS {
            let local = LocalDerivatives::at(&octave.dogs, li as usize, yi as usize, xi as usize);
            let offset = local.offset()?;

            if offset.iter().all(|v| v.abs() < 0.5) {
                converged = Some((local, offset));
                break;
            }
            if offset.iter().any(|v| v.abs() > width.max(height) as f32) {
                return None;
            }

            xi += offset.x.round() as isize;
            yi += offset.y.round() as isize;
            li += offset.z.round() as isize;

            if li < 1
                || li > layers
                || xi < border
                || xi >= width as isize - border
                || yi < border
                || yi >= height as isize - border
            {
                return None;
            }
        }

        let (local, offset) = converged?;

        let contrast = local.value + 0.5 * local.gradient.dot(&offset);
        if contrast.abs() * (layers as f32) < self.config.contrast_threshold {
            return None;
        }

        let (dxx, dyy, dxy) = (local.hessian[(0, 0)], local.hessian[(1, 1)], local.hessian[(0, 1)]);
        let trace = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let r = self.config.edge_threshold;
        if det <= 0.0 || trace * trace * r >= (r + 1.0) * (r + 1.0) * det {
            return None;
        }

        let scale_position = (li as f32 + offset.z) / layers as f32;
        Some(ScaleSpacePoint {
            octave: octave_index,
            layer: li as usize,
            x: xi as f32 + offset.x,
            y: yi as f32 + offset.y,
            sigma: self.config.sigma * 2f32.powf(scale_position),
            response: contrast.abs(),
            angle: 0.0,
        })
    }

    /// One keypoint per orientation histogram peak within 80% of the maximum.
    fn assign_orientations(&self, octave: &Octave, point: ScaleSpacePoint) -> Vec<ScaleSpacePoint> {
        let image = &octave.gaussians[point.layer];
        let (height, width) = image.dim();
        let scale = ORIENTATION_SIGMA_FACTOR * point.sigma;
        let radius = (ORIENTATION_RADIUS_FACTOR * scale).round() as isize;
        let weight_factor = -1.0 / (2.0 * scale * scale);
        let (cx, cy) = (point.x.round() as isize, point.y.round() as isize);

        let mut raw = [0f32; ORIENTATION_BINS];
        for dy in -radius..=radius {
            let y = cy + dy;
            if y <= 0 || y >= height as isize - 1 {
                continue;
            }
            for dx in -radius..=radius {
                let x = cx + dx;
                if x <= 0 || x >= width as isize - 1 {
                    continue;
                }
                let (magnitude, angle) = gradient(image, y as usize, x as usize);
                let weight = ((dx * dx + dy * dy) as f32 * weight_factor).exp();
                let bin = (ORIENTATION_BINS as f32 * angle / (2.0 * PI)).round() as isize;
                raw[bin.rem_euclid(ORIENTATION_BINS as isize) as usize] += weight * magnitude;
            }
        }

        let n = ORIENTATION_BINS;
        let mut histogram = [0f32; ORIENTATION_BINS];
        for i in 0..n {
            histogram[i] = (raw[(i + n - 2) % n] + raw[(i + 2) % n]) * (1.0 / 16.0)
                + (raw[(i + n - 1) % n] + raw[(i + 1) % n]) * (4.0 / 16.0)
                + raw[i] * (6.0 / 16.0);
        }

        let max = histogram.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let mut oriented = Vec::new();
        for i in 0..n {
            let left = histogram[(i + n - 1) % n];
            let right = histogram[(i + 1) % n];
            let value = histogram[i];
            if value > left && value > right && value >= ORIENTATION_PEAK_RATIO * max {
                let peak = i as f32 + 0.5 * (left - right) / (left - 2.0 * value + right);
                let bin = peak.rem_euclid(n as f32);
                oriented.push(ScaleSpacePoint {
                    angle: bin * 2.0 * PI / n as f32,
                    ..point
                });
            }
        }
        oriented
    }

    fn compute_descriptor(&self, octave: &Octave, point: &ScaleSpacePoint) -> [f32; DESCRIPTOR_SIZE] {
        let image = &octave.gaussians[point.layer];
        let (height, width) = image.dim();
        let d = DESCRIPTOR_WIDTH as f32;

        let hist_width = DESCRIPTOR_SCALE_FACTOR * point.sigma;
        let diagonal = ((width * width + height * height) as f32).sqrt();
        let radius = (hist_width * SQRT_2 * (d + 1.0) * 0.5).round().min(diagonal) as isize;

        let (sin_t, cos_t) = point.angle.sin_cos();
        let (cos_t, sin_t) = (cos_t / hist_width, sin_t / hist_width);
        let exp_scale = -1.0 / (d * d * 0.5);
        let bins_per_radian = DESCRIPTOR_BINS as f32 / (2.0 * PI);
        let (cx, cy) = (point.x.round() as isize, point.y.round() as isize);

        let mut histogram = [0f32; DESCRIPTOR_SIZE];
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                // Offset expressed in the keypoint's rotated frame, in bins.
                let x_rot = dx as f32 * cos_t + dy as f32 * sin_t;
                let y_rot = -(dx as f32) * sin_t + dy as f32 * cos_t;
                let row_bin = y_rot + d / 2.0 - 0.5;
                let col_bin = x_rot + d / 2.0 - 0.5;
                if row_bin <= -1.0 || row_bin >= d || col_bin <= -1.0 || col_bin >= d {
                    continue;
                }

                let (x, y) = (cx + dx, cy + dy);
                if y <= 0 || y >= height as isize - 1 || x <= 0 || x >= width as isize - 1 {
                    continue;
                }

                let (magnitude, angle) = gradient(image, y as usize, x as usize);
                let weight = ((x_rot * x_rot + y_rot * y_rot) * exp_scale).exp();
                let orientation_bin =
                    ((angle - point.angle) * bins_per_radian).rem_euclid(DESCRIPTOR_BINS as f32);
                accumulate(&mut histogram, row_bin, col_bin, orientation_bin, magnitude * weight);
            }
        }

        normalize_descriptor(&mut histogram);
        histogram
    }
}

impl FeatureExtractor for SiftExtractor {
    fn name(&self) -> &str {
        "SIFT"
    }

    fn extract(&self, image: &GrayImage) -> Features {
        let octaves = self.build_scale_space(image);
        if octaves.is_empty() {
            debug!(
                width = image.width(),
                height = image.height(),
                "Image too small for a scale space"
            );
            return Features::empty();
        }

        let mut points: Vec<ScaleSpacePoint> = octaves
            .par_iter()
            .enumerate()
            .map(|(index, octave)| self.detect_in_octave(index, octave))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        if self.config.n_features > 0 && points.len() > self.config.n_features {
            // Stable sort keeps detection order between equal responses.
            points.sort_by(|a, b| b.response.total_cmp(&a.response));
            points.truncate(self.config.n_features);
        }

        let rows: Vec<[f32; DESCRIPTOR_SIZE]> = points
            .par_iter()
            .map(|point| self.compute_descriptor(&octaves[point.octave], point))
            .collect();

        let mut descriptors = Array2::<f32>::zeros((rows.len(), DESCRIPTOR_SIZE));
        for (mut target, source) in descriptors.rows_mut().into_iter().zip(&rows) {
            target.iter_mut().zip(source.iter()).for_each(|(t, s)| *t = *s);
        }

        let keypoints: Vec<Keypoint> = points.into_iter().map(ScaleSpacePoint::to_keypoint).collect();
        debug!(
            keypoints = keypoints.len(),
            octaves = octaves.len(),
            "SIFT extraction completed"
        );

        Features {
            keypoints,
            descriptors,
        }
    }
}

fn blur(image: &Array2<f32>, sigma: f32) -> Array2<f32> {
    f32_image_to_array(gaussian_blur_f32(&array_to_f32_image(image), sigma))
}

fn is_local_extremum(stack: &[&Array2<f32>; 3], y: usize, x: usize, value: f32) -> bool {
    let neighbourhood = stack.iter().flat_map(|image| {
        (y - 1..=y + 1).flat_map(move |ny| (x - 1..=x + 1).map(move |nx| image[[ny, nx]]))
    });

    if value > 0.0 {
        neighbourhood.into_iter().all(|v| v <= value)
    } else {
        neighbourhood.into_iter().all(|v| v >= value)
    }
}

/// Central-difference gradient magnitude and direction (radians, y down).
fn gradient(image: &Array2<f32>, y: usize, x: usize) -> (f32, f32) {
    let gx = image[[y, x + 1]] - image[[y, x - 1]];
    let gy = image[[y + 1, x]] - image[[y - 1, x]];
    ((gx * gx + gy * gy).sqrt(), gy.atan2(gx))
}

/// Trilinear vote into the 4x4 spatial by 8 orientation grid.
fn accumulate(histogram: &mut [f32; DESCRIPTOR_SIZE], row_bin: f32, col_bin: f32, orientation_bin: f32, value: f32) {
    let (r0, c0, o0) = (row_bin.floor(), col_bin.floor(), orientation_bin.floor());
    let (dr, dc, d_o) = (row_bin - r0, col_bin - c0, orientation_bin - o0);
    let (r0, c0, o0) = (r0 as isize, c0 as isize, o0 as usize);

    for (row, row_weight) in [(r0, 1.0 - dr), (r0 + 1, dr)] {
        if row < 0 || row >= DESCRIPTOR_WIDTH as isize {
            continue;
        }
        for (col, col_weight) in [(c0, 1.0 - dc), (c0 + 1, dc)] {
            if col < 0 || col >= DESCRIPTOR_WIDTH as isize {
                continue;
            }
            let cell = (row as usize * DESCRIPTOR_WIDTH + col as usize) * DESCRIPTOR_BINS;
            for (orientation, orientation_weight) in [(o0, 1.0 - d_o), (o0 + 1, d_o)] {
                histogram[cell + orientation % DESCRIPTOR_BINS] +=
                    value * row_weight * col_weight * orientation_weight;
            }
        }
    }
}

/// Unit length, large components capped, unit length again.
fn normalize_descriptor(histogram: &mut [f32; DESCRIPTOR_SIZE]) {
    let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
    let cap = DESCRIPTOR_MAGNITUDE_CAP * norm;
    histogram.iter_mut().for_each(|v| *v = v.min(cap));

    let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
    histogram.iter_mut().for_each(|v| *v /= norm);
}

/// First and second derivatives of the DoG stack at one sample.
struct LocalDerivatives {
    value: f32,
    gradient: Vector3<f32>,
    hessian: Matrix3<f32>,
}

impl LocalDerivatives {
    fn at(dogs: &[Array2<f32>], layer: usize, y: usize, x: usize) -> Self {
        let (prev, curr, next) = (&dogs[layer - 1], &dogs[layer], &dogs[layer + 1]);
        let value = curr[[y, x]];

        let dx = (curr[[y, x + 1]] - curr[[y, x - 1]]) * 0.5;
        let dy = (curr[[y + 1, x]] - curr[[y - 1, x]]) * 0.5;
        let ds = (next[[y, x]] - prev[[y, x]]) * 0.5;

        let v2 = 2.0 * value;
        let dxx = curr[[y, x + 1]] + curr[[y, x - 1]] - v2;
        let dyy = curr[[y + 1, x]] + curr[[y - 1, x]] - v2;
        let dss = next[[y, x]] + prev[[y, x]] - v2;
        let dxy = (curr[[y + 1, x + 1]] - curr[[y + 1, x - 1]] - curr[[y - 1, x + 1]]
            + curr[[y - 1, x - 1]])
            * 0.25;
        let dxs = (next[[y, x + 1]] - next[[y, x - 1]] - prev[[y, x + 1]] + prev[[y, x - 1]]) * 0.25;
        let dys = (next[[y + 1, x]] - next[[y - 1, x]] - prev[[y + 1, x]] + prev[[y - 1, x]]) * 0.25;

        Self {
            value,
            gradient: Vector3::new(dx, dy, ds),
            hessian: Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss),
        }
    }

    /// Offset `-H^-1 g` to the quadratic's extremum, `None` when singular.
    fn offset(&self) -> Option<Vector3<f32>> {
        let solution = self.hessian.lu().solve(&self.gradient)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(-solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_octave_count() {
        assert_eq!(SiftExtractor::octave_count(400, 300), 5);
        assert_eq!(SiftExtractor::octave_count(16, 64), 1);
        assert_eq!(SiftExtractor::octave_count(15, 400), 0);
    }

    #[test]
    fn test_tiny_image_has_no_features() {
        let image = GrayImage::from_pixel(12, 12, Luma([200]));
        let features = SiftExtractor::default().extract(&image);
        assert!(features.is_empty());
        assert_eq!(features.descriptors.dim(), (0, DESCRIPTOR_SIZE));
    }

    #[test]
    fn test_descriptor_normalization_caps_components() {
        let mut histogram = [0f32; DESCRIPTOR_SIZE];
        histogram[0] = 10.0;
        histogram[1] = 1.0;
        histogram[2] = 1.0;
        normalize_descriptor(&mut histogram);

        let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(histogram[0] < 0.99);
        assert!((histogram[1] - histogram[2]).abs() < 1e-6);
    }

    #[test]
    fn test_accumulate_splits_between_neighbouring_bins() {
        let mut histogram = [0f32; DESCRIPTOR_SIZE];
        accumulate(&mut histogram, 1.5, 2.0, 7.5, 1.0);

        let total: f32 = histogram.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        // Orientation wraps from bin 7 back to bin 0.
        let cell = (DESCRIPTOR_WIDTH + 2) * DESCRIPTOR_BINS;
        assert!((histogram[cell + 7] - 0.25).abs() < 1e-6);
        assert!((histogram[cell] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_single_blob_is_detected_near_its_centre() {
        let image = GrayImage::from_fn(64, 64, |x, y| {
            let d2 = (x as f32 - 32.0).powi(2) + (y as f32 - 30.0).powi(2);
            Luma([(40.0 + 180.0 * (-d2 / (2.0 * 3.0 * 3.0)).exp()) as u8])
        });
        let features = SiftExtractor::default().extract(&image);

        assert!(!features.is_empty());
        assert!(features
            .keypoints
            .iter()
            .any(|kp| (kp.x - 32.0).abs() < 1.5 && (kp.y - 30.0).abs() < 1.5));
    }
}
