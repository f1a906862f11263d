//! Synthetic scenes with known ground truth, for tests and benchmarks.

use std::ops::RangeInclusive;

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::algorithms::homography::{Homography, Point};
use crate::utils::ransac::PointPair;

pub const SCENE_WIDTH: u32 = 400;
pub const SCENE_HEIGHT: u32 = 300;
pub const PATCH_SIZE: f64 = 50.0;
/// Top-left corner of the textured patch in the reference image.
pub const REFERENCE_PATCH_ORIGIN: (f64, f64) = (100.0, 100.0);
/// Top-left corner of the (unrotated) patch in the target image.
pub const TARGET_PATCH_ORIGIN: (f64, f64) = (120.0, 115.0);
pub const TARGET_ROTATION_DEGREES: f64 = 15.0;

/// Background noise range; narrow enough to stay below the detector's
/// contrast threshold.
const NOISE_RANGE: RangeInclusive<u8> = 118..=138;
/// Background noise of `full_noise_patch_scene`, which the detector does see.
const FULL_NOISE_RANGE: RangeInclusive<u8> = 0..=255;
const BLOB_COUNT: usize = 25;

#[derive(Debug, Clone, Copy)]
struct Blob {
    x: f64,
    y: f64,
    sigma: f64,
    amplitude: f64,
}

/// Sum of Gaussian blobs over a `PATCH_SIZE` square, evaluated analytically
/// so it can be sampled at any rotation without interpolation blur.
#[derive(Debug, Clone)]
pub struct BlobTexture {
    blobs: Vec<Blob>,
}

impl BlobTexture {
    pub fn random(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let blobs = (0..BLOB_COUNT)
            .map(|_| {
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                Blob {
                    x: rng.gen_range(6.0..PATCH_SIZE - 6.0),
                    y: rng.gen_range(6.0..PATCH_SIZE - 6.0),
                    sigma: rng.gen_range(2.0..4.0),
                    amplitude: sign * rng.gen_range(60.0..110.0),
                }
            })
            .collect();
        Self { blobs }
    }

    /// Intensity at patch coordinates `(u, v)`, clamped to [0, 255].
    pub fn value(&self, u: f64, v: f64) -> f64 {
        let sum: f64 = self
            .blobs
            .iter()
            .map(|b| {
                let d2 = (u - b.x).powi(2) + (v - b.y).powi(2);
                b.amplitude * (-d2 / (2.0 * b.sigma * b.sigma)).exp()
            })
            .sum();
        (128.0 + sum).clamp(0.0, 255.0)
    }

    pub fn contains(u: f64, v: f64) -> bool {
        (0.0..PATCH_SIZE).contains(&u) && (0.0..PATCH_SIZE).contains(&v)
    }
}

/// Reference and target images sharing one textured patch, plus the true
/// target-to-reference homography.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub reference: GrayImage,
    pub target: GrayImage,
    pub truth: Homography,
}

impl SyntheticScene {
    /// Patch corners in the target image, clockwise from top-left.
    pub fn target_patch_corners(&self) -> [Point; 4] {
        let inverse = self.truth.inverse();
        reference_patch_corners().map(|corner| inverse.apply(&corner).unwrap_or(corner))
    }
}

/// Patch corners in the reference image, clockwise from top-left.
pub fn reference_patch_corners() -> [Point; 4] {
    let (x0, y0) = REFERENCE_PATCH_ORIGIN;
    [
        Point::new(x0, y0),
        Point::new(x0 + PATCH_SIZE, y0),
        Point::new(x0 + PATCH_SIZE, y0 + PATCH_SIZE),
        Point::new(x0, y0 + PATCH_SIZE),
    ]
}

/// Homography taking target pixels to reference pixels for the patch scene:
/// rotate about the target patch centre, then move onto the reference patch.
pub fn patch_scene_truth() -> Homography {
    let half = PATCH_SIZE / 2.0;
    let (rcx, rcy) = (REFERENCE_PATCH_ORIGIN.0 + half, REFERENCE_PATCH_ORIGIN.1 + half);
    let (tcx, tcy) = (TARGET_PATCH_ORIGIN.0 + half, TARGET_PATCH_ORIGIN.1 + half);
    let (sin, cos) = TARGET_ROTATION_DEGREES.to_radians().sin_cos();

    // reference = R(-theta) * (target - target_centre) + reference_centre
    Homography::from_rows([
        [cos, sin, rcx - (cos * tcx + sin * tcy)],
        [-sin, cos, rcy - (-sin * tcx + cos * tcy)],
        [0.0, 0.0, 1.0],
    ])
    .unwrap_or_default()
}

/// 400x300 reference with the patch at (100,100)-(150,150), and a target with
/// the same patch at (120,115) rotated by 15 degrees. Backgrounds are
/// independent low-contrast uniform noise.
pub fn patch_scene(seed: u64) -> SyntheticScene {
    build_patch_scene(seed, NOISE_RANGE)
}

/// Same layout as [`patch_scene`] over full-range uniform noise, so both
/// backgrounds produce unrelated keypoints the matcher has to reject.
pub fn full_noise_patch_scene(seed: u64) -> SyntheticScene {
    build_patch_scene(seed, FULL_NOISE_RANGE)
}

fn build_patch_scene(seed: u64, noise: RangeInclusive<u8>) -> SyntheticScene {
    let texture = BlobTexture::random(seed);
    let truth = patch_scene_truth();
    let (ox, oy) = REFERENCE_PATCH_ORIGIN;

    let mut reference = noise_image_in(SCENE_WIDTH, SCENE_HEIGHT, seed.wrapping_add(1), noise.clone());
    for (x, y, pixel) in reference.enumerate_pixels_mut() {
        let (u, v) = (x as f64 - ox, y as f64 - oy);
        if BlobTexture::contains(u, v) {
            *pixel = Luma([texture.value(u, v).round() as u8]);
        }
    }

    let mut target = noise_image_in(SCENE_WIDTH, SCENE_HEIGHT, seed.wrapping_add(2), noise);
    for (x, y, pixel) in target.enumerate_pixels_mut() {
        let Some(mapped) = truth.apply(&Point::new(x as f64, y as f64)) else {
            continue;
        };
        let (u, v) = (mapped.x - ox, mapped.y - oy);
        if BlobTexture::contains(u, v) {
            *pixel = Luma([texture.value(u, v).round() as u8]);
        }
    }

    SyntheticScene {
        reference,
        target,
        truth,
    }
}

pub fn noise_image(width: u32, height: u32, seed: u64) -> GrayImage {
    noise_image_in(width, height, seed, NOISE_RANGE)
}

pub fn noise_image_in(width: u32, height: u32, seed: u64, range: RangeInclusive<u8>) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(width, height, |_, _| Luma([rng.gen_range(range.clone())]))
}

pub fn uniform_image(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
}

/// `count` target points spread over the scene, paired with their image under
/// `homography` plus Gaussian noise of `noise_sigma` pixels.
pub fn correspondences_under(homography: &Homography, count: usize, noise_sigma: f64, seed: u64) -> Vec<PointPair> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = (noise_sigma > 0.0)
        .then(|| Normal::new(0.0, noise_sigma).ok())
        .flatten();

    (0..count)
        .filter_map(|_| {
            let target = Point::new(
                rng.gen_range(0.0..SCENE_WIDTH as f64),
                rng.gen_range(0.0..SCENE_HEIGHT as f64),
            );
            let mut reference = homography.apply(&target)?;
            if let Some(noise) = &noise {
                reference.x += noise.sample(&mut rng);
                reference.y += noise.sample(&mut rng);
            }
            Some(PointPair { target, reference })
        })
        .collect()
}
