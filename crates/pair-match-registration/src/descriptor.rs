//! 256-bit BRIEF descriptors.

use nalgebra::Point2;
use pair_match_core::GrayImage;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::features::Keypoint;

pub const DESCRIPTOR_BITS: usize = 256;
const PATCH_RADIUS: i32 = 15;
const SMOOTH_RADIUS: i32 = 2;
const PATTERN_SEED: u64 = 0xb41e_f256;

/// Packed binary descriptor, bit `i` lives in word `i / 64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    pub fn bit(&self, i: usize) -> bool {
        (self.0[i / 64] >> (i % 64)) & 1 == 1
    }

    /// One `0.0`/`1.0` coordinate per bit; squared Euclidean distance between
    /// two expansions equals their Hamming distance.
    pub fn expand(&self) -> [f32; DESCRIPTOR_BITS] {
        let mut out = [0.0f32; DESCRIPTOR_BITS];
        for (i, v) in out.iter_mut().enumerate() {
            if self.bit(i) {
                *v = 1.0;
            }
        }
        out
    }
}

/// A keypoint that survived description.
#[derive(Clone, Copy, Debug)]
pub struct Described {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

/// Test pairs sampled once from an isotropic distribution over the patch.
pub struct BriefExtractor {
    pairs: Vec<((i32, i32), (i32, i32))>,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let mut sample = || -> (i32, i32) {
            loop {
                let x = rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS);
                let y = rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS);
                if x * x + y * y <= PATCH_RADIUS * PATCH_RADIUS {
                    return (x, y);
                }
            }
        };
        let pairs = (0..DESCRIPTOR_BITS).map(|_| (sample(), sample())).collect();
        Self { pairs }
    }
}

impl BriefExtractor {
    /// Describe every keypoint far enough from the border; the others are
    /// dropped.
    pub fn describe(&self, image: &GrayImage, keypoints: &[Keypoint]) -> Vec<Described> {
        let margin = (PATCH_RADIUS + SMOOTH_RADIUS + 1) as f32;
        let w = image.width as f32;
        let h = image.height as f32;
        let smoothed = box_blur(image, SMOOTH_RADIUS);

        keypoints
            .iter()
            .filter(|k| {
                let p = k.position;
                p.x >= margin && p.y >= margin && p.x < w - margin && p.y < h - margin
            })
            .map(|k| Described {
                keypoint: *k,
                descriptor: self.describe_one(&smoothed, k.position),
            })
            .collect()
    }

    fn describe_one(&self, smoothed: &GrayImage, at: Point2<f32>) -> Descriptor {
        let cx = at.x.round() as i32;
        let cy = at.y.round() as i32;
        let sample = |(dx, dy): (i32, i32)| -> u8 {
            smoothed.get((cx + dx) as usize, (cy + dy) as usize)
        };
        let mut words = [0u64; 4];
        for (i, &(a, b)) in self.pairs.iter().enumerate() {
            if sample(a) < sample(b) {
                words[i / 64] |= 1 << (i % 64);
            }
        }
        Descriptor(words)
    }
}

/// Mean filter through an integral image; borders are clamped.
fn box_blur(image: &GrayImage, radius: i32) -> GrayImage {
    let (w, h) = (image.width, image.height);
    let stride = w + 1;
    let mut integral = vec![0u32; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0u32;
        for x in 0..w {
            row += image.data[y * w + x] as u32;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let y0 = (y as i32 - radius).max(0) as usize;
        let y1 = ((y as i32 + radius + 1) as usize).min(h);
        for x in 0..w {
            let x0 = (x as i32 - radius).max(0) as usize;
            let x1 = ((x as i32 + radius + 1) as usize).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let area = ((x1 - x0) * (y1 - y0)) as u32;
            out.data[y * w + x] = (sum / area) as u8;
        }
    }
    out
}
