//! Sparse block matching on a rectified stereo pair.

use crate::image::GrayImage;

/// Local SAD search along the epipolar row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockMatchParams {
    pub block_size: usize,
    pub max_disparity: usize,
    /// Second-best cost must exceed `best / uniqueness_ratio`.
    pub uniqueness_ratio: f32,
}

impl Default for BlockMatchParams {
    fn default() -> Self {
        Self {
            block_size: 9,
            max_disparity: 128,
            uniqueness_ratio: 0.9,
        }
    }
}

fn sad(left: &GrayImage, right: &GrayImage, x: usize, y: usize, d: usize, half: usize) -> u32 {
    let mut cost = 0u32;
    for dy in 0..=2 * half {
        let row = y + dy - half;
        let l = &left.data[row * left.width + x - half..=row * left.width + x + half];
        let xr = x - d;
        let r = &right.data[row * right.width + xr - half..=row * right.width + xr + half];
        cost += l
            .iter()
            .zip(r)
            .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs())
            .sum::<u32>();
    }
    cost
}

/// Disparity in pixels at `(x, y)` of the left image, with parabolic
/// sub-pixel refinement. `None` on textureless or ambiguous matches.
pub fn disparity_at(
    left: &GrayImage,
    right: &GrayImage,
    x: usize,
    y: usize,
    params: &BlockMatchParams,
) -> Option<f32> {
    if left.width != right.width || left.height != right.height {
        return None;
    }
    let half = params.block_size / 2;
    if x < half || y < half || x + half >= left.width || y + half >= left.height {
        return None;
    }
    let max_d = params.max_disparity.min(x - half);
    if max_d < 1 {
        return None;
    }

    let costs: Vec<u32> = (0..=max_d)
        .map(|d| sad(left, right, x, y, d, half))
        .collect();
    let (best_d, &best) = costs.iter().enumerate().min_by_key(|(_, &c)| c)?;

    let second = costs
        .iter()
        .enumerate()
        .filter(|(d, _)| d.abs_diff(best_d) > 1)
        .map(|(_, &c)| c)
        .min()
        .unwrap_or(u32::MAX);
    if (best as f32) > params.uniqueness_ratio * second as f32 {
        return None;
    }
    if best_d == 0 {
        return None;
    }

    let mut d = best_d as f32;
    if best_d < max_d {
        let c0 = costs[best_d - 1] as f32;
        let c1 = best as f32;
        let c2 = costs[best_d + 1] as f32;
        let denom = c0 - 2.0 * c1 + c2;
        if denom > 0.0 {
            d += 0.5 * (c0 - c2) / denom;
        }
    }
    Some(d)
}
