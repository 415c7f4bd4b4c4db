//! Keypoint detectors.

use nalgebra::Point2;
use pair_match_core::{GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::params::DetectorKind;

/// A detected interest point before description.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub position: Point2<f32>,
    /// Diameter of the support region, in pixels.
    pub size: f32,
    pub response: f32,
}

pub trait Detector {
    fn detect(&self, image: &GrayImage) -> Vec<Keypoint>;
}

/// Bresenham circle of radius 3 used by the FAST segment test.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// FAST-9 segment test with 3x3 non-maximum suppression on the score.
#[derive(Clone, Copy, Debug)]
pub struct FastDetector {
    pub threshold: u8,
    /// Contiguous arc length required on the circle.
    pub arc_length: usize,
}

impl Default for FastDetector {
    fn default() -> Self {
        Self {
            threshold: 20,
            arc_length: 9,
        }
    }
}

impl FastDetector {
    /// Score of the pixel at `(x, y)`, 0 when the segment test fails.
    fn score(&self, img: &GrayImageView<'_>, x: usize, y: usize) -> f32 {
        let center = img.data[y * img.width + x] as i32;
        let t = self.threshold as i32;
        let mut ring = [0i32; 16];
        for (k, (dx, dy)) in CIRCLE.iter().enumerate() {
            let px = (x as i32 + dx) as usize;
            let py = (y as i32 + dy) as usize;
            ring[k] = img.data[py * img.width + px] as i32 - center;
        }

        let passes = |sign: i32| -> bool {
            let mut run = 0;
            for k in 0..32 {
                if ring[k % 16] * sign > t {
                    run += 1;
                    if run >= self.arc_length {
                        return true;
                    }
                } else {
                    run = 0;
                }
            }
            false
        };

        let brighter = passes(1);
        let darker = !brighter && passes(-1);
        if !brighter && !darker {
            return 0.0;
        }
        let sign = if brighter { 1 } else { -1 };
        ring.iter()
            .map(|d| (d * sign - t).max(0))
            .sum::<i32>() as f32
    }
}

impl Detector for FastDetector {
    fn detect(&self, image: &GrayImage) -> Vec<Keypoint> {
        let view = image.view();
        let (w, h) = (view.width, view.height);
        if w < 7 || h < 7 {
            return Vec::new();
        }

        let mut scores = vec![0.0f32; w * h];
        for y in 3..h - 3 {
            for x in 3..w - 3 {
                scores[y * w + x] = self.score(&view, x, y);
            }
        }

        let mut out = Vec::new();
        for y in 4..h - 4 {
            for x in 4..w - 4 {
                let s = scores[y * w + x];
                if s <= 0.0 {
                    continue;
                }
                let mut is_max = true;
                'nms: for ny in y - 1..=y + 1 {
                    for nx in x - 1..=x + 1 {
                        if (nx, ny) == (x, y) {
                            continue;
                        }
                        let other = scores[ny * w + nx];
                        // Ties go to the earlier pixel in raster order.
                        if other > s || (other == s && (ny, nx) < (y, x)) {
                            is_max = false;
                            break 'nms;
                        }
                    }
                }
                if is_max {
                    out.push(Keypoint {
                        position: Point2::new(x as f32, y as f32),
                        size: 7.0,
                        response: s,
                    });
                }
            }
        }
        out
    }
}

/// ChESS X-junction detector from the `chess-corners` crate.
#[cfg(feature = "chess")]
#[derive(Clone, Debug)]
pub struct ChessDetector {
    pub config: chess_corners::ChessConfig,
}

#[cfg(feature = "chess")]
impl Default for ChessDetector {
    fn default() -> Self {
        let mut config = chess_corners::ChessConfig::single_scale();
        config.threshold_mode = chess_corners::ThresholdMode::Relative;
        config.threshold_value = 0.2;
        config.nms_radius = 2;
        Self { config }
    }
}

#[cfg(feature = "chess")]
impl Detector for ChessDetector {
    fn detect(&self, image: &GrayImage) -> Vec<Keypoint> {
        let Some(img) =
            image::GrayImage::from_raw(image.width as u32, image.height as u32, image.data.clone())
        else {
            log::warn!(
                "gray buffer does not match {}x{}, no ChESS corners",
                image.width,
                image.height
            );
            return Vec::new();
        };
        let corners = match chess_corners::find_chess_corners_image(&img, &self.config) {
            Ok(corners) => corners,
            Err(err) => {
                log::warn!("ChESS detection failed: {err}");
                return Vec::new();
            }
        };
        corners
            .iter()
            .map(|c| Keypoint {
                position: Point2::new(c.x, c.y),
                size: 10.0,
                response: c.response,
            })
            .collect()
    }
}

/// Detect with the configured detector and keep the `max_features` strongest
/// (all of them when `max_features` is 0).
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(image), fields(width = image.width, height = image.height))
)]
pub fn detect_keypoints(image: &GrayImage, kind: DetectorKind, max_features: usize) -> Vec<Keypoint> {
    let mut keypoints = match kind {
        DetectorKind::Fast => FastDetector::default().detect(image),
        #[cfg(feature = "chess")]
        DetectorKind::Chess => ChessDetector::default().detect(image),
        #[cfg(not(feature = "chess"))]
        DetectorKind::Chess => {
            log::warn!("built without the `chess` feature, falling back to FAST");
            FastDetector::default().detect(image)
        }
    };
    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
    if max_features > 0 {
        keypoints.truncate(max_features);
    }
    keypoints
}
