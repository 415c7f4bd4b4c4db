use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics of a single camera.
///
/// The model is valid for projection only when all four intrinsics are
/// strictly positive and the image size is known.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// `(width, height)` in pixels.
    #[serde(default)]
    pub image_size: Option<(u32, u32)>,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            image_size: None,
        }
    }

    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = Some((width, height));
        self
    }

    pub fn is_valid_for_projection(&self) -> bool {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        positive(self.fx)
            && positive(self.fy)
            && positive(self.cx)
            && positive(self.cy)
            && matches!(self.image_size, Some((w, h)) if w > 0 && h > 0)
    }

    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Project a camera-frame point; `None` behind the camera.
    #[inline]
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        Some(Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Back-project a pixel at metric depth `z`.
    #[inline]
    pub fn unproject(&self, pixel: &Point2<f64>, z: f64) -> Point3<f64> {
        Point3::new(
            (pixel.x - self.cx) * z / self.fx,
            (pixel.y - self.cy) * z / self.fy,
            z,
        )
    }

    /// Pixel to normalized image-plane coordinates.
    #[inline]
    pub fn normalize(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }
}

/// Rectified stereo pair: left/right intrinsics plus the baseline in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoCameraModel {
    pub left: CameraModel,
    pub right: CameraModel,
    pub baseline: f64,
}

impl StereoCameraModel {
    pub fn is_valid_for_projection(&self) -> bool {
        self.left.is_valid_for_projection()
            && self.right.is_valid_for_projection()
            && self.baseline.is_finite()
            && self.baseline > 0.0
    }

    /// Metric depth for a disparity in pixels.
    #[inline]
    pub fn depth_from_disparity(&self, disparity: f64) -> Option<f64> {
        (disparity > 0.0).then(|| self.left.fx * self.baseline / disparity)
    }
}
