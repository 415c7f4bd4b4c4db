//! Calibrated sensor snapshots fed to registration.

use nalgebra::{Point2, Point3};

use crate::calibration::Calibration;
use crate::image::{AuxImage, ColorImage, GrayImage};
use crate::stereo::{disparity_at, BlockMatchParams};

/// Image + optional depth/right image + the active calibration.
///
/// Immutable once built; the grayscale copy is computed at build time.
#[derive(Clone, Debug)]
pub struct Observation {
    id: i32,
    image: ColorImage,
    gray: GrayImage,
    aux: Option<AuxImage>,
    calibration: Calibration,
}

impl Observation {
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    #[inline]
    pub fn image(&self) -> &ColorImage {
        &self.image
    }

    #[inline]
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    #[inline]
    pub fn aux(&self) -> Option<&AuxImage> {
        self.aux.as_ref()
    }

    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn has_aux(&self) -> bool {
        self.aux.is_some()
    }

    pub fn is_stereo(&self) -> bool {
        self.calibration.is_stereo()
    }

    /// 3D point (camera frame, metres) behind a pixel of the image.
    ///
    /// Uses the depth map directly, or a local disparity search for stereo
    /// pairs. `None` without depth information or on invalid measurements.
    pub fn point3(&self, pixel: Point2<f32>) -> Option<Point3<f64>> {
        let x = pixel.x.round();
        let y = pixel.y.round();
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let (xi, yi) = (x as usize, y as usize);
        let cam = self.calibration.camera();
        let px = Point2::new(pixel.x as f64, pixel.y as f64);

        match (&self.aux, &self.calibration) {
            (Some(AuxImage::Depth(depth)), _) => {
                let (sx, sy) = depth_scale(&self.gray, depth.width, depth.height);
                let z = depth.depth((xi as f32 * sx) as usize, (yi as f32 * sy) as usize)?;
                Some(cam.unproject(&px, z as f64))
            }
            (Some(AuxImage::Right(right)), Calibration::Stereo(stereo)) => {
                let d = disparity_at(&self.gray, right, xi, yi, &BlockMatchParams::default())?;
                let z = stereo.depth_from_disparity(d as f64)?;
                Some(cam.unproject(&px, z))
            }
            _ => None,
        }
    }
}

fn depth_scale(image: &GrayImage, width: usize, height: usize) -> (f32, f32) {
    if image.width == 0 || image.height == 0 {
        return (1.0, 1.0);
    }
    (
        width as f32 / image.width as f32,
        height as f32 / image.height as f32,
    )
}

/// Packages images with the resolved calibration.
#[derive(Clone, Copy, Debug)]
pub struct ObservationBuilder {
    calibration: Calibration,
}

impl ObservationBuilder {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    pub fn build(&self, id: i32, image: ColorImage, aux: Option<AuxImage>) -> Observation {
        let gray = image.to_gray();
        Observation {
            id,
            image,
            gray,
            aux,
            calibration: self.calibration,
        }
    }

    /// Build the "from" (id 1) and "to" (id 2) observations.
    pub fn build_pair(
        &self,
        from: (ColorImage, Option<AuxImage>),
        to: (ColorImage, Option<AuxImage>),
    ) -> (Observation, Observation) {
        (self.build(1, from.0, from.1), self.build(2, to.0, to.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraModel, StereoCameraModel};
    use crate::image::DepthImage;
    use approx::assert_relative_eq;

    fn color(w: usize, h: usize) -> ColorImage {
        ColorImage {
            width: w,
            height: h,
            data: vec![128; w * h * 3],
        }
    }

    fn cam() -> CameraModel {
        CameraModel::new(100.0, 100.0, 10.0, 10.0).with_image_size(20, 20)
    }

    #[test]
    fn pair_gets_ids_one_and_two() {
        let builder = ObservationBuilder::new(Calibration::Mono(cam()));
        let (a, b) = builder.build_pair((color(20, 20), None), (color(20, 20), None));
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert!(!a.is_stereo());
        assert_eq!(a.gray().data.len(), 400);
    }

    #[test]
    fn stereo_calibration_tags_both_observations() {
        let stereo = StereoCameraModel {
            left: cam(),
            right: cam(),
            baseline: 0.05,
        };
        let builder = ObservationBuilder::new(Calibration::Stereo(stereo));
        let right = AuxImage::Right(GrayImage::new(20, 20));
        let (a, b) = builder.build_pair(
            (color(20, 20), Some(right.clone())),
            (color(20, 20), Some(right)),
        );
        assert!(a.is_stereo() && b.is_stereo());
    }

    #[test]
    fn depth_lookup_unprojects() {
        let mut depth = DepthImage::from_millimeters(20, 20, &[0; 400]);
        depth.data[10 * 20 + 15] = 2.0;
        let obs = ObservationBuilder::new(Calibration::Mono(cam())).build(
            1,
            color(20, 20),
            Some(AuxImage::Depth(depth)),
        );
        let p = obs.point3(Point2::new(15.0, 10.0)).expect("valid depth");
        assert_relative_eq!(p, Point3::new(0.1, 0.0, 2.0), epsilon = 1e-9);
        assert!(obs.point3(Point2::new(3.0, 3.0)).is_none());
    }
}
